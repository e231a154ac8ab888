use enostr::Note;
use tracing::debug;

/// Decides whether a note from a relay may enter the store.
pub trait NoteVerifier {
    fn verify(&self, note: &Note) -> bool;
}

/// Checks the id hash and schnorr signature.
#[derive(Debug, Default, Clone, Copy)]
pub struct SignatureVerifier;

impl NoteVerifier for SignatureVerifier {
    fn verify(&self, note: &Note) -> bool {
        match note.verify() {
            Ok(()) => true,
            Err(err) => {
                debug!("dropping note {}: {err}", note.id);
                false
            }
        }
    }
}

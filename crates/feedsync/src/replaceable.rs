use enostr::{NormRelayUrl, Note, NoteId, Pubkey};
use hashbrown::HashMap;
use tracing::debug;

/// Kinds where only the latest note per author matters
pub fn is_replaceable(kind: u32) -> bool {
    kind == 0 || kind == 3 || (10_000..20_000).contains(&kind)
}

#[derive(Debug, Clone)]
struct Cursor {
    note: Note,
    /// relays known to hold `note`
    holders: Vec<NormRelayUrl>,
}

impl Cursor {
    fn new(note: Note, relay: &NormRelayUrl) -> Self {
        Self {
            note,
            holders: vec![relay.clone()],
        }
    }

    /// Strictly newer, or same second with the smaller id
    fn is_superseded_by(&self, note: &Note) -> bool {
        note.created_at > self.note.created_at
            || (note.created_at == self.note.created_at && note.id < self.note.id)
    }
}

/// A note to push back to a relay that served an outdated copy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Correction {
    pub relay: NormRelayUrl,
    pub note: Note,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// the note is the new latest value, forward it
    Accepted { corrections: Vec<Correction> },
    /// the note is the latest value we already have
    Confirmed,
    /// an older value, dropped
    Stale { correction: Option<Correction> },
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted { .. })
    }

    pub fn corrections(self) -> Vec<Correction> {
        match self {
            Verdict::Accepted { corrections } => corrections,
            Verdict::Confirmed => vec![],
            Verdict::Stale { correction } => correction.into_iter().collect(),
        }
    }
}

/// Latest-wins reducer for replaceable notes, shared by every relay in a
/// session
#[derive(Debug, Default)]
pub struct ReplaceableResolver {
    cursors: HashMap<(Pubkey, u32), Cursor>,
}

impl ReplaceableResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self, author: &Pubkey, kind: u32) -> Option<&Note> {
        self.cursors.get(&(*author, kind)).map(|c| &c.note)
    }

    pub fn current_id(&self, author: &Pubkey, kind: u32) -> Option<NoteId> {
        self.current(author, kind).map(|n| n.id)
    }

    #[profiling::function]
    pub fn offer(&mut self, note: &Note, relay: &NormRelayUrl) -> Verdict {
        let key = (note.pubkey, note.kind);

        let Some(cursor) = self.cursors.get_mut(&key) else {
            self.cursors.insert(key, Cursor::new(note.clone(), relay));
            return Verdict::Accepted {
                corrections: vec![],
            };
        };

        if cursor.note.id == note.id {
            if !cursor.holders.contains(relay) {
                cursor.holders.push(relay.clone());
            }
            return Verdict::Confirmed;
        }

        if cursor.is_superseded_by(note) {
            let old = std::mem::replace(cursor, Cursor::new(note.clone(), relay));
            let corrections = if old.note.is_protected() || note.is_protected() {
                vec![]
            } else {
                old.holders
                    .into_iter()
                    .filter(|r| r != relay)
                    .map(|r| Correction {
                        relay: r,
                        note: note.clone(),
                    })
                    .collect()
            };
            debug!(
                "kind {} of {} replaced by {} ({} corrections)",
                note.kind,
                note.pubkey,
                note.id,
                corrections.len()
            );
            return Verdict::Accepted { corrections };
        }

        let correction = if note.is_protected() || cursor.note.is_protected() {
            None
        } else {
            Some(Correction {
                relay: relay.clone(),
                note: cursor.note.clone(),
            })
        };

        debug!("stale kind {} of {} from {}", note.kind, note.pubkey, relay);
        Verdict::Stale { correction }
    }
}

//! Unsigned notes for unit tests. Signatures are never checked here, the
//! store takes its verifier as an argument.

use enostr::{NormRelayUrl, Note, NoteId, Pubkey};

pub fn relay(url: &str) -> NormRelayUrl {
    NormRelayUrl::new(url).expect("relay url")
}

pub fn pubkey(n: u8) -> Pubkey {
    Pubkey::new([n; 32])
}

pub fn note(id: u8, created_at: u64) -> Note {
    NoteBuilder::new(id, created_at).build()
}

pub struct NoteBuilder {
    note: Note,
}

impl NoteBuilder {
    pub fn new(id: u8, created_at: u64) -> Self {
        Self {
            note: Note {
                id: NoteId::new([id; 32]),
                pubkey: pubkey(0x11),
                created_at,
                kind: enostr::KIND_TEXT_NOTE,
                tags: vec![],
                content: String::new(),
                sig: "00".repeat(64),
            },
        }
    }

    pub fn kind(mut self, kind: u32) -> Self {
        self.note.kind = kind;
        self
    }

    pub fn author(mut self, pk: Pubkey) -> Self {
        self.note.pubkey = pk;
        self
    }

    pub fn content(mut self, content: &str) -> Self {
        self.note.content = content.to_owned();
        self
    }

    pub fn tag(mut self, tag: &[&str]) -> Self {
        self.note.tags.push(tag.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn build(self) -> Note {
        self.note
    }
}

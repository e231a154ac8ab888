use std::fmt;

use enostr::{Note, ProfileState, Pubkey};
use hashbrown::HashMap;

/// `name@domain`. `_@domain` is the domain's root identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nip05 {
    pub name: String,
    pub domain: String,
}

impl Nip05 {
    pub fn parse(s: &str) -> Option<Self> {
        let (name, domain) = s.rsplit_once('@')?;
        Some(Self {
            name: name.to_owned(),
            domain: domain.to_owned(),
        })
    }

    pub fn is_root(&self) -> bool {
        self.name == "_"
    }
}

impl fmt::Display for Nip05 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            write!(f, "@{}", self.domain)
        } else {
            write!(f, "{}@{}", self.name, self.domain)
        }
    }
}

/// What the timeline shows next to a note
#[derive(Debug, Clone, PartialEq)]
pub struct UserProfile {
    pub pubkey: Pubkey,
    pub name: String,
    pub picture: Option<String>,
    pub nip05: Option<Nip05>,
    /// custom emoji shortcode -> image url
    pub emojis: HashMap<String, String>,
    pub created_at: u64,
}

impl UserProfile {
    /// Build from a kind 0 note. Contents that aren't a json object still
    /// give a profile, named after the pubkey.
    pub fn from_note(note: &Note) -> Self {
        let emojis = note
            .tags
            .iter()
            .filter(|t| t.len() >= 3 && t[0] == "emoji")
            .map(|t| (t[1].clone(), t[2].clone()))
            .collect();

        let mut profile = UserProfile {
            pubkey: note.pubkey,
            name: String::new(),
            picture: None,
            nip05: None,
            emojis,
            created_at: note.created_at,
        };

        match ProfileState::from_note_contents(&note.content) {
            Some(state) => {
                profile.name = state
                    .display_name()
                    .or_else(|| state.name())
                    .unwrap_or_default()
                    .to_owned();
                profile.picture = state.picture().map(str::to_owned);
                profile.nip05 = state.nip05().and_then(Nip05::parse);
            }
            None => {
                profile.name = note.pubkey.hex();
            }
        }

        profile
    }
}

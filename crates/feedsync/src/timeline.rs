use std::fmt::{self, Display};

use enostr::{Filter, Note, Pubkey, KIND_CONTACTS, KIND_RELAY_LIST};
use tracing::{debug, warn};

use crate::{Error, Result};

/// What the timeline is a timeline of
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimelineKind {
    /// notes from everyone this key follows
    Home(Pubkey),
    /// notes from one author
    User(Pubkey),
    /// whatever the filter says
    Custom(Filter),
}

impl TimelineKind {
    /// Home timeline for a hex or npub handle
    pub fn home(handle: &str) -> Result<Self> {
        Ok(TimelineKind::Home(parse_identity(handle)?))
    }

    pub fn user(handle: &str) -> Result<Self> {
        Ok(TimelineKind::User(parse_identity(handle)?))
    }

    /// The base filter if it can be known without asking relays
    pub fn initial_filter(&self) -> FilterState {
        match self {
            TimelineKind::Home(_) => FilterState::NeedsRemote,
            TimelineKind::User(pk) => FilterState::ready(Filter::new().authors([*pk])),
            TimelineKind::Custom(filter) => FilterState::ready(filter.clone()),
        }
    }

    /// Query for the contact list and relay list of a home timeline owner
    pub fn identity_filter(&self) -> Option<Filter> {
        match self {
            TimelineKind::Home(pk) => Some(
                Filter::new()
                    .kinds([KIND_CONTACTS, KIND_RELAY_LIST])
                    .authors([*pk]),
            ),
            TimelineKind::User(_) | TimelineKind::Custom(_) => None,
        }
    }
}

impl Display for TimelineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimelineKind::Home(_) => f.write_str("Home"),
            TimelineKind::User(_) => f.write_str("User"),
            TimelineKind::Custom(_) => f.write_str("Custom"),
        }
    }
}

fn parse_identity(handle: &str) -> Result<Pubkey> {
    Pubkey::parse(handle.trim()).map_err(|_| Error::InvalidIdentity(handle.to_owned()))
}

/// The filter every query of the timeline is overlaid with
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterState {
    /// We need the contact list from relays before we can query anything
    NeedsRemote,
    Ready(Filter),
}

impl FilterState {
    pub fn ready(filter: Filter) -> Self {
        Self::Ready(filter)
    }

    pub fn get_filter(&self) -> Option<&Filter> {
        match self {
            FilterState::Ready(filter) => Some(filter),
            FilterState::NeedsRemote => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, FilterState::Ready(_))
    }
}

/// Create an author filter from a contact list. Anything that isn't a
/// lowercase hex key is skipped.
pub fn filter_from_contacts(note: &Note) -> Option<Filter> {
    let authors: Vec<String> = note
        .tag_values("p")
        .filter(|pk| Pubkey::is_hex64(pk))
        .map(str::to_owned)
        .collect();

    if authors.is_empty() {
        warn!("no authors found in contact list {}", note.id);
        return None;
    }

    debug!("adding {} authors to contact filter", authors.len());

    Some(Filter {
        authors: Some(authors),
        ..Default::default()
    })
}

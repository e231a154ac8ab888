//! Keeps one merged, newest-first timeline in sync across several nostr
//! relays: live subscriptions at the top, bounded backfill at the bottom,
//! latest-wins handling of replaceable notes and discovery of extra relays
//! from the relay lists of followed authors.

mod backfill;
mod config;
mod discovery;
mod endpoint;
mod error;
mod gate;
mod profile;
mod reactions;
mod replaceable;
mod session;
mod store;
mod timeline;
mod verify;

#[cfg(test)]
mod test_notes;

pub use backfill::{backfill, BackfillPlan, BackfillStep, HistorySource};
pub use config::{SyncConfig, DEFAULT_RELAYS};
pub use discovery::{read_relays, relay_list, write_relays, ActiveProbe, RelayDiscovery, RelayUsage};
pub use endpoint::{LiveState, LoadOutcome, LoadResult, LoadingOld, RelayEndpoint};
pub use error::Error;
pub use gate::{ConcurrencyGate, Issue, QueryBatch, QueryId, Subscriber};
pub use profile::{Nip05, UserProfile};
pub use reactions::ReactionTally;
pub use replaceable::{is_replaceable, Correction, ReplaceableResolver, Verdict};
pub use session::Session;
pub use store::{timeline_cmp, EventRecord, EventStore, InsertResult};
pub use timeline::{filter_from_contacts, FilterState, TimelineKind};
pub use verify::{NoteVerifier, SignatureVerifier};

pub type Result<T> = std::result::Result<T, Error>;

mod client;
mod error;
mod filter;
mod note;
mod profile;
mod pubkey;
mod relay;

pub use client::ClientMessage;
pub use error::Error;
pub use ewebsock;
pub use filter::Filter;
pub use note::{
    Note, NoteId, KIND_CONTACTS, KIND_METADATA, KIND_REACTION, KIND_RELAY_LIST, KIND_TEXT_NOTE,
};
pub use profile::ProfileState;
pub use pubkey::Pubkey;
pub use relay::message::{CommandResult, RelayMessage};
pub use relay::pool::{PoolEvent, PoolEventBuf, PoolRelay, RelayPool};
pub use relay::{
    NormRelayUrl, Relay, RelayLimitations, RelayReqId, RelayStatus, RelayTransport, SubPass,
    SubPassGuardian, Wakeup,
};

pub type Result<T> = std::result::Result<T, error::Error>;

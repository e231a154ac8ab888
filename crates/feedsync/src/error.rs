use enostr::NormRelayUrl;

/// Failures surfaced to callers waiting on a load. Clone so one in-flight
/// load can hand the same outcome to every attached waiter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("transport error on {relay}: {reason}")]
    Transport { relay: String, reason: String },

    #[error("{relay} closed the subscription: {reason}")]
    RelayClosed { relay: String, reason: String },

    #[error("{0} disconnected")]
    Disconnected(String),

    #[error("relay probe timed out")]
    ProbeTimeout,

    #[error("invalid identity '{0}'")]
    InvalidIdentity(String),

    #[error("session closed")]
    Cancelled,

    #[error("unknown relay {0}")]
    UnknownRelay(String),

    #[error("nostr: {0}")]
    Nostr(String),

    #[error("json: {0}")]
    Json(String),
}

impl Error {
    pub fn transport(relay: &NormRelayUrl, err: enostr::Error) -> Self {
        Error::Transport {
            relay: relay.to_string(),
            reason: err.to_string(),
        }
    }

    pub fn relay_closed(relay: &NormRelayUrl, reason: &str) -> Self {
        Error::RelayClosed {
            relay: relay.to_string(),
            reason: reason.to_owned(),
        }
    }

    pub fn disconnected(relay: &NormRelayUrl) -> Self {
        Error::Disconnected(relay.to_string())
    }
}

impl From<enostr::Error> for Error {
    fn from(err: enostr::Error) -> Self {
        Error::Nostr(err.to_string())
    }
}

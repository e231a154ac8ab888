use crate::{ClientMessage, Result};

mod identity;
mod limits;
pub mod message;
pub mod pool;
mod websocket;

pub use identity::{NormRelayUrl, RelayReqId};
pub use limits::{RelayLimitations, SubPass, SubPassGuardian};
pub use websocket::Relay;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayStatus {
    Connected,
    Connecting,
    Disconnected,
}

/// Called by the websocket thread when a relay has something for us, so the
/// owner of the pool knows to poll it.
pub trait Wakeup: Send + Sync + Clone + 'static {
    fn wake(&self);
}

impl<F> Wakeup for F
where
    F: Fn() + Send + Sync + Clone + 'static,
{
    fn wake(&self) {
        self()
    }
}

/// The seam between the sync engine and the network. The pool implements
/// this over websockets; tests plug in a recorder.
pub trait RelayTransport {
    /// Open (or keep) a connection to `relay`. Idempotent.
    fn ensure_relay(&mut self, relay: &NormRelayUrl) -> Result<()>;

    /// Queue `msg` for `relay`. Messages sent while the relay is still
    /// connecting are delivered once it opens.
    fn send(&mut self, relay: &NormRelayUrl, msg: &ClientMessage) -> Result<()>;

    /// Drop the connection to `relay`.
    fn release_relay(&mut self, relay: &NormRelayUrl);
}

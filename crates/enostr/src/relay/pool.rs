use crate::relay::{NormRelayUrl, Relay, RelayStatus, RelayTransport, Wakeup};
use crate::{ClientMessage, Error, Result};

use std::time::{Duration, Instant};

use ewebsock::{WsEvent, WsMessage};
use tracing::{debug, error, info, warn};

#[derive(Debug)]
pub struct PoolEvent<'a> {
    pub relay: &'a NormRelayUrl,
    pub event: ewebsock::WsEvent,
}

impl PoolEvent<'_> {
    pub fn into_owned(self) -> PoolEventBuf {
        PoolEventBuf {
            relay: self.relay.to_owned(),
            event: self.event,
        }
    }
}

#[derive(Debug)]
pub struct PoolEventBuf {
    pub relay: NormRelayUrl,
    pub event: ewebsock::WsEvent,
}

pub struct PoolRelay {
    pub relay: Relay,
    pub last_ping: Instant,
    pub last_connect_attempt: Instant,
    pub retry_connect_after: Duration,
    /// messages queued while the socket isn't open yet
    pending: Vec<ClientMessage>,
}

impl PoolRelay {
    pub fn new(relay: Relay) -> PoolRelay {
        PoolRelay {
            relay,
            last_ping: Instant::now(),
            last_connect_attempt: Instant::now(),
            retry_connect_after: Self::initial_reconnect_duration(),
            pending: vec![],
        }
    }

    pub fn initial_reconnect_duration() -> Duration {
        Duration::from_secs(5)
    }

    fn send(&mut self, msg: &ClientMessage) -> Result<()> {
        match self.relay.status {
            RelayStatus::Connected => self.relay.send(msg),
            RelayStatus::Connecting | RelayStatus::Disconnected => {
                // serialize now so a bad message fails at the call site
                msg.to_json()?;
                self.pending.push(msg.clone());
                Ok(())
            }
        }
    }

    fn flush(&mut self) {
        for msg in std::mem::take(&mut self.pending) {
            if let Err(err) = self.relay.send(&msg) {
                error!("dropping queued message to {}: {err}", self.relay.url);
            }
        }
    }
}

pub struct RelayPool<W: Wakeup> {
    pub relays: Vec<PoolRelay>,
    pub ping_rate: Duration,
    wakeup: W,
}

impl<W: Wakeup> RelayPool<W> {
    // Constructs a new, empty RelayPool.
    pub fn new(wakeup: W) -> Self {
        RelayPool {
            relays: vec![],
            ping_rate: Duration::from_secs(25),
            wakeup,
        }
    }

    pub fn ping_rate(&mut self, duration: Duration) -> &mut Self {
        self.ping_rate = duration;
        self
    }

    pub fn has(&self, url: &NormRelayUrl) -> bool {
        self.relays.iter().any(|r| r.relay.url == *url)
    }

    /// Keep relay connectiongs alive by pinging relays that haven't been
    /// pinged in awhile. Adjust ping rate with [`ping_rate`].
    pub fn keepalive_ping(&mut self) {
        for relay in &mut self.relays {
            let now = std::time::Instant::now();

            match relay.relay.status {
                RelayStatus::Disconnected => {
                    let reconnect_at = relay.last_connect_attempt + relay.retry_connect_after;
                    if now > reconnect_at {
                        relay.last_connect_attempt = now;
                        let next_duration = Duration::from_millis(
                            ((relay.retry_connect_after.as_millis() as f64) * 1.5) as u64,
                        );
                        debug!(
                            "bumping reconnect duration from {:?} to {:?} and retrying connect",
                            relay.retry_connect_after, next_duration
                        );
                        relay.retry_connect_after = next_duration;
                        if let Err(err) = relay.relay.connect(self.wakeup.clone()) {
                            error!("error connecting to relay: {}", err);
                        }
                    }
                }

                RelayStatus::Connected => {
                    relay.retry_connect_after = PoolRelay::initial_reconnect_duration();

                    let should_ping = now - relay.last_ping > self.ping_rate;
                    if should_ping {
                        debug!("pinging {}", relay.relay.url);
                        relay.relay.ping();
                        relay.last_ping = Instant::now();
                    }
                }

                RelayStatus::Connecting => {}
            }
        }
    }

    pub fn add_url(&mut self, url: NormRelayUrl) -> Result<()> {
        if self.has(&url) {
            return Ok(());
        }
        info!("connecting to {url}");
        let relay = Relay::new(url, self.wakeup.clone())?;
        self.relays.push(PoolRelay::new(relay));

        Ok(())
    }

    pub fn remove_url(&mut self, url: &NormRelayUrl) {
        self.relays.retain(|pool_relay| pool_relay.relay.url != *url);
    }

    /// Attempts to receive a pool event from a list of relays. The
    /// function searches each relay in the list in order, attempting to
    /// receive a message from each. If a message is received, return it.
    /// If no message is received from any relays, None is returned.
    #[profiling::function]
    pub fn try_recv(&mut self) -> Option<PoolEvent<'_>> {
        for pool_relay in &mut self.relays {
            let Some(event) = pool_relay.relay.receiver.try_recv() else {
                continue;
            };

            match &event {
                WsEvent::Opened => {
                    pool_relay.relay.status = RelayStatus::Connected;
                    pool_relay.flush();
                }
                WsEvent::Closed => {
                    pool_relay.relay.status = RelayStatus::Disconnected;
                    pool_relay.pending.clear();
                }
                WsEvent::Error(err) => {
                    error!("{} {:?}", pool_relay.relay.url, err);
                    pool_relay.relay.status = RelayStatus::Disconnected;
                    pool_relay.pending.clear();
                }
                WsEvent::Message(ev) => {
                    // let's just handle pongs here.
                    if let WsMessage::Ping(ref bs) = ev {
                        debug!("pong {}", &pool_relay.relay.url);
                        pool_relay.relay.sender.send(WsMessage::Pong(bs.to_owned()));
                    }
                }
            }

            return Some(PoolEvent {
                event,
                relay: &pool_relay.relay.url,
            });
        }

        None
    }
}

impl<W: Wakeup> RelayTransport for RelayPool<W> {
    fn ensure_relay(&mut self, relay: &NormRelayUrl) -> Result<()> {
        self.add_url(relay.clone())
    }

    fn send(&mut self, relay: &NormRelayUrl, msg: &ClientMessage) -> Result<()> {
        let Some(pool_relay) = self.relays.iter_mut().find(|r| r.relay.url == *relay) else {
            warn!("send to unknown relay {relay}");
            return Err(Error::UnknownRelay(relay.to_string()));
        };
        pool_relay.send(msg)
    }

    fn release_relay(&mut self, relay: &NormRelayUrl) {
        self.remove_url(relay);
    }
}

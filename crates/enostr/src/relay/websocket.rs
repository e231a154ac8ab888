use crate::{
    relay::{NormRelayUrl, RelayStatus, Wakeup},
    ClientMessage, Result,
};

use std::{
    fmt,
    hash::{Hash, Hasher},
};

use ewebsock::{Options, WsMessage, WsReceiver, WsSender};
use tracing::{debug, error};

pub struct Relay {
    pub url: NormRelayUrl,
    pub status: RelayStatus,
    pub sender: WsSender,
    pub receiver: WsReceiver,
}

impl fmt::Debug for Relay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relay")
            .field("url", &self.url)
            .field("status", &self.status)
            .finish()
    }
}

impl Hash for Relay {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Hashes the Relay by hashing the URL
        self.url.hash(state);
    }
}

impl PartialEq for Relay {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url
    }
}

impl Eq for Relay {}

impl Relay {
    pub fn new(url: NormRelayUrl, wakeup: impl Wakeup) -> Result<Self> {
        let status = RelayStatus::Connecting;
        let (sender, receiver) =
            ewebsock::connect_with_wakeup(url.as_str(), Options::default(), move || wakeup.wake())?;

        Ok(Self {
            url,
            sender,
            receiver,
            status,
        })
    }

    pub fn send(&mut self, msg: &ClientMessage) -> Result<()> {
        let json = match msg.to_json() {
            Ok(json) => {
                debug!("sending {} to {}", json, self.url);
                json
            }
            Err(e) => {
                error!("error serializing json for filter: {e}");
                return Err(e);
            }
        };

        self.sender.send(WsMessage::Text(json));
        Ok(())
    }

    pub fn connect(&mut self, wakeup: impl Wakeup) -> Result<()> {
        let (sender, receiver) = ewebsock::connect_with_wakeup(
            self.url.as_str(),
            Options::default(),
            move || wakeup.wake(),
        )?;
        self.status = RelayStatus::Connecting;
        self.sender = sender;
        self.receiver = receiver;
        Ok(())
    }

    pub fn ping(&mut self) {
        let msg = WsMessage::Ping(vec![]);
        self.sender.send(msg);
    }
}

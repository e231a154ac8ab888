use std::time::Duration;

use enostr::RelayLimitations;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::{Error, Result};

pub const DEFAULT_RELAYS: &[&str] = &[
    "wss://relay.damus.io",
    "wss://pyramid.fiatjaf.com",
    "wss://nos.lol",
    "wss://nostr.wine",
    "wss://purplepag.es",
];

/// Knobs for a sync session. The defaults are what the timeline uses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub relays: Vec<String>,

    /// simultaneous historical queries per relay
    pub max_concurrent_queries: usize,

    /// trim a relay's below-viewport records down to this many
    pub upper_watermark: usize,

    /// load older records once a relay has this few below the viewport
    pub lower_watermark: usize,

    #[serde(with = "secs")]
    pub probe_timeout: Duration,

    /// limit on the live REQ
    pub live_limit: u32,

    /// target count for one load of older records
    pub batch_limit: u32,

    pub fetch_profiles: bool,
    pub fetch_reactions: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            relays: DEFAULT_RELAYS.iter().map(|s| s.to_string()).collect(),
            max_concurrent_queries: RelayLimitations::default().maximum_subs,
            upper_watermark: 10,
            lower_watermark: 3,
            probe_timeout: Duration::from_secs(10),
            live_limit: 11,
            batch_limit: 8,
            fetch_profiles: true,
            fetch_reactions: true,
        }
    }
}

impl SyncConfig {
    /// Parse a saved config. Missing fields take their defaults, a file we
    /// can't read gives the defaults.
    pub fn from_json(json: &str) -> Self {
        match serde_json::from_str::<SyncConfig>(json) {
            Ok(config) => config,
            Err(err) => {
                error!("invalid sync config, using defaults: {err}");
                Self::default()
            }
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Json(e.to_string()))
    }

    pub fn relays<I, S>(mut self, relays: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.relays = relays.into_iter().map(Into::into).collect();
        self
    }

    pub fn max_concurrent_queries(mut self, cap: usize) -> Self {
        self.max_concurrent_queries = cap;
        self
    }

    pub fn watermarks(mut self, lower: usize, upper: usize) -> Self {
        self.lower_watermark = lower;
        self.upper_watermark = upper;
        self
    }

    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn live_limit(mut self, limit: u32) -> Self {
        self.live_limit = limit;
        self
    }

    pub fn batch_limit(mut self, limit: u32) -> Self {
        self.batch_limit = limit;
        self
    }

    pub fn fetch_profiles(mut self, on: bool) -> Self {
        self.fetch_profiles = on;
        self
    }

    pub fn fetch_reactions(mut self, on: bool) -> Self {
        self.fetch_reactions = on;
        self
    }

    pub(crate) fn limits(&self) -> RelayLimitations {
        RelayLimitations {
            maximum_subs: self.max_concurrent_queries,
        }
    }
}

/// Durations are stored as whole seconds
mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

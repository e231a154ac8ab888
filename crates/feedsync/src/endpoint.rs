use enostr::{NormRelayUrl, Note, RelayReqId, RelayStatus};
use tokio::sync::oneshot;

use crate::backfill::BackfillPlan;
use crate::config::SyncConfig;
use crate::gate::ConcurrencyGate;
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveState {
    Idle,
    /// asked to go live before the base filter was known
    AwaitingBase,
    Subscribed(RelayReqId),
    /// the relay sent CLOSED for our live subscription, retried on the next
    /// open or when the live zone is entered again
    ClosedByRelay,
}

/// Result of one load of older notes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOutcome {
    /// at least one note came back
    pub success: bool,
    pub received: usize,
}

pub type LoadResult = Result<LoadOutcome>;

/// One in-flight load of older notes and everyone waiting on it
#[derive(Debug)]
pub struct LoadingOld {
    pub before: Option<u64>,
    pub waiters: Vec<oneshot::Sender<LoadResult>>,
    /// queries went out (false while waiting on the base filter)
    pub started: bool,
    pub outstanding: usize,
    pub received: usize,
    pub error: Option<Error>,
    pub plan: Option<BackfillPlan>,
    /// notes of the current backfill step
    pub step_notes: Vec<Note>,
    /// run the eviction check again when this load succeeds
    pub recheck: bool,
}

impl LoadingOld {
    pub fn new(before: Option<u64>) -> Self {
        Self {
            before,
            waiters: vec![],
            started: false,
            outstanding: 0,
            received: 0,
            error: None,
            plan: None,
            step_notes: vec![],
            recheck: false,
        }
    }

    pub fn outcome(&self) -> LoadResult {
        match &self.error {
            Some(err) => Err(err.clone()),
            None => Ok(LoadOutcome {
                success: self.received > 0,
                received: self.received,
            }),
        }
    }

    /// Resolve every waiter with the same outcome
    pub fn resolve(self, outcome: LoadResult) {
        for waiter in self.waiters {
            // the caller may have dropped the receiver, that's fine
            let _ = waiter.send(outcome.clone());
        }
    }
}

/// Everything we track for one relay
#[derive(Debug)]
pub struct RelayEndpoint {
    pub url: NormRelayUrl,
    pub status: RelayStatus,
    pub live: LiveState,
    pub gate: ConcurrencyGate,
    pub loading_old: Option<LoadingOld>,
    /// oldest timestamp we last tried to load below. `None` means no
    /// attempt since the last viewport movement.
    pub last_oldest: Option<Option<u64>>,
}

impl RelayEndpoint {
    pub fn new(url: NormRelayUrl, config: &SyncConfig) -> Self {
        Self {
            url,
            status: RelayStatus::Connecting,
            live: LiveState::Idle,
            gate: ConcurrencyGate::new(config.limits()),
            loading_old: None,
            last_oldest: None,
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self.live, LiveState::Subscribed(_))
    }

    pub fn live_sub(&self) -> Option<&RelayReqId> {
        match &self.live {
            LiveState::Subscribed(id) => Some(id),
            LiveState::Idle | LiveState::AwaitingBase | LiveState::ClosedByRelay => None,
        }
    }

    pub fn is_loading_old(&self) -> bool {
        self.loading_old.is_some()
    }
}

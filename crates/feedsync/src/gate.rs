use std::collections::VecDeque;

use enostr::{Filter, RelayLimitations, RelayReqId, SubPass, SubPassGuardian};
use hashbrown::HashMap;
use tracing::{debug, trace};

/// Caller-side handle for one historical query. Several of these can ride on
/// the same REQ once their filters are merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryId(pub u64);

#[derive(Debug, Clone)]
pub struct Subscriber {
    pub query: QueryId,
    /// the filter this subscriber asked for, before merging
    pub filter: Filter,
}

/// One REQ worth of work and everyone waiting on it
#[derive(Debug, Clone)]
pub struct QueryBatch {
    pub filter: Filter,
    pub subscribers: Vec<Subscriber>,
}

impl QueryBatch {
    fn new(query: QueryId, filter: Filter) -> Self {
        Self {
            subscribers: vec![Subscriber {
                query,
                filter: filter.clone(),
            }],
            filter,
        }
    }

    /// Subscribers whose own filter wants `note`
    pub fn interested<'a>(&'a self, note: &'a enostr::Note) -> impl Iterator<Item = QueryId> + 'a {
        self.subscribers
            .iter()
            .filter(move |s| s.filter.matches(note))
            .map(|s| s.query)
    }
}

#[derive(Debug)]
struct InFlight {
    batch: QueryBatch,
    _pass: SubPass,
}

/// Work the caller has to put on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub sub_id: RelayReqId,
    pub filter: Filter,
}

/// Per relay bound on simultaneous historical queries. Requests beyond the
/// bound wait in a queue where compatible filters are merged.
#[derive(Debug)]
pub struct ConcurrencyGate {
    guardian: SubPassGuardian,
    in_flight: HashMap<RelayReqId, InFlight>,
    pending: VecDeque<QueryBatch>,
}

impl ConcurrencyGate {
    pub fn new(limits: RelayLimitations) -> Self {
        Self {
            guardian: SubPassGuardian::from_limits(limits),
            in_flight: HashMap::new(),
            pending: VecDeque::new(),
        }
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_idle(&self) -> bool {
        self.in_flight.is_empty() && self.pending.is_empty()
    }

    pub fn batch(&self, sub_id: &RelayReqId) -> Option<&QueryBatch> {
        self.in_flight.get(sub_id).map(|f| &f.batch)
    }

    /// Issue right away if there is a free slot, otherwise merge into a
    /// pending batch or queue.
    #[profiling::function]
    pub fn submit(&mut self, query: QueryId, filter: Filter) -> Option<Issue> {
        if let Some(pass) = self.guardian.take_pass() {
            return Some(self.start(QueryBatch::new(query, filter), pass));
        }

        for batch in self.pending.iter_mut() {
            if let Some(merged) = batch.filter.merge(&filter) {
                debug!("merged query {:?} into pending batch", query);
                batch.filter = merged;
                batch.subscribers.push(Subscriber { query, filter });
                return None;
            }
        }

        trace!("queueing query {:?}, {} pending", query, self.pending.len() + 1);
        self.pending.push_back(QueryBatch::new(query, filter));
        None
    }

    fn start(&mut self, batch: QueryBatch, pass: SubPass) -> Issue {
        let sub_id = RelayReqId::default();
        let filter = batch.filter.clone();
        self.in_flight
            .insert(sub_id.clone(), InFlight { batch, _pass: pass });
        Issue { sub_id, filter }
    }

    /// Release the slot held by `sub_id` and hand back its batch. Unknown
    /// ids return `None`, so completing twice is harmless.
    pub fn finish(&mut self, sub_id: &RelayReqId) -> Option<QueryBatch> {
        let InFlight { batch, _pass } = self.in_flight.remove(sub_id)?;
        self.guardian.return_pass(_pass);
        Some(batch)
    }

    /// Next pending batch to put on the wire, if a slot is free
    pub fn issue_next(&mut self) -> Option<Issue> {
        if self.pending.is_empty() {
            return None;
        }
        let pass = self.guardian.take_pass()?;
        let batch = self.pending.pop_front()?;
        Some(self.start(batch, pass))
    }

    /// Everything in flight, slots released. Pending batches stay queued.
    pub fn drain_in_flight(&mut self) -> Vec<(RelayReqId, QueryBatch)> {
        let drained: Vec<_> = self.in_flight.drain().collect();
        drained
            .into_iter()
            .map(|(id, InFlight { batch, _pass })| {
                self.guardian.return_pass(_pass);
                (id, batch)
            })
            .collect()
    }

    /// In flight and pending, for shutdown
    pub fn drain_all(&mut self) -> (Vec<(RelayReqId, QueryBatch)>, Vec<QueryBatch>) {
        let in_flight = self.drain_in_flight();
        (in_flight, self.pending.drain(..).collect())
    }
}

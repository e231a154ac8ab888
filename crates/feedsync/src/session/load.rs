use enostr::{Filter, NormRelayUrl, Note, RelayTransport, KIND_TEXT_NOTE};
use tokio::sync::oneshot;
use tracing::{debug, trace};

use super::{QueryOwner, Session};
use crate::backfill::BackfillPlan;
use crate::endpoint::{LoadResult, LoadingOld};
use crate::verify::NoteVerifier;
use crate::Error;

impl<T: RelayTransport, V: NoteVerifier> Session<T, V> {
    /// Load notes older than `before` from one relay. While a load is in
    /// flight on that relay, further calls attach to it and resolve with the
    /// same outcome.
    pub fn load_old(
        &mut self,
        relay: &NormRelayUrl,
        before: Option<u64>,
    ) -> oneshot::Receiver<LoadResult> {
        let (tx, rx) = oneshot::channel();

        if self.closed {
            let _ = tx.send(Err(Error::Cancelled));
            return rx;
        }

        let Some(idx) = self.endpoint_index(relay) else {
            let _ = tx.send(Err(Error::UnknownRelay(relay.to_string())));
            return rx;
        };

        self.begin_load(idx, before, Some(tx), false);
        rx
    }

    /// The viewport moved. Notes older than `floor` are below it.
    pub fn set_viewport_floor(&mut self, floor: Option<u64>) {
        self.store.set_floor(floor);
        self.request_more();
    }

    /// Trim relays with too many notes below the viewport and load more from
    /// those with too few
    pub fn request_more(&mut self) {
        if self.closed {
            return;
        }
        for idx in 0..self.endpoints.len() {
            self.endpoints[idx].last_oldest = None;
            self.check_relay(idx);
        }
    }

    pub(super) fn check_relay(&mut self, idx: usize) {
        let url = self.endpoints[idx].url.clone();
        let count = self.store.below_floor_count(&url);

        if count > self.config.upper_watermark {
            let dropped = self.store.trim_relay(&url, self.config.upper_watermark);
            debug!("trimmed {} old notes of {url}", dropped.len());
            for id in &dropped {
                self.reactions.remove(id);
            }
            return;
        }

        if count > self.config.lower_watermark {
            return;
        }

        let oldest = self.store.oldest_for(&url);
        let ep = &mut self.endpoints[idx];
        if ep.last_oldest == Some(oldest) {
            trace!("{url} already tried below {oldest:?}");
            return;
        }

        if let Some(load) = ep.loading_old.as_mut() {
            load.recheck = true;
            return;
        }

        ep.last_oldest = Some(oldest);
        debug!("{url} has {count} notes below the viewport, loading more");
        self.begin_load(idx, oldest, None, true);
    }

    fn begin_load(
        &mut self,
        idx: usize,
        before: Option<u64>,
        waiter: Option<oneshot::Sender<LoadResult>>,
        recheck: bool,
    ) {
        let ep = &mut self.endpoints[idx];

        if let Some(load) = ep.loading_old.as_mut() {
            trace!("joining load in flight on {}", ep.url);
            load.waiters.extend(waiter);
            load.recheck |= recheck;
            return;
        }

        let mut load = LoadingOld::new(before);
        load.waiters.extend(waiter);
        load.recheck = recheck;
        ep.loading_old = Some(load);

        self.start_load_queries(idx);
    }

    /// Put the load's queries through the gate once the base filter is known
    pub(super) fn start_load_queries(&mut self, idx: usize) {
        let Some(base) = self.base.get_filter().cloned() else {
            return;
        };
        let floor = self.store.floor();
        let batch = self.config.batch_limit;
        let url = self.endpoints[idx].url.clone();

        let Some(load) = self.endpoints[idx].loading_old.as_mut() else {
            return;
        };
        if load.started {
            return;
        }
        load.started = true;

        let mut queries: Vec<(QueryOwner, Filter)> = Vec::with_capacity(2);
        match load.before {
            Some(before) => {
                // everything between the viewport and the oldest note we have
                let since = floor.map_or(before, |f| f.min(before));
                queries.push((
                    QueryOwner::LoadOld(url.clone()),
                    Filter::new()
                        .kinds([KIND_TEXT_NOTE])
                        .since(since)
                        .until(before)
                        .with_base(&base),
                ));

                if before > 0 {
                    let mut plan = BackfillPlan::new(0, before - 1, batch);
                    if let Some(step) = plan.next_step() {
                        queries.push((QueryOwner::Backfill(url.clone()), step.filter(&base)));
                        load.plan = Some(plan);
                    }
                }
            }
            None => queries.push((
                QueryOwner::LoadOld(url.clone()),
                Filter::new()
                    .kinds([KIND_TEXT_NOTE])
                    .limit(batch)
                    .with_base(&base),
            )),
        }

        load.outstanding = queries.len();
        debug!("loading old notes on {url} before {:?}", load.before);

        for (owner, filter) in queries {
            self.submit(idx, owner, filter);
        }
    }

    pub(super) fn on_load_note(&mut self, relay: &NormRelayUrl, note: &Note) {
        let res = self.insert_note(relay, note.clone(), false, false);
        if !res.accepted() {
            return;
        }
        if let Some(load) = self
            .endpoint_index(relay)
            .and_then(|idx| self.endpoints[idx].loading_old.as_mut())
        {
            load.received += 1;
        }
    }

    /// Backfill notes are held until the step ends so the plan can cut them
    /// to size
    pub(super) fn on_backfill_note(&mut self, relay: &NormRelayUrl, note: &Note) {
        if !self.verifier.verify(note) {
            return;
        }
        if let Some(load) = self
            .endpoint_index(relay)
            .and_then(|idx| self.endpoints[idx].loading_old.as_mut())
        {
            load.step_notes.push(note.clone());
        }
    }

    pub(super) fn load_query_done(&mut self, relay: &NormRelayUrl, outcome: Result<(), Error>) {
        let Some(idx) = self.endpoint_index(relay) else {
            return;
        };
        let Some(load) = self.endpoints[idx].loading_old.as_mut() else {
            return;
        };

        if let Err(err) = outcome {
            load.error.get_or_insert(err);
        }
        load.outstanding = load.outstanding.saturating_sub(1);

        if load.outstanding == 0 {
            self.finish_load(idx);
        }
    }

    pub(super) fn backfill_step_done(&mut self, relay: &NormRelayUrl, outcome: Result<(), Error>) {
        let Some(idx) = self.endpoint_index(relay) else {
            return;
        };
        let base = self.base.get_filter().cloned();
        let Some(load) = self.endpoints[idx].loading_old.as_mut() else {
            return;
        };

        let notes = std::mem::take(&mut load.step_notes);
        let (kept, next) = match outcome {
            Err(err) => {
                load.error.get_or_insert(err);
                load.plan = None;
                (vec![], None)
            }
            Ok(()) => match load.plan.as_mut() {
                Some(plan) => {
                    let kept = plan.on_result(notes).to_vec();
                    (kept, plan.next_step())
                }
                None => (vec![], None),
            },
        };

        let next = next.zip(base);
        if next.is_none() {
            load.outstanding = load.outstanding.saturating_sub(1);
        }

        let mut received = 0;
        for note in kept {
            if self.insert_verified(relay, note).accepted() {
                received += 1;
            }
        }

        if let Some(load) = self.endpoints[idx].loading_old.as_mut() {
            load.received += received;
        }

        match next {
            Some((step, base)) => {
                self.submit(idx, QueryOwner::Backfill(relay.clone()), step.filter(&base));
            }
            None => {
                let done = self.endpoints[idx]
                    .loading_old
                    .as_ref()
                    .is_some_and(|l| l.outstanding == 0);
                if done {
                    self.finish_load(idx);
                }
            }
        }
    }

    fn finish_load(&mut self, idx: usize) {
        let Some(load) = self.endpoints[idx].loading_old.take() else {
            return;
        };

        let outcome = load.outcome();
        let recheck = load.recheck;
        debug!(
            "load on {} finished: {:?}",
            self.endpoints[idx].url, outcome
        );
        load.resolve(outcome.clone());

        if recheck && outcome.is_ok_and(|o| o.success) {
            self.check_relay(idx);
        }
    }
}

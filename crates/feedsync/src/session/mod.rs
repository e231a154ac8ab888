//! The session owns every relay endpoint, the merged store and the
//! cross-relay state. It never touches the network itself: relay traffic is
//! fed in through `process_*`, timeouts through `tick`, and everything it
//! wants to say goes out through the `RelayTransport`.

mod fanout;
mod load;

use std::time::Instant;

use enostr::ewebsock::{WsEvent, WsMessage};
use enostr::{
    ClientMessage, Filter, NormRelayUrl, Note, NoteId, Pubkey, RelayMessage, RelayPool,
    RelayReqId, RelayStatus, RelayTransport, Wakeup, KIND_TEXT_NOTE,
};
use hashbrown::{HashMap, HashSet};
use tracing::{debug, error, info, trace, warn};

use crate::discovery::RelayDiscovery;
use crate::endpoint::{LiveState, RelayEndpoint};
use crate::gate::{Issue, QueryId};
use crate::profile::UserProfile;
use crate::reactions::ReactionTally;
use crate::replaceable::ReplaceableResolver;
use crate::store::{EventStore, InsertResult};
use crate::timeline::{FilterState, TimelineKind};
use crate::verify::{NoteVerifier, SignatureVerifier};
use crate::{Error, SyncConfig};

use fanout::{Fanout, FanoutId, FanoutPurpose};

/// Who is waiting on a historical query
#[derive(Debug, Clone)]
enum QueryOwner {
    /// gap query or plain batch of a relay's older-notes load
    LoadOld(NormRelayUrl),
    /// one step of a relay's backfill plan
    Backfill(NormRelayUrl),
    Fanout(FanoutId),
}

pub struct Session<T: RelayTransport, V: NoteVerifier = SignatureVerifier> {
    config: SyncConfig,
    kind: TimelineKind,
    transport: T,
    verifier: V,
    base: FilterState,
    endpoints: Vec<RelayEndpoint>,
    store: EventStore,
    resolver: ReplaceableResolver,
    discovery: RelayDiscovery,
    discovery_requested: bool,
    profiles: HashMap<Pubkey, UserProfile>,
    profiles_requested: HashSet<Pubkey>,
    reactions: HashMap<NoteId, ReactionTally>,
    queries: HashMap<QueryId, QueryOwner>,
    fanouts: HashMap<FanoutId, Fanout>,
    next_id: u64,
    live_zone: bool,
    started: bool,
    closed: bool,
}

impl<T: RelayTransport> Session<T, SignatureVerifier> {
    pub fn new(config: SyncConfig, kind: TimelineKind, transport: T) -> Self {
        Self::with_verifier(config, kind, transport, SignatureVerifier)
    }
}

impl<T: RelayTransport, V: NoteVerifier> Session<T, V> {
    pub fn with_verifier(config: SyncConfig, kind: TimelineKind, transport: T, verifier: V) -> Self {
        let base = kind.initial_filter();
        Self {
            config,
            kind,
            transport,
            verifier,
            base,
            endpoints: vec![],
            store: EventStore::new(),
            resolver: ReplaceableResolver::new(),
            discovery: RelayDiscovery::new(),
            discovery_requested: false,
            profiles: HashMap::new(),
            profiles_requested: HashSet::new(),
            reactions: HashMap::new(),
            queries: HashMap::new(),
            fanouts: HashMap::new(),
            next_id: 0,
            live_zone: false,
            started: false,
            closed: false,
        }
    }

    // ---- accessors ----

    pub fn store(&self) -> &EventStore {
        &self.store
    }

    pub fn kind(&self) -> &TimelineKind {
        &self.kind
    }

    pub fn base(&self) -> &FilterState {
        &self.base
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn relays(&self) -> impl Iterator<Item = &NormRelayUrl> {
        self.endpoints.iter().map(|e| &e.url)
    }

    pub fn endpoint(&self, url: &NormRelayUrl) -> Option<&RelayEndpoint> {
        self.endpoints.iter().find(|e| e.url == *url)
    }

    pub fn profile(&self, pk: &Pubkey) -> Option<&UserProfile> {
        self.profiles.get(pk)
    }

    pub fn profiles(&self) -> &HashMap<Pubkey, UserProfile> {
        &self.profiles
    }

    pub fn reactions(&self, id: &NoteId) -> Option<&ReactionTally> {
        self.reactions.get(id)
    }

    pub fn resolver(&self) -> &ReplaceableResolver {
        &self.resolver
    }

    pub fn discovery(&self) -> &RelayDiscovery {
        &self.discovery
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn in_live_zone(&self) -> bool {
        self.live_zone
    }

    // ---- lifecycle ----

    /// Connect to the configured relays and start working out the base
    /// filter. Calling it again does nothing.
    pub fn start(&mut self) {
        if self.started || self.closed {
            return;
        }
        self.started = true;
        info!("starting {} timeline", self.kind);

        for raw in self.config.relays.clone() {
            match NormRelayUrl::new(&raw) {
                Ok(url) => {
                    self.add_endpoint(url);
                }
                Err(err) => warn!("skipping configured relay: {err}"),
            }
        }

        if let Some(filter) = self.kind.identity_filter() {
            self.fanout(FanoutPurpose::Identity, filter);
        }

        if self.base.is_ready() {
            self.on_base_ready();
        }
    }

    /// Cancel everything in flight. Every waiting load resolves with
    /// `Error::Cancelled`.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.live_zone = false;
        info!("closing {} timeline", self.kind);

        if let Some(probe) = self.discovery.cancel() {
            self.send_close(&probe.relay, &probe.sub_id);
            self.transport.release_relay(&probe.relay);
        }

        for idx in 0..self.endpoints.len() {
            if let LiveState::Subscribed(sub) =
                std::mem::replace(&mut self.endpoints[idx].live, LiveState::Idle)
            {
                let url = self.endpoints[idx].url.clone();
                self.send_close(&url, &sub);
            }

            let (in_flight, _pending) = self.endpoints[idx].gate.drain_all();
            for (sub, _) in &in_flight {
                let url = self.endpoints[idx].url.clone();
                self.send_close(&url, sub);
            }

            if let Some(load) = self.endpoints[idx].loading_old.take() {
                load.resolve(Err(Error::Cancelled));
            }
        }

        self.queries.clear();
        self.fanouts.clear();

        for ep in &self.endpoints {
            self.transport.release_relay(&ep.url);
        }
    }

    /// The top of the timeline is on screen: go live on every relay
    pub fn enter_live_zone(&mut self) {
        if self.closed {
            return;
        }
        self.live_zone = true;
        for idx in 0..self.endpoints.len() {
            self.start_live_at(idx);
        }
    }

    pub fn leave_live_zone(&mut self) {
        self.live_zone = false;
        for idx in 0..self.endpoints.len() {
            self.stop_live_at(idx);
        }
    }

    pub fn start_live(&mut self, relay: &NormRelayUrl) {
        if self.closed {
            return;
        }
        if let Some(idx) = self.endpoint_index(relay) {
            self.start_live_at(idx);
        }
    }

    pub fn stop_live(&mut self, relay: &NormRelayUrl) {
        if let Some(idx) = self.endpoint_index(relay) {
            self.stop_live_at(idx);
        }
    }

    /// Advance timers
    pub fn tick(&mut self, now: Instant) {
        if self.closed {
            return;
        }
        if let Some(probe) = self.discovery.timed_out(now) {
            let (relay, sub) = (probe.relay.clone(), probe.sub_id.clone());
            self.send_close(&relay, &sub);
            self.probe_failed(&relay, &Error::ProbeTimeout.to_string());
        }
    }

    // ---- input ----

    /// Feed a websocket event from `relay`
    pub fn process_pool_event(&mut self, relay: &NormRelayUrl, event: &WsEvent) {
        if self.closed {
            return;
        }
        match event {
            WsEvent::Opened => self.on_opened(relay),
            WsEvent::Closed => self.on_disconnected(relay, "closed"),
            WsEvent::Error(err) => self.on_disconnected(relay, err),
            WsEvent::Message(WsMessage::Text(txt)) => self.process_json(relay, txt),
            WsEvent::Message(_) => {}
        }
    }

    pub fn process_json(&mut self, relay: &NormRelayUrl, json: &str) {
        match RelayMessage::from_json(json) {
            Ok(msg) => self.process_message(relay, msg),
            Err(err) => warn!("malformed message from {relay}: {err}"),
        }
    }

    #[profiling::function]
    pub fn process_message(&mut self, relay: &NormRelayUrl, msg: RelayMessage) {
        if self.closed {
            return;
        }
        match msg {
            RelayMessage::Event(sub, note) => self.on_event(relay, RelayReqId::from(sub), note),
            RelayMessage::Eose(sub) => self.on_eose(relay, RelayReqId::from(sub)),
            RelayMessage::Closed(sub, reason) => {
                self.on_closed(relay, RelayReqId::from(sub), &reason)
            }
            RelayMessage::OK(res) => {
                if res.status {
                    debug!("{relay} accepted {}", res.event_id);
                } else {
                    warn!("{relay} rejected {}: {}", res.event_id, res.message);
                }
            }
            RelayMessage::Notice(notice) => info!("notice from {relay}: {notice}"),
        }
    }

    // ---- internals ----

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn endpoint_index(&self, url: &NormRelayUrl) -> Option<usize> {
        self.endpoints.iter().position(|e| e.url == *url)
    }

    fn in_use(&self) -> HashSet<NormRelayUrl> {
        self.endpoints.iter().map(|e| e.url.clone()).collect()
    }

    /// Returns the index of the (possibly existing) endpoint
    fn add_endpoint(&mut self, url: NormRelayUrl) -> Option<usize> {
        if let Some(idx) = self.endpoint_index(&url) {
            return Some(idx);
        }

        if let Err(err) = self.transport.ensure_relay(&url) {
            error!("could not connect to {url}: {err}");
            return None;
        }

        debug!("adding relay {url}");
        self.endpoints.push(RelayEndpoint::new(url, &self.config));
        let idx = self.endpoints.len() - 1;

        if self.live_zone {
            self.start_live_at(idx);
        }

        Some(idx)
    }

    fn send_close(&mut self, relay: &NormRelayUrl, sub: &RelayReqId) {
        if let Err(err) = self
            .transport
            .send(relay, &ClientMessage::close(sub.to_string()))
        {
            debug!("could not close {sub} on {relay}: {err}");
        }
    }

    fn live_filter(&self, base: &Filter) -> Filter {
        Filter::new()
            .kinds([KIND_TEXT_NOTE])
            .limit(self.config.live_limit)
            .with_base(base)
    }

    fn start_live_at(&mut self, idx: usize) {
        if self.endpoints[idx].is_live() {
            return;
        }

        let Some(base) = self.base.get_filter().cloned() else {
            debug!("{} waiting for base filter", self.endpoints[idx].url);
            self.endpoints[idx].live = LiveState::AwaitingBase;
            return;
        };

        let sub = RelayReqId::default();
        let filter = self.live_filter(&base);
        let url = self.endpoints[idx].url.clone();
        let msg = ClientMessage::req(sub.to_string(), vec![filter]);

        match self.transport.send(&url, &msg) {
            Ok(()) => {
                debug!("live on {url} as {sub}");
                self.endpoints[idx].live = LiveState::Subscribed(sub);
            }
            Err(err) => {
                error!("could not go live on {url}: {err}");
                self.endpoints[idx].live = LiveState::Idle;
            }
        }
    }

    fn stop_live_at(&mut self, idx: usize) {
        match std::mem::replace(&mut self.endpoints[idx].live, LiveState::Idle) {
            LiveState::Subscribed(sub) => {
                let url = self.endpoints[idx].url.clone();
                self.send_close(&url, &sub);
            }
            LiveState::Idle | LiveState::AwaitingBase | LiveState::ClosedByRelay => {}
        }
    }

    /// Re-send live REQs under their existing ids, eg after the base
    /// filter changed or the socket reopened
    fn refresh_live_at(&mut self, idx: usize) {
        let Some(sub) = self.endpoints[idx].live_sub().cloned() else {
            return;
        };
        let Some(base) = self.base.get_filter().cloned() else {
            return;
        };
        let url = self.endpoints[idx].url.clone();
        let msg = ClientMessage::req(sub.to_string(), vec![self.live_filter(&base)]);
        if let Err(err) = self.transport.send(&url, &msg) {
            error!("could not resubscribe live on {url}: {err}");
            self.endpoints[idx].live = LiveState::Idle;
        }
    }

    fn set_base(&mut self, filter: Filter) {
        let first = !self.base.is_ready();
        self.base = FilterState::ready(filter);

        if first {
            self.on_base_ready();
        } else {
            debug!("base filter replaced, refreshing live subscriptions");
            for idx in 0..self.endpoints.len() {
                self.refresh_live_at(idx);
            }
        }
    }

    fn on_base_ready(&mut self) {
        info!("base filter ready");

        for idx in 0..self.endpoints.len() {
            if self.endpoints[idx].live == LiveState::AwaitingBase {
                self.endpoints[idx].live = LiveState::Idle;
                self.start_live_at(idx);
            }
            self.start_load_queries(idx);
        }

        self.request_author_meta();
    }

    fn on_opened(&mut self, relay: &NormRelayUrl) {
        let Some(idx) = self.endpoint_index(relay) else {
            return;
        };
        let prev = self.endpoints[idx].status;
        self.endpoints[idx].status = RelayStatus::Connected;
        debug!("{relay} opened");

        if prev == RelayStatus::Disconnected {
            self.refresh_live_at(idx);
        }
        if self.live_zone && self.endpoints[idx].live == LiveState::ClosedByRelay {
            self.start_live_at(idx);
        }
    }

    fn on_disconnected(&mut self, relay: &NormRelayUrl, why: &str) {
        if self.discovery.probe().is_some_and(|p| p.relay == *relay) {
            self.probe_failed(relay, why);
        }

        let Some(idx) = self.endpoint_index(relay) else {
            return;
        };
        warn!("{relay} disconnected: {why}");
        self.endpoints[idx].status = RelayStatus::Disconnected;

        let err = Error::disconnected(relay);
        let drained = self.endpoints[idx].gate.drain_in_flight();
        for (_, batch) in drained {
            for s in batch.subscribers {
                self.complete_query(s.query, Err(err.clone()));
            }
        }

        self.pump(idx);
    }

    fn on_event(&mut self, relay: &NormRelayUrl, sub: RelayReqId, note: Note) {
        if self.discovery.is_probing(&sub) {
            self.probe_succeeded(relay);
            return;
        }

        let Some(idx) = self.endpoint_index(relay) else {
            trace!("event from unknown relay {relay}");
            return;
        };

        if self.endpoints[idx].live_sub() == Some(&sub) {
            self.insert_note(relay, note, true, true);
            return;
        }

        let interested: Vec<QueryId> = match self.endpoints[idx].gate.batch(&sub) {
            Some(batch) => batch.interested(&note).collect(),
            None => {
                trace!("event for unknown sub {sub} on {relay}");
                return;
            }
        };

        for query in interested {
            self.deliver(relay, query, &note);
        }
    }

    fn on_eose(&mut self, relay: &NormRelayUrl, sub: RelayReqId) {
        if self.discovery.is_probing(&sub) {
            self.probe_succeeded(relay);
            return;
        }

        let Some(idx) = self.endpoint_index(relay) else {
            return;
        };

        if self.endpoints[idx].live_sub() == Some(&sub) {
            trace!("live {sub} caught up on {relay}");
            return;
        }

        if self.endpoints[idx].gate.batch(&sub).is_some() {
            self.send_close(relay, &sub);
            self.finish_batch(idx, &sub, Ok(()));
        }
    }

    fn on_closed(&mut self, relay: &NormRelayUrl, sub: RelayReqId, reason: &str) {
        if self.discovery.is_probing(&sub) {
            self.probe_failed(relay, reason);
            return;
        }

        let Some(idx) = self.endpoint_index(relay) else {
            return;
        };

        if self.endpoints[idx].live_sub() == Some(&sub) {
            warn!("{relay} closed our live subscription: {reason}");
            self.endpoints[idx].live = LiveState::ClosedByRelay;
            return;
        }

        self.finish_batch(idx, &sub, Err(Error::relay_closed(relay, reason)));
    }

    /// Insert a timeline note, verifying it on the way in
    fn insert_note(
        &mut self,
        relay: &NormRelayUrl,
        note: Note,
        realtime: bool,
        transition: bool,
    ) -> InsertResult {
        let verifier = &self.verifier;
        let res = self
            .store
            .insert(note, relay, realtime, transition, |n| verifier.verify(n));
        self.after_insert(res);
        res
    }

    /// Insert a note that already passed verification
    fn insert_verified(&mut self, relay: &NormRelayUrl, note: Note) -> InsertResult {
        let res = self.store.insert(note, relay, false, false, |_| true);
        self.after_insert(res);
        res
    }

    fn after_insert(&mut self, res: InsertResult) {
        let InsertResult::Inserted(pos) = res else {
            return;
        };
        let Some(record) = self.store.records().get(pos) else {
            return;
        };
        let (author, id, kind) = (record.note.pubkey, record.note.id, record.note.kind);

        self.request_profile(author);
        if kind == KIND_TEXT_NOTE {
            self.request_reactions(id);
        }
    }

    // ---- gate plumbing ----

    fn submit(&mut self, idx: usize, owner: QueryOwner, filter: Filter) -> QueryId {
        let query = QueryId(self.next_id());
        self.queries.insert(query, owner);

        if let Some(issue) = self.endpoints[idx].gate.submit(query, filter) {
            self.send_issue(idx, issue);
        }
        self.pump(idx);

        query
    }

    /// Issue pending batches while slots are free
    fn pump(&mut self, idx: usize) {
        while let Some(issue) = self.endpoints[idx].gate.issue_next() {
            self.send_issue(idx, issue);
        }
    }

    fn send_issue(&mut self, idx: usize, issue: Issue) {
        let url = self.endpoints[idx].url.clone();
        let msg = ClientMessage::req(issue.sub_id.to_string(), vec![issue.filter]);

        if let Err(err) = self.transport.send(&url, &msg) {
            error!("could not send query to {url}: {err}");
            let err = Error::transport(&url, err);
            if let Some(batch) = self.endpoints[idx].gate.finish(&issue.sub_id) {
                for s in batch.subscribers {
                    self.complete_query(s.query, Err(err.clone()));
                }
            }
        }
    }

    fn finish_batch(&mut self, idx: usize, sub: &RelayReqId, outcome: Result<(), Error>) {
        let Some(batch) = self.endpoints[idx].gate.finish(sub) else {
            return;
        };

        // free slots go to queued work before follow-up queries
        self.pump(idx);

        for s in batch.subscribers {
            self.complete_query(s.query, outcome.clone());
        }
    }

    fn deliver(&mut self, relay: &NormRelayUrl, query: QueryId, note: &Note) {
        let Some(owner) = self.queries.get(&query).cloned() else {
            return;
        };

        match owner {
            QueryOwner::LoadOld(_) => self.on_load_note(relay, note),
            QueryOwner::Backfill(_) => self.on_backfill_note(relay, note),
            QueryOwner::Fanout(fid) => self.on_fanout_note(relay, fid, note),
        }
    }

    fn complete_query(&mut self, query: QueryId, outcome: Result<(), Error>) {
        let Some(owner) = self.queries.remove(&query) else {
            return;
        };

        match owner {
            QueryOwner::LoadOld(url) => self.load_query_done(&url, outcome),
            QueryOwner::Backfill(url) => self.backfill_step_done(&url, outcome),
            QueryOwner::Fanout(fid) => self.fanout_relay_done(fid, outcome),
        }
    }
}

impl<W: Wakeup, V: NoteVerifier> Session<RelayPool<W>, V> {
    /// Drain the websocket pool and keep connections alive
    pub fn poll(&mut self) {
        self.transport.keepalive_ping();
        while let Some(ev) = self.transport.try_recv() {
            let ev = ev.into_owned();
            self.process_pool_event(&ev.relay, &ev.event);
        }
        self.tick(Instant::now());
    }
}

use std::time::Instant;

use enostr::{
    ClientMessage, Filter, NormRelayUrl, Note, NoteId, Pubkey, RelayReqId, RelayStatus,
    RelayTransport, KIND_CONTACTS, KIND_METADATA, KIND_REACTION, KIND_RELAY_LIST,
};
use tracing::{debug, info, warn};

use super::{QueryOwner, Session};
use crate::discovery::read_relays;
use crate::profile::UserProfile;
use crate::replaceable::{is_replaceable, Correction};
use crate::timeline::{filter_from_contacts, TimelineKind};
use crate::verify::NoteVerifier;
use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(super) struct FanoutId(u64);

/// Why a query went to every relay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum FanoutPurpose {
    /// contact list and relay list of the home timeline owner
    Identity,
    /// profiles and relay lists of every author in the base filter
    AuthorMeta,
    Profile(Pubkey),
    Reactions(NoteId),
}

#[derive(Debug)]
pub(super) struct Fanout {
    purpose: FanoutPurpose,
    /// relays that haven't finished yet
    remaining: usize,
}

impl<T: RelayTransport, V: NoteVerifier> Session<T, V> {
    /// Send the same query through every relay's gate
    pub(super) fn fanout(&mut self, purpose: FanoutPurpose, filter: Filter) {
        let id = FanoutId(self.next_id());
        let relays = self.endpoints.len();

        if relays == 0 {
            self.fanout_complete(purpose);
            return;
        }

        self.fanouts.insert(
            id,
            Fanout {
                purpose,
                remaining: relays,
            },
        );

        for idx in 0..relays {
            self.submit(idx, QueryOwner::Fanout(id), filter.clone());
        }
    }

    pub(super) fn fanout_relay_done(&mut self, id: FanoutId, outcome: Result<(), Error>) {
        let Some(fanout) = self.fanouts.get_mut(&id) else {
            return;
        };

        if let Err(err) = outcome {
            debug!("{:?} query failed on one relay: {err}", fanout.purpose);
        }

        fanout.remaining = fanout.remaining.saturating_sub(1);
        if fanout.remaining > 0 {
            return;
        }

        let purpose = fanout.purpose;
        self.fanouts.remove(&id);
        self.fanout_complete(purpose);
    }

    fn fanout_complete(&mut self, purpose: FanoutPurpose) {
        match purpose {
            FanoutPurpose::Identity => {
                if !self.base.is_ready() {
                    warn!("no contact list found for the {} timeline", self.kind);
                }
            }
            FanoutPurpose::AuthorMeta => {
                self.discovery.begin();
                self.next_probe();
            }
            FanoutPurpose::Profile(pk) => {
                if !self.profiles.contains_key(&pk) {
                    debug!("no profile found for {pk}");
                }
            }
            FanoutPurpose::Reactions(_) => {}
        }
    }

    pub(super) fn on_fanout_note(&mut self, relay: &NormRelayUrl, id: FanoutId, note: &Note) {
        let Some(purpose) = self.fanouts.get(&id).map(|f| f.purpose) else {
            return;
        };

        if !self.verifier.verify(note) {
            return;
        }

        if let FanoutPurpose::Reactions(target) = purpose {
            // the tally is gone once its note was trimmed
            if let Some(tally) = self.reactions.get_mut(&target) {
                if note.kind == KIND_REACTION {
                    tally.add(note);
                }
            }
            return;
        }

        if !is_replaceable(note.kind) {
            return;
        }

        let verdict = self.resolver.offer(note, relay);
        let accepted = verdict.is_accepted();
        self.send_corrections(verdict.corrections());
        if !accepted {
            return;
        }

        match (purpose, note.kind) {
            (_, KIND_METADATA) => {
                self.profiles
                    .insert(note.pubkey, UserProfile::from_note(note));
            }
            (FanoutPurpose::Identity, KIND_CONTACTS) if self.is_owner(&note.pubkey) => {
                // an empty list leaves the current base alone
                if let Some(filter) = filter_from_contacts(note) {
                    self.set_base(filter);
                }
            }
            (FanoutPurpose::Identity, KIND_RELAY_LIST) if self.is_owner(&note.pubkey) => {
                for url in read_relays(note) {
                    self.add_endpoint(url);
                }
            }
            (FanoutPurpose::AuthorMeta, KIND_RELAY_LIST) => self.discovery.record(note),
            _ => {}
        }
    }

    fn is_owner(&self, pk: &Pubkey) -> bool {
        matches!(&self.kind, TimelineKind::Home(owner) if owner == pk)
    }

    /// Push the latest copy to relays that served an older one. Best
    /// effort, the relay's OK is only logged.
    fn send_corrections(&mut self, corrections: Vec<Correction>) {
        for c in corrections {
            debug!("republishing {} to {}", c.note.id, c.relay);
            if let Err(err) = self.transport.send(&c.relay, &ClientMessage::event(c.note)) {
                warn!("could not republish to {}: {err}", c.relay);
            }
        }
    }

    /// Ask for profiles and relay lists of every author, once per session
    pub(super) fn request_author_meta(&mut self) {
        if self.discovery_requested {
            return;
        }
        let Some(authors) = self.base.get_filter().and_then(|f| f.authors.clone()) else {
            return;
        };
        if authors.is_empty() {
            return;
        }
        self.discovery_requested = true;

        if self.config.fetch_profiles {
            self.profiles_requested.extend(
                authors
                    .iter()
                    .filter_map(|a| Pubkey::from_hex(a).ok()),
            );
        }

        info!("fetching relay lists of {} authors", authors.len());
        let filter = Filter {
            kinds: Some(vec![KIND_METADATA, KIND_RELAY_LIST]),
            authors: Some(authors),
            ..Default::default()
        };
        self.fanout(FanoutPurpose::AuthorMeta, filter);
    }

    pub(super) fn request_profile(&mut self, author: Pubkey) {
        if !self.config.fetch_profiles || !self.profiles_requested.insert(author) {
            return;
        }
        self.fanout(
            FanoutPurpose::Profile(author),
            Filter::new().kinds([KIND_METADATA]).authors([author]),
        );
    }

    pub(super) fn request_reactions(&mut self, id: NoteId) {
        if !self.config.fetch_reactions || self.reactions.contains_key(&id) {
            return;
        }
        self.reactions.insert(id, Default::default());
        self.fanout(
            FanoutPurpose::Reactions(id),
            Filter::new().kinds([KIND_REACTION]).events([id]),
        );
    }

    // ---- relay probing ----

    /// Start probing the next candidate relay, if any and none is running
    pub(super) fn next_probe(&mut self) {
        loop {
            let in_use = self.in_use();
            let Some(candidate) = self.discovery.next_candidate(&in_use) else {
                return;
            };

            if let Err(err) = self.transport.ensure_relay(&candidate) {
                self.discovery.fail(&candidate, &err.to_string());
                continue;
            }

            let sub = RelayReqId::default();
            let msg = ClientMessage::req(
                sub.to_string(),
                vec![Filter::new().kinds([KIND_RELAY_LIST]).limit(1)],
            );
            if let Err(err) = self.transport.send(&candidate, &msg) {
                self.discovery.fail(&candidate, &err.to_string());
                self.transport.release_relay(&candidate);
                continue;
            }

            let deadline = Instant::now() + self.config.probe_timeout;
            self.discovery.start_probe(candidate, sub, deadline);
            return;
        }
    }

    pub(super) fn probe_succeeded(&mut self, relay: &NormRelayUrl) {
        let Some(probe) = self.discovery.probe_succeeded() else {
            return;
        };
        if probe.relay != *relay {
            warn!("probe answer for {} came from {relay}", probe.relay);
        }

        self.send_close(&probe.relay, &probe.sub_id);
        if let Some(idx) = self.add_endpoint(probe.relay) {
            self.endpoints[idx].status = RelayStatus::Connected;
        }
        self.next_probe();
    }

    pub(super) fn probe_failed(&mut self, relay: &NormRelayUrl, why: &str) {
        self.discovery.fail(relay, why);
        if self.endpoint_index(relay).is_none() {
            self.transport.release_relay(relay);
        }
        self.next_probe();
    }
}

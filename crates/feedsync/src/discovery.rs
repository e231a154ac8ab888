use std::collections::VecDeque;
use std::time::Instant;

use enostr::{NormRelayUrl, Note, Pubkey, RelayReqId};
use hashbrown::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// Marker on an `r` tag of a relay list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayUsage {
    Read,
    Write,
    Both,
}

/// Parsed `r` tags of a kind 10002 note, deduplicated, in tag order
pub fn relay_list(note: &Note) -> Vec<(NormRelayUrl, RelayUsage)> {
    let mut out: Vec<(NormRelayUrl, RelayUsage)> = Vec::new();

    for tag in &note.tags {
        if tag.len() < 2 || tag[0] != "r" {
            continue;
        }

        let url = match NormRelayUrl::new(&tag[1]) {
            Ok(url) => url,
            Err(err) => {
                debug!("skipping relay list entry of {}: {err}", note.pubkey);
                continue;
            }
        };

        let usage = match tag.get(2).map(|s| s.as_str()) {
            Some("read") => RelayUsage::Read,
            Some("write") => RelayUsage::Write,
            _ => RelayUsage::Both,
        };

        if !out.iter().any(|(u, _)| *u == url) {
            out.push((url, usage));
        }
    }

    out
}

/// Relays we read our own feed from: anything not marked write-only
pub fn read_relays(note: &Note) -> Vec<NormRelayUrl> {
    relay_list(note)
        .into_iter()
        .filter(|(_, usage)| *usage != RelayUsage::Write)
        .map(|(url, _)| url)
        .collect()
}

/// Relays an author publishes to: anything not marked read-only
pub fn write_relays(note: &Note) -> Vec<NormRelayUrl> {
    relay_list(note)
        .into_iter()
        .filter(|(_, usage)| *usage != RelayUsage::Read)
        .map(|(url, _)| url)
        .collect()
}

#[derive(Debug, Clone)]
pub struct ActiveProbe {
    pub relay: NormRelayUrl,
    pub sub_id: RelayReqId,
    pub deadline: Instant,
}

/// Picks extra relays so every followed author with a published relay list
/// is covered by at least one relay we read from.
#[derive(Debug, Default)]
pub struct RelayDiscovery {
    /// how many authors list each relay
    popularity: HashMap<NormRelayUrl, usize>,
    /// latest write relays per author
    preferred: HashMap<Pubkey, Vec<NormRelayUrl>>,
    /// authors still to cover, in the order their lists arrived
    work: VecDeque<Pubkey>,
    /// relays that failed a probe, never retried this session
    failed: HashSet<NormRelayUrl>,
    probe: Option<ActiveProbe>,
}

impl RelayDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an author's relay list. A newer list replaces the old one in
    /// the tally.
    pub fn record(&mut self, note: &Note) {
        let relays = write_relays(note);

        if let Some(old) = self.preferred.remove(&note.pubkey) {
            for r in old {
                if let Some(c) = self.popularity.get_mut(&r) {
                    *c = c.saturating_sub(1);
                }
            }
        }

        for r in &relays {
            *self.popularity.entry(r.clone()).or_insert(0) += 1;
        }

        self.preferred.insert(note.pubkey, relays);
    }

    pub fn popularity(&self, relay: &NormRelayUrl) -> usize {
        self.popularity.get(relay).copied().unwrap_or(0)
    }

    pub fn has_failed(&self, relay: &NormRelayUrl) -> bool {
        self.failed.contains(relay)
    }

    pub fn probe(&self) -> Option<&ActiveProbe> {
        self.probe.as_ref()
    }

    pub fn is_probing(&self, sub_id: &RelayReqId) -> bool {
        self.probe.as_ref().is_some_and(|p| p.sub_id == *sub_id)
    }

    /// Queue every recorded author for coverage checks
    pub fn begin(&mut self) {
        let mut authors: Vec<Pubkey> = self.preferred.keys().copied().collect();
        authors.sort();
        info!("checking relay coverage for {} authors", authors.len());
        self.work = authors.into();
    }

    /// The next relay worth probing given the relays already in use
    pub fn next_candidate(&mut self, in_use: &HashSet<NormRelayUrl>) -> Option<NormRelayUrl> {
        if self.probe.is_some() {
            return None;
        }

        while let Some(author) = self.work.front() {
            let Some(list) = self.preferred.get(author) else {
                self.work.pop_front();
                continue;
            };

            if list.is_empty() || list.iter().any(|r| in_use.contains(r)) {
                self.work.pop_front();
                continue;
            }

            let best = list
                .iter()
                .filter(|r| !self.failed.contains(*r))
                .max_by(|a, b| {
                    self.popularity(a)
                        .cmp(&self.popularity(b))
                        // earlier in the list wins ties
                        .then_with(|| {
                            let ia = list.iter().position(|x| x == *a);
                            let ib = list.iter().position(|x| x == *b);
                            ib.cmp(&ia)
                        })
                })
                .cloned();

            match best {
                Some(relay) => return Some(relay),
                None => {
                    debug!("no usable relay left for {}", author);
                    self.work.pop_front();
                }
            }
        }

        None
    }

    pub fn start_probe(&mut self, relay: NormRelayUrl, sub_id: RelayReqId, deadline: Instant) {
        debug!("probing {relay}");
        self.probe = Some(ActiveProbe {
            relay,
            sub_id,
            deadline,
        });
    }

    /// The probe answered. Returns the relay to adopt.
    pub fn probe_succeeded(&mut self) -> Option<ActiveProbe> {
        let probe = self.probe.take()?;
        info!("adding relay {} ({} authors)", probe.relay, self.popularity(&probe.relay));
        Some(probe)
    }

    /// Discount a relay for the rest of the session
    pub fn fail(&mut self, relay: &NormRelayUrl, why: &str) {
        warn!("could not use relay {relay}: {why}");
        self.failed.insert(relay.clone());
        if self.probe.as_ref().is_some_and(|p| p.relay == *relay) {
            self.probe = None;
        }
    }

    pub fn timed_out(&self, now: Instant) -> Option<&ActiveProbe> {
        self.probe.as_ref().filter(|p| now >= p.deadline)
    }

    pub fn cancel(&mut self) -> Option<ActiveProbe> {
        self.work.clear();
        self.probe.take()
    }
}

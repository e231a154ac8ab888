use std::cmp::{Ordering, Reverse};

use enostr::{NormRelayUrl, Note, NoteId};

/// A note in the merged timeline plus every relay that served it
#[derive(Debug, Clone)]
pub struct EventRecord {
    pub note: Note,
    pub relays: Vec<NormRelayUrl>,
    /// arrived through a live subscription and should animate in
    pub transition: bool,
    pub realtime: bool,
}

impl EventRecord {
    pub fn seen_on(&self, relay: &NormRelayUrl) -> bool {
        self.relays.iter().any(|r| r == relay)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertResult {
    /// new record at this index
    Inserted(usize),
    /// existing record, relay added to its set
    Attributed,
    /// existing record already attributed to the relay
    AlreadyAttributed,
    /// failed verification
    Rejected,
}

impl InsertResult {
    pub fn is_new(&self) -> bool {
        matches!(self, InsertResult::Inserted(_))
    }

    pub fn accepted(&self) -> bool {
        !matches!(self, InsertResult::Rejected)
    }
}

/// Newest first, ties by ascending id
fn timeline_key(note: &Note) -> (Reverse<u64>, NoteId) {
    (Reverse(note.created_at), note.id)
}

pub fn timeline_cmp(a: &Note, b: &Note) -> Ordering {
    timeline_key(a).cmp(&timeline_key(b))
}

/// The merged timeline. Sorted by `created_at` descending then `id`
/// ascending, one record per id.
#[derive(Debug, Default)]
pub struct EventStore {
    records: Vec<EventRecord>,
    /// `created_at` of the lowest note on screen
    floor: Option<u64>,
}

impl EventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[EventRecord] {
        &self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &EventRecord> {
        self.records.iter()
    }

    pub fn get(&self, id: &NoteId) -> Option<&EventRecord> {
        self.records.iter().find(|r| r.note.id == *id)
    }

    pub fn floor(&self) -> Option<u64> {
        self.floor
    }

    pub fn set_floor(&mut self, floor: Option<u64>) {
        self.floor = floor;
    }

    /// Insert or attribute. `verify` only runs for ids we haven't stored yet.
    #[profiling::function]
    pub fn insert(
        &mut self,
        note: Note,
        relay: &NormRelayUrl,
        realtime: bool,
        transition: bool,
        verify: impl FnOnce(&Note) -> bool,
    ) -> InsertResult {
        let key = timeline_key(&note);
        let pos = self
            .records
            .partition_point(|r| timeline_key(&r.note) < key);

        if let Some(existing) = self.records.get_mut(pos) {
            if existing.note.id == note.id {
                if existing.seen_on(relay) {
                    return InsertResult::AlreadyAttributed;
                }
                existing.relays.push(relay.clone());
                return InsertResult::Attributed;
            }
        }

        if !verify(&note) {
            return InsertResult::Rejected;
        }

        self.records.insert(
            pos,
            EventRecord {
                note,
                relays: vec![relay.clone()],
                transition,
                realtime,
            },
        );

        InsertResult::Inserted(pos)
    }

    fn below_floor(&self, record: &EventRecord) -> bool {
        self.floor.is_none_or(|floor| record.note.created_at < floor)
    }

    /// Records from `relay` under the viewport. With no floor everything
    /// counts.
    pub fn below_floor_count(&self, relay: &NormRelayUrl) -> usize {
        self.records
            .iter()
            .filter(|r| r.seen_on(relay) && self.below_floor(r))
            .count()
    }

    pub fn oldest_for(&self, relay: &NormRelayUrl) -> Option<u64> {
        self.records
            .iter()
            .rev()
            .find(|r| r.seen_on(relay))
            .map(|r| r.note.created_at)
    }

    /// Detach `relay` from its oldest below-floor records until only `keep`
    /// remain. Records left without any relay are dropped and their ids
    /// returned.
    pub fn trim_relay(&mut self, relay: &NormRelayUrl, keep: usize) -> Vec<NoteId> {
        let excess = self.below_floor_count(relay).saturating_sub(keep);
        let mut detached = 0;
        let mut dropped = vec![];

        for i in (0..self.records.len()).rev() {
            if detached == excess {
                break;
            }
            let below = self.below_floor(&self.records[i]);
            let record = &mut self.records[i];
            if !below || !record.seen_on(relay) {
                continue;
            }
            record.relays.retain(|r| r != relay);
            detached += 1;
            if record.relays.is_empty() {
                dropped.push(self.records.remove(i).note.id);
            }
        }

        dropped
    }
}

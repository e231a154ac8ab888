//! Fetch the newest `limit` notes of a time window without knowing how dense
//! the window is and without ever sending an unbounded REQ.
//!
//! The window is split in half. The newer half is queried with
//! `remaining + 1`; if it oversupplies we already have the newest
//! `remaining` notes, otherwise we keep what came back and walk into the
//! older half. Each step at least halves the window.

use enostr::{Filter, Note};

use crate::store::timeline_cmp;

/// One bounded query. `since` and `until` are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackfillStep {
    pub since: u64,
    pub until: u64,
    pub limit: u32,
}

impl BackfillStep {
    pub fn filter(&self, base: &Filter) -> Filter {
        Filter::new()
            .kinds([enostr::KIND_TEXT_NOTE])
            .since(self.since)
            .until(self.until)
            .limit(self.limit)
            .with_base(base)
    }
}

#[derive(Debug, Clone)]
pub struct BackfillPlan {
    /// window still to look at
    window: Option<(u64, u64)>,
    remaining: u32,
    /// the step whose results we are waiting for, and the older half left
    /// over once it is answered
    in_flight: Option<(BackfillStep, Option<(u64, u64)>)>,
    collected: Vec<Note>,
}

impl BackfillPlan {
    pub fn new(since: u64, until: u64, limit: u32) -> Self {
        let window = if since > until || limit == 0 {
            None
        } else {
            Some((since, until))
        };

        Self {
            window,
            remaining: limit,
            in_flight: None,
            collected: Vec::new(),
        }
    }

    pub fn is_done(&self) -> bool {
        self.in_flight.is_none() && (self.window.is_none() || self.remaining == 0)
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn collected(&self) -> &[Note] {
        &self.collected
    }

    pub fn into_notes(self) -> Vec<Note> {
        self.collected
    }

    /// The next query to run. `None` once the plan is satisfied or the
    /// window is exhausted, or while a step is still outstanding.
    pub fn next_step(&mut self) -> Option<BackfillStep> {
        if self.in_flight.is_some() || self.remaining == 0 {
            return None;
        }
        let (since, until) = self.window.take()?;
        let limit = self.remaining.saturating_add(1);

        let (step, older) = if since == until {
            (
                BackfillStep {
                    since,
                    until,
                    limit,
                },
                None,
            )
        } else {
            // since < until so middle >= since
            let middle = (since + until + 1) / 2 - 1;
            (
                BackfillStep {
                    since: middle + 1,
                    until,
                    limit,
                },
                Some((since, middle)),
            )
        };

        self.in_flight = Some((step, older));
        Some(step)
    }

    /// Feed the answer to the outstanding step. Returns the notes that made
    /// the cut, newest first.
    pub fn on_result(&mut self, mut notes: Vec<Note>) -> &[Note] {
        let Some((step, older)) = self.in_flight.take() else {
            return &[];
        };

        notes.retain(|n| n.created_at >= step.since && n.created_at <= step.until);
        notes.sort_by(timeline_cmp);
        notes.dedup_by(|a, b| a.id == b.id);

        let start = self.collected.len();
        let remaining = self.remaining as usize;

        if notes.len() >= remaining {
            // dense enough: these are the newest of the whole window
            notes.truncate(remaining);
            self.remaining = 0;
            self.window = None;
        } else {
            self.remaining -= notes.len() as u32;
            self.window = older;
        }

        self.collected.extend(notes);
        &self.collected[start..]
    }
}

/// Something that can answer a bounded history query
pub trait HistorySource {
    fn query(&mut self, step: &BackfillStep) -> Vec<Note>;
}

/// Run a whole plan against a synchronous source
pub fn backfill<S: HistorySource>(source: &mut S, since: u64, until: u64, limit: u32) -> Vec<Note> {
    let mut plan = BackfillPlan::new(since, until, limit);
    while let Some(step) = plan.next_step() {
        let notes = source.query(&step);
        plan.on_result(notes);
    }
    plan.into_notes()
}

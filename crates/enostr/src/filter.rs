use crate::{Error, Note, NoteId, Pubkey};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A NIP-01 REQ filter. Tag filters are stored under their wire key, eg `#e`.
#[derive(Serialize, Deserialize, Debug, Eq, PartialEq, Clone, Default)]
pub struct Filter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kinds: Option<Vec<u32>>,
    #[serde(flatten)]
    pub tags: BTreeMap<String, Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<u64>, // unix timestamp seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub until: Option<u64>, // unix timestamp seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
}

/// Which list-valued field two filters disagree on
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum ListField<'a> {
    Ids,
    Authors,
    Kinds,
    Tag(&'a str),
}

impl Filter {
    pub fn new() -> Filter {
        Filter::default()
    }

    pub fn ids<I: IntoIterator<Item = NoteId>>(mut self, ids: I) -> Self {
        self.ids = Some(ids.into_iter().map(|id| id.hex()).collect());
        self
    }

    pub fn authors<I: IntoIterator<Item = Pubkey>>(mut self, authors: I) -> Self {
        self.authors = Some(authors.into_iter().map(|pk| pk.hex()).collect());
        self
    }

    pub fn kinds<I: IntoIterator<Item = u32>>(mut self, kinds: I) -> Self {
        self.kinds = Some(kinds.into_iter().collect());
        self
    }

    /// Add a tag filter, `tag` is the single letter name without the `#`
    pub fn tag<I, S>(mut self, tag: char, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.insert(
            format!("#{tag}"),
            values.into_iter().map(Into::into).collect(),
        );
        self
    }

    pub fn events<I: IntoIterator<Item = NoteId>>(self, ids: I) -> Self {
        self.tag('e', ids.into_iter().map(|id| id.hex()))
    }

    pub fn pubkeys<I: IntoIterator<Item = Pubkey>>(self, pks: I) -> Self {
        self.tag('p', pks.into_iter().map(|pk| pk.hex()))
    }

    pub fn since(mut self, since: u64) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: u64) -> Self {
        self.until = Some(until);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn from_json(json: &str) -> Result<Self, Error> {
        serde_json::from_str(json).map_err(Into::into)
    }

    pub fn json(&self) -> Result<String, Error> {
        serde_json::to_string(self).map_err(Into::into)
    }

    /// Overlay `base` on top of this filter. Every field set in `base` wins.
    pub fn with_base(&self, base: &Filter) -> Filter {
        let mut out = self.clone();
        if base.ids.is_some() {
            out.ids = base.ids.clone();
        }
        if base.authors.is_some() {
            out.authors = base.authors.clone();
        }
        if base.kinds.is_some() {
            out.kinds = base.kinds.clone();
        }
        for (k, v) in &base.tags {
            out.tags.insert(k.clone(), v.clone());
        }
        if base.since.is_some() {
            out.since = base.since;
        }
        if base.until.is_some() {
            out.until = base.until;
        }
        if base.limit.is_some() {
            out.limit = base.limit;
        }
        if base.search.is_some() {
            out.search = base.search.clone();
        }
        out
    }

    /// NIP-01 matching. `limit` never excludes a note. `search` is left to
    /// the relay, so a note that passes every other constraint matches.
    pub fn matches(&self, note: &Note) -> bool {
        if let Some(ids) = &self.ids {
            let id = note.id.hex();
            if !ids.iter().any(|i| *i == id) {
                return false;
            }
        }

        if let Some(authors) = &self.authors {
            let pk = note.pubkey.hex();
            if !authors.iter().any(|a| *a == pk) {
                return false;
            }
        }

        if let Some(kinds) = &self.kinds {
            if !kinds.contains(&note.kind) {
                return false;
            }
        }

        if self.since.is_some_and(|since| note.created_at < since) {
            return false;
        }

        if self.until.is_some_and(|until| note.created_at > until) {
            return false;
        }

        for (key, values) in &self.tags {
            let Some(name) = key.strip_prefix('#') else {
                continue;
            };
            if !note.tag_values(name).any(|v| values.iter().any(|f| f == v)) {
                return false;
            }
        }

        true
    }

    /// Union two filters that differ in exactly one list field. Returns
    /// `None` when they cannot be served by one query: `limit` or `search`
    /// set on either side, differing time bounds, a field present on only
    /// one side, more than one differing field, or no difference at all.
    pub fn merge(&self, other: &Filter) -> Option<Filter> {
        if self.limit.is_some() || other.limit.is_some() {
            return None;
        }
        if self.search.is_some() || other.search.is_some() {
            return None;
        }
        if self.since != other.since || self.until != other.until {
            return None;
        }

        let mut differing: Option<ListField> = None;
        let mut note_diff = |field| -> bool {
            if differing.is_some() {
                return false;
            }
            differing = Some(field);
            true
        };

        match (&self.ids, &other.ids) {
            (Some(a), Some(b)) if !same_set(a, b) => {
                if !note_diff(ListField::Ids) {
                    return None;
                }
            }
            (Some(_), None) | (None, Some(_)) => return None,
            _ => {}
        }

        match (&self.authors, &other.authors) {
            (Some(a), Some(b)) if !same_set(a, b) => {
                if !note_diff(ListField::Authors) {
                    return None;
                }
            }
            (Some(_), None) | (None, Some(_)) => return None,
            _ => {}
        }

        match (&self.kinds, &other.kinds) {
            (Some(a), Some(b)) if !same_set(a, b) => {
                if !note_diff(ListField::Kinds) {
                    return None;
                }
            }
            (Some(_), None) | (None, Some(_)) => return None,
            _ => {}
        }

        if self.tags.len() != other.tags.len() {
            return None;
        }
        for (key, a) in &self.tags {
            let b = other.tags.get(key)?;
            if !same_set(a, b) && !note_diff(ListField::Tag(key)) {
                return None;
            }
        }

        let mut merged = self.clone();
        match differing? {
            ListField::Ids => union_into(merged.ids.as_mut()?, other.ids.as_ref()?),
            ListField::Authors => union_into(merged.authors.as_mut()?, other.authors.as_ref()?),
            ListField::Kinds => union_into(merged.kinds.as_mut()?, other.kinds.as_ref()?),
            ListField::Tag(key) => union_into(merged.tags.get_mut(key)?, other.tags.get(key)?),
        }

        Some(merged)
    }
}

/// Order and repeats don't matter to a relay
fn same_set<T: PartialEq>(a: &[T], b: &[T]) -> bool {
    a.iter().all(|v| b.contains(v)) && b.iter().all(|v| a.contains(v))
}

fn union_into<T: PartialEq + Clone>(into: &mut Vec<T>, from: &[T]) {
    for v in from {
        if !into.contains(v) {
            into.push(v.clone());
        }
    }
}

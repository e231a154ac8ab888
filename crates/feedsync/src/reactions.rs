use enostr::{Note, NoteId};
use hashbrown::{HashMap, HashSet};

/// Reaction counts for one note, keyed by reaction content (`+`, an emoji,
/// a `:shortcode:`)
#[derive(Debug, Default, Clone)]
pub struct ReactionTally {
    counts: HashMap<String, usize>,
    seen: HashSet<NoteId>,
}

impl ReactionTally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a kind 7 note. The same reaction from a second relay is not
    /// counted again. Returns whether it was counted.
    pub fn add(&mut self, reaction: &Note) -> bool {
        if !self.seen.insert(reaction.id) {
            return false;
        }
        *self.counts.entry(reaction.content.clone()).or_insert(0) += 1;
        true
    }

    pub fn count(&self, content: &str) -> usize {
        self.counts.get(content).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.seen.len()
    }

    /// Most used first
    pub fn ranked(&self) -> Vec<(&str, usize)> {
        let mut out: Vec<(&str, usize)> = self
            .counts
            .iter()
            .map(|(k, v)| (k.as_str(), *v))
            .collect();
        out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_notes::NoteBuilder;

    #[test]
    fn counts_each_reaction_once() {
        let mut tally = ReactionTally::new();
        let plus = NoteBuilder::new(1, 1).kind(7).content("+").build();
        let other_plus = NoteBuilder::new(2, 1).kind(7).content("+").build();
        let fire = NoteBuilder::new(3, 1).kind(7).content("🔥").build();

        assert!(tally.add(&plus));
        assert!(!tally.add(&plus));
        assert!(tally.add(&other_plus));
        assert!(tally.add(&fire));

        assert_eq!(tally.count("+"), 2);
        assert_eq!(tally.total(), 3);
        assert_eq!(tally.ranked(), vec![("+", 2), ("🔥", 1)]);
    }
}

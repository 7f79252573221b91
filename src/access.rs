/// Diagnostic mirror of reinforcement activity.
///
/// The memory store owns the authoritative access statistics. The decision
/// loop keeps its own tally of what it asked the store to reinforce so a run
/// can be inspected (and a checkpoint compared) without reaching into store
/// internals.
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::types::{MemoryId, MemoryTier};

/// Reinforcement tally for one memory id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AccessCount {
    /// Number of reinforcement calls that included this id
    pub reinforcements: u64,
    /// Sum of all feedback magnitudes applied
    pub net_feedback: f64,
}

/// Per-tier tallies, keyed by memory id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccessCounters {
    counts: BTreeMap<(MemoryTier, MemoryId), AccessCount>,
}

/// Flat, JSON-friendly form of one counter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessEntry {
    pub tier: MemoryTier,
    pub id: MemoryId,
    #[serde(flatten)]
    pub count: AccessCount,
}

impl AccessCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one reinforcement call.
    pub fn record(&mut self, tier: MemoryTier, ids: &BTreeSet<MemoryId>, magnitude: f64) {
        for id in ids {
            let count = self.counts.entry((tier, id.clone())).or_default();
            count.reinforcements += 1;
            count.net_feedback += magnitude;
        }
    }

    pub fn get(&self, tier: MemoryTier, id: &MemoryId) -> Option<AccessCount> {
        self.counts.get(&(tier, id.clone())).copied()
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Ids with the largest absolute net feedback.
    pub fn most_reinforced(&self, limit: usize) -> Vec<AccessEntry> {
        let mut entries = self.entries();
        entries.sort_by(|a, b| {
            b.count
                .net_feedback
                .abs()
                .total_cmp(&a.count.net_feedback.abs())
                .then_with(|| b.count.reinforcements.cmp(&a.count.reinforcements))
        });
        entries.truncate(limit);
        entries
    }

    /// Entries in (tier, id) order, for persistence.
    pub fn entries(&self) -> Vec<AccessEntry> {
        self.counts
            .iter()
            .map(|((tier, id), count)| AccessEntry {
                tier: *tier,
                id: id.clone(),
                count: *count,
            })
            .collect()
    }

    pub fn from_entries(entries: impl IntoIterator<Item = AccessEntry>) -> Self {
        Self {
            counts: entries
                .into_iter()
                .map(|e| ((e.tier, e.id), e.count))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(ids: &[&str]) -> BTreeSet<MemoryId> {
        ids.iter().map(|s| MemoryId::from(*s)).collect()
    }

    #[test]
    fn test_record_accumulates() {
        let mut counters = AccessCounters::new();
        counters.record(MemoryTier::Short, &set(&["s1", "s2"]), -1.0);
        counters.record(MemoryTier::Short, &set(&["s1"]), 1.0);
        counters.record(MemoryTier::Mid, &set(&["s1"]), 1.0);

        let s1 = counters.get(MemoryTier::Short, &"s1".into()).unwrap();
        assert_eq!(s1.reinforcements, 2);
        assert_eq!(s1.net_feedback, 0.0);

        // Same id in another tier is a different memory
        let mid = counters.get(MemoryTier::Mid, &"s1".into()).unwrap();
        assert_eq!(mid.reinforcements, 1);
        assert_eq!(counters.len(), 3);
    }

    #[test]
    fn test_entries_roundtrip() {
        let mut counters = AccessCounters::new();
        counters.record(MemoryTier::Long, &set(&["l1"]), 1.0);
        counters.record(MemoryTier::Reflection, &set(&["r1", "r2"]), -1.0);

        let json = serde_json::to_string(&counters.entries()).unwrap();
        let entries: Vec<AccessEntry> = serde_json::from_str(&json).unwrap();
        assert_eq!(AccessCounters::from_entries(entries), counters);
    }

    #[test]
    fn test_most_reinforced() {
        let mut counters = AccessCounters::new();
        counters.record(MemoryTier::Short, &set(&["a"]), 1.0);
        counters.record(MemoryTier::Short, &set(&["b"]), -1.0);
        counters.record(MemoryTier::Short, &set(&["b"]), -1.0);

        let top = counters.most_reinforced(1);
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].id, MemoryId::from("b"));
    }
}

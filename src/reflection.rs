/// The reflection log.
///
/// Every processed step leaves exactly one [`ReflectionRecord`]: what the
/// reasoning collaborator said (or an empty marker when it did not
/// converge) and which memory ids were consulted in each tier. It is the
/// only link between a past decision and the memories that shaped it, so
/// reinforcement reads from here and nowhere else.
///
/// The log is append-only. A date index points at the latest record for each
/// date; reprocessing a date appends a new record and moves the index.
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{ReflectError, ReflectResult};
use crate::reasoning::{ReasoningOutput, RetrievedMemories};
use crate::types::{Decision, MemoryId, MemoryTier, RunMode};

/// One date's reflection for one asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReflectionRecord {
    pub date: NaiveDate,
    pub mode: RunMode,
    /// False when the collaborator returned nothing
    pub converged: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<Decision>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
    /// Ids consulted per tier, in rank order. Tiers with no hits are absent.
    pub consulted: BTreeMap<MemoryTier, Vec<MemoryId>>,
}

impl ReflectionRecord {
    /// Build a record from what was retrieved and what came back.
    pub fn new(
        date: NaiveDate,
        mode: RunMode,
        memories: &RetrievedMemories,
        output: Option<&ReasoningOutput>,
    ) -> Self {
        let consulted = MemoryTier::ALL
            .iter()
            .filter_map(|tier| {
                let ids = memories.ids(*tier);
                (!ids.is_empty()).then_some((*tier, ids))
            })
            .collect();

        Self {
            date,
            mode,
            converged: output.is_some(),
            decision: output.and_then(ReasoningOutput::decision),
            rationale: output.and_then(|o| o.rationale.clone()),
            consulted,
        }
    }

    /// Deduplicated ids consulted in one tier.
    pub fn consulted_ids(&self, tier: MemoryTier) -> BTreeSet<MemoryId> {
        self.consulted
            .get(&tier)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }
}

/// Append-only reflection history with a date index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReflectionLog {
    entries: Vec<ReflectionRecord>,
    by_date: BTreeMap<NaiveDate, usize>,
}

impl ReflectionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from a persisted entry list. Later entries win for a date.
    pub fn from_entries(entries: Vec<ReflectionRecord>) -> Self {
        let by_date = entries
            .iter()
            .enumerate()
            .map(|(pos, record)| (record.date, pos))
            .collect();
        Self { entries, by_date }
    }

    /// Append a record and point its date at it.
    pub fn record(&mut self, record: ReflectionRecord) {
        self.by_date.insert(record.date, self.entries.len());
        self.entries.push(record);
    }

    /// Current record for a date.
    pub fn get(&self, date: NaiveDate) -> Option<&ReflectionRecord> {
        self.by_date.get(&date).map(|&pos| &self.entries[pos])
    }

    /// Current record for a date, or the state-consistency error.
    pub fn require(&self, date: NaiveDate) -> ReflectResult<&ReflectionRecord> {
        self.get(date)
            .ok_or(ReflectError::MissingReflection { date })
    }

    /// Every record ever appended, oldest first.
    pub fn entries(&self) -> &[ReflectionRecord] {
        &self.entries
    }

    /// Current records, one per date, in date order.
    pub fn current(&self) -> impl Iterator<Item = &ReflectionRecord> {
        self.by_date.values().map(|&pos| &self.entries[pos])
    }

    /// Number of distinct dates.
    pub fn len(&self) -> usize {
        self.by_date.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_date.is_empty()
    }
}

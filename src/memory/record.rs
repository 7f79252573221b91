/// Memory records and relevance scoring.
///
/// A record is a dated text snippet living in one tier. Its retained
/// weight is described by three numbers:
///
/// - **importance** (0.0 - 1.0): raised or lowered by outcome feedback,
///   decays a little every maintenance step
/// - **recency** (0.0 - 1.0): `exp(-age / horizon)`, reset on promotion
/// - **access_count**: signed sum of all feedback magnitudes received
///
/// Retrieval ranks records by a weighted blend of lexical overlap with the
/// query, importance, and recency.
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::types::{MemoryId, MemorySnippet, MemoryTier};

/// A stored memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: MemoryId,
    pub text: String,
    pub date: NaiveDate,
    pub tier: MemoryTier,
    pub importance: f32,
    pub recency: f32,
    /// Maintenance steps since insertion or last tier move
    pub age_steps: u32,
    pub access_count: f64,
}

impl MemoryRecord {
    pub fn new(
        id: MemoryId,
        tier: MemoryTier,
        date: NaiveDate,
        text: impl Into<String>,
        importance: f32,
    ) -> Self {
        Self {
            id,
            text: text.into(),
            date,
            tier,
            importance: importance.clamp(0.0, 1.0),
            recency: 1.0,
            age_steps: 0,
            access_count: 0.0,
        }
    }

    /// Apply a feedback magnitude.
    pub fn reinforce(&mut self, magnitude: f64, step: f32) {
        self.access_count += magnitude;
        self.importance = (self.importance + step * magnitude as f32).clamp(0.0, 1.0);
    }

    /// Age one step: decay importance and recompute recency.
    pub fn age(&mut self, importance_decay: f32, recency_horizon: f32) {
        self.age_steps = self.age_steps.saturating_add(1);
        self.importance = (self.importance * importance_decay).clamp(0.0, 1.0);
        self.recency = if recency_horizon > 0.0 {
            (-(self.age_steps as f32) / recency_horizon).exp()
        } else {
            0.0
        };
    }

    /// Move to another tier; the id is kept, the clock restarts.
    pub fn relocate(&mut self, tier: MemoryTier) {
        self.tier = tier;
        self.age_steps = 0;
        self.recency = 1.0;
    }

    /// Weighted relevance against a tokenized query.
    pub fn relevance(&self, query_tokens: &BTreeSet<String>, weights: &QueryWeights) -> f32 {
        let similarity = lexical_similarity(query_tokens, &tokenize(&self.text));
        similarity * weights.similarity
            + self.importance * weights.importance
            + self.recency * weights.recency
    }

    pub fn snippet(&self) -> MemorySnippet {
        MemorySnippet {
            id: self.id.clone(),
            text: self.text.clone(),
        }
    }
}

/// Weights of the three relevance components.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QueryWeights {
    pub similarity: f32,
    pub importance: f32,
    pub recency: f32,
}

impl Default for QueryWeights {
    fn default() -> Self {
        Self {
            similarity: 0.5,
            importance: 0.3,
            recency: 0.2,
        }
    }
}

/// Lowercased alphanumeric tokens.
pub fn tokenize(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Jaccard overlap of two token sets (0.0 when either is empty).
pub fn lexical_similarity(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let shared = a.intersection(b).count() as f32;
    let union = a.union(b).count() as f32;
    shared / union
}

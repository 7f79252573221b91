/// Tier maintenance planning.
///
/// Every maintenance step ages each record of an asset, then decides where
/// it belongs:
///
/// ```text
/// Short ──importance ≥ promote──▶ Mid ──importance ≥ promote──▶ Long
///   ◀──importance < demote──        ◀──importance < demote──
///
/// Reflection: never moves
/// any tier:   importance or recency under the eviction floor → evicted
/// ```
///
/// Planning is separated from execution so the store can apply all moves
/// for an asset under a single lock.
use serde::{Deserialize, Serialize};

use super::record::{MemoryRecord, QueryWeights};
use crate::types::{MemoryId, MemoryTier};

/// Per-tier lifecycle parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierConfig {
    /// Importance given to freshly inserted records
    pub initial_importance: f32,
    /// Multiplicative importance decay per step
    pub importance_decay: f32,
    /// Recency is `exp(-age / recency_horizon)`
    pub recency_horizon: f32,
    /// Promote when importance reaches this value
    pub promote_at: Option<f32>,
    /// Demote when importance falls below this value
    pub demote_below: Option<f32>,
    pub evict_importance_below: f32,
    pub evict_recency_below: f32,
    /// Importance change per unit of feedback
    pub reinforcement_step: f32,
}

impl TierConfig {
    pub fn short() -> Self {
        Self {
            initial_importance: 0.5,
            importance_decay: 0.95,
            recency_horizon: 3.0,
            promote_at: Some(0.8),
            demote_below: None,
            evict_importance_below: 0.05,
            evict_recency_below: 0.01,
            reinforcement_step: 0.1,
        }
    }

    pub fn mid() -> Self {
        Self {
            initial_importance: 0.6,
            importance_decay: 0.97,
            recency_horizon: 90.0,
            promote_at: Some(0.85),
            demote_below: Some(0.3),
            evict_importance_below: 0.05,
            evict_recency_below: 0.01,
            reinforcement_step: 0.1,
        }
    }

    pub fn long() -> Self {
        Self {
            initial_importance: 0.7,
            importance_decay: 0.99,
            recency_horizon: 365.0,
            promote_at: None,
            demote_below: Some(0.4),
            evict_importance_below: 0.05,
            evict_recency_below: 0.01,
            reinforcement_step: 0.1,
        }
    }

    pub fn reflection() -> Self {
        Self {
            initial_importance: 0.6,
            importance_decay: 0.98,
            recency_horizon: 365.0,
            promote_at: None,
            demote_below: None,
            evict_importance_below: 0.05,
            evict_recency_below: 0.01,
            reinforcement_step: 0.1,
        }
    }
}

/// Configuration of the tiered memory store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "TierConfig::short")]
    pub short: TierConfig,
    #[serde(default = "TierConfig::mid")]
    pub mid: TierConfig,
    #[serde(default = "TierConfig::long")]
    pub long: TierConfig,
    #[serde(default = "TierConfig::reflection")]
    pub reflection: TierConfig,
    #[serde(default)]
    pub weights: QueryWeights,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            short: TierConfig::short(),
            mid: TierConfig::mid(),
            long: TierConfig::long(),
            reflection: TierConfig::reflection(),
            weights: QueryWeights::default(),
        }
    }
}

impl MemoryConfig {
    pub fn tier(&self, tier: MemoryTier) -> &TierConfig {
        match tier {
            MemoryTier::Short => &self.short,
            MemoryTier::Mid => &self.mid,
            MemoryTier::Long => &self.long,
            MemoryTier::Reflection => &self.reflection,
        }
    }
}

/// What maintenance decided for one record.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Promote {
        id: MemoryId,
        from: MemoryTier,
        to: MemoryTier,
    },
    Demote {
        id: MemoryId,
        from: MemoryTier,
        to: MemoryTier,
    },
    Evict { id: MemoryId, from: MemoryTier },
}

impl Transition {
    pub fn id(&self) -> &MemoryId {
        match self {
            Transition::Promote { id, .. }
            | Transition::Demote { id, .. }
            | Transition::Evict { id, .. } => id,
        }
    }
}

/// Plans tier transitions for already-aged records.
#[derive(Debug, Clone)]
pub struct TransitionPlanner<'a> {
    config: &'a MemoryConfig,
}

impl<'a> TransitionPlanner<'a> {
    pub fn new(config: &'a MemoryConfig) -> Self {
        Self { config }
    }

    /// Decide the fate of one record. Eviction wins over movement.
    pub fn plan(&self, record: &MemoryRecord) -> Option<Transition> {
        let tier_config = self.config.tier(record.tier);

        if record.importance < tier_config.evict_importance_below
            || record.recency < tier_config.evict_recency_below
        {
            return Some(Transition::Evict {
                id: record.id.clone(),
                from: record.tier,
            });
        }

        if let (Some(threshold), Some(to)) = (tier_config.promote_at, record.tier.promoted()) {
            if record.importance >= threshold {
                return Some(Transition::Promote {
                    id: record.id.clone(),
                    from: record.tier,
                    to,
                });
            }
        }

        if let (Some(threshold), Some(to)) = (tier_config.demote_below, record.tier.demoted()) {
            if record.importance < threshold {
                return Some(Transition::Demote {
                    id: record.id.clone(),
                    from: record.tier,
                    to,
                });
            }
        }

        None
    }

    /// Plan for a batch of records, in their given order.
    pub fn plan_all<'r>(
        &self,
        records: impl IntoIterator<Item = &'r MemoryRecord>,
    ) -> Vec<Transition> {
        records.into_iter().filter_map(|r| self.plan(r)).collect()
    }
}

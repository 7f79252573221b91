/// In-process tiered memory store.
///
/// Each asset owns an isolated [`AssetMemory`] inside a `DashMap`, so
/// decision loops for different symbols can share one store without
/// interfering, and every query sees all earlier writes for that symbol.
///
/// ## Identifier stability
///
/// Ids are issued per asset from a monotonically increasing counter and are
/// never reused. A record keeps its id when maintenance promotes or demotes
/// it, and the store remembers every tier an id has lived in. Reinforcing an
/// id therefore succeeds for any tier it was ever retrieved from; evicted ids
/// are remembered as tombstones and reinforcing them is a no-op. Ids that
/// were never issued for that asset and tier are rejected.
use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use tokio::fs;
use tracing::{debug, trace};

use super::lifecycle::{MemoryConfig, Transition, TransitionPlanner};
use super::record::{MemoryRecord, tokenize};
use super::{MemoryCheckpoint, MemoryStore};
use crate::error::{ReflectError, ReflectResult};
use crate::types::{MemoryId, MemorySnippet, MemoryTier};

const SNAPSHOT_VERSION: u32 = 1;
const SNAPSHOT_FILE: &str = "memory.bin";

/// Where an id has been and where it is now.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Placement {
    visited: Vec<MemoryTier>,
    /// `None` once evicted
    current: Option<MemoryTier>,
}

/// All memory belonging to one asset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssetMemory {
    tiers: BTreeMap<MemoryTier, Vec<MemoryRecord>>,
    placements: HashMap<MemoryId, Placement>,
    next_id: u64,
}

impl AssetMemory {
    fn issue_id(&mut self) -> MemoryId {
        self.next_id += 1;
        MemoryId(format!("mem-{:06}", self.next_id))
    }

    fn records(&self, tier: MemoryTier) -> &[MemoryRecord] {
        self.tiers.get(&tier).map(Vec::as_slice).unwrap_or(&[])
    }

    fn record_mut(&mut self, tier: MemoryTier, id: &MemoryId) -> Option<&mut MemoryRecord> {
        self.tiers
            .get_mut(&tier)
            .and_then(|records| records.iter_mut().find(|r| &r.id == id))
    }

    fn take(&mut self, tier: MemoryTier, id: &MemoryId) -> Option<MemoryRecord> {
        let records = self.tiers.get_mut(&tier)?;
        let pos = records.iter().position(|r| &r.id == id)?;
        Some(records.remove(pos))
    }

    fn len(&self) -> usize {
        self.tiers.values().map(Vec::len).sum()
    }
}

/// Counts per tier for one asset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TierStats {
    pub short: usize,
    pub mid: usize,
    pub long: usize,
    pub reflection: usize,
    pub evicted: usize,
}

impl TierStats {
    pub fn total(&self) -> usize {
        self.short + self.mid + self.long + self.reflection
    }
}

/// Serializable snapshot of the whole store.
#[derive(Debug, Serialize, Deserialize)]
struct MemorySnapshot {
    version: u32,
    config: MemoryConfig,
    /// Vec instead of map keeps the encoding independent of hash order
    assets: Vec<(String, AssetMemory)>,
}

/// Reference [`MemoryStore`] implementation.
pub struct TieredMemory {
    config: MemoryConfig,
    assets: DashMap<String, AssetMemory>,
}

impl TieredMemory {
    pub fn new() -> Self {
        Self::with_config(MemoryConfig::default())
    }

    pub fn with_config(config: MemoryConfig) -> Self {
        Self {
            config,
            assets: DashMap::new(),
        }
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Full record lookup (diagnostics and tests).
    pub fn record(&self, symbol: &str, id: &MemoryId) -> Option<MemoryRecord> {
        let asset = self.assets.get(symbol)?;
        let current = asset.placements.get(id)?.current?;
        asset
            .records(current)
            .iter()
            .find(|r| &r.id == id)
            .cloned()
    }

    /// Tier the id currently lives in, `None` if evicted or unknown.
    pub fn current_tier(&self, symbol: &str, id: &MemoryId) -> Option<MemoryTier> {
        self.assets
            .get(symbol)
            .and_then(|asset| asset.placements.get(id).and_then(|p| p.current))
    }

    pub fn stats(&self, symbol: &str) -> TierStats {
        let Some(asset) = self.assets.get(symbol) else {
            return TierStats::default();
        };
        TierStats {
            short: asset.records(MemoryTier::Short).len(),
            mid: asset.records(MemoryTier::Mid).len(),
            long: asset.records(MemoryTier::Long).len(),
            reflection: asset.records(MemoryTier::Reflection).len(),
            evicted: asset
                .placements
                .values()
                .filter(|p| p.current.is_none())
                .count(),
        }
    }

    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<_> = self.assets.iter().map(|e| e.key().clone()).collect();
        symbols.sort();
        symbols
    }

    fn apply(asset: &mut AssetMemory, transition: &Transition) {
        match transition {
            Transition::Promote { id, from, to } | Transition::Demote { id, from, to } => {
                if let Some(mut record) = asset.take(*from, id) {
                    record.relocate(*to);
                    asset.tiers.entry(*to).or_default().push(record);
                    if let Some(placement) = asset.placements.get_mut(id) {
                        placement.current = Some(*to);
                        if !placement.visited.contains(to) {
                            placement.visited.push(*to);
                        }
                    }
                }
            }
            Transition::Evict { id, from } => {
                asset.take(*from, id);
                if let Some(placement) = asset.placements.get_mut(id) {
                    placement.current = None;
                }
            }
        }
    }
}

impl Default for TieredMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore for TieredMemory {
    fn add(
        &self,
        tier: MemoryTier,
        symbol: &str,
        date: NaiveDate,
        text: &str,
    ) -> ReflectResult<MemoryId> {
        let initial = self.config.tier(tier).initial_importance;
        let mut asset = self.assets.entry(symbol.to_string()).or_default();
        let id = asset.issue_id();
        asset.tiers.entry(tier).or_default().push(MemoryRecord::new(
            id.clone(),
            tier,
            date,
            text,
            initial,
        ));
        asset.placements.insert(
            id.clone(),
            Placement {
                visited: vec![tier],
                current: Some(tier),
            },
        );
        trace!(%symbol, %tier, memory_id = %id, "Memory added");
        Ok(id)
    }

    fn query(
        &self,
        tier: MemoryTier,
        symbol: &str,
        query_text: &str,
        top_k: usize,
    ) -> ReflectResult<Vec<MemorySnippet>> {
        let Some(asset) = self.assets.get(symbol) else {
            return Ok(Vec::new());
        };
        let query_tokens = tokenize(query_text);
        let weights = &self.config.weights;

        let mut scored: Vec<(f32, &MemoryRecord)> = asset
            .records(tier)
            .iter()
            .map(|r| (r.relevance(&query_tokens, weights), r))
            .collect();
        // Highest score first; ties resolved by id for deterministic replay
        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.1.id.cmp(&b.1.id))
        });

        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(_, r)| r.snippet())
            .collect())
    }

    fn reinforce(
        &self,
        tier: MemoryTier,
        symbol: &str,
        ids: &BTreeSet<MemoryId>,
        magnitude: f64,
    ) -> ReflectResult<()> {
        let unknown = |id: &MemoryId| ReflectError::UnknownMemory {
            tier,
            symbol: symbol.to_string(),
            id: id.clone(),
        };

        let Some(mut asset) = self.assets.get_mut(symbol) else {
            return match ids.iter().next() {
                Some(id) => Err(unknown(id)),
                None => Ok(()),
            };
        };

        // Validate everything before touching anything
        let mut live = Vec::with_capacity(ids.len());
        for id in ids {
            let placement = asset
                .placements
                .get(id)
                .filter(|p| p.visited.contains(&tier))
                .ok_or_else(|| unknown(id))?;
            match placement.current {
                Some(current) => live.push((current, id)),
                None => debug!(%symbol, %tier, memory_id = %id, "Skipping evicted memory"),
            }
        }

        for (current, id) in live {
            let step = self.config.tier(current).reinforcement_step;
            if let Some(record) = asset.record_mut(current, id) {
                record.reinforce(magnitude, step);
            }
        }
        Ok(())
    }

    fn maintain(&self, symbol: &str) -> ReflectResult<()> {
        let Some(mut asset) = self.assets.get_mut(symbol) else {
            return Ok(());
        };

        for (tier, records) in asset.tiers.iter_mut() {
            let tier_config = self.config.tier(*tier);
            for record in records.iter_mut() {
                record.age(tier_config.importance_decay, tier_config.recency_horizon);
            }
        }

        let planner = TransitionPlanner::new(&self.config);
        let transitions =
            planner.plan_all(asset.tiers.values().flat_map(|records| records.iter()));
        for transition in &transitions {
            Self::apply(&mut asset, transition);
        }

        debug!(
            %symbol,
            records = asset.len(),
            transitions = transitions.len(),
            "Maintenance complete"
        );
        Ok(())
    }
}

#[async_trait]
impl MemoryCheckpoint for TieredMemory {
    async fn save_checkpoint(&self, dir: &Path, force: bool) -> ReflectResult<()> {
        if fs::metadata(dir).await.is_ok() {
            if !force {
                return Err(ReflectError::CheckpointExists {
                    path: dir.to_path_buf(),
                });
            }
        } else {
            fs::create_dir_all(dir).await?;
        }

        let mut assets: Vec<(String, AssetMemory)> = self
            .assets
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        assets.sort_by(|a, b| a.0.cmp(&b.0));

        let snapshot = MemorySnapshot {
            version: SNAPSHOT_VERSION,
            config: self.config.clone(),
            assets,
        };
        let bytes = bincode::serialize(&snapshot)
            .map_err(|e| ReflectError::Storage(format!("Failed to serialize memory: {}", e)))?;

        // Write to temporary file first, then rename into place
        let path = dir.join(SNAPSHOT_FILE);
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, &bytes).await?;
        fs::rename(&temp_path, &path).await?;
        Ok(())
    }

    async fn load_checkpoint(dir: &Path) -> ReflectResult<Self> {
        let bytes = fs::read(dir.join(SNAPSHOT_FILE))
            .await
            .map_err(|e| ReflectError::Storage(format!("Failed to read memory snapshot: {}", e)))?;
        let snapshot: MemorySnapshot = bincode::deserialize(&bytes).map_err(|e| {
            ReflectError::Storage(format!("Failed to deserialize memory snapshot: {}", e))
        })?;

        if snapshot.version != SNAPSHOT_VERSION {
            return Err(ReflectError::Storage(format!(
                "Incompatible memory snapshot version: {} (expected {})",
                snapshot.version, SNAPSHOT_VERSION
            )));
        }

        let memory = TieredMemory::with_config(snapshot.config);
        for (symbol, asset) in snapshot.assets {
            memory.assets.insert(symbol, asset);
        }
        Ok(memory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn ids(list: &[&MemoryId]) -> BTreeSet<MemoryId> {
        list.iter().map(|id| (*id).clone()).collect()
    }

    #[test]
    fn test_add_and_query() {
        let memory = TieredMemory::new();
        memory
            .add(MemoryTier::Short, "TSLA", day(2), "rate hike hurts growth")
            .unwrap();
        memory
            .add(MemoryTier::Short, "TSLA", day(2), "cafeteria menu")
            .unwrap();

        let hits = memory
            .query(MemoryTier::Short, "TSLA", "growth investor", 1)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "rate hike hurts growth");

        // Other tiers and other assets are untouched
        assert!(memory
            .query(MemoryTier::Mid, "TSLA", "growth", 5)
            .unwrap()
            .is_empty());
        assert!(memory
            .query(MemoryTier::Short, "AAPL", "growth", 5)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_query_does_not_mutate() {
        let memory = TieredMemory::new();
        let id = memory
            .add(MemoryTier::Mid, "TSLA", day(2), "quarterly report")
            .unwrap();
        let before = memory.record("TSLA", &id).unwrap();
        memory.query(MemoryTier::Mid, "TSLA", "report", 3).unwrap();
        assert_eq!(memory.record("TSLA", &id).unwrap(), before);
    }

    #[test]
    fn test_reinforce_updates_importance_and_access() {
        let memory = TieredMemory::new();
        let id = memory
            .add(MemoryTier::Short, "TSLA", day(2), "news")
            .unwrap();

        memory
            .reinforce(MemoryTier::Short, "TSLA", &ids(&[&id]), 1.0)
            .unwrap();
        let record = memory.record("TSLA", &id).unwrap();
        assert_eq!(record.access_count, 1.0);
        assert!((record.importance - 0.6).abs() < 1e-6);

        memory
            .reinforce(MemoryTier::Short, "TSLA", &ids(&[&id]), -1.0)
            .unwrap();
        let record = memory.record("TSLA", &id).unwrap();
        assert_eq!(record.access_count, 0.0);
        assert!((record.importance - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_reinforce_unknown_id_is_all_or_nothing() {
        let memory = TieredMemory::new();
        let id = memory
            .add(MemoryTier::Short, "TSLA", day(2), "news")
            .unwrap();
        let bogus = MemoryId::new("mem-999999");

        let err = memory
            .reinforce(MemoryTier::Short, "TSLA", &ids(&[&id, &bogus]), 1.0)
            .unwrap_err();
        assert!(matches!(err, ReflectError::UnknownMemory { ref id, .. } if id == &bogus));
        assert_eq!(memory.record("TSLA", &id).unwrap().access_count, 0.0);

        // Known id, wrong tier
        let err = memory
            .reinforce(MemoryTier::Long, "TSLA", &ids(&[&id]), 1.0)
            .unwrap_err();
        assert!(matches!(err, ReflectError::UnknownMemory { .. }));

        // Unknown asset
        assert!(memory
            .reinforce(MemoryTier::Short, "AAPL", &ids(&[&id]), 1.0)
            .is_err());
    }

    #[test]
    fn test_promotion_keeps_id_reinforceable() {
        let memory = TieredMemory::new();
        let id = memory
            .add(MemoryTier::Short, "TSLA", day(2), "big news")
            .unwrap();
        // 0.5 + 4 * 0.1 = 0.9, above the Short promotion threshold even after decay
        for _ in 0..4 {
            memory
                .reinforce(MemoryTier::Short, "TSLA", &ids(&[&id]), 1.0)
                .unwrap();
        }
        memory.maintain("TSLA").unwrap();
        assert_eq!(memory.current_tier("TSLA", &id), Some(MemoryTier::Mid));

        // Still reinforceable under the tier it was consulted in
        memory
            .reinforce(MemoryTier::Short, "TSLA", &ids(&[&id]), 1.0)
            .unwrap();
        assert_eq!(memory.record("TSLA", &id).unwrap().access_count, 5.0);
    }

    #[test]
    fn test_eviction_tombstones_id() {
        let memory = TieredMemory::new();
        let id = memory
            .add(MemoryTier::Short, "TSLA", day(2), "stale news")
            .unwrap();
        // Recency horizon for Short is 3 steps: exp(-14/3) < 0.01
        for _ in 0..14 {
            memory.maintain("TSLA").unwrap();
        }
        assert_eq!(memory.current_tier("TSLA", &id), None);
        assert_eq!(memory.stats("TSLA").evicted, 1);
        assert_eq!(memory.stats("TSLA").total(), 0);

        // Reinforcing a tombstone is a no-op, not an error
        memory
            .reinforce(MemoryTier::Short, "TSLA", &ids(&[&id]), 1.0)
            .unwrap();
    }

    #[test]
    fn test_maintenance_is_per_asset() {
        let memory = TieredMemory::new();
        let a = memory.add(MemoryTier::Mid, "TSLA", day(2), "a").unwrap();
        let b = memory.add(MemoryTier::Mid, "AAPL", day(2), "b").unwrap();

        memory.maintain("TSLA").unwrap();
        assert_eq!(memory.record("TSLA", &a).unwrap().age_steps, 1);
        assert_eq!(memory.record("AAPL", &b).unwrap().age_steps, 0);
    }

    #[tokio::test]
    async fn test_checkpoint_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("brain");

        let memory = TieredMemory::new();
        let id = memory
            .add(MemoryTier::Long, "TSLA", day(2), "annual report")
            .unwrap();
        memory.add(MemoryTier::Short, "AAPL", day(2), "news").unwrap();
        memory.maintain("TSLA").unwrap();

        memory.save_checkpoint(&path, false).await.unwrap();
        let restored = TieredMemory::load_checkpoint(&path).await.unwrap();

        assert_eq!(restored.record("TSLA", &id), memory.record("TSLA", &id));
        assert_eq!(restored.symbols(), vec!["AAPL".to_string(), "TSLA".to_string()]);

        // Id counter survives, so new ids never collide
        let next = restored
            .add(MemoryTier::Long, "TSLA", day(3), "another")
            .unwrap();
        assert_ne!(next, id);
    }

    #[tokio::test]
    async fn test_checkpoint_requires_force() {
        let dir = TempDir::new().unwrap();
        let memory = TieredMemory::new();

        let err = memory.save_checkpoint(dir.path(), false).await.unwrap_err();
        assert!(matches!(err, ReflectError::CheckpointExists { .. }));
        memory.save_checkpoint(dir.path(), true).await.unwrap();
    }

    #[tokio::test]
    async fn test_load_missing_checkpoint() {
        let result = TieredMemory::load_checkpoint(Path::new("/nonexistent/brain")).await;
        assert!(matches!(result, Err(ReflectError::Storage(_))));
    }
}

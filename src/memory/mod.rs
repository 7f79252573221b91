/// Tiered textual memory.
///
/// The decision loop talks to memory only through the [`MemoryStore`] and
/// [`MemoryCheckpoint`] traits. Four tiers are addressable independently:
///
/// - **Short**: news-like items, fast decay
/// - **Mid**: periodic reports
/// - **Long**: foundational reference documents
/// - **Reflection**: rationales written back by the reasoning step
///
/// ## The Flow
///
/// ```text
/// add ──▶ tier ──query (top-k, read only)──▶ decision loop
///                                                │
///          reinforce(ids, ±magnitude) ◀──────────┘ (later, on feedback)
///                 │
/// maintain: decay ─▶ promote / demote ─▶ evict
/// ```
///
/// [`TieredMemory`] is the in-process implementation shipped with the crate.
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::BTreeSet;
use std::path::Path;

use crate::error::ReflectResult;
use crate::types::{MemoryId, MemorySnippet, MemoryTier};

pub mod lifecycle;
pub mod record;
pub mod tiered;

pub use lifecycle::{MemoryConfig, TierConfig, Transition, TransitionPlanner};
pub use record::{MemoryRecord, QueryWeights};
pub use tiered::{TierStats, TieredMemory};

/// Storage contract consumed by the decision loop.
///
/// Implementations must isolate mutations per asset and tier, and a query
/// must observe every earlier write made for the same asset.
pub trait MemoryStore: Send + Sync {
    /// Insert a dated text record into a tier.
    fn add(
        &self,
        tier: MemoryTier,
        symbol: &str,
        date: NaiveDate,
        text: &str,
    ) -> ReflectResult<MemoryId>;

    /// Top-k records of one tier, best first. Never mutates.
    fn query(
        &self,
        tier: MemoryTier,
        symbol: &str,
        query_text: &str,
        top_k: usize,
    ) -> ReflectResult<Vec<MemorySnippet>>;

    /// Apply outcome feedback to the given ids.
    ///
    /// Fails without side effects if any id is unknown for that asset and tier.
    fn reinforce(
        &self,
        tier: MemoryTier,
        symbol: &str,
        ids: &BTreeSet<MemoryId>,
        magnitude: f64,
    ) -> ReflectResult<()>;

    /// Periodic housekeeping for one asset: decay, promotion/demotion, eviction.
    fn maintain(&self, symbol: &str) -> ReflectResult<()>;
}

/// Directory-based snapshot/restore owned by the store itself.
#[async_trait]
pub trait MemoryCheckpoint: Sized + Send + Sync {
    /// Write the store into `dir`. Fails if `dir` exists and `force` is not set.
    async fn save_checkpoint(&self, dir: &Path, force: bool) -> ReflectResult<()>;

    /// Rebuild a store from a directory written by `save_checkpoint`.
    async fn load_checkpoint(dir: &Path) -> ReflectResult<Self>;
}

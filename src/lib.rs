//! # KoruReflect: Memory-Reinforced Decision Loops
//!
//! KoruReflect runs one decision loop per traded asset. Every step it:
//! - **Ingests** filings and news into tiered textual memory
//! - **Retrieves** the top-k memories of each tier for the agent's persona
//! - **Reflects** through an external reasoning collaborator
//! - **Acts** on the portfolio (training labels or live decisions)
//! - **Reinforces** the exact memories behind a past decision once its
//!   outcome is known
//! - **Maintains** memory: decay, promotion/demotion, eviction
//!
//! ## Quick Start
//!
//! ```ignore
//! use koru_reflect::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AgentConfig::load("agent.json".as_ref()).await?;
//!     let book = PositionBook::new(config.symbol(), config.look_back_window_size());
//!     let reasoner = reasoner_from_config(&config.chat)?;
//!     let mut agent = DecisionLoop::new(config, Arc::new(TieredMemory::new()), book, reasoner)?;
//!
//!     let step = MarketStep::new(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(), 248.4)
//!         .with_news(vec!["rate hike".into()])
//!         .with_outcome(0.5);
//!     agent.step(&step, RunMode::Train).await?;
//!
//!     agent.save_checkpoint("checkpoints/tsla-agent".as_ref(), false).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! The loop (`agent`) depends on three collaborators through traits:
//!
//! 1. **Memory** ([`MemoryStore`], [`MemoryCheckpoint`]) - four tiers, per asset
//! 2. **Portfolio** ([`Portfolio`]) - market data, actions, delayed feedback
//! 3. **Reasoning** ([`ReasoningCollaborator`]) - the decision itself
//!
//! [`TieredMemory`], [`PositionBook`] and the reasoners in [`reasoning`] are
//! the implementations shipped with the crate.
//!
//! ## Concurrency
//!
//! Steps of one loop are sequential (`step` takes `&mut self`). Loops for
//! different assets may run in parallel over one shared `Arc<TieredMemory>`:
//! each asset's memory is isolated.

pub mod access;
pub mod agent;
pub mod checkpoint;
pub mod config;
mod error;
pub mod events;
pub mod memory;
pub mod portfolio;
pub mod reasoning;
pub mod reflection;
mod types;

// Public API exports
pub use access::{AccessCount, AccessCounters, AccessEntry};
pub use agent::{DecisionLoop, MOMENTUM_WINDOW};
pub use checkpoint::{AgentSnapshot, SNAPSHOT_VERSION};
pub use config::{AgentConfig, ChatConfig, GeneralConfig};
pub use error::{ReflectError, ReflectResult};
pub use events::{AgentEvent, EventSink, NullSink, RecordingSink, TracingSink};
pub use memory::{MemoryCheckpoint, MemoryConfig, MemoryStore, TierConfig, TieredMemory};
pub use portfolio::{Portfolio, PositionBook};
pub use reasoning::{
    NullReasoner, ReasoningCollaborator, ReasoningOutput, ReflectionInput, ReflectionRequest,
    RetrievedMemories, reasoner_from_config,
};
pub use reflection::{ReflectionLog, ReflectionRecord};
pub use types::{
    Decision, Direction, Feedback, MarketStep, MemoryId, MemorySnippet, MemoryTier, RunMode,
    TradeAction,
};

#[cfg(feature = "http")]
pub use reasoning::http::HttpReasoner;

// Re-export commonly used external types for convenience
pub use chrono::NaiveDate;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use koru_reflect::prelude::*;
/// ```
pub mod prelude {
    pub use crate::agent::DecisionLoop;
    pub use crate::config::AgentConfig;
    pub use crate::error::{ReflectError, ReflectResult};
    pub use crate::events::{AgentEvent, EventSink, RecordingSink, TracingSink};
    pub use crate::memory::{MemoryCheckpoint, MemoryStore, TieredMemory};
    pub use crate::portfolio::{Portfolio, PositionBook};
    pub use crate::reasoning::{
        NullReasoner, ReasoningCollaborator, ReasoningOutput, ReflectionRequest,
        reasoner_from_config,
    };
    pub use crate::types::{
        Decision, Direction, Feedback, MarketStep, MemoryId, MemorySnippet, MemoryTier, RunMode,
        TradeAction,
    };
    pub use chrono::NaiveDate;
}

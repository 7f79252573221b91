/// Checkpoint save and restore for a decision loop.
///
/// A checkpoint is a directory:
///
/// ```text
/// <location>/
///   state.json       AgentSnapshot (versioned)
///   portfolio.json   the portfolio, as serialized by its own serde impl
///   brain/           the memory store's own checkpoint
/// ```
///
/// Everything is first written into a hidden sibling directory and renamed
/// into place once complete, so a crash mid-save never leaves a half-written
/// checkpoint at `location`. With `force`, the previous checkpoint is moved
/// aside and only deleted once the replacement has been renamed into place;
/// if that rename fails the previous checkpoint is moved back.
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, warn};

use crate::access::{AccessCounters, AccessEntry};
use crate::agent::DecisionLoop;
use crate::config::AgentConfig;
use crate::error::{ReflectError, ReflectResult};
use crate::events::{AgentEvent, EventSink, TracingSink};
use crate::memory::{MemoryCheckpoint, MemoryStore};
use crate::portfolio::Portfolio;
use crate::reasoning::ReasoningCollaborator;
use crate::reflection::{ReflectionLog, ReflectionRecord};

/// Current state snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

pub const STATE_FILE: &str = "state.json";
pub const PORTFOLIO_FILE: &str = "portfolio.json";
pub const BRAIN_DIR: &str = "brain";

/// Decision loop state, excluding memory and portfolio internals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub config: AgentConfig,
    pub steps: u64,
    /// Full append-only log, oldest first
    pub reflections: Vec<ReflectionRecord>,
    pub access_counters: Vec<AccessEntry>,
}

impl AgentSnapshot {
    /// Read and version-check `state.json` from a checkpoint directory.
    pub async fn read(location: &Path) -> ReflectResult<Self> {
        let path = location.join(STATE_FILE);
        let bytes = fs::read(&path).await.map_err(|e| {
            ReflectError::Storage(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let snapshot: AgentSnapshot = serde_json::from_slice(&bytes)?;

        if snapshot.version != SNAPSHOT_VERSION {
            return Err(ReflectError::Storage(format!(
                "Incompatible snapshot version: {} (expected {})",
                snapshot.version, SNAPSHOT_VERSION
            )));
        }
        Ok(snapshot)
    }

    pub fn reflection_log(&self) -> ReflectionLog {
        ReflectionLog::from_entries(self.reflections.clone())
    }

    pub fn access_counters(&self) -> AccessCounters {
        AccessCounters::from_entries(self.access_counters.clone())
    }
}

/// Hidden, uniquely named sibling of `location`.
fn hidden_sibling(location: &Path, tag: &str) -> ReflectResult<PathBuf> {
    let name = location.file_name().ok_or_else(|| {
        ReflectError::config(format!(
            "Checkpoint location '{}' has no directory name",
            location.display()
        ))
    })?;
    let sibling = format!(".{}.{}-{}", name.to_string_lossy(), tag, uuid::Uuid::new_v4());
    Ok(location.with_file_name(sibling))
}

/// Directory a checkpoint is written into before it is moved into place.
fn staging_path(location: &Path) -> ReflectResult<PathBuf> {
    hidden_sibling(location, "tmp")
}

/// Where a replaced checkpoint waits until its successor is in place.
fn backup_path(location: &Path) -> ReflectResult<PathBuf> {
    hidden_sibling(location, "old")
}

/// Move `staging` to `location`, keeping any existing checkpoint recoverable
/// until the new one is in place.
async fn swap_into_place(staging: &Path, location: &Path) -> ReflectResult<()> {
    if !exists(location).await {
        fs::rename(staging, location).await?;
        return Ok(());
    }

    let backup = backup_path(location)?;
    debug!(path = %location.display(), "Replacing existing checkpoint");
    fs::rename(location, &backup).await?;

    if let Err(e) = fs::rename(staging, location).await {
        if let Err(restore) = fs::rename(&backup, location).await {
            warn!(
                path = %backup.display(),
                error = %restore,
                "Failed to restore previous checkpoint"
            );
        }
        return Err(e.into());
    }

    if let Err(e) = fs::remove_dir_all(&backup).await {
        warn!(path = %backup.display(), error = %e, "Failed to remove replaced checkpoint");
    }
    Ok(())
}

async fn exists(path: &Path) -> bool {
    fs::metadata(path).await.is_ok()
}

impl<M, P, R> DecisionLoop<M, P, R>
where
    M: MemoryStore + MemoryCheckpoint,
    P: Portfolio + Serialize + DeserializeOwned,
    R: ReasoningCollaborator,
{
    /// Capture the current state.
    pub fn snapshot(&self) -> AgentSnapshot {
        AgentSnapshot {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            config: self.config.clone(),
            steps: self.steps,
            reflections: self.reflections.entries().to_vec(),
            access_counters: self.access.entries(),
        }
    }

    /// Save a checkpoint to `location`.
    ///
    /// Fails with `CheckpointExists`, leaving the existing directory
    /// untouched, if `location` exists and `force` is not set.
    pub async fn save_checkpoint(&self, location: &Path, force: bool) -> ReflectResult<()> {
        if exists(location).await && !force {
            return Err(ReflectError::CheckpointExists {
                path: location.to_path_buf(),
            });
        }

        if let Some(parent) = location.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let staging = staging_path(location)?;

        if let Err(e) = self.write_checkpoint(&staging).await {
            if let Err(cleanup) = fs::remove_dir_all(&staging).await {
                warn!(
                    path = %staging.display(),
                    error = %cleanup,
                    "Failed to clean up staging directory"
                );
            }
            return Err(e);
        }

        if let Err(e) = swap_into_place(&staging, location).await {
            if let Err(cleanup) = fs::remove_dir_all(&staging).await {
                warn!(
                    path = %staging.display(),
                    error = %cleanup,
                    "Failed to clean up staging directory"
                );
            }
            return Err(e);
        }

        self.emit(AgentEvent::CheckpointSaved {
            path: location.to_path_buf(),
        });
        Ok(())
    }

    async fn write_checkpoint(&self, dir: &Path) -> ReflectResult<()> {
        fs::create_dir_all(dir).await?;

        let state = serde_json::to_vec_pretty(&self.snapshot())?;
        fs::write(dir.join(STATE_FILE), state).await?;

        let portfolio = serde_json::to_vec_pretty(&self.portfolio)?;
        fs::write(dir.join(PORTFOLIO_FILE), portfolio).await?;

        self.memory.save_checkpoint(&dir.join(BRAIN_DIR), false).await
    }

    /// Restore a loop from `location`, logging through [`TracingSink`].
    pub async fn load_checkpoint(location: &Path, reasoner: R) -> ReflectResult<Self> {
        Self::load_checkpoint_with_sink(location, reasoner, Arc::new(TracingSink)).await
    }

    /// Restore a loop from `location` with an explicit event sink.
    ///
    /// The reasoning collaborator is not part of a checkpoint and must be
    /// supplied again.
    pub async fn load_checkpoint_with_sink(
        location: &Path,
        reasoner: R,
        sink: Arc<dyn EventSink>,
    ) -> ReflectResult<Self> {
        let snapshot = AgentSnapshot::read(location).await?;

        let path = location.join(PORTFOLIO_FILE);
        let bytes = fs::read(&path).await.map_err(|e| {
            ReflectError::Storage(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let portfolio: P = serde_json::from_slice(&bytes)?;

        let memory = M::load_checkpoint(&location.join(BRAIN_DIR)).await?;

        let mut agent = DecisionLoop::new(snapshot.config, Arc::new(memory), portfolio, reasoner)?
            .with_sink(sink);
        agent.reflections = ReflectionLog::from_entries(snapshot.reflections);
        agent.access = AccessCounters::from_entries(snapshot.access_counters);
        agent.steps = snapshot.steps;

        agent.emit(AgentEvent::CheckpointRestored {
            path: location.to_path_buf(),
        });
        Ok(agent)
    }
}

/// Structured observability for the decision loop.
///
/// The loop never logs through a global: it is handed an [`EventSink`] and
/// emits typed [`AgentEvent`]s at every phase boundary. The default
/// [`TracingSink`] forwards events to `tracing`; [`RecordingSink`] keeps them
/// for inspection.
///
/// # Example
///
/// ```ignore
/// let sink = Arc::new(RecordingSink::new());
/// let agent = DecisionLoop::new(config, memory, portfolio, reasoner)?
///     .with_sink(sink.clone());
/// agent.step(step, RunMode::Train).await?;
/// assert_eq!(sink.count(|e| matches!(e, AgentEvent::MaintenanceRun { .. })), 1);
/// ```
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{debug, info, warn};

use crate::types::{Decision, MemoryId, MemorySnippet, MemoryTier, RunMode, TradeAction};

/// An observable event emitted by the decision loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AgentEvent {
    /// The `done` flag was set; nothing happened.
    StepSkipped { symbol: String, date: NaiveDate },
    /// Text was written into a tier.
    MemoryIngested {
        symbol: String,
        date: NaiveDate,
        tier: MemoryTier,
        id: MemoryId,
    },
    /// Top-k hits for one tier.
    MemoryRetrieved {
        symbol: String,
        tier: MemoryTier,
        hits: Vec<MemorySnippet>,
    },
    /// Reasoning converged; decision and rationale are each optional.
    ReflectionRecorded {
        symbol: String,
        date: NaiveDate,
        mode: RunMode,
        decision: Option<Decision>,
        rationale: Option<String>,
    },
    /// Reasoning returned nothing usable; an empty marker was stored.
    ReflectionUnconverged {
        symbol: String,
        date: NaiveDate,
        mode: RunMode,
    },
    ActionApplied {
        symbol: String,
        date: NaiveDate,
        action: TradeAction,
    },
    /// Zero-magnitude feedback arrived and was dropped.
    FeedbackIgnored { symbol: String, date: NaiveDate },
    MemoryReinforced {
        symbol: String,
        date: NaiveDate,
        tier: MemoryTier,
        ids: Vec<MemoryId>,
        magnitude: f64,
    },
    MaintenanceRun { symbol: String },
    CheckpointSaved { path: PathBuf },
    CheckpointRestored { path: PathBuf },
}

impl AgentEvent {
    /// Short machine-friendly name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            AgentEvent::StepSkipped { .. } => "step_skipped",
            AgentEvent::MemoryIngested { .. } => "memory_ingested",
            AgentEvent::MemoryRetrieved { .. } => "memory_retrieved",
            AgentEvent::ReflectionRecorded { .. } => "reflection_recorded",
            AgentEvent::ReflectionUnconverged { .. } => "reflection_unconverged",
            AgentEvent::ActionApplied { .. } => "action_applied",
            AgentEvent::FeedbackIgnored { .. } => "feedback_ignored",
            AgentEvent::MemoryReinforced { .. } => "memory_reinforced",
            AgentEvent::MaintenanceRun { .. } => "maintenance_run",
            AgentEvent::CheckpointSaved { .. } => "checkpoint_saved",
            AgentEvent::CheckpointRestored { .. } => "checkpoint_restored",
        }
    }
}

/// Destination for agent events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &AgentEvent);
}

/// Forwards events to `tracing` with structured fields.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &AgentEvent) {
        match event {
            AgentEvent::StepSkipped { symbol, date } => {
                debug!(%symbol, %date, "Step skipped (done)");
            }
            AgentEvent::MemoryIngested {
                symbol,
                date,
                tier,
                id,
            } => {
                debug!(%symbol, %date, %tier, memory_id = %id, "Memory ingested");
            }
            AgentEvent::MemoryRetrieved { symbol, tier, hits } => {
                for hit in hits {
                    info!(%symbol, %tier, memory_id = %hit.id, text = %hit.text, "Top-k memory");
                }
            }
            AgentEvent::ReflectionRecorded {
                symbol,
                date,
                mode,
                decision,
                rationale,
            } => {
                info!(
                    %symbol,
                    %date,
                    %mode,
                    decision = ?decision,
                    rationale = rationale.as_deref().unwrap_or(""),
                    "Reflection recorded"
                );
            }
            AgentEvent::ReflectionUnconverged { symbol, date, mode } => {
                info!(%symbol, %date, %mode, "No reflection result or not converged");
            }
            AgentEvent::ActionApplied {
                symbol,
                date,
                action,
            } => {
                info!(
                    %symbol,
                    %date,
                    direction = action.direction.signum(),
                    quantity = action.quantity,
                    "Action applied"
                );
            }
            AgentEvent::FeedbackIgnored { symbol, date } => {
                debug!(%symbol, %date, "Zero feedback, nothing to reinforce");
            }
            AgentEvent::MemoryReinforced {
                symbol,
                date,
                tier,
                ids,
                magnitude,
            } => {
                info!(%symbol, %date, %tier, count = ids.len(), magnitude, "Memories reinforced");
            }
            AgentEvent::MaintenanceRun { symbol } => {
                debug!(%symbol, "Memory maintenance run");
            }
            AgentEvent::CheckpointSaved { path } => {
                info!(path = %path.display(), "Checkpoint saved");
            }
            AgentEvent::CheckpointRestored { path } => {
                info!(path = %path.display(), "Checkpoint restored");
            }
        }
    }
}

/// Drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: &AgentEvent) {}
}

/// Keeps every event in memory, in emission order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<AgentEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded events.
    pub fn events(&self) -> Vec<AgentEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Number of recorded events matching a predicate.
    pub fn count(&self, predicate: impl Fn(&AgentEvent) -> bool) -> usize {
        self.events().iter().filter(|e| predicate(e)).count()
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: &AgentEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event.clone()),
            Err(_) => warn!(event = event.name(), "Recording sink poisoned, event dropped"),
        }
    }
}

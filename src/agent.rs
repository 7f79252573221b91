/// The per-asset decision loop.
///
/// One [`DecisionLoop`] owns the state of one asset: its configuration, the
/// reflection log and the access counters. Each call to [`DecisionLoop::step`]
/// runs the phases in a fixed order, never overlapping:
///
/// ```text
/// ingest ─▶ retrieve ─▶ reflect ─▶ act ─▶ reinforce ─▶ maintain
///   │          │           │        │         │            │
/// memory    memory     reasoner  portfolio  portfolio   memory
/// portfolio portfolio                        memory
/// ```
///
/// The reflect phase is the only place where retrieved memory ids become
/// associated with a date. The reinforce phase of a later step reads them
/// back when the portfolio reports the outcome for that date.
///
/// # Example
///
/// ```ignore
/// use koru_reflect::prelude::*;
/// use std::sync::Arc;
///
/// let config = AgentConfig::new("tsla-agent", "TSLA", "growth investor");
/// let book = PositionBook::new("TSLA", config.look_back_window_size());
/// let mut agent = DecisionLoop::new(config, Arc::new(TieredMemory::new()), book, NullReasoner)?;
///
/// let step = MarketStep::new(date, 251.3)
///     .with_news(vec!["rate hike".into()])
///     .with_outcome(0.5);
/// agent.step(&step, RunMode::Train).await?;
/// ```
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::access::AccessCounters;
use crate::config::AgentConfig;
use crate::error::{ReflectError, ReflectResult};
use crate::events::{AgentEvent, EventSink, TracingSink};
use crate::memory::MemoryStore;
use crate::portfolio::Portfolio;
use crate::reasoning::{
    ReasoningCollaborator, ReflectionInput, ReflectionRequest, RetrievedMemories,
};
use crate::reflection::{ReflectionLog, ReflectionRecord};
use crate::types::{Direction, MarketStep, MemoryId, MemoryTier, RunMode, TradeAction};

/// Lookback of the momentum signal handed to Test-mode reflections.
pub const MOMENTUM_WINDOW: usize = 2;

/// Orchestrates one asset's steps against its collaborators.
pub struct DecisionLoop<M, P, R> {
    pub(crate) config: AgentConfig,
    pub(crate) memory: Arc<M>,
    pub(crate) portfolio: P,
    pub(crate) reasoner: R,
    pub(crate) sink: Arc<dyn EventSink>,
    pub(crate) reflections: ReflectionLog,
    pub(crate) access: AccessCounters,
    /// Processed (non-skipped) steps
    pub(crate) steps: u64,
}

impl<M, P, R> std::fmt::Debug for DecisionLoop<M, P, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionLoop")
            .field("agent", &self.config.agent_name())
            .field("symbol", &self.config.symbol())
            .field("steps", &self.steps)
            .field("reflections", &self.reflections.len())
            .finish()
    }
}

impl<M, P, R> DecisionLoop<M, P, R>
where
    M: MemoryStore,
    P: Portfolio,
    R: ReasoningCollaborator,
{
    /// Build a loop. Fails if the configuration does not validate.
    pub fn new(
        config: AgentConfig,
        memory: Arc<M>,
        portfolio: P,
        reasoner: R,
    ) -> ReflectResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            memory,
            portfolio,
            reasoner,
            sink: Arc::new(TracingSink),
            reflections: ReflectionLog::new(),
            access: AccessCounters::new(),
            steps: 0,
        })
    }

    /// Replace the event sink (defaults to [`TracingSink`]).
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn memory(&self) -> &Arc<M> {
        &self.memory
    }

    pub fn portfolio(&self) -> &P {
        &self.portfolio
    }

    pub fn reasoner(&self) -> &R {
        &self.reasoner
    }

    pub fn reflections(&self) -> &ReflectionLog {
        &self.reflections
    }

    pub fn access_counters(&self) -> &AccessCounters {
        &self.access
    }

    /// Number of steps processed so far (skipped steps excluded).
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Run one time step.
    ///
    /// Returns the action applied to the portfolio, or `None` when the step
    /// carried the `done` flag and nothing happened.
    ///
    /// # Errors
    ///
    /// - `Config` if a Train step has no realized outcome (raised before any
    ///   collaborator is touched)
    /// - `MissingReflection` if delayed feedback names a date this loop never
    ///   reflected on
    /// - any error surfaced by the memory store or portfolio
    pub async fn step(
        &mut self,
        step: &MarketStep,
        mode: RunMode,
    ) -> ReflectResult<Option<TradeAction>> {
        if step.done {
            self.emit(AgentEvent::StepSkipped {
                symbol: self.symbol(),
                date: step.date,
            });
            return Ok(None);
        }

        let input = self.reflection_input(step, mode)?;

        self.ingest(step)?;
        let memories = self.retrieve()?;
        let input = match input {
            ReflectionInput::Test { .. } => ReflectionInput::Test {
                momentum: self.portfolio.momentum(MOMENTUM_WINDOW),
            },
            train => train,
        };
        self.reflect(step, memories, input).await?;
        let action = self.act(step, input)?;
        self.reinforce()?;
        self.maintain()?;

        self.steps += 1;
        Ok(Some(action))
    }

    /// Validate the mode-specific input before any side effect.
    fn reflection_input(&self, step: &MarketStep, mode: RunMode) -> ReflectResult<ReflectionInput> {
        if !step.price.is_finite() {
            return Err(ReflectError::config(format!(
                "Non-finite price {} on {} for {}",
                step.price,
                step.date,
                self.config.symbol()
            )));
        }
        match mode {
            RunMode::Train => {
                let realized_outcome = step.realized_outcome.ok_or_else(|| {
                    ReflectError::config(format!(
                        "Train step on {} for {} has no realized outcome",
                        step.date,
                        self.config.symbol()
                    ))
                })?;
                if !realized_outcome.is_finite() {
                    return Err(ReflectError::config(format!(
                        "Non-finite realized outcome on {}",
                        step.date
                    )));
                }
                Ok(ReflectionInput::Train { realized_outcome })
            }
            RunMode::Test => Ok(ReflectionInput::Test { momentum: None }),
        }
    }

    /// Route payloads to tiers by kind, then forward the price.
    fn ingest(&mut self, step: &MarketStep) -> ReflectResult<()> {
        let symbol = self.symbol();

        let routed = step
            .periodic_filing
            .iter()
            .map(|text| (MemoryTier::Mid, text))
            .chain(step.structural_filing.iter().map(|text| (MemoryTier::Long, text)))
            .chain(step.news.iter().map(|text| (MemoryTier::Short, text)))
            .filter(|(_, text)| !text.is_empty());

        for (tier, text) in routed {
            let id = self.memory.add(tier, &symbol, step.date, text)?;
            self.emit(AgentEvent::MemoryIngested {
                symbol: symbol.clone(),
                date: step.date,
                tier,
                id,
            });
        }

        self.portfolio.update_market(&symbol, step.date, step.price)
    }

    /// Top-k per tier against the persona. Read only.
    fn retrieve(&self) -> ReflectResult<RetrievedMemories> {
        let symbol = self.symbol();
        let mut memories = RetrievedMemories::default();

        for tier in MemoryTier::ALL {
            let hits = self.memory.query(
                tier,
                &symbol,
                self.config.character_string(),
                self.config.top_k(),
            )?;
            self.emit(AgentEvent::MemoryRetrieved {
                symbol: symbol.clone(),
                tier,
                hits: hits.clone(),
            });
            *memories.tier_mut(tier) = hits;
        }
        Ok(memories)
    }

    async fn reflect(
        &mut self,
        step: &MarketStep,
        memories: RetrievedMemories,
        input: ReflectionInput,
    ) -> ReflectResult<()> {
        let request = ReflectionRequest {
            date: step.date,
            symbol: self.symbol(),
            memories,
            input,
        };
        let output = self.reasoner.reflect(&request).await;

        if let Some(rationale) = output.as_ref().and_then(|o| o.rationale.as_deref()) {
            let id = self
                .memory
                .add(MemoryTier::Reflection, &request.symbol, step.date, rationale)?;
            self.emit(AgentEvent::MemoryIngested {
                symbol: request.symbol.clone(),
                date: step.date,
                tier: MemoryTier::Reflection,
                id,
            });
        }

        let record =
            ReflectionRecord::new(step.date, input.mode(), &request.memories, output.as_ref());
        if record.converged {
            self.emit(AgentEvent::ReflectionRecorded {
                symbol: request.symbol.clone(),
                date: step.date,
                mode: record.mode,
                decision: record.decision,
                rationale: record.rationale.clone(),
            });
        } else {
            self.emit(AgentEvent::ReflectionUnconverged {
                symbol: request.symbol.clone(),
                date: step.date,
                mode: record.mode,
            });
        }
        self.reflections.record(record);
        Ok(())
    }

    /// Train follows the realized outcome; Test follows today's decision.
    fn act(&mut self, step: &MarketStep, input: ReflectionInput) -> ReflectResult<TradeAction> {
        let direction = match input {
            ReflectionInput::Train { realized_outcome } => {
                Direction::from_outcome(realized_outcome)
            }
            ReflectionInput::Test { .. } => Direction::from_decision(
                self.reflections
                    .get(step.date)
                    .and_then(|record| record.decision),
            ),
        };
        let action = TradeAction::unit(direction);

        self.portfolio.apply_action(action)?;
        self.emit(AgentEvent::ActionApplied {
            symbol: self.symbol(),
            date: step.date,
            action,
        });
        Ok(action)
    }

    /// Credit the memories consulted on the fed-back date.
    fn reinforce(&mut self) -> ReflectResult<()> {
        let Some(feedback) = self.portfolio.pending_feedback() else {
            return Ok(());
        };
        let symbol = self.symbol();

        if feedback.magnitude == 0.0 {
            self.emit(AgentEvent::FeedbackIgnored {
                symbol,
                date: feedback.date,
            });
            return Ok(());
        }

        let record = self.reflections.require(feedback.date)?;
        let calls: Vec<(MemoryTier, BTreeSet<MemoryId>)> = MemoryTier::ALL
            .into_iter()
            .map(|tier| (tier, record.consulted_ids(tier)))
            .filter(|(_, ids)| !ids.is_empty())
            .collect();

        for (tier, ids) in calls {
            self.memory.reinforce(tier, &symbol, &ids, feedback.magnitude)?;
            self.access.record(tier, &ids, feedback.magnitude);
            self.emit(AgentEvent::MemoryReinforced {
                symbol: symbol.clone(),
                date: feedback.date,
                tier,
                ids: ids.into_iter().collect(),
                magnitude: feedback.magnitude,
            });
        }
        Ok(())
    }

    fn maintain(&self) -> ReflectResult<()> {
        let symbol = self.symbol();
        self.memory.maintain(&symbol)?;
        self.emit(AgentEvent::MaintenanceRun { symbol });
        Ok(())
    }

    fn symbol(&self) -> String {
        self.config.symbol().to_string()
    }

    pub(crate) fn emit(&self, event: AgentEvent) {
        self.sink.emit(&event);
    }
}

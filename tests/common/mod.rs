//! Call-recording collaborator doubles shared by the integration suites.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use koru_reflect::{
    AgentConfig, DecisionLoop, Feedback, MemoryId, MemorySnippet, MemoryStore, MemoryTier,
    Portfolio, ReasoningCollaborator, ReasoningOutput, RecordingSink, ReflectResult,
    ReflectionInput, ReflectionRequest, TradeAction,
};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

pub const SYMBOL: &str = "TSLA";
pub const PERSONA: &str = "A cautious growth investor watching rates and earnings";

pub fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
}

pub fn config() -> AgentConfig {
    AgentConfig::new("tsla-agent", SYMBOL, PERSONA).with_top_k(3)
}

pub fn ids(list: &[&str]) -> BTreeSet<MemoryId> {
    list.iter().map(|s| MemoryId::from(*s)).collect()
}

/// Build a loop over the given doubles with a recording sink.
pub fn agent<M, P, R>(
    memory: Arc<M>,
    portfolio: P,
    reasoner: R,
) -> (DecisionLoop<M, P, R>, Arc<RecordingSink>)
where
    M: MemoryStore,
    P: Portfolio,
    R: ReasoningCollaborator,
{
    let sink = Arc::new(RecordingSink::new());
    let agent = DecisionLoop::new(config(), memory, portfolio, reasoner)
        .unwrap()
        .with_sink(sink.clone());
    (agent, sink)
}

// ============================================================================
// Memory
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum MemoryCall {
    Add {
        tier: MemoryTier,
        symbol: String,
        date: NaiveDate,
        text: String,
    },
    Query {
        tier: MemoryTier,
        symbol: String,
        query: String,
        top_k: usize,
    },
    Reinforce {
        tier: MemoryTier,
        symbol: String,
        ids: BTreeSet<MemoryId>,
        magnitude: f64,
    },
    Maintain {
        symbol: String,
    },
}

impl MemoryCall {
    pub fn is_mutation(&self) -> bool {
        !matches!(self, MemoryCall::Query { .. })
    }
}

/// Returns canned hits per tier and records every call.
#[derive(Default)]
pub struct RecordingMemory {
    calls: Mutex<Vec<MemoryCall>>,
    hits: Mutex<HashMap<MemoryTier, Vec<MemorySnippet>>>,
    next_id: AtomicU64,
}

impl RecordingMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canned query result for one tier, text derived from the id.
    pub fn with_hits(self, tier: MemoryTier, ids: &[&str]) -> Self {
        self.set_hits(tier, ids);
        self
    }

    pub fn set_hits(&self, tier: MemoryTier, ids: &[&str]) {
        let snippets = ids
            .iter()
            .map(|id| MemorySnippet::new(*id, format!("text of {}", id)))
            .collect();
        self.hits.lock().unwrap().insert(tier, snippets);
    }

    pub fn clear_hits(&self) {
        self.hits.lock().unwrap().clear();
    }

    pub fn calls(&self) -> Vec<MemoryCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn mutation_count(&self) -> usize {
        self.calls().iter().filter(|c| c.is_mutation()).count()
    }

    pub fn adds(&self) -> Vec<(MemoryTier, String)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                MemoryCall::Add { tier, text, .. } => Some((tier, text)),
                _ => None,
            })
            .collect()
    }

    pub fn reinforcements(&self) -> Vec<(MemoryTier, BTreeSet<MemoryId>, f64)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                MemoryCall::Reinforce {
                    tier,
                    ids,
                    magnitude,
                    ..
                } => Some((tier, ids, magnitude)),
                _ => None,
            })
            .collect()
    }

    pub fn maintain_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, MemoryCall::Maintain { .. }))
            .count()
    }

    fn push(&self, call: MemoryCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl MemoryStore for RecordingMemory {
    fn add(
        &self,
        tier: MemoryTier,
        symbol: &str,
        date: NaiveDate,
        text: &str,
    ) -> ReflectResult<MemoryId> {
        self.push(MemoryCall::Add {
            tier,
            symbol: symbol.to_string(),
            date,
            text: text.to_string(),
        });
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryId::new(format!("added-{}", n)))
    }

    fn query(
        &self,
        tier: MemoryTier,
        symbol: &str,
        query_text: &str,
        top_k: usize,
    ) -> ReflectResult<Vec<MemorySnippet>> {
        self.push(MemoryCall::Query {
            tier,
            symbol: symbol.to_string(),
            query: query_text.to_string(),
            top_k,
        });
        let hits = self.hits.lock().unwrap();
        Ok(hits
            .get(&tier)
            .map(|h| h.iter().take(top_k).cloned().collect())
            .unwrap_or_default())
    }

    fn reinforce(
        &self,
        tier: MemoryTier,
        symbol: &str,
        ids: &BTreeSet<MemoryId>,
        magnitude: f64,
    ) -> ReflectResult<()> {
        self.push(MemoryCall::Reinforce {
            tier,
            symbol: symbol.to_string(),
            ids: ids.clone(),
            magnitude,
        });
        Ok(())
    }

    fn maintain(&self, symbol: &str) -> ReflectResult<()> {
        self.push(MemoryCall::Maintain {
            symbol: symbol.to_string(),
        });
        Ok(())
    }
}

// ============================================================================
// Portfolio
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum PortfolioCall {
    UpdateMarket {
        symbol: String,
        date: NaiveDate,
        price: f64,
    },
    ApplyAction(TradeAction),
    PendingFeedback,
    Momentum(usize),
}

#[derive(Default)]
struct PortfolioState {
    calls: Vec<PortfolioCall>,
    feedback: VecDeque<Feedback>,
    momentum: Option<f64>,
}

/// Shared handle: clones observe the same state, so a test can keep one
/// while the loop owns another.
#[derive(Clone, Default)]
pub struct RecordingPortfolio {
    state: Arc<Mutex<PortfolioState>>,
}

impl RecordingPortfolio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_momentum(self, momentum: Option<f64>) -> Self {
        self.state.lock().unwrap().momentum = momentum;
        self
    }

    /// Queue a feedback signal for the next reinforce phase.
    pub fn push_feedback(&self, date: NaiveDate, magnitude: f64) {
        self.state
            .lock()
            .unwrap()
            .feedback
            .push_back(Feedback { date, magnitude });
    }

    pub fn pending(&self) -> usize {
        self.state.lock().unwrap().feedback.len()
    }

    pub fn calls(&self) -> Vec<PortfolioCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn actions(&self) -> Vec<TradeAction> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                PortfolioCall::ApplyAction(action) => Some(action),
                _ => None,
            })
            .collect()
    }

    pub fn last_direction(&self) -> Option<i64> {
        self.actions().last().map(|a| a.direction.signum())
    }

    fn push(&self, call: PortfolioCall) {
        self.state.lock().unwrap().calls.push(call);
    }
}

impl Portfolio for RecordingPortfolio {
    fn update_market(&mut self, symbol: &str, date: NaiveDate, price: f64) -> ReflectResult<()> {
        self.push(PortfolioCall::UpdateMarket {
            symbol: symbol.to_string(),
            date,
            price,
        });
        Ok(())
    }

    fn apply_action(&mut self, action: TradeAction) -> ReflectResult<()> {
        self.push(PortfolioCall::ApplyAction(action));
        Ok(())
    }

    fn pending_feedback(&mut self) -> Option<Feedback> {
        self.push(PortfolioCall::PendingFeedback);
        self.state.lock().unwrap().feedback.pop_front()
    }

    fn momentum(&self, window: usize) -> Option<f64> {
        self.push(PortfolioCall::Momentum(window));
        self.state.lock().unwrap().momentum
    }
}

// ============================================================================
// Reasoning
// ============================================================================

/// Always answers the same way and records every request.
#[derive(Default)]
pub struct ScriptedReasoner {
    output: Option<ReasoningOutput>,
    requests: Mutex<Vec<ReflectionRequest>>,
}

impl ScriptedReasoner {
    /// Never converges.
    pub fn silent() -> Self {
        Self::default()
    }

    /// Raw label and rationale, exactly as an endpoint would send them.
    pub fn answering(label: Option<&str>, rationale: Option<&str>) -> Self {
        Self {
            output: Some(ReasoningOutput {
                decision_label: label.map(str::to_string),
                rationale: rationale.map(str::to_string),
            }),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ReflectionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReasoningCollaborator for ScriptedReasoner {
    async fn reflect(&self, request: &ReflectionRequest) -> Option<ReasoningOutput> {
        self.requests.lock().unwrap().push(request.clone());
        self.output.clone()
    }
}

/// Deterministic reasoner that follows momentum in Test mode and the
/// outcome in Train mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct MomentumReasoner;

#[async_trait]
impl ReasoningCollaborator for MomentumReasoner {
    async fn reflect(&self, request: &ReflectionRequest) -> Option<ReasoningOutput> {
        let signal = match request.input {
            ReflectionInput::Train { realized_outcome } => Some(realized_outcome),
            ReflectionInput::Test { momentum } => momentum,
        }?;
        let label = if signal > 0.0 {
            "buy"
        } else if signal < 0.0 {
            "sell"
        } else {
            "hold"
        };
        Some(ReasoningOutput {
            decision_label: Some(label.to_string()),
            rationale: Some(format!("{} signal {} on {}", label, signal, request.date)),
        })
    }
}

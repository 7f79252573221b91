/// The reasoning collaborator seam.
///
/// The decision loop hands the collaborator what it retrieved from each tier
/// plus a mode-specific signal, and gets back an optional decision label and
/// rationale. Prompting, the model itself and output validation all live
/// behind this trait. A collaborator that times out or cannot produce a
/// usable answer returns `None`; the loop treats that as an unconverged
/// reflection, never as an error.
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::ChatConfig;
use crate::error::ReflectResult;
use crate::types::{Decision, MemoryId, MemorySnippet, MemoryTier, RunMode};

/// Mode-specific input to a reflection.
///
/// Training sees the realized outcome and no momentum; testing sees momentum
/// (possibly absent) and never the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum ReflectionInput {
    Train { realized_outcome: f64 },
    Test { momentum: Option<f64> },
}

impl ReflectionInput {
    pub fn mode(&self) -> RunMode {
        match self {
            ReflectionInput::Train { .. } => RunMode::Train,
            ReflectionInput::Test { .. } => RunMode::Test,
        }
    }
}

/// Top-k hits per tier, in tier-local rank order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievedMemories {
    pub short: Vec<MemorySnippet>,
    pub mid: Vec<MemorySnippet>,
    pub long: Vec<MemorySnippet>,
    pub reflection: Vec<MemorySnippet>,
}

impl RetrievedMemories {
    pub fn tier(&self, tier: MemoryTier) -> &[MemorySnippet] {
        match tier {
            MemoryTier::Short => &self.short,
            MemoryTier::Mid => &self.mid,
            MemoryTier::Long => &self.long,
            MemoryTier::Reflection => &self.reflection,
        }
    }

    pub fn tier_mut(&mut self, tier: MemoryTier) -> &mut Vec<MemorySnippet> {
        match tier {
            MemoryTier::Short => &mut self.short,
            MemoryTier::Mid => &mut self.mid,
            MemoryTier::Long => &mut self.long,
            MemoryTier::Reflection => &mut self.reflection,
        }
    }

    /// Ids of one tier, in rank order.
    pub fn ids(&self, tier: MemoryTier) -> Vec<MemoryId> {
        self.tier(tier).iter().map(|s| s.id.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        MemoryTier::ALL.iter().all(|t| self.tier(*t).is_empty())
    }
}

/// Everything the collaborator sees for one asset on one date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReflectionRequest {
    pub date: NaiveDate,
    pub symbol: String,
    pub memories: RetrievedMemories,
    pub input: ReflectionInput,
}

impl ReflectionRequest {
    pub fn mode(&self) -> RunMode {
        self.input.mode()
    }
}

/// Structured answer from the collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReasoningOutput {
    /// Raw decision label; unrecognized labels count as no decision.
    #[serde(
        rename = "investment_decision",
        alias = "decision",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub decision_label: Option<String>,
    #[serde(
        rename = "summary_reason",
        alias = "rationale",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub rationale: Option<String>,
}

impl ReasoningOutput {
    pub fn new(decision: Option<Decision>, rationale: Option<&str>) -> Self {
        Self {
            decision_label: decision.map(|d| d.to_string()),
            rationale: rationale.map(str::to_string),
        }
    }

    /// Parsed decision label.
    pub fn decision(&self) -> Option<Decision> {
        self.decision_label.as_deref().and_then(Decision::parse)
    }
}

/// The external reasoning step.
#[async_trait]
pub trait ReasoningCollaborator: Send + Sync {
    /// Reflect on retrieved memories. `None` means unconverged.
    async fn reflect(&self, request: &ReflectionRequest) -> Option<ReasoningOutput>;
}

#[async_trait]
impl<R: ReasoningCollaborator + ?Sized> ReasoningCollaborator for Box<R> {
    async fn reflect(&self, request: &ReflectionRequest) -> Option<ReasoningOutput> {
        (**self).reflect(request).await
    }
}

/// Never converges. Useful for offline replays and label generation.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReasoner;

#[async_trait]
impl ReasoningCollaborator for NullReasoner {
    async fn reflect(&self, _request: &ReflectionRequest) -> Option<ReasoningOutput> {
        None
    }
}

/// Pick a collaborator for a chat configuration.
///
/// A configured URL selects [`http::HttpReasoner`] (when built with the `http`
/// feature); otherwise reflections run against [`NullReasoner`].
pub fn reasoner_from_config(chat: &ChatConfig) -> ReflectResult<Box<dyn ReasoningCollaborator>> {
    if let Some(reasoner) = http_reasoner(chat)? {
        return Ok(reasoner);
    }

    tracing::warn!(
        endpoint = %chat.endpoint,
        "No reasoning URL configured; reflections will not converge"
    );
    Ok(Box::new(NullReasoner))
}

#[cfg(feature = "http")]
fn http_reasoner(chat: &ChatConfig) -> ReflectResult<Option<Box<dyn ReasoningCollaborator>>> {
    match chat.url {
        Some(_) => Ok(Some(Box::new(http::HttpReasoner::from_config(chat)?))),
        None => Ok(None),
    }
}

#[cfg(not(feature = "http"))]
fn http_reasoner(_chat: &ChatConfig) -> ReflectResult<Option<Box<dyn ReasoningCollaborator>>> {
    Ok(None)
}

#[cfg(feature = "http")]
pub mod http {
    //! JSON-over-HTTP reasoning endpoint.

    use super::*;
    use crate::error::ReflectError;
    use serde_json::json;
    use std::time::Duration;
    use tracing::warn;

    /// POSTs the reflection request to a configured endpoint.
    ///
    /// The body is `{"model", "temperature", "request"}`; the response must be
    /// a [`ReasoningOutput`] JSON object. Transport errors, timeouts, non-2xx
    /// statuses and unparsable bodies all yield `None`.
    pub struct HttpReasoner {
        url: String,
        model: String,
        temperature: f64,
        client: reqwest::Client,
    }

    impl HttpReasoner {
        pub fn from_config(chat: &ChatConfig) -> ReflectResult<Self> {
            let url = chat
                .url
                .clone()
                .ok_or_else(|| ReflectError::config("chat.url is required for the HTTP reasoner"))?;
            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(chat.timeout_secs))
                .build()
                .map_err(|e| ReflectError::config(format!("Failed to build HTTP client: {}", e)))?;
            Ok(Self {
                url,
                model: chat.model.clone(),
                temperature: chat.temperature,
                client,
            })
        }
    }

    #[async_trait]
    impl ReasoningCollaborator for HttpReasoner {
        async fn reflect(&self, request: &ReflectionRequest) -> Option<ReasoningOutput> {
            let body = json!({
                "model": self.model,
                "temperature": self.temperature,
                "request": request,
            });

            let response = match self.client.post(&self.url).json(&body).send().await {
                Ok(response) => response,
                Err(e) => {
                    warn!(url = %self.url, error = %e, "Reasoning request failed");
                    return None;
                }
            };
            let response = match response.error_for_status() {
                Ok(response) => response,
                Err(e) => {
                    warn!(url = %self.url, error = %e, "Reasoning endpoint returned an error");
                    return None;
                }
            };
            match response.json::<ReasoningOutput>().await {
                Ok(output) => Some(output),
                Err(e) => {
                    warn!(url = %self.url, error = %e, "Unparsable reasoning response");
                    None
                }
            }
        }
    }
}

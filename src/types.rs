/// Common types used throughout koru-reflect.
///
/// These are the values that flow between the decision loop and its
/// collaborators: memory tiers and ids, retrieved snippets, trade actions,
/// feedback signals, run modes and the per-step market input.
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ReflectError;

/// One of the four independent memory partitions.
///
/// Tiers differ by intended recency and granularity, not by mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryTier {
    /// News-like items, fast decay
    Short,
    /// Periodic reports
    Mid,
    /// Foundational / structural reference documents
    Long,
    /// Rationales produced by the reasoning collaborator
    Reflection,
}

impl MemoryTier {
    /// All tiers, in retrieval order.
    pub const ALL: [MemoryTier; 4] = [
        MemoryTier::Short,
        MemoryTier::Mid,
        MemoryTier::Long,
        MemoryTier::Reflection,
    ];

    /// Next tier up for promotion, if any. Reflection never moves.
    pub fn promoted(self) -> Option<MemoryTier> {
        match self {
            MemoryTier::Short => Some(MemoryTier::Mid),
            MemoryTier::Mid => Some(MemoryTier::Long),
            MemoryTier::Long | MemoryTier::Reflection => None,
        }
    }

    /// Next tier down for demotion, if any.
    pub fn demoted(self) -> Option<MemoryTier> {
        match self {
            MemoryTier::Long => Some(MemoryTier::Mid),
            MemoryTier::Mid => Some(MemoryTier::Short),
            MemoryTier::Short | MemoryTier::Reflection => None,
        }
    }
}

impl fmt::Display for MemoryTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryTier::Short => write!(f, "short"),
            MemoryTier::Mid => write!(f, "mid"),
            MemoryTier::Long => write!(f, "long"),
            MemoryTier::Reflection => write!(f, "reflection"),
        }
    }
}

/// Opaque memory identifier, unique within its tier and asset.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryId(pub String);

impl MemoryId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MemoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MemoryId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A single query hit: the record's id and its text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemorySnippet {
    pub id: MemoryId,
    pub text: String,
}

impl MemorySnippet {
    pub fn new(id: impl Into<MemoryId>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }
}

/// Decision label produced by the reasoning collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Buy,
    Hold,
    Sell,
}

impl Decision {
    /// Lenient parse: anything unrecognized is `None`.
    pub fn parse(label: &str) -> Option<Decision> {
        match label.trim().to_ascii_lowercase().as_str() {
            "buy" => Some(Decision::Buy),
            "hold" => Some(Decision::Hold),
            "sell" => Some(Decision::Sell),
            _ => None,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Buy => write!(f, "buy"),
            Decision::Hold => write!(f, "hold"),
            Decision::Sell => write!(f, "sell"),
        }
    }
}

/// Trade direction applied to the portfolio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Flat,
    Short,
}

impl Direction {
    /// Signed representation: 1, 0 or -1.
    pub fn signum(self) -> i64 {
        match self {
            Direction::Long => 1,
            Direction::Flat => 0,
            Direction::Short => -1,
        }
    }

    /// Direction implied by the sign of a realized outcome.
    ///
    /// Strictly positive is long; zero and negative are short.
    pub fn from_outcome(outcome: f64) -> Direction {
        if outcome > 0.0 {
            Direction::Long
        } else {
            Direction::Short
        }
    }

    /// Direction implied by a decision label; absence means flat.
    pub fn from_decision(decision: Option<Decision>) -> Direction {
        match decision {
            Some(Decision::Buy) => Direction::Long,
            Some(Decision::Sell) => Direction::Short,
            Some(Decision::Hold) | None => Direction::Flat,
        }
    }
}

/// A portfolio action: direction plus unit quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeAction {
    pub direction: Direction,
    pub quantity: u32,
}

impl TradeAction {
    /// Every derived action trades a single unit.
    pub fn unit(direction: Direction) -> Self {
        Self {
            direction,
            quantity: 1,
        }
    }

    /// Signed share delta (`direction * quantity`).
    pub fn signed_quantity(&self) -> i64 {
        self.direction.signum() * i64::from(self.quantity)
    }
}

/// Delayed outcome for a past decision date.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub date: NaiveDate,
    pub magnitude: f64,
}

/// Explicit run mode. Parsing anything other than train/test fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Train,
    Test,
}

impl FromStr for RunMode {
    type Err = ReflectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "train" => Ok(RunMode::Train),
            "test" => Ok(RunMode::Test),
            _ => Err(ReflectError::InvalidRunMode {
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Train => write!(f, "train"),
            RunMode::Test => write!(f, "test"),
        }
    }
}

/// Everything the environment hands the agent for one time step.
///
/// Document payloads use `None` for "nothing arrived today"; the content of
/// a present payload is never inspected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketStep {
    pub date: NaiveDate,
    pub price: f64,
    /// Periodic (quarterly-like) report, routed to the Mid tier.
    #[serde(default)]
    pub periodic_filing: Option<String>,
    /// Foundational (annual-like) report, routed to the Long tier.
    #[serde(default)]
    pub structural_filing: Option<String>,
    /// News-like items, each routed to the Short tier.
    #[serde(default)]
    pub news: Vec<String>,
    /// Realized future outcome; known only in training data.
    #[serde(default)]
    pub realized_outcome: Option<f64>,
    #[serde(default)]
    pub done: bool,
}

impl MarketStep {
    /// A step with a date and price and nothing else.
    pub fn new(date: NaiveDate, price: f64) -> Self {
        Self {
            date,
            price,
            periodic_filing: None,
            structural_filing: None,
            news: Vec::new(),
            realized_outcome: None,
            done: false,
        }
    }

    pub fn with_news(mut self, news: Vec<String>) -> Self {
        self.news = news;
        self
    }

    pub fn with_periodic_filing(mut self, text: impl Into<String>) -> Self {
        self.periodic_filing = Some(text.into());
        self
    }

    pub fn with_structural_filing(mut self, text: impl Into<String>) -> Self {
        self.structural_filing = Some(text.into());
        self
    }

    pub fn with_outcome(mut self, outcome: f64) -> Self {
        self.realized_outcome = Some(outcome);
        self
    }

    pub fn finished(mut self) -> Self {
        self.done = true;
        self
    }
}

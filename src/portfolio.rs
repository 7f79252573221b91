/// Portfolio bookkeeping consumed by the decision loop.
///
/// The loop only needs four things from a portfolio: accept today's price,
/// apply an action, hand back delayed outcome feedback for a past date, and
/// provide a short-horizon momentum signal. [`PositionBook`] is a simple
/// single-symbol implementation of that contract.
///
/// # Feedback
///
/// Once more than `lookback` days are on the book, every recorded action
/// enqueues one feedback signal: the sign of the position-weighted price
/// change across the trailing window, attributed to the date that opened the
/// window. Signals are consumed oldest first, one per call.
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::error::{ReflectError, ReflectResult};
use crate::types::{Feedback, TradeAction};

/// Contract between the decision loop and a portfolio.
pub trait Portfolio: Send {
    /// Record the market observation for `date`.
    fn update_market(&mut self, symbol: &str, date: NaiveDate, price: f64) -> ReflectResult<()>;

    /// Record an action and recompute the running series.
    fn apply_action(&mut self, action: TradeAction) -> ReflectResult<()>;

    /// Next unconsumed feedback signal, oldest first.
    fn pending_feedback(&mut self) -> Option<Feedback>;

    /// Sign of the price change over the last `window` observations.
    fn momentum(&self, window: usize) -> Option<f64>;
}

/// Single-symbol position book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionBook {
    symbol: String,
    lookback: usize,
    dates: Vec<NaiveDate>,
    prices: Vec<f64>,
    /// Position held after each day's action
    positions: Vec<i64>,
    holding: i64,
    pending: VecDeque<Feedback>,
}

impl PositionBook {
    pub fn new(symbol: impl Into<String>, lookback: usize) -> Self {
        Self {
            symbol: symbol.into(),
            lookback: lookback.max(1),
            dates: Vec::new(),
            prices: Vec::new(),
            positions: Vec::new(),
            holding: 0,
            pending: VecDeque::new(),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Current position in units.
    pub fn holding(&self) -> i64 {
        self.holding
    }

    /// Number of days with a recorded action.
    pub fn days(&self) -> usize {
        self.positions.len()
    }

    /// Cumulative mark-to-market P&L of the recorded positions.
    pub fn realized_pnl(&self) -> f64 {
        Self::window_pnl(&self.positions, &self.prices, 0, self.positions.len())
    }

    /// Number of feedback signals not yet consumed.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// P&L of holding `positions[i]` from day `i` to day `i + 1`, for i in [from, to - 1).
    fn window_pnl(positions: &[i64], prices: &[f64], from: usize, to: usize) -> f64 {
        (from..to.saturating_sub(1))
            .filter(|&i| i + 1 < prices.len())
            .map(|i| positions[i] as f64 * (prices[i + 1] - prices[i]))
            .sum()
    }

    fn enqueue_feedback(&mut self) {
        let n = self.positions.len();
        if n <= self.lookback {
            return;
        }
        let start = n - 1 - self.lookback;
        let pnl = Self::window_pnl(&self.positions, &self.prices, start, n);
        let magnitude = if pnl > 0.0 {
            1.0
        } else if pnl < 0.0 {
            -1.0
        } else {
            0.0
        };
        self.pending.push_back(Feedback {
            date: self.dates[start],
            magnitude,
        });
    }
}

impl Portfolio for PositionBook {
    fn update_market(&mut self, symbol: &str, date: NaiveDate, price: f64) -> ReflectResult<()> {
        if symbol != self.symbol {
            return Err(ReflectError::config(format!(
                "Portfolio tracks '{}', got market data for '{}'",
                self.symbol, symbol
            )));
        }
        if !price.is_finite() {
            return Err(ReflectError::config(format!(
                "Non-finite price {} on {}",
                price, date
            )));
        }
        self.dates.push(date);
        self.prices.push(price);
        Ok(())
    }

    fn apply_action(&mut self, action: TradeAction) -> ReflectResult<()> {
        if self.positions.len() >= self.prices.len() {
            return Err(ReflectError::Storage(
                "Action recorded before the day's market update".to_string(),
            ));
        }
        self.holding += action.signed_quantity();
        self.positions.push(self.holding);
        self.enqueue_feedback();
        Ok(())
    }

    fn pending_feedback(&mut self) -> Option<Feedback> {
        self.pending.pop_front()
    }

    fn momentum(&self, window: usize) -> Option<f64> {
        if window < 2 || self.prices.len() < window {
            return None;
        }
        let last = self.prices[self.prices.len() - 1];
        let first = self.prices[self.prices.len() - window];
        let delta = last - first;
        Some(if delta > 0.0 {
            1.0
        } else if delta < 0.0 {
            -1.0
        } else {
            0.0
        })
    }
}

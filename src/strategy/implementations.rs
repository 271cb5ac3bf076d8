// src/strategy/implementations.rs

use std::collections::VecDeque;

use serde::Deserialize;

use crate::error::{ConfigError, Result};
use crate::strategy::traits::{InventorySignals, OrderPolicy};

// =========================================================================
// 1. Base Stock Policy (Order-Up-To, reviewed every period)
// =========================================================================

/// Keeps the inventory position at a fixed base-stock level `S`.
///
/// Formula: Order = max(0, S - InventoryPosition)
#[derive(Debug, Clone)]
pub struct BaseStockPolicy {
    base_stock_level: i64,
}

impl BaseStockPolicy {
    pub fn new(base_stock_level: i64) -> Self {
        Self { base_stock_level }
    }
}

impl OrderPolicy for BaseStockPolicy {
    fn order_qty(&mut self, signals: &InventorySignals) -> i64 {
        (self.base_stock_level - signals.inventory_position()).max(0)
    }
}

// =========================================================================
// 2. (s, S) Policy
// =========================================================================

/// Reviewed every period, but only orders once the position drops to the
/// reorder point `s`, and then orders all the way up to `S`.
#[derive(Debug, Clone)]
pub struct SsPolicy {
    reorder_point: i64,
    order_up_to: i64,
}

impl SsPolicy {
    /// Returns `None` when `S < s`, which would order a negative amount.
    pub fn new(reorder_point: i64, order_up_to: i64) -> Option<Self> {
        if order_up_to < reorder_point {
            return None;
        }
        Some(Self {
            reorder_point,
            order_up_to,
        })
    }
}

impl OrderPolicy for SsPolicy {
    fn order_qty(&mut self, signals: &InventorySignals) -> i64 {
        let ip = signals.inventory_position();
        if ip <= self.reorder_point {
            (self.order_up_to - ip).max(0)
        } else {
            0
        }
    }
}

// =========================================================================
// 3. Periodic Review Order-Up-To Policy
// =========================================================================

/// Reviews only when `(t - phase_offset) mod R == 0`, then orders up to `S`.
/// Every other period returns exactly 0.
#[derive(Debug, Clone)]
pub struct PeriodicReviewPolicy {
    review_period: u32,
    order_up_to: i64,
    phase_offset: u32,
}

impl PeriodicReviewPolicy {
    /// Returns `None` for a zero review period.
    pub fn new(review_period: u32, order_up_to: i64, phase_offset: u32) -> Option<Self> {
        if review_period == 0 {
            return None;
        }
        Some(Self {
            review_period,
            order_up_to,
            phase_offset,
        })
    }

    pub fn is_review_period(&self, t: u32) -> bool {
        (t as i64 - self.phase_offset as i64).rem_euclid(self.review_period as i64) == 0
    }
}

impl OrderPolicy for PeriodicReviewPolicy {
    fn order_qty(&mut self, signals: &InventorySignals) -> i64 {
        if !self.is_review_period(signals.period) {
            return 0;
        }
        (self.order_up_to - signals.inventory_position()).max(0)
    }
}

// =========================================================================
// 4. K-out-of-M Cycle Policy
// =========================================================================
// Reviews on a fixed set of offsets inside a repeating cycle of `m`
// periods (e.g. 2 delivery days out of every 7).

#[derive(Debug, Clone)]
pub struct KmCyclePolicy {
    cycle_length: u32,
    review_offsets: Vec<u32>,
    order_up_to: i64,
}

impl KmCyclePolicy {
    /// Without explicit offsets the first `k` periods of each cycle are
    /// review periods. Returns `None` if `m == 0`, `k > m` or an offset
    /// falls outside the cycle.
    pub fn new(k: u32, m: u32, order_up_to: i64, review_offsets: Option<Vec<u32>>) -> Option<Self> {
        if m == 0 || k > m {
            return None;
        }
        let mut offsets = review_offsets.unwrap_or_else(|| (0..k).collect());
        if offsets.iter().any(|&o| o >= m) {
            return None;
        }
        offsets.sort_unstable();
        offsets.dedup();
        Some(Self {
            cycle_length: m,
            review_offsets: offsets,
            order_up_to,
        })
    }

    pub fn is_review_period(&self, t: u32) -> bool {
        self.review_offsets.binary_search(&(t % self.cycle_length)).is_ok()
    }
}

impl OrderPolicy for KmCyclePolicy {
    fn order_qty(&mut self, signals: &InventorySignals) -> i64 {
        if !self.is_review_period(signals.period) {
            return 0;
        }
        (self.order_up_to - signals.inventory_position()).max(0)
    }
}

// =========================================================================
// 5. Adaptive (Forecast-Based) Policy
// =========================================================================
// Forecasts demand as the mean of a trailing window and covers a number of
// periods of that forecast plus a safety buffer.

#[derive(Debug, Clone)]
pub struct AdaptivePolicy {
    cover_horizon: f64,
    buffer_ratio: f64,
    window: usize,
    history: VecDeque<i64>, // Most recent observation at the back
}

impl AdaptivePolicy {
    pub const DEFAULT_WINDOW: usize = 7;

    pub fn new(cover_horizon: f64, buffer_ratio: f64, window: usize) -> Self {
        let window = window.max(1);
        Self {
            cover_horizon,
            buffer_ratio,
            window,
            history: VecDeque::with_capacity(window),
        }
    }

    /// Mean of the trailing window, 0 with no history.
    pub fn forecast(&self) -> f64 {
        if self.history.is_empty() {
            return 0.0;
        }
        self.history.iter().sum::<i64>() as f64 / self.history.len() as f64
    }
}

impl OrderPolicy for AdaptivePolicy {
    fn order_qty(&mut self, signals: &InventorySignals) -> i64 {
        let target = self.cover_horizon * self.forecast() * (1.0 + self.buffer_ratio);
        let order = (target - signals.inventory_position() as f64).round();
        if order < 0.0 {
            0
        } else {
            order as i64
        }
    }

    fn observe_demand(&mut self, qty: i64) {
        if self.history.len() == self.window {
            self.history.pop_front();
        }
        self.history.push_back(qty.max(0));
    }
}

// =========================================================================
// 6. Construction from a network description
// =========================================================================

/// Policy description as found in a network description. Resolved once,
/// when the network is built, into a boxed [`OrderPolicy`].
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PolicySpec {
    BaseStock {
        base_stock_level: i64,
    },
    OrderUpTo {
        level: i64,
    },
    #[serde(alias = "sS")]
    Ss {
        s: i64,
        #[serde(rename = "S")]
        order_up_to: i64,
    },
    PeriodicReview {
        review_period: u32,
        #[serde(alias = "target_level")]
        order_up_to: i64,
        #[serde(default)]
        phase_offset: u32,
    },
    KmCycle {
        #[serde(alias = "K")]
        k: u32,
        #[serde(alias = "M")]
        m: u32,
        #[serde(rename = "S")]
        order_up_to: i64,
        #[serde(default)]
        review_offsets: Option<Vec<u32>>,
    },
    Adaptive {
        #[serde(default = "default_cover_horizon")]
        cover_horizon: f64,
        #[serde(default = "default_buffer_ratio")]
        buffer_ratio: f64,
        #[serde(default = "default_window")]
        window: usize,
    },
}

fn default_cover_horizon() -> f64 {
    1.0
}

fn default_buffer_ratio() -> f64 {
    0.2
}

fn default_window() -> usize {
    AdaptivePolicy::DEFAULT_WINDOW
}

impl Default for PolicySpec {
    /// A node without a policy never orders.
    fn default() -> Self {
        PolicySpec::BaseStock {
            base_stock_level: 0,
        }
    }
}

impl PolicySpec {
    pub fn build(&self, node: &str) -> Result<Box<dyn OrderPolicy>> {
        let invalid = |reason: &str| ConfigError::InvalidPolicy {
            node: node.to_string(),
            reason: reason.to_string(),
        };

        let policy: Box<dyn OrderPolicy> = match self.clone() {
            PolicySpec::BaseStock { base_stock_level } => {
                Box::new(BaseStockPolicy::new(base_stock_level))
            }
            PolicySpec::OrderUpTo { level } => Box::new(BaseStockPolicy::new(level)),
            PolicySpec::Ss { s, order_up_to } => Box::new(
                SsPolicy::new(s, order_up_to).ok_or_else(|| invalid("S must be >= s"))?,
            ),
            PolicySpec::PeriodicReview {
                review_period,
                order_up_to,
                phase_offset,
            } => Box::new(
                PeriodicReviewPolicy::new(review_period, order_up_to, phase_offset)
                    .ok_or_else(|| invalid("review_period must be positive"))?,
            ),
            PolicySpec::KmCycle {
                k,
                m,
                order_up_to,
                review_offsets,
            } => Box::new(
                KmCyclePolicy::new(k, m, order_up_to, review_offsets)
                    .ok_or_else(|| invalid("need 0 < m, k <= m and offsets below m"))?,
            ),
            PolicySpec::Adaptive {
                cover_horizon,
                buffer_ratio,
                window,
            } => {
                if cover_horizon < 0.0 || buffer_ratio < -1.0 {
                    return Err(invalid("cover_horizon and buffer_ratio out of range"));
                }
                Box::new(AdaptivePolicy::new(cover_horizon, buffer_ratio, window))
            }
        };
        Ok(policy)
    }
}

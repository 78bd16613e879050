//! Anomaly records produced by the detectors
//!
//! Two families: price anomalies found in candle windows, and order-book
//! anomalies found in depth snapshots. Every anomaly carries a severity in
//! [0, 100] from which a coarse risk level is derived.

use crate::{Candle, Market, OrderBookSnapshot, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Kinds of anomaly detectable in a candle window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PriceAnomalyKind {
    /// Rapid rise followed by a collapse within the same window
    PumpAndDump,
    /// Recent volatility far above the window baseline
    AbnormalVolatility,
    /// Single-candle volume far above the window mean
    VolumeSpike,
    /// Single-candle price move beyond the pump threshold
    PriceSpike,
    /// Sustained one-directional run with a large cumulative move
    CoordinatedMovement,
}

/// Kinds of anomaly detectable in a depth snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderBookAnomalyKind {
    /// One level dwarfing the rest of its side
    Spoofing,
    /// Near-uniform order sizes stacked across levels
    Layering,
    /// Heavily one-sided resting volume
    Imbalance,
    /// Spread far wider than normal
    SpreadManipulation,
    /// Too little resting value to absorb ordinary flow
    ThinLiquidity,
    /// Mirrored bid/ask sizes suggesting self-trading
    WashTrading,
}

/// Coarse risk bucket derived from severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Fixed severity cut points: >= 80 High, >= 50 Medium, else Low
    pub fn from_severity(severity: f64) -> Self {
        if severity >= 80.0 {
            RiskLevel::High
        } else if severity >= 50.0 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

/// Anomaly found in a window of candles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceAnomaly {
    pub kind: PriceAnomalyKind,
    pub market: Market,
    pub timestamp: Timestamp,
    /// Severity in [0, 100]
    pub severity: f64,
    pub description: String,
    /// Numeric metrics backing the detection (ratios, z-scores, ...)
    pub metrics: HashMap<String, f64>,
    /// The candle window the rule fired on
    pub evidence: Vec<Candle>,
}

impl PriceAnomaly {
    pub fn risk_level(&self) -> RiskLevel {
        RiskLevel::from_severity(self.severity)
    }
}

/// Anomaly found in a depth snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBookAnomaly {
    pub kind: OrderBookAnomalyKind,
    pub market: Market,
    pub timestamp: Timestamp,
    /// Severity in [0, 100]
    pub severity: f64,
    pub description: String,
    /// Numeric metrics backing the detection
    pub metrics: HashMap<String, f64>,
    /// The snapshot the rule fired on
    pub evidence: OrderBookSnapshot,
}

impl OrderBookAnomaly {
    pub fn risk_level(&self) -> RiskLevel {
        RiskLevel::from_severity(self.severity)
    }
}

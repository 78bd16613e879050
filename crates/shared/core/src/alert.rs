//! Alerts raised towards registered sinks
//!
//! A `MarketAlert` is the externally visible product of an analysis pass:
//! either a wrapped anomaly or a synthetic market-health warning. The core
//! keeps no alert history beyond aggregate counters.

use crate::{Market, OrderBookAnomalyKind, PriceAnomalyKind, RiskLevel, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Alert classification, mapped 1:1 from the anomaly kinds plus the
/// synthetic market-health alert emitted on a risk-indicator breach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertType {
    PumpAndDump,
    AbnormalVolatility,
    VolumeSpike,
    PriceSpike,
    CoordinatedMovement,
    Spoofing,
    Layering,
    Imbalance,
    SpreadManipulation,
    ThinLiquidity,
    WashTrading,
    /// Composite indicators crossed into Medium/High risk
    MarketHealth,
}

impl From<PriceAnomalyKind> for AlertType {
    fn from(kind: PriceAnomalyKind) -> Self {
        match kind {
            PriceAnomalyKind::PumpAndDump => AlertType::PumpAndDump,
            PriceAnomalyKind::AbnormalVolatility => AlertType::AbnormalVolatility,
            PriceAnomalyKind::VolumeSpike => AlertType::VolumeSpike,
            PriceAnomalyKind::PriceSpike => AlertType::PriceSpike,
            PriceAnomalyKind::CoordinatedMovement => AlertType::CoordinatedMovement,
        }
    }
}

impl From<OrderBookAnomalyKind> for AlertType {
    fn from(kind: OrderBookAnomalyKind) -> Self {
        match kind {
            OrderBookAnomalyKind::Spoofing => AlertType::Spoofing,
            OrderBookAnomalyKind::Layering => AlertType::Layering,
            OrderBookAnomalyKind::Imbalance => AlertType::Imbalance,
            OrderBookAnomalyKind::SpreadManipulation => AlertType::SpreadManipulation,
            OrderBookAnomalyKind::ThinLiquidity => AlertType::ThinLiquidity,
            OrderBookAnomalyKind::WashTrading => AlertType::WashTrading,
        }
    }
}

impl AlertType {
    /// Suggested operator response, surfaced verbatim in the alert
    pub fn recommended_action(&self) -> &'static str {
        match self {
            AlertType::PumpAndDump => "Avoid entering positions; expect a retrace",
            AlertType::AbnormalVolatility => "Widen stops or reduce position size",
            AlertType::VolumeSpike => "Verify against news before acting on the move",
            AlertType::PriceSpike => "Wait for confirmation before following the move",
            AlertType::CoordinatedMovement => "Treat the trend as potentially orchestrated",
            AlertType::Spoofing => "Ignore displayed depth on the flagged side",
            AlertType::Layering => "Discount stacked levels when estimating depth",
            AlertType::Imbalance => "Expect short-term pressure towards the heavy side",
            AlertType::SpreadManipulation => "Use limit orders only; spread is unreliable",
            AlertType::ThinLiquidity => "Reduce order sizes; slippage risk is elevated",
            AlertType::WashTrading => "Distrust reported volume for this market",
            AlertType::MarketHealth => "Review this market before trading it",
        }
    }
}

/// Composite per-market risk scores, computed fresh each analysis pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketRiskIndicators {
    pub market: Market,
    pub timestamp: Timestamp,
    /// 0 (broken) to 100 (healthy)
    pub health_score: f64,
    /// 100 - health_score
    pub manipulation_risk: f64,
    /// 0 (illiquid) to 100 (deep)
    pub liquidity_score: f64,
    /// Recent volatility expressed as a 0-100 score
    pub volatility_score: f64,
    pub overall_risk: RiskLevel,
}

/// An alert handed to registered callbacks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketAlert {
    /// "{market}-{unix_timestamp}"
    pub id: String,
    pub alert_type: AlertType,
    pub market: Market,
    pub timestamp: Timestamp,
    pub severity: f64,
    pub risk_level: RiskLevel,
    pub title: String,
    pub description: String,
    /// Present when both candle and book data were available this pass
    pub indicators: Option<MarketRiskIndicators>,
    /// Numeric evidence backing the alert
    pub evidence: HashMap<String, f64>,
    pub recommended_action: String,
}

impl MarketAlert {
    /// Build the stable alert id from market and timestamp
    pub fn make_id(market: &str, timestamp: Timestamp) -> String {
        format!("{}-{}", market, timestamp.timestamp())
    }
}

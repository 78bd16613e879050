//! Sentinel Core Domain
//!
//! Pure domain types for the Sentinel market surveillance system.
//! This crate contains no async, no I/O, and is 100% unit testable.

pub mod alert;
pub mod anomaly;
pub mod market_data;

// Re-export commonly used types at crate root
pub use alert::{AlertType, MarketAlert, MarketRiskIndicators};
pub use anomaly::{
    OrderBookAnomaly, OrderBookAnomalyKind, PriceAnomaly, PriceAnomalyKind, RiskLevel,
};
pub use market_data::{Candle, MarketType, OrderBookLevel, OrderBookSnapshot, Ticker};

/// Symbol identifier for a monitored market (e.g. "BTCUSDT")
pub type Market = String;

/// Timestamp in UTC
pub type Timestamp = chrono::DateTime<chrono::Utc>;

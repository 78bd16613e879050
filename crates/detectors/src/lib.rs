//! Sentinel Anomaly Detectors
//!
//! Per-market detectors for manipulation patterns:
//!
//! - **Candle detector**: pump-and-dump, abnormal volatility, volume spikes,
//!   single-candle price spikes, coordinated directional runs. Pure analysis
//!   over a fixed-size OHLCV window.
//! - **Order-book detector**: spoofing, layering, imbalance, spread
//!   manipulation, thin liquidity, wash-trading symmetry. One instance per
//!   market, owning a bounded rolling snapshot history.
//!
//! Severity multipliers are empirically chosen calibration constants,
//! exposed through the config structs rather than re-derived.

pub mod candle;
pub mod order_book;
mod stats;

pub use candle::{CandleAnomalyDetector, CandleDetectorConfig, HealthBreakdown};
pub use order_book::{OrderBookAnomalyDetector, OrderBookDetectorConfig};

//! Monitor configuration

use sentinel_detectors::{CandleDetectorConfig, OrderBookDetectorConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the multi-market monitor
///
/// All intervals are wall-clock; `high_priority_interval` doubles as the
/// hard floor below which alert feedback can never push a market's check
/// interval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Minimum 24h quote volume for a market to be monitored
    pub min_volume_24h: f64,
    /// Maximum concurrently running market checks
    pub max_concurrent: usize,
    /// Check interval for mid-priority markets
    pub base_interval: Duration,
    /// Check interval for high-priority markets; also the interval floor
    pub high_priority_interval: Duration,
    /// Check interval for low-priority markets
    pub low_priority_interval: Duration,
    /// Kline interval requested from the data source
    pub kline_interval: String,
    /// Candles requested per analysis pass
    pub kline_limit: usize,
    /// Order book depth requested per analysis pass
    pub book_depth: usize,
    /// How often 24h volumes are refreshed and alert counters decayed
    pub refresh_interval: Duration,
    /// How often aggregate statistics are recomputed
    pub stats_interval: Duration,
    /// Candle detector thresholds
    pub candle: CandleDetectorConfig,
    /// Order book detector thresholds
    pub order_book: OrderBookDetectorConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            min_volume_24h: 1_000_000.0,
            max_concurrent: 5,
            base_interval: Duration::from_secs(300),
            high_priority_interval: Duration::from_secs(60),
            low_priority_interval: Duration::from_secs(900),
            kline_interval: "1m".to_string(),
            kline_limit: 100,
            book_depth: 20,
            refresh_interval: Duration::from_secs(300),
            stats_interval: Duration::from_secs(60),
            candle: CandleDetectorConfig::default(),
            order_book: OrderBookDetectorConfig::default(),
        }
    }
}

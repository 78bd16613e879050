//! Sentinel Multi-Market Monitor
//!
//! Continuous surveillance across every market of a data source:
//!
//! ```text
//! MarketDataSource ──▶ MultiMarketMonitor
//!                          │  discovery (quote currency + volume filter)
//!                          ▼
//!                      scheduler (min-heap of due times, semaphore-bounded)
//!                          │  one MarketAnalyzer per market
//!                          ▼
//!                      detectors ──▶ alerts ──▶ callbacks
//!                          │
//!                          └── alert feedback: score up, interval down
//! ```
//!
//! Alert-producing checks raise a market's priority score and tighten its
//! check interval down to a configured floor; a refresh loop decays the
//! pressure once a market goes quiet.

pub mod analyzer;
pub mod config;
pub mod context;
pub mod monitor;
pub mod priority;
pub mod stats;

pub use analyzer::MarketAnalyzer;
pub use config::MonitorConfig;
pub use context::{AlertCallback, MonitorContext};
pub use monitor::MultiMarketMonitor;
pub use priority::MarketPriority;
pub use stats::MonitoringStats;

//! Aggregate monitoring statistics
//!
//! Process-wide counters with a lifecycle bound to one monitoring run;
//! reset whenever monitoring starts.

use chrono::Utc;
use sentinel_core::Timestamp;
use serde::{Deserialize, Serialize};

/// Counters recomputed by the stats loop and read through
/// `MultiMarketMonitor::statistics`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringStats {
    pub markets_monitored: usize,
    pub total_checks: u64,
    pub total_alerts: u64,
    /// Markets whose latest composite risk was High
    pub high_risk_markets: usize,
    pub medium_risk_markets: usize,
    pub low_risk_markets: usize,
    pub checks_per_minute: f64,
    pub started_at: Timestamp,
}

impl MonitoringStats {
    pub fn new_run(markets_monitored: usize) -> Self {
        Self {
            markets_monitored,
            total_checks: 0,
            total_alerts: 0,
            high_risk_markets: 0,
            medium_risk_markets: 0,
            low_risk_markets: 0,
            checks_per_minute: 0.0,
            started_at: Utc::now(),
        }
    }

    /// Checks per minute since the run started
    pub fn check_rate(&self, now: Timestamp) -> f64 {
        let elapsed_min = (now - self.started_at).num_milliseconds() as f64 / 60_000.0;
        if elapsed_min <= 0.0 {
            return 0.0;
        }
        self.total_checks as f64 / elapsed_min
    }
}

//! Shared monitoring context
//!
//! All state shared between the scheduler loop, the per-market checks, and
//! the background loops lives here, with explicit ownership instead of
//! globals. The context is shared by `Arc`; each map is individually
//! synchronized.

use crate::config::MonitorConfig;
use crate::priority::MarketPriority;
use crate::stats::MonitoringStats;
use dashmap::DashMap;
use sentinel_core::{Market, MarketAlert, RiskLevel};
use sentinel_ports::MarketDataSource;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tokio::sync::{Notify, RwLock};

/// Callback invoked synchronously for every alert, in registration order
pub type AlertCallback = Arc<dyn Fn(&MarketAlert) + Send + Sync>;

/// State shared across the monitor's tasks
pub struct MonitorContext {
    pub config: MonitorConfig,
    pub data_source: Arc<dyn MarketDataSource>,
    /// Scheduling state, one entry per monitored market
    pub priorities: DashMap<Market, MarketPriority>,
    /// Latest composite risk level per market
    pub risk_levels: DashMap<Market, RiskLevel>,
    /// Aggregate counters for the current run
    pub stats: RwLock<MonitoringStats>,
    /// Observed at the top of every loop iteration
    pub running: AtomicBool,
    /// Wakes sleeping background loops on shutdown
    pub shutdown: Notify,
    /// Monitor-level alert callbacks
    pub callbacks: std::sync::RwLock<Vec<AlertCallback>>,
}

impl MonitorContext {
    pub fn new(config: MonitorConfig, data_source: Arc<dyn MarketDataSource>) -> Self {
        Self {
            config,
            data_source,
            priorities: DashMap::new(),
            risk_levels: DashMap::new(),
            stats: RwLock::new(MonitoringStats::new_run(0)),
            running: AtomicBool::new(false),
            shutdown: Notify::new(),
            callbacks: std::sync::RwLock::new(Vec::new()),
        }
    }
}

//! Multi-market monitor
//!
//! Orchestrates one `MarketAnalyzer` per market across a dynamically
//! discovered market set:
//!
//! 1. A min-heap schedule keyed by next-due instant (market name as a
//!    stable tiebreak) decides which market to check when.
//! 2. A semaphore bounds how many checks run simultaneously, regardless of
//!    market count.
//! 3. Alert feedback raises a market's priority and tightens its interval;
//!    a refresh loop decays it back; a stats loop keeps counters current.
//!
//! Checks for one market never overlap: the heap holds exactly one entry
//! per market, and a market re-enters it only after its check completes.

use crate::analyzer::MarketAnalyzer;
use crate::config::MonitorConfig;
use crate::context::{AlertCallback, MonitorContext};
use crate::priority::MarketPriority;
use crate::stats::MonitoringStats;
use chrono::Utc;
use dashmap::DashMap;
use log::{error, info, warn};
use priority_queue::PriorityQueue;
use sentinel_core::{Market, MarketType, RiskLevel};
use sentinel_ports::{MarketDataSource, MonitorError};
use std::cmp::Reverse;
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::sync::mpsc::{UnboundedSender, unbounded_channel};
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, sleep_until};

/// Min-heap over (due instant, market); `Reverse` turns the max-queue into
/// earliest-due-first with a deterministic name tiebreak.
type Schedule = PriorityQueue<Market, Reverse<(Instant, Market)>>;

type SharedAnalyzers = Arc<DashMap<Market, Arc<Mutex<MarketAnalyzer>>>>;

/// Monitors many markets under a bounded concurrency budget
pub struct MultiMarketMonitor {
    ctx: Arc<MonitorContext>,
    analyzers: SharedAnalyzers,
    handles: Vec<JoinHandle<()>>,
}

impl MultiMarketMonitor {
    pub fn new(config: MonitorConfig, data_source: Arc<dyn MarketDataSource>) -> Self {
        Self {
            ctx: Arc::new(MonitorContext::new(config, data_source)),
            analyzers: Arc::new(DashMap::new()),
            handles: Vec::new(),
        }
    }

    /// Register a callback receiving every alert from every market.
    /// Effective immediately, including for markets already being monitored.
    pub fn add_alert_callback(&self, callback: AlertCallback) {
        self.ctx
            .callbacks
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(callback);
    }

    /// Markets of one venue segment quoted in `quote_currency` with at
    /// least `min_volume` 24h quote volume.
    pub async fn discover_markets(
        &self,
        quote_currency: &str,
        min_volume: f64,
        market_type: MarketType,
    ) -> Result<Vec<Market>, MonitorError> {
        let tickers = self.ctx.data_source.all_tickers(market_type).await?;
        Ok(tickers
            .into_iter()
            .filter(|t| t.market.ends_with(quote_currency) && t.volume_24h >= min_volume)
            .map(|t| t.market)
            .collect())
    }

    /// Discover markets and begin monitoring them all.
    ///
    /// A discovery failure is returned to the caller and monitoring does
    /// not start; a second call while already running is a no-op.
    pub async fn start_monitoring_all(
        &mut self,
        quote_currency: &str,
        min_volume: f64,
        market_type: MarketType,
    ) -> Result<(), MonitorError> {
        let tickers = self.ctx.data_source.all_tickers(market_type).await?;
        let entries: Vec<(Market, f64)> = tickers
            .into_iter()
            .filter(|t| t.market.ends_with(quote_currency) && t.volume_24h >= min_volume)
            .map(|t| (t.market, t.volume_24h))
            .collect();
        if entries.is_empty() {
            return Err(MonitorError::NoMarkets);
        }
        self.begin(entries, market_type).await;
        Ok(())
    }

    /// Begin monitoring an explicit market list, assumed to be spot
    /// markets. 24h volumes are fetched best-effort for the initial
    /// priority scores; markets missing from the ticker list start at the
    /// lowest tier.
    pub async fn start_monitoring(&mut self, markets: Vec<Market>) -> Result<(), MonitorError> {
        if markets.is_empty() {
            return Err(MonitorError::NoMarkets);
        }
        let market_type = MarketType::default();
        let volumes: HashMap<Market, f64> = match self.ctx.data_source.all_tickers(market_type).await
        {
            Ok(tickers) => tickers
                .into_iter()
                .map(|t| (t.market, t.volume_24h))
                .collect(),
            Err(e) => {
                warn!("volume lookup failed, starting with zero volumes: {}", e);
                HashMap::new()
            }
        };
        let entries = markets
            .into_iter()
            .map(|m| {
                let volume = volumes.get(&m).copied().unwrap_or(0.0);
                (m, volume)
            })
            .collect();
        self.begin(entries, market_type).await;
        Ok(())
    }

    async fn begin(&mut self, entries: Vec<(Market, f64)>, market_type: MarketType) {
        if self.ctx.running.swap(true, Ordering::SeqCst) {
            warn!("monitor already running; start ignored");
            return;
        }

        self.ctx.priorities.clear();
        self.ctx.risk_levels.clear();
        self.analyzers.clear();

        let max_volume = entries.iter().map(|(_, v)| *v).fold(0.0_f64, f64::max);
        for (market, volume) in &entries {
            self.ctx.priorities.insert(
                market.clone(),
                MarketPriority::from_volume(market, *volume, max_volume, &self.ctx.config),
            );

            let mut analyzer = MarketAnalyzer::new(
                market,
                self.ctx.data_source.clone(),
                &self.ctx.config,
            );
            analyzer.add_alert_callback(Self::forwarder(self.ctx.clone()));
            self.analyzers
                .insert(market.clone(), Arc::new(Mutex::new(analyzer)));
        }

        *self.ctx.stats.write().await = MonitoringStats::new_run(entries.len());

        info!(
            "monitoring {} markets (max {} concurrent checks)",
            entries.len(),
            self.ctx.config.max_concurrent
        );

        self.handles.retain(|h| !h.is_finished());
        self.handles
            .push(tokio::spawn(scheduler_loop(self.ctx.clone(), self.analyzers.clone())));
        self.handles
            .push(tokio::spawn(refresh_loop(self.ctx.clone(), market_type)));
        self.handles.push(tokio::spawn(stats_loop(self.ctx.clone())));
    }

    /// Bridges an analyzer's fan-out to the monitor-level callbacks.
    /// Each registered callback is isolated: one panicking sink never
    /// stops delivery to the rest.
    fn forwarder(ctx: Arc<MonitorContext>) -> AlertCallback {
        Arc::new(move |alert| {
            let callbacks = ctx.callbacks.read().unwrap_or_else(|e| e.into_inner());
            for (i, callback) in callbacks.iter().enumerate() {
                let cb: &(dyn Fn(&sentinel_core::MarketAlert) + Send + Sync) = &**callback;
                if catch_unwind(AssertUnwindSafe(|| cb(alert))).is_err() {
                    error!("[{}] alert callback #{} panicked", alert.market, i);
                }
            }
        })
    }

    /// Signal the loops to exit. In-flight checks run to completion;
    /// no mid-check cancellation.
    pub fn stop(&self) {
        if self.ctx.running.swap(false, Ordering::SeqCst) {
            info!("stopping monitor; in-flight checks will complete");
            self.ctx.shutdown.notify_waiters();
        }
    }

    pub fn is_running(&self) -> bool {
        self.ctx.running.load(Ordering::SeqCst)
    }

    /// Wait for the background loops of the current run to finish
    pub async fn join(&mut self) {
        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                error!("monitor task failed: {}", e);
            }
        }
    }

    /// Snapshot of the aggregate counters for the current run
    pub async fn statistics(&self) -> MonitoringStats {
        self.ctx.stats.read().await.clone()
    }

    /// Markets whose latest composite risk level is High, sorted by name
    pub fn high_risk_markets(&self) -> Vec<Market> {
        let mut markets: Vec<Market> = self
            .ctx
            .risk_levels
            .iter()
            .filter(|e| *e.value() == RiskLevel::High)
            .map(|e| e.key().clone())
            .collect();
        markets.sort();
        markets
    }

    /// All market priorities, sorted descending by score (name as tiebreak)
    pub fn market_priorities(&self) -> Vec<MarketPriority> {
        let mut priorities: Vec<MarketPriority> = self
            .ctx
            .priorities
            .iter()
            .map(|e| e.value().clone())
            .collect();
        priorities.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.market.cmp(&b.market))
        });
        priorities
    }
}

impl Drop for MultiMarketMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The scheduler: pop the earliest-due market, check it under the
/// concurrency budget, re-insert it at `now + its current interval`.
async fn scheduler_loop(ctx: Arc<MonitorContext>, analyzers: SharedAnalyzers) {
    info!("scheduler started for {} markets", ctx.priorities.len());

    let semaphore = Arc::new(Semaphore::new(ctx.config.max_concurrent));
    let (done_tx, mut done_rx) = unbounded_channel::<Market>();

    let mut schedule: Schedule = PriorityQueue::new();
    let now = Instant::now();
    for entry in ctx.priorities.iter() {
        schedule.push(entry.key().clone(), Reverse((now, entry.key().clone())));
    }

    while ctx.running.load(Ordering::SeqCst) {
        // Completed checks re-enter the schedule first
        while let Ok(market) = done_rx.try_recv() {
            reschedule(&ctx, &mut schedule, market);
        }

        let now = Instant::now();
        let wait = match schedule.peek() {
            Some((_, Reverse((due, _)))) if *due <= now => {
                let Some((market, _)) = schedule.pop() else {
                    continue;
                };
                let Some(analyzer) = analyzers.get(&market).map(|a| a.value().clone()) else {
                    warn!("[{}] no analyzer; dropping from schedule", market);
                    continue;
                };
                let Ok(permit) = semaphore.clone().acquire_owned().await else {
                    break; // semaphore closed only on shutdown
                };
                // Stop may have arrived while parked on the permit
                if !ctx.running.load(Ordering::SeqCst) {
                    break;
                }
                tokio::spawn(run_check(
                    ctx.clone(),
                    analyzer,
                    market,
                    permit,
                    done_tx.clone(),
                ));
                continue;
            }
            // Nothing due yet: bounded sleep so stop() is observed promptly
            Some((_, Reverse((due, _)))) => (*due - now).min(Duration::from_secs(1)),
            None => Duration::from_secs(1),
        };

        tokio::select! {
            _ = sleep(wait) => {}
            Some(market) = done_rx.recv() => reschedule(&ctx, &mut schedule, market),
        }
    }

    info!("scheduler stopped");
}

fn reschedule(ctx: &MonitorContext, schedule: &mut Schedule, market: Market) {
    let interval = ctx
        .priorities
        .get(&market)
        .map(|p| p.check_interval)
        .unwrap_or(ctx.config.base_interval);
    let due = Instant::now() + interval;
    schedule.push(market.clone(), Reverse((due, market)));
}

/// One market check: run the analyzer, apply priority feedback, update
/// counters, and hand the market back to the scheduler. A panicking check
/// is contained here; the market is still rescheduled at its normal
/// interval.
async fn run_check(
    ctx: Arc<MonitorContext>,
    analyzer: Arc<Mutex<MarketAnalyzer>>,
    market: Market,
    permit: OwnedSemaphorePermit,
    done_tx: UnboundedSender<Market>,
) {
    let outcome = tokio::spawn(async move {
        let mut analyzer = analyzer.lock().await;
        let alerts = analyzer.analyze().await;
        let risk = analyzer.last_indicators().map(|i| i.overall_risk);
        (alerts.len() as u64, risk)
    })
    .await;

    match outcome {
        Ok((alert_count, risk)) => {
            {
                let mut stats = ctx.stats.write().await;
                stats.total_checks += 1;
                stats.total_alerts += alert_count;
            }
            if let Some(risk) = risk {
                ctx.risk_levels.insert(market.clone(), risk);
            }
            if alert_count > 0
                && let Some(mut priority) = ctx.priorities.get_mut(&market)
            {
                priority.record_alerts(Utc::now(), &ctx.config);
                info!(
                    "[{}] {} alerts; priority {:.2}, interval {:?}",
                    market, alert_count, priority.score, priority.check_interval
                );
            }
        }
        Err(e) => {
            error!("[{}] market check failed: {}", market, e);
        }
    }

    drop(permit);
    // Scheduler gone means we are shutting down
    let _ = done_tx.send(market);
}

/// Refreshes 24h volumes and decays alert counters
async fn refresh_loop(ctx: Arc<MonitorContext>, market_type: MarketType) {
    let mut next = Instant::now() + ctx.config.refresh_interval;
    while ctx.running.load(Ordering::SeqCst) {
        tokio::select! {
            _ = sleep_until(next) => {}
            _ = ctx.shutdown.notified() => continue,
        }
        next = Instant::now() + ctx.config.refresh_interval;

        let volumes: HashMap<Market, f64> = match ctx.data_source.all_tickers(market_type).await {
            Ok(tickers) => tickers
                .into_iter()
                .map(|t| (t.market, t.volume_24h))
                .collect(),
            Err(e) => {
                warn!("volume refresh failed: {}", e);
                HashMap::new()
            }
        };

        let now = Utc::now();
        for mut entry in ctx.priorities.iter_mut() {
            let volume = volumes.get(entry.key()).copied();
            if let Some(volume) = volume {
                entry.volume_24h = volume;
            }
            entry.decay(now, &ctx.config);
        }
    }
}

/// Recomputes risk-bucket counts and the check rate
async fn stats_loop(ctx: Arc<MonitorContext>) {
    let mut next = Instant::now() + ctx.config.stats_interval;
    while ctx.running.load(Ordering::SeqCst) {
        tokio::select! {
            _ = sleep_until(next) => {}
            _ = ctx.shutdown.notified() => continue,
        }
        next = Instant::now() + ctx.config.stats_interval;

        let mut high = 0;
        let mut medium = 0;
        let mut low = 0;
        for entry in ctx.risk_levels.iter() {
            match entry.value() {
                RiskLevel::High => high += 1,
                RiskLevel::Medium => medium += 1,
                RiskLevel::Low => low += 1,
            }
        }

        let mut stats = ctx.stats.write().await;
        stats.markets_monitored = ctx.priorities.len();
        stats.high_risk_markets = high;
        stats.medium_risk_markets = medium;
        stats.low_risk_markets = low;
        stats.checks_per_minute = stats.check_rate(Utc::now());

        info!(
            "stats: {} markets, {} checks ({:.1}/min), {} alerts, risk H/M/L {}/{}/{}",
            stats.markets_monitored,
            stats.total_checks,
            stats.checks_per_minute,
            stats.total_alerts,
            high,
            medium,
            low
        );
    }
}

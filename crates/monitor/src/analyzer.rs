//! Per-market analysis coordinator
//!
//! Pulls ticker, kline, and order-book data for one market, runs both
//! anomaly detectors, blends the results into composite risk indicators,
//! and fans the resulting alerts out to registered callbacks.

use crate::config::MonitorConfig;
use crate::context::AlertCallback;
use chrono::Utc;
use log::{error, warn};
use sentinel_core::{
    AlertType, Candle, Market, MarketAlert, MarketRiskIndicators, OrderBookAnomaly,
    OrderBookSnapshot, PriceAnomaly, RiskLevel, Ticker,
};
use sentinel_detectors::{CandleAnomalyDetector, OrderBookAnomalyDetector};
use sentinel_ports::MarketDataSource;
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

/// Coordinates one market's analysis passes
///
/// Owns that market's detectors (including the order-book detector's
/// snapshot history); the scheduler guarantees no two passes for the same
/// market run concurrently.
pub struct MarketAnalyzer {
    market: Market,
    data_source: Arc<dyn MarketDataSource>,
    candle_detector: CandleAnomalyDetector,
    book_detector: OrderBookAnomalyDetector,
    callbacks: Vec<AlertCallback>,
    kline_interval: String,
    kline_limit: usize,
    book_depth: usize,
    last_indicators: Option<MarketRiskIndicators>,
}

impl MarketAnalyzer {
    pub fn new(
        market: &str,
        data_source: Arc<dyn MarketDataSource>,
        config: &MonitorConfig,
    ) -> Self {
        Self {
            market: market.to_string(),
            data_source,
            candle_detector: CandleAnomalyDetector::new(config.candle.clone()),
            book_detector: OrderBookAnomalyDetector::new(config.order_book.clone()),
            callbacks: Vec::new(),
            kline_interval: config.kline_interval.clone(),
            kline_limit: config.kline_limit,
            book_depth: config.book_depth,
            last_indicators: None,
        }
    }

    pub fn market(&self) -> &str {
        &self.market
    }

    /// Register a callback; callbacks run synchronously in registration
    /// order on every alert. Callbacks must not block for unbounded time.
    pub fn add_alert_callback(&mut self, callback: AlertCallback) {
        self.callbacks.push(callback);
    }

    /// Indicators computed by the most recent pass that had both candle
    /// and order-book data
    pub fn last_indicators(&self) -> Option<&MarketRiskIndicators> {
        self.last_indicators.as_ref()
    }

    /// Run one full analysis pass.
    ///
    /// A missing ticker, kline window, or order book skips the affected
    /// checks for this pass; it is never an error.
    pub async fn analyze(&mut self) -> Vec<MarketAlert> {
        let ticker = match self.data_source.ticker(&self.market).await {
            Ok(t) => Some(t),
            Err(e) => {
                warn!("[{}] ticker unavailable: {}", self.market, e);
                None
            }
        };

        let candles = match self
            .data_source
            .klines(&self.market, &self.kline_interval, self.kline_limit)
            .await
        {
            Ok(c) => c,
            Err(e) => {
                warn!("[{}] klines unavailable: {}", self.market, e);
                Vec::new()
            }
        };

        let book = match self.data_source.order_book(&self.market, self.book_depth).await {
            Ok(b) => Some(b),
            Err(e) => {
                warn!("[{}] order book unavailable: {}", self.market, e);
                None
            }
        };

        let price_anomalies = if candles.is_empty() {
            Vec::new()
        } else {
            self.candle_detector.analyze(&candles, &self.market)
        };
        let book_anomalies = match &book {
            Some(snapshot) => self.book_detector.analyze(snapshot),
            None => Vec::new(),
        };

        // Composite indicators need both data sources
        let indicators = match (&book, candles.is_empty()) {
            (Some(snapshot), false) => Some(self.compute_indicators(&candles, snapshot)),
            _ => None,
        };
        self.last_indicators = indicators.clone();

        let mut alerts = Vec::new();
        for anomaly in price_anomalies {
            alerts.push(self.price_alert(anomaly, indicators.clone()));
        }
        for anomaly in book_anomalies {
            alerts.push(self.book_alert(anomaly, indicators.clone()));
        }
        if let Some(ind) = &indicators
            && ind.overall_risk >= RiskLevel::Medium
        {
            alerts.push(self.health_alert(ind.clone(), ticker.as_ref()));
        }

        for alert in &alerts {
            self.fan_out(alert);
        }
        alerts
    }

    fn compute_indicators(
        &self,
        candles: &[Candle],
        snapshot: &OrderBookSnapshot,
    ) -> MarketRiskIndicators {
        let health = self.candle_detector.market_health(candles);
        let liquidity_score = (snapshot.total_value()
            / self.book_detector.config().thin_liquidity_threshold
            * 10.0)
            .min(100.0);
        let manipulation_risk = 100.0 - health.health_score;

        MarketRiskIndicators {
            market: self.market.clone(),
            timestamp: Utc::now(),
            health_score: health.health_score,
            manipulation_risk,
            liquidity_score,
            volatility_score: health.volatility_score,
            overall_risk: RiskLevel::from_severity(manipulation_risk),
        }
    }

    fn price_alert(
        &self,
        anomaly: PriceAnomaly,
        indicators: Option<MarketRiskIndicators>,
    ) -> MarketAlert {
        let alert_type = AlertType::from(anomaly.kind);
        MarketAlert {
            id: MarketAlert::make_id(&self.market, anomaly.timestamp),
            alert_type,
            market: self.market.clone(),
            timestamp: anomaly.timestamp,
            severity: anomaly.severity,
            risk_level: anomaly.risk_level(),
            title: format!("{:?} on {}", anomaly.kind, self.market),
            description: anomaly.description,
            indicators,
            evidence: anomaly.metrics,
            recommended_action: alert_type.recommended_action().to_string(),
        }
    }

    fn book_alert(
        &self,
        anomaly: OrderBookAnomaly,
        indicators: Option<MarketRiskIndicators>,
    ) -> MarketAlert {
        let alert_type = AlertType::from(anomaly.kind);
        MarketAlert {
            id: MarketAlert::make_id(&self.market, anomaly.timestamp),
            alert_type,
            market: self.market.clone(),
            timestamp: anomaly.timestamp,
            severity: anomaly.severity,
            risk_level: anomaly.risk_level(),
            title: format!("{:?} on {}", anomaly.kind, self.market),
            description: anomaly.description,
            indicators,
            evidence: anomaly.metrics,
            recommended_action: alert_type.recommended_action().to_string(),
        }
    }

    fn health_alert(
        &self,
        indicators: MarketRiskIndicators,
        ticker: Option<&Ticker>,
    ) -> MarketAlert {
        let mut evidence = HashMap::from([
            ("health_score".to_string(), indicators.health_score),
            ("manipulation_risk".to_string(), indicators.manipulation_risk),
            ("liquidity_score".to_string(), indicators.liquidity_score),
            ("volatility_score".to_string(), indicators.volatility_score),
        ]);
        if let Some(t) = ticker {
            evidence.insert("last_price".to_string(), t.last_price);
            evidence.insert("volume_24h".to_string(), t.volume_24h);
        }

        MarketAlert {
            id: MarketAlert::make_id(&self.market, indicators.timestamp),
            alert_type: AlertType::MarketHealth,
            market: self.market.clone(),
            timestamp: indicators.timestamp,
            severity: indicators.manipulation_risk,
            risk_level: indicators.overall_risk,
            title: format!("Degraded market health on {}", self.market),
            description: format!(
                "Health {:.0}/100, manipulation risk {:.0}/100, liquidity {:.0}/100",
                indicators.health_score,
                indicators.manipulation_risk,
                indicators.liquidity_score
            ),
            indicators: Some(indicators),
            evidence,
            recommended_action: AlertType::MarketHealth.recommended_action().to_string(),
        }
    }

    /// Invoke every callback; a panicking callback is logged and the
    /// remaining callbacks still run.
    fn fan_out(&self, alert: &MarketAlert) {
        for (i, callback) in self.callbacks.iter().enumerate() {
            let cb: &(dyn Fn(&MarketAlert) + Send + Sync) = &**callback;
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| cb(alert))) {
                let msg = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(
                    "[{}] alert callback #{} panicked: {}",
                    self.market, i, msg
                );
            }
        }
    }
}

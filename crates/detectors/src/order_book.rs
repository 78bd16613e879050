//! Depth snapshot anomaly detection
//!
//! One detector instance per market. Each call first appends the snapshot to
//! a bounded rolling history (oldest evicted), then runs all six checks; any
//! subset may fire.

use crate::stats::{coefficient_of_variation, mean};
use log::debug;
use sentinel_core::{OrderBookAnomaly, OrderBookAnomalyKind, OrderBookLevel, OrderBookSnapshot};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// Thresholds for the order-book rules
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBookDetectorConfig {
    /// Levels per side examined by the per-level rules
    pub depth_levels: usize,
    /// Levels examined by the layering rule
    pub layering_levels: usize,
    /// Max level volume over mean of the rest, per side
    pub spoofing_threshold: f64,
    /// Volume coefficient-of-variation below which depth looks fabricated
    pub layering_cv_threshold: f64,
    /// Absolute imbalance ratio bound
    pub imbalance_threshold: f64,
    /// Spread as percent of mid above which the spread looks manipulated
    pub spread_threshold: f64,
    /// Total resting value (quote units) below which the book is thin
    pub thin_liquidity_threshold: f64,
    /// Mean paired bid/ask volume similarity above which wash trading is suspected
    pub wash_similarity_threshold: f64,
    /// Rolling snapshot history retained per market
    pub history_cap: usize,
}

impl Default for OrderBookDetectorConfig {
    fn default() -> Self {
        Self {
            depth_levels: 5,
            layering_levels: 5,
            spoofing_threshold: 5.0,
            layering_cv_threshold: 0.2,
            imbalance_threshold: 0.7,
            spread_threshold: 1.0,
            thin_liquidity_threshold: 1000.0,
            wash_similarity_threshold: 0.8,
            history_cap: 100,
        }
    }
}

/// Per-market depth snapshot detector
///
/// Owns its market's snapshot history exclusively; instances are never
/// shared across markets.
#[derive(Debug, Clone)]
pub struct OrderBookAnomalyDetector {
    config: OrderBookDetectorConfig,
    history: VecDeque<OrderBookSnapshot>,
}

impl OrderBookAnomalyDetector {
    pub fn new(config: OrderBookDetectorConfig) -> Self {
        let cap = config.history_cap;
        Self {
            config,
            history: VecDeque::with_capacity(cap),
        }
    }

    pub fn config(&self) -> &OrderBookDetectorConfig {
        &self.config
    }

    /// Snapshots currently retained
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Append the snapshot to the rolling history and run all checks
    pub fn analyze(&mut self, snapshot: &OrderBookSnapshot) -> Vec<OrderBookAnomaly> {
        self.history.push_back(snapshot.clone());
        while self.history.len() > self.config.history_cap {
            self.history.pop_front();
        }

        let mut anomalies = Vec::new();

        anomalies.extend(self.check_spoofing(snapshot, Side::Bid));
        anomalies.extend(self.check_spoofing(snapshot, Side::Ask));
        anomalies.extend(self.check_layering(snapshot, Side::Bid));
        anomalies.extend(self.check_layering(snapshot, Side::Ask));
        anomalies.extend(self.check_imbalance(snapshot));
        anomalies.extend(self.check_spread(snapshot));
        anomalies.extend(self.check_thin_liquidity(snapshot));
        anomalies.extend(self.check_wash_trading(snapshot));

        if !anomalies.is_empty() {
            debug!(
                "[{}] {} order book anomalies in snapshot",
                snapshot.market,
                anomalies.len()
            );
        }
        anomalies
    }

    /// One level dwarfing the mean of the remaining top levels on its side
    fn check_spoofing(
        &self,
        snapshot: &OrderBookSnapshot,
        side: Side,
    ) -> Option<OrderBookAnomaly> {
        let levels = side.levels(snapshot);
        let top = &levels[..levels.len().min(self.config.depth_levels)];
        if top.len() < 2 {
            return None;
        }

        let (max_idx, max_level) = top
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.volume.total_cmp(&b.1.volume))?;
        let rest: Vec<f64> = top
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != max_idx)
            .map(|(_, l)| l.volume)
            .collect();
        let rest_mean = mean(&rest);
        if rest_mean == 0.0 {
            return None;
        }

        let ratio = max_level.volume / rest_mean;
        if ratio <= self.config.spoofing_threshold {
            return None;
        }

        let severity = (ratio * 15.0).min(100.0);
        Some(self.anomaly(
            OrderBookAnomalyKind::Spoofing,
            snapshot,
            severity,
            format!(
                "{} level at {:.4} holds {:.1}x the volume of neighbouring levels",
                side.name(),
                max_level.price,
                ratio
            ),
            HashMap::from([
                ("ratio".to_string(), ratio),
                ("level_price".to_string(), max_level.price),
                ("level_volume".to_string(), max_level.volume),
                ("side".to_string(), side.metric_value()),
            ]),
        ))
    }

    /// Near-uniform order sizes stacked across the top levels of a side
    fn check_layering(
        &self,
        snapshot: &OrderBookSnapshot,
        side: Side,
    ) -> Option<OrderBookAnomaly> {
        let levels = side.levels(snapshot);
        if levels.len() < self.config.layering_levels {
            return None;
        }

        let volumes: Vec<f64> = levels[..self.config.layering_levels]
            .iter()
            .map(|l| l.volume)
            .collect();
        let cv = coefficient_of_variation(&volumes);
        if volumes.iter().all(|v| *v == 0.0) || cv >= self.config.layering_cv_threshold {
            return None;
        }

        let severity = ((1.0 - cv) * 100.0).min(100.0);
        Some(self.anomaly(
            OrderBookAnomalyKind::Layering,
            snapshot,
            severity,
            format!(
                "{} side shows {} near-identical levels (cv {:.3})",
                side.name(),
                self.config.layering_levels,
                cv
            ),
            HashMap::from([
                ("cv".to_string(), cv),
                ("side".to_string(), side.metric_value()),
            ]),
        ))
    }

    /// Heavily one-sided resting volume
    fn check_imbalance(&self, snapshot: &OrderBookSnapshot) -> Option<OrderBookAnomaly> {
        let ratio = snapshot.imbalance_ratio();
        if ratio.abs() <= self.config.imbalance_threshold {
            return None;
        }

        let severity = (ratio.abs() * 100.0).min(100.0);
        let dominant = if ratio > 0.0 { "bid" } else { "ask" };
        Some(self.anomaly(
            OrderBookAnomalyKind::Imbalance,
            snapshot,
            severity,
            format!("Book is {:.0}% {}-heavy", ratio.abs() * 100.0, dominant),
            HashMap::from([
                ("imbalance_ratio".to_string(), ratio),
                (
                    "dominant_side".to_string(),
                    if ratio > 0.0 { 1.0 } else { -1.0 },
                ),
            ]),
        ))
    }

    /// Spread far wider than the configured bound
    fn check_spread(&self, snapshot: &OrderBookSnapshot) -> Option<OrderBookAnomaly> {
        let spread_pct = snapshot.spread_pct()?;
        if spread_pct <= self.config.spread_threshold {
            return None;
        }

        let severity = (spread_pct * 50.0).min(100.0);
        Some(self.anomaly(
            OrderBookAnomalyKind::SpreadManipulation,
            snapshot,
            severity,
            format!("Spread of {:.2}% of mid", spread_pct),
            HashMap::from([("spread_pct".to_string(), spread_pct)]),
        ))
    }

    /// Too little resting value to absorb ordinary flow
    fn check_thin_liquidity(&self, snapshot: &OrderBookSnapshot) -> Option<OrderBookAnomaly> {
        let total_value = snapshot.total_value();
        if total_value >= self.config.thin_liquidity_threshold {
            return None;
        }

        // Severity grows as remaining value shrinks: empty book scores 100
        let severity = ((self.config.thin_liquidity_threshold - total_value)
            / self.config.thin_liquidity_threshold
            * 100.0)
            .clamp(0.0, 100.0);
        Some(self.anomaly(
            OrderBookAnomalyKind::ThinLiquidity,
            snapshot,
            severity,
            format!(
                "Only {:.0} quote units resting (threshold {:.0})",
                total_value, self.config.thin_liquidity_threshold
            ),
            HashMap::from([("total_value".to_string(), total_value)]),
        ))
    }

    /// Mirrored bid/ask sizes across paired levels
    fn check_wash_trading(&self, snapshot: &OrderBookSnapshot) -> Option<OrderBookAnomaly> {
        let pairs = snapshot
            .bids
            .iter()
            .zip(snapshot.asks.iter())
            .take(self.config.depth_levels);

        let similarities: Vec<f64> = pairs
            .filter_map(|(bid, ask): (&OrderBookLevel, &OrderBookLevel)| {
                let max = bid.volume.max(ask.volume);
                if max == 0.0 {
                    None
                } else {
                    Some(bid.volume.min(ask.volume) / max)
                }
            })
            .collect();
        if similarities.is_empty() {
            return None;
        }

        let similarity = mean(&similarities);
        if similarity <= self.config.wash_similarity_threshold {
            return None;
        }

        let severity = (similarity * 80.0).min(100.0);
        Some(self.anomaly(
            OrderBookAnomalyKind::WashTrading,
            snapshot,
            severity,
            format!(
                "Bid/ask volumes mirror each other ({:.0}% similarity)",
                similarity * 100.0
            ),
            HashMap::from([("similarity".to_string(), similarity)]),
        ))
    }

    fn anomaly(
        &self,
        kind: OrderBookAnomalyKind,
        snapshot: &OrderBookSnapshot,
        severity: f64,
        description: String,
        metrics: HashMap<String, f64>,
    ) -> OrderBookAnomaly {
        OrderBookAnomaly {
            kind,
            market: snapshot.market.clone(),
            timestamp: snapshot.timestamp,
            severity,
            description,
            metrics,
            evidence: snapshot.clone(),
        }
    }
}

impl Default for OrderBookAnomalyDetector {
    fn default() -> Self {
        Self::new(OrderBookDetectorConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Bid,
    Ask,
}

impl Side {
    fn levels<'a>(&self, snapshot: &'a OrderBookSnapshot) -> &'a [OrderBookLevel] {
        match self {
            Side::Bid => &snapshot.bids,
            Side::Ask => &snapshot.asks,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Side::Bid => "Bid",
            Side::Ask => "Ask",
        }
    }

    /// Encoded for the numeric metrics map: bid = 1, ask = -1
    fn metric_value(&self) -> f64 {
        match self {
            Side::Bid => 1.0,
            Side::Ask => -1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn snapshot(bids: &[(f64, f64)], asks: &[(f64, f64)]) -> OrderBookSnapshot {
        OrderBookSnapshot {
            timestamp: Utc::now(),
            market: "BTCUSDT".to_string(),
            bids: bids.iter().map(|&(p, v)| OrderBookLevel::new(p, v)).collect(),
            asks: asks.iter().map(|&(p, v)| OrderBookLevel::new(p, v)).collect(),
        }
    }

    /// A deep, varied, balanced book that should trigger nothing
    fn healthy_book() -> OrderBookSnapshot {
        snapshot(
            &[
                (100.0, 8.0),
                (99.9, 3.0),
                (99.8, 5.0),
                (99.7, 2.0),
                (99.6, 6.0),
            ],
            &[
                (100.1, 2.5),
                (100.2, 7.0),
                (100.3, 4.0),
                (100.4, 9.0),
                (100.5, 3.5),
            ],
        )
    }

    #[test]
    fn test_healthy_book_is_clean() {
        let mut detector = OrderBookAnomalyDetector::default();
        let anomalies = detector.analyze(&healthy_book());
        assert!(anomalies.is_empty(), "got: {:?}", anomalies);
    }

    #[test]
    fn test_spoofing_bid_side_only() {
        let mut detector = OrderBookAnomalyDetector::default();
        // One bid at 10x the mean of the other four
        let snap = snapshot(
            &[
                (100.0, 40.0),
                (99.9, 3.0),
                (99.8, 5.0),
                (99.7, 2.0),
                (99.6, 6.0),
            ],
            &[
                (100.1, 2.5),
                (100.2, 7.0),
                (100.3, 4.0),
                (100.4, 9.0),
                (100.5, 3.5),
            ],
        );

        let anomalies = detector.analyze(&snap);
        let spoofs: Vec<_> = anomalies
            .iter()
            .filter(|a| a.kind == OrderBookAnomalyKind::Spoofing)
            .collect();

        assert_eq!(spoofs.len(), 1, "spoofing must fire on the bid side only");
        assert_eq!(spoofs[0].metrics["side"], 1.0);
        assert!((spoofs[0].metrics["ratio"] - 10.0).abs() < 0.01);
    }

    #[test]
    fn test_spoofing_extreme_ratio_caps_severity() {
        let mut detector = OrderBookAnomalyDetector::default();
        // Spec scenario: bid wall of 50 against unit levels
        let snap = snapshot(
            &[
                (100.0, 50.0),
                (99.0, 1.0),
                (98.0, 1.0),
                (97.0, 1.0),
                (96.0, 1.0),
            ],
            &[
                (101.0, 1.0),
                (102.0, 1.0),
                (103.0, 1.0),
                (104.0, 1.0),
                (105.0, 1.0),
            ],
        );

        let anomalies = detector.analyze(&snap);
        let spoof = anomalies
            .iter()
            .find(|a| a.kind == OrderBookAnomalyKind::Spoofing && a.metrics["side"] == 1.0)
            .expect("bid spoofing should fire");

        assert!((spoof.metrics["ratio"] - 50.0).abs() < 0.01);
        assert_eq!(spoof.severity, 100.0);
    }

    #[test]
    fn test_layering_uniform_levels() {
        let mut detector = OrderBookAnomalyDetector::default();
        let snap = snapshot(
            &[
                (100.0, 5.0),
                (99.9, 5.0),
                (99.8, 5.0),
                (99.7, 5.0),
                (99.6, 5.0),
            ],
            &[
                (100.1, 2.5),
                (100.2, 7.0),
                (100.3, 4.0),
                (100.4, 9.0),
                (100.5, 3.5),
            ],
        );

        let anomalies = detector.analyze(&snap);
        let layers: Vec<_> = anomalies
            .iter()
            .filter(|a| a.kind == OrderBookAnomalyKind::Layering)
            .collect();

        assert_eq!(layers.len(), 1);
        assert_eq!(layers[0].metrics["side"], 1.0);
        // cv = 0 for identical volumes: severity saturates
        assert_eq!(layers[0].severity, 100.0);
    }

    #[test]
    fn test_imbalance_bid_heavy() {
        let mut detector = OrderBookAnomalyDetector::default();
        // bid 90 vs ask 5: ratio = 85/95 ≈ 0.895
        let snap = snapshot(
            &[(100.0, 40.0), (99.9, 30.0), (99.8, 20.0)],
            &[(100.1, 2.0), (100.2, 3.0)],
        );

        let anomalies = detector.analyze(&snap);
        let imb = anomalies
            .iter()
            .find(|a| a.kind == OrderBookAnomalyKind::Imbalance)
            .expect("imbalance should fire");

        assert!((imb.metrics["imbalance_ratio"] - 85.0 / 95.0).abs() < 1e-9);
        assert_eq!(imb.metrics["dominant_side"], 1.0);
    }

    #[test]
    fn test_spread_manipulation() {
        let mut detector = OrderBookAnomalyDetector::default();
        // spread = 3 on mid 101.5: ~2.96% of mid
        let snap = snapshot(
            &[(100.0, 8.0), (99.9, 3.0), (99.8, 5.0), (99.7, 2.0), (99.6, 6.0)],
            &[(103.0, 2.5), (103.1, 7.0), (103.2, 4.0), (103.3, 9.0), (103.4, 3.5)],
        );

        let anomalies = detector.analyze(&snap);
        let spread = anomalies
            .iter()
            .find(|a| a.kind == OrderBookAnomalyKind::SpreadManipulation)
            .expect("spread manipulation should fire");
        assert!(spread.metrics["spread_pct"] > 1.0);
        assert_eq!(spread.severity, 100.0);
    }

    #[test]
    fn test_thin_liquidity_scales_inversely() {
        let mut detector = OrderBookAnomalyDetector::default();
        // ~400 quote units resting in total
        let thin = snapshot(
            &[(10.0, 11.0), (9.9, 4.0), (9.8, 3.0), (9.7, 1.0), (9.6, 2.0)],
            &[(10.1, 3.0), (10.2, 9.0), (10.3, 2.0), (10.4, 4.0), (10.5, 1.0)],
        );
        let anomalies = detector.analyze(&thin);
        let a = anomalies
            .iter()
            .find(|a| a.kind == OrderBookAnomalyKind::ThinLiquidity)
            .expect("thin liquidity should fire");
        let mild_severity = a.severity;

        // A nearly empty book must score strictly worse
        let mut detector = OrderBookAnomalyDetector::default();
        let emptier = snapshot(&[(10.0, 1.0)], &[(10.1, 1.0)]);
        let anomalies = detector.analyze(&emptier);
        let b = anomalies
            .iter()
            .find(|a| a.kind == OrderBookAnomalyKind::ThinLiquidity)
            .expect("thin liquidity should fire");

        assert!(b.severity > mild_severity);
    }

    #[test]
    fn test_wash_trading_symmetry() {
        let mut detector = OrderBookAnomalyDetector::default();
        // Paired volumes within 10% of each other on every level
        let snap = snapshot(
            &[
                (100.0, 10.0),
                (99.9, 7.0),
                (99.8, 4.0),
                (99.7, 9.0),
                (99.6, 6.0),
            ],
            &[
                (100.1, 9.5),
                (100.2, 7.2),
                (100.3, 4.1),
                (100.4, 8.6),
                (100.5, 5.8),
            ],
        );

        let anomalies = detector.analyze(&snap);
        let wash = anomalies
            .iter()
            .find(|a| a.kind == OrderBookAnomalyKind::WashTrading)
            .expect("wash trading should fire");
        assert!(wash.metrics["similarity"] > 0.9);
    }

    #[test]
    fn test_history_bounded_at_cap() {
        let config = OrderBookDetectorConfig {
            history_cap: 10,
            ..Default::default()
        };
        let mut detector = OrderBookAnomalyDetector::new(config);

        for _ in 0..25 {
            detector.analyze(&healthy_book());
        }
        assert_eq!(detector.history_len(), 10);
    }

    #[test]
    fn test_empty_book_only_flags_thin_liquidity() {
        let mut detector = OrderBookAnomalyDetector::default();
        let anomalies = detector.analyze(&snapshot(&[], &[]));

        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].kind, OrderBookAnomalyKind::ThinLiquidity);
        assert_eq!(anomalies[0].severity, 100.0);
    }
}

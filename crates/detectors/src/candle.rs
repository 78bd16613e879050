//! Candle window anomaly detection
//!
//! Stateless analysis of a fixed-size OHLCV window. Each rule is independent
//! and every match is returned; callers decide how to rank and route them.

use crate::stats::{coefficient_of_variation, mean, std_dev};
use chrono::Utc;
use log::debug;
use sentinel_core::{Candle, PriceAnomaly, PriceAnomalyKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Thresholds for the candle rules
///
/// The severity multipliers baked into the rules (e.g. z-score x 20) are
/// calibration constants; the thresholds here are the tunable surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandleDetectorConfig {
    /// Minimum candles required before any rule runs
    pub window_size: usize,
    /// Percent rise that qualifies as a pump (also the price-spike bound)
    pub pump_threshold: f64,
    /// Percent fall that qualifies as the dump leg (negative)
    pub dump_threshold: f64,
    /// Recent-vs-baseline volatility z-score bound
    pub volatility_threshold: f64,
    /// Recent volume over baseline mean ratio bound
    pub volume_spike_threshold: f64,
    /// Candles examined by the pump-and-dump and coordinated-run rules
    pub run_length: usize,
    /// Cumulative percent move that makes a one-directional run suspicious
    pub coordinated_move_pct: f64,
}

impl Default for CandleDetectorConfig {
    fn default() -> Self {
        Self {
            window_size: 20,
            pump_threshold: 10.0,
            dump_threshold: -10.0,
            volatility_threshold: 5.0,
            volume_spike_threshold: 3.0,
            run_length: 10,
            coordinated_move_pct: 15.0,
        }
    }
}

/// Sub-scores behind the composite market health figure, each 0-100
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HealthBreakdown {
    /// Lower volatility scores higher
    pub volatility_score: f64,
    /// Even candle-to-candle volume scores higher
    pub volume_consistency: f64,
    /// Flat cumulative drift scores higher
    pub trend_score: f64,
    /// 0.4 volatility + 0.3 volume consistency + 0.3 trend
    pub health_score: f64,
}

/// Stateless candle-window detector
#[derive(Debug, Clone, Default)]
pub struct CandleAnomalyDetector {
    config: CandleDetectorConfig,
}

impl CandleAnomalyDetector {
    pub fn new(config: CandleDetectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CandleDetectorConfig {
        &self.config
    }

    /// Run every rule over the window.
    ///
    /// Returns an empty vec (never an error) when fewer than
    /// `window_size` candles are supplied.
    pub fn analyze(&self, candles: &[Candle], market: &str) -> Vec<PriceAnomaly> {
        if candles.len() < self.config.window_size {
            debug!(
                "[{}] candle window too short: {} < {}",
                market,
                candles.len(),
                self.config.window_size
            );
            return Vec::new();
        }

        let mut anomalies = Vec::new();

        if let Some(a) = self.check_pump_and_dump(candles, market) {
            anomalies.push(a);
        }
        if let Some(a) = self.check_abnormal_volatility(candles, market) {
            anomalies.push(a);
        }
        if let Some(a) = self.check_volume_spike(candles, market) {
            anomalies.push(a);
        }
        if let Some(a) = self.check_price_spike(candles, market) {
            anomalies.push(a);
        }
        if let Some(a) = self.check_coordinated_movement(candles, market) {
            anomalies.push(a);
        }

        anomalies
    }

    /// Rapid rise with a later collapse inside the last `run_length` candles
    fn check_pump_and_dump(&self, candles: &[Candle], market: &str) -> Option<PriceAnomaly> {
        let window = &candles[candles.len() - self.config.run_length.min(candles.len())..];

        // Largest cumulative close-to-close rise and the index it peaks at
        let mut max_rise = 0.0_f64;
        let mut peak_idx = 0usize;
        for i in 0..window.len() {
            if window[i].close == 0.0 {
                continue;
            }
            for j in i + 1..window.len() {
                let rise = (window[j].close - window[i].close) / window[i].close * 100.0;
                if rise > max_rise {
                    max_rise = rise;
                    peak_idx = j;
                }
            }
        }

        if max_rise <= self.config.pump_threshold {
            return None;
        }

        // Worst single-candle fall after the peak
        let worst_fall = window[peak_idx + 1..]
            .iter()
            .map(|c| c.change_pct())
            .fold(f64::INFINITY, f64::min);
        if !worst_fall.is_finite() || worst_fall >= self.config.dump_threshold {
            return None;
        }

        let severity = (max_rise.abs() + worst_fall.abs()).min(100.0);
        Some(self.anomaly(
            PriceAnomalyKind::PumpAndDump,
            market,
            severity,
            format!(
                "Pump of +{:.1}% followed by dump of {:.1}% within {} candles",
                max_rise,
                worst_fall,
                window.len()
            ),
            HashMap::from([
                ("rise_pct".to_string(), max_rise),
                ("fall_pct".to_string(), worst_fall),
            ]),
            candles,
        ))
    }

    /// Recent volatility far above the full-window baseline
    fn check_abnormal_volatility(&self, candles: &[Candle], market: &str) -> Option<PriceAnomaly> {
        let changes: Vec<f64> = candles.iter().map(Candle::change_pct).collect();
        let baseline = std_dev(&changes);
        if baseline == 0.0 {
            return None;
        }

        let recent = &changes[changes.len().saturating_sub(5)..];
        let recent_vol = std_dev(recent);
        let z = (recent_vol - baseline) / baseline;
        if z <= self.config.volatility_threshold {
            return None;
        }

        let severity = (z * 20.0).min(100.0);
        Some(self.anomaly(
            PriceAnomalyKind::AbnormalVolatility,
            market,
            severity,
            format!(
                "Recent volatility {:.2}% is {:.1} sigma above baseline {:.2}%",
                recent_vol, z, baseline
            ),
            HashMap::from([
                ("recent_volatility".to_string(), recent_vol),
                ("baseline_volatility".to_string(), baseline),
                ("z_score".to_string(), z),
            ]),
            candles,
        ))
    }

    /// Latest candle's volume against the mean of the preceding window
    fn check_volume_spike(&self, candles: &[Candle], market: &str) -> Option<PriceAnomaly> {
        let (latest, rest) = candles.split_last()?;
        let baseline: Vec<f64> = rest.iter().map(|c| c.volume).collect();
        let avg = mean(&baseline);
        if avg == 0.0 {
            return None;
        }

        let ratio = latest.volume / avg;
        if ratio <= self.config.volume_spike_threshold {
            return None;
        }

        let severity = (ratio * 20.0).min(100.0);
        Some(self.anomaly(
            PriceAnomalyKind::VolumeSpike,
            market,
            severity,
            format!("Volume {:.0} is {:.1}x the window average {:.0}", latest.volume, ratio, avg),
            HashMap::from([
                ("volume".to_string(), latest.volume),
                ("average_volume".to_string(), avg),
                ("ratio".to_string(), ratio),
            ]),
            candles,
        ))
    }

    /// Any of the last five candles moving beyond the pump threshold
    fn check_price_spike(&self, candles: &[Candle], market: &str) -> Option<PriceAnomaly> {
        let recent = &candles[candles.len().saturating_sub(5)..];
        let spikes: Vec<f64> = recent
            .iter()
            .map(Candle::change_pct)
            .filter(|c| c.abs() > self.config.pump_threshold)
            .collect();
        let worst = spikes
            .iter()
            .copied()
            .max_by(|a, b| a.abs().total_cmp(&b.abs()))?;

        let severity = (worst.abs() * 5.0).min(100.0);
        Some(self.anomaly(
            PriceAnomalyKind::PriceSpike,
            market,
            severity,
            format!("Single-candle move of {:+.1}%", worst),
            HashMap::from([
                ("change_pct".to_string(), worst),
                ("spike_count".to_string(), spikes.len() as f64),
            ]),
            candles,
        ))
    }

    /// Last `run_length` candles all one direction with a large cumulative move
    fn check_coordinated_movement(&self, candles: &[Candle], market: &str) -> Option<PriceAnomaly> {
        let window = &candles[candles.len() - self.config.run_length.min(candles.len())..];
        let first = window.first()?;
        let last = window.last()?;

        let all_bullish = window.iter().all(|c| c.close > c.open);
        let all_bearish = window.iter().all(|c| c.close < c.open);
        if !(all_bullish || all_bearish) {
            return None;
        }

        if first.open == 0.0 {
            return None;
        }
        let cumulative = (last.close - first.open) / first.open * 100.0;
        if cumulative.abs() <= self.config.coordinated_move_pct {
            return None;
        }

        let severity = (cumulative.abs() * 3.0).min(100.0);
        let direction = if all_bullish { "bullish" } else { "bearish" };
        Some(self.anomaly(
            PriceAnomalyKind::CoordinatedMovement,
            market,
            severity,
            format!(
                "{} consecutive {} candles, {:+.1}% cumulative",
                window.len(),
                direction,
                cumulative
            ),
            HashMap::from([
                ("cumulative_pct".to_string(), cumulative),
                ("run_length".to_string(), window.len() as f64),
            ]),
            candles,
        ))
    }

    /// Composite health of the window: volatility, volume consistency, trend.
    ///
    /// A calm, evenly traded, flat market scores near 100 on every axis.
    pub fn market_health(&self, candles: &[Candle]) -> HealthBreakdown {
        let changes: Vec<f64> = candles.iter().map(Candle::change_pct).collect();
        let volumes: Vec<f64> = candles.iter().map(|c| c.volume).collect();

        let volatility_score = (100.0 - std_dev(&changes) * 10.0).clamp(0.0, 100.0);
        let volume_consistency =
            (100.0 - coefficient_of_variation(&volumes) * 100.0).clamp(0.0, 100.0);

        let trend_score = match (candles.first(), candles.last()) {
            (Some(first), Some(last)) if first.open != 0.0 => {
                let drift = (last.close - first.open) / first.open * 100.0;
                (100.0 - drift.abs() * 5.0).clamp(0.0, 100.0)
            }
            _ => 100.0,
        };

        let health_score =
            0.4 * volatility_score + 0.3 * volume_consistency + 0.3 * trend_score;

        HealthBreakdown {
            volatility_score,
            volume_consistency,
            trend_score,
            health_score,
        }
    }

    fn anomaly(
        &self,
        kind: PriceAnomalyKind,
        market: &str,
        severity: f64,
        description: String,
        metrics: HashMap<String, f64>,
        evidence: &[Candle],
    ) -> PriceAnomaly {
        PriceAnomaly {
            kind,
            market: market.to_string(),
            timestamp: Utc::now(),
            severity,
            description,
            metrics,
            evidence: evidence.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    /// Build a window of candles from close-to-close percent moves,
    /// starting at `start_price` with constant volume.
    fn candles_from_moves(start_price: f64, moves: &[f64]) -> Vec<Candle> {
        let mut out = Vec::new();
        let mut price = start_price;
        let t0 = Utc::now();
        for (i, pct) in moves.iter().enumerate() {
            let open = price;
            let close = open * (1.0 + pct / 100.0);
            out.push(Candle {
                timestamp: t0 + Duration::minutes(i as i64),
                open,
                high: open.max(close) * 1.001,
                low: open.min(close) * 0.999,
                close,
                volume: 1000.0,
                market: "BTCUSDT".to_string(),
            });
            price = close;
        }
        out
    }

    /// Flat window: tiny alternating moves, constant volume
    fn quiet_window(len: usize) -> Vec<Candle> {
        let moves: Vec<f64> = (0..len)
            .map(|i| if i % 2 == 0 { 0.05 } else { -0.05 })
            .collect();
        candles_from_moves(100.0, &moves)
    }

    #[test]
    fn test_short_window_returns_empty() {
        let detector = CandleAnomalyDetector::default();
        for len in 0..20 {
            let candles = quiet_window(len);
            assert!(
                detector.analyze(&candles, "BTCUSDT").is_empty(),
                "window of {} candles must yield no anomalies",
                len
            );
        }
    }

    #[test]
    fn test_quiet_window_is_clean() {
        let detector = CandleAnomalyDetector::default();
        let candles = quiet_window(30);
        assert!(detector.analyze(&candles, "BTCUSDT").is_empty());
    }

    #[test]
    fn test_pump_and_dump_detected() {
        let detector = CandleAnomalyDetector::default();
        // 15 quiet candles, then +12% pump and -12% dump in the last 10
        let mut moves = vec![0.0; 15];
        moves.extend([0.0, 12.0, 0.0, -12.0, 0.0]);
        let candles = candles_from_moves(100.0, &moves);

        let anomalies = detector.analyze(&candles, "BTCUSDT");
        let pnd = anomalies
            .iter()
            .find(|a| a.kind == PriceAnomalyKind::PumpAndDump)
            .expect("pump-and-dump should fire");

        // severity = |rise| + |fall| >= 24
        assert!(pnd.severity >= 24.0, "severity {} < 24", pnd.severity);
        assert!(pnd.metrics["rise_pct"] >= 12.0);
        assert!(pnd.metrics["fall_pct"] <= -12.0);
    }

    #[test]
    fn test_pump_without_dump_does_not_fire() {
        let detector = CandleAnomalyDetector::default();
        let mut moves = vec![0.0; 15];
        moves.extend([0.0, 12.0, 0.5, 0.5, 0.5]);
        let candles = candles_from_moves(100.0, &moves);

        let anomalies = detector.analyze(&candles, "BTCUSDT");
        assert!(
            !anomalies
                .iter()
                .any(|a| a.kind == PriceAnomalyKind::PumpAndDump)
        );
    }

    #[test]
    fn test_volume_spike() {
        let detector = CandleAnomalyDetector::default();
        let mut candles = quiet_window(20);
        candles.last_mut().unwrap().volume = 5000.0; // 5x the 1000 baseline

        let anomalies = detector.analyze(&candles, "BTCUSDT");
        let spike = anomalies
            .iter()
            .find(|a| a.kind == PriceAnomalyKind::VolumeSpike)
            .expect("volume spike should fire");

        assert!((spike.metrics["ratio"] - 5.0).abs() < 0.01);
        // Calibration: severity = ratio * 20, capped at 100
        assert!((spike.severity - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_price_spike_in_recent_candles() {
        let detector = CandleAnomalyDetector::default();
        let mut moves = vec![0.0; 18];
        moves.extend([-11.0, 0.0]);
        let candles = candles_from_moves(100.0, &moves);

        let anomalies = detector.analyze(&candles, "BTCUSDT");
        let spike = anomalies
            .iter()
            .find(|a| a.kind == PriceAnomalyKind::PriceSpike)
            .expect("price spike should fire");
        assert!((spike.metrics["change_pct"] + 11.0).abs() < 0.01);
        assert!((spike.severity - 55.0).abs() < 0.1);
    }

    #[test]
    fn test_coordinated_movement() {
        let detector = CandleAnomalyDetector::default();
        // 10 quiet candles then 10 bullish candles of +2% each (~+21.9% cumulative)
        let mut moves = vec![0.0; 10];
        moves.extend(vec![2.0; 10]);
        // The leading zeros produce doji candles; make them faintly mixed instead
        for (i, m) in moves.iter_mut().take(10).enumerate() {
            *m = if i % 2 == 0 { 0.01 } else { -0.01 };
        }
        let candles = candles_from_moves(100.0, &moves);

        let anomalies = detector.analyze(&candles, "BTCUSDT");
        let run = anomalies
            .iter()
            .find(|a| a.kind == PriceAnomalyKind::CoordinatedMovement)
            .expect("coordinated movement should fire");
        assert!(run.metrics["cumulative_pct"] > 15.0);
        assert_eq!(run.metrics["run_length"], 10.0);
    }

    #[test]
    fn test_abnormal_volatility() {
        let detector = CandleAnomalyDetector::default();
        // Long calm baseline, then an explosive last five candles. The
        // baseline must be long enough that the burst does not dominate the
        // full-window deviation itself.
        let mut moves: Vec<f64> = (0..300)
            .map(|i| if i % 2 == 0 { 0.02 } else { -0.02 })
            .collect();
        moves.extend([10.0, -10.0, 11.0, -11.0, 10.5]);
        let candles = candles_from_moves(100.0, &moves);

        let anomalies = detector.analyze(&candles, "BTCUSDT");
        assert!(
            anomalies
                .iter()
                .any(|a| a.kind == PriceAnomalyKind::AbnormalVolatility),
            "got: {:?}",
            anomalies.iter().map(|a| a.kind).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_market_health_of_quiet_window() {
        let detector = CandleAnomalyDetector::default();
        let health = detector.market_health(&quiet_window(20));

        assert!(health.health_score > 90.0, "health {:?}", health);
        assert!(health.volatility_score > 95.0);
        assert!(health.volume_consistency > 95.0);
        assert!(health.trend_score > 95.0);
    }

    #[test]
    fn test_market_health_degrades_with_volatility() {
        let detector = CandleAnomalyDetector::default();
        let wild: Vec<f64> = (0..20)
            .map(|i| if i % 2 == 0 { 9.0 } else { -9.0 })
            .collect();
        let health = detector.market_health(&candles_from_moves(100.0, &wild));

        assert!(health.volatility_score < 50.0);
        assert!(health.health_score < detector.market_health(&quiet_window(20)).health_score);
    }
}

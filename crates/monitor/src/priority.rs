//! Per-market scheduling priority
//!
//! Priority scores start from normalized 24h volume and are raised by alert
//! feedback; the check interval follows the score's tier, tightened further
//! (never below the high-priority floor) while a market keeps alerting.

use crate::config::MonitorConfig;
use sentinel_core::{Market, Timestamp};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Score above which a market is checked at the high-priority interval
const HIGH_TIER_SCORE: f64 = 0.7;
/// Score above which a market is checked at the base interval
const BASE_TIER_SCORE: f64 = 0.3;
/// Alerting checks tolerated before the interval starts halving
const ALERT_COUNT_TIGHTEN: u32 = 3;

/// Scheduling state for one monitored market
///
/// Created at monitoring start, mutated by the scheduler and by the refresh
/// loop, dropped when monitoring stops.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketPriority {
    pub market: Market,
    /// Monitoring urgency in [0, 1]
    pub score: f64,
    pub volume_24h: f64,
    pub last_alert: Option<Timestamp>,
    /// Alerting checks not yet decayed away
    pub alert_count: u32,
    pub check_interval: Duration,
    /// Last time the alert counter was decayed
    last_decay: Option<Timestamp>,
}

impl MarketPriority {
    /// Initial priority from 24h volume, normalized against the largest
    /// volume in the monitored set.
    pub fn from_volume(
        market: &str,
        volume_24h: f64,
        max_volume: f64,
        config: &MonitorConfig,
    ) -> Self {
        let score = if max_volume > 0.0 {
            (volume_24h / max_volume).clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            market: market.to_string(),
            score,
            volume_24h,
            last_alert: None,
            alert_count: 0,
            check_interval: Self::tier_interval(score, config),
            last_decay: None,
        }
    }

    /// The interval tier a score maps to
    pub fn tier_interval(score: f64, config: &MonitorConfig) -> Duration {
        if score > HIGH_TIER_SCORE {
            config.high_priority_interval
        } else if score > BASE_TIER_SCORE {
            config.base_interval
        } else {
            config.low_priority_interval
        }
    }

    /// Feedback after an alert-producing check: raise the score, re-tier,
    /// and once the counter exceeds the tolerance keep halving the interval
    /// towards (never past) the high-priority floor.
    pub fn record_alerts(&mut self, now: Timestamp, config: &MonitorConfig) {
        self.score = (self.score + 0.1).min(1.0);
        self.alert_count += 1;
        self.last_alert = Some(now);
        // Decay is measured from the most recent alert
        self.last_decay = None;

        self.check_interval = Self::tier_interval(self.score, config);
        if self.alert_count > ALERT_COUNT_TIGHTEN {
            self.check_interval =
                (self.check_interval / 2).max(config.high_priority_interval);
        }
    }

    /// Periodic decay: one alert forgiven per alert-free hour. When the
    /// counter drops back to tolerance the interval returns to its tier.
    pub fn decay(&mut self, now: Timestamp, config: &MonitorConfig) {
        if self.alert_count == 0 {
            return;
        }
        let anchor = self.last_decay.or(self.last_alert);
        let Some(anchor) = anchor else { return };

        if now - anchor >= chrono::Duration::hours(1) {
            self.alert_count -= 1;
            self.last_decay = Some(now);
            if self.alert_count <= ALERT_COUNT_TIGHTEN {
                self.check_interval = Self::tier_interval(self.score, config);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};

    fn config() -> MonitorConfig {
        MonitorConfig::default()
    }

    #[test]
    fn test_initial_tiers_from_volume() {
        let cfg = config();

        let high = MarketPriority::from_volume("BTCUSDT", 900_000.0, 1_000_000.0, &cfg);
        assert_eq!(high.check_interval, cfg.high_priority_interval);

        let base = MarketPriority::from_volume("ETHUSDT", 500_000.0, 1_000_000.0, &cfg);
        assert_eq!(base.check_interval, cfg.base_interval);

        let low = MarketPriority::from_volume("DOGEUSDT", 100_000.0, 1_000_000.0, &cfg);
        assert_eq!(low.check_interval, cfg.low_priority_interval);
    }

    #[test]
    fn test_zero_max_volume_scores_zero() {
        let cfg = config();
        let p = MarketPriority::from_volume("BTCUSDT", 0.0, 0.0, &cfg);
        assert_eq!(p.score, 0.0);
        assert_eq!(p.check_interval, cfg.low_priority_interval);
    }

    #[test]
    fn test_four_alerting_checks_reach_floor() {
        let cfg = config();
        // Base-tier market (score 0.5)
        let mut p = MarketPriority::from_volume("ETHUSDT", 500_000.0, 1_000_000.0, &cfg);
        assert_eq!(p.check_interval, cfg.base_interval);

        for _ in 0..4 {
            p.record_alerts(Utc::now(), &cfg);
        }

        // Score boosted past the high tier, counter past tolerance:
        // interval sits exactly on the floor
        assert!(p.score > 0.7);
        assert_eq!(p.alert_count, 4);
        assert_eq!(p.check_interval, cfg.high_priority_interval);
    }

    #[test]
    fn test_interval_never_below_floor() {
        let cfg = config();
        let mut p = MarketPriority::from_volume("BTCUSDT", 1_000_000.0, 1_000_000.0, &cfg);

        for _ in 0..20 {
            p.record_alerts(Utc::now(), &cfg);
        }
        assert!(p.check_interval >= cfg.high_priority_interval);
        assert_eq!(p.score, 1.0);
    }

    #[test]
    fn test_decay_restores_tier_interval() {
        let cfg = config();
        let mut p = MarketPriority::from_volume("ETHUSDT", 500_000.0, 1_000_000.0, &cfg);

        let t0 = Utc::now();
        for _ in 0..5 {
            p.record_alerts(t0, &cfg);
        }
        let tightened = p.check_interval;
        assert!(tightened < cfg.base_interval);

        // One decay per alert-free hour
        let mut now = t0;
        for expected in (0..5).rev() {
            now += ChronoDuration::hours(1);
            p.decay(now, &cfg);
            assert_eq!(p.alert_count, expected);
        }

        // Counter back below tolerance: interval restored to the score's tier
        assert_eq!(
            p.check_interval,
            MarketPriority::tier_interval(p.score, &cfg)
        );
    }

    #[test]
    fn test_decay_needs_a_full_hour() {
        let cfg = config();
        let mut p = MarketPriority::from_volume("ETHUSDT", 500_000.0, 1_000_000.0, &cfg);

        let t0 = Utc::now();
        p.record_alerts(t0, &cfg);
        p.decay(t0 + ChronoDuration::minutes(30), &cfg);
        assert_eq!(p.alert_count, 1);

        p.decay(t0 + ChronoDuration::minutes(61), &cfg);
        assert_eq!(p.alert_count, 0);
    }
}

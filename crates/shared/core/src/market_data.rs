//! Market data records
//!
//! Immutable values produced by a `MarketDataSource` and consumed by the
//! anomaly detectors: OHLCV candles, depth snapshots, and 24h tickers.

use crate::{Market, Timestamp};
use serde::{Deserialize, Serialize};

/// A single OHLCV candle
///
/// Immutable once received. Derived metrics (body, wicks, percent change)
/// are computed on demand rather than stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: Timestamp,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub market: Market,
}

impl Candle {
    /// Absolute size of the candle body (open to close)
    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    /// Wick above the body
    pub fn upper_wick(&self) -> f64 {
        self.high - self.open.max(self.close)
    }

    /// Wick below the body
    pub fn lower_wick(&self) -> f64 {
        self.open.min(self.close) - self.low
    }

    /// Closed above its open
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    /// Percent change from open to close. Zero open yields 0.0.
    pub fn change_pct(&self) -> f64 {
        if self.open == 0.0 {
            return 0.0;
        }
        (self.close - self.open) / self.open * 100.0
    }
}

/// One price level of a depth snapshot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderBookLevel {
    pub price: f64,
    pub volume: f64,
}

impl OrderBookLevel {
    pub fn new(price: f64, volume: f64) -> Self {
        Self { price, volume }
    }

    /// Quote-currency value of the level
    pub fn value(&self) -> f64 {
        self.price * self.volume
    }
}

/// A point-in-time view of one market's order book
///
/// Bids are ordered by descending price, asks by ascending price; the best
/// quote on each side is therefore the first level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBookSnapshot {
    pub timestamp: Timestamp,
    pub market: Market,
    pub bids: Vec<OrderBookLevel>,
    pub asks: Vec<OrderBookLevel>,
}

impl OrderBookSnapshot {
    pub fn best_bid(&self) -> Option<&OrderBookLevel> {
        self.bids.first()
    }

    pub fn best_ask(&self) -> Option<&OrderBookLevel> {
        self.asks.first()
    }

    /// Absolute spread; None when either side is empty
    pub fn spread(&self) -> Option<f64> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask.price - bid.price),
            _ => None,
        }
    }

    /// Spread as a percentage of the mid price
    pub fn spread_pct(&self) -> Option<f64> {
        let spread = self.spread()?;
        let mid = self.mid_price()?;
        if mid == 0.0 {
            return None;
        }
        Some(spread / mid * 100.0)
    }

    pub fn mid_price(&self) -> Option<f64> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid.price + ask.price) / 2.0),
            _ => None,
        }
    }

    /// Aggregate bid volume across all levels in the snapshot
    pub fn bid_volume(&self) -> f64 {
        self.bids.iter().map(|l| l.volume).sum()
    }

    /// Aggregate ask volume across all levels in the snapshot
    pub fn ask_volume(&self) -> f64 {
        self.asks.iter().map(|l| l.volume).sum()
    }

    /// Order book imbalance: (bid_vol - ask_vol) / (bid_vol + ask_vol)
    ///
    /// Ranges over [-1, 1]. An empty book is defined as balanced (0.0),
    /// never NaN.
    pub fn imbalance_ratio(&self) -> f64 {
        let bid_vol = self.bid_volume();
        let ask_vol = self.ask_volume();
        let total = bid_vol + ask_vol;
        if total == 0.0 {
            return 0.0;
        }
        (bid_vol - ask_vol) / total
    }

    /// Total quote-currency value resting on both sides
    pub fn total_value(&self) -> f64 {
        self.bids.iter().map(|l| l.value()).sum::<f64>()
            + self.asks.iter().map(|l| l.value()).sum::<f64>()
    }
}

/// Venue segment a market trades on
///
/// Exchanges list spot and derivative markets through separate ticker
/// feeds; discovery and volume refresh are scoped to one segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MarketType {
    #[default]
    Spot,
    Futures,
}

/// 24h ticker summary for one market
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    pub market: Market,
    pub last_price: f64,
    /// Rolling 24h traded volume in quote currency
    pub volume_24h: f64,
}

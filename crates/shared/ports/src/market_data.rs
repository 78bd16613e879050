//! Market data source port
//!
//! Narrow data-access interface over whatever exchange transport feeds the
//! monitor. Implementations own connection handling, retries, and parsing;
//! the surveillance core only sees domain types.

use crate::error::DataSourceError;
use async_trait::async_trait;
use sentinel_core::{Candle, MarketType, OrderBookSnapshot, Ticker};

/// Supplies ticker, kline, order-book, and market-list data per market.
///
/// Each call is independently failable: a transient upstream failure on one
/// call must not poison the others.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// All tickers in one venue segment, used for discovery and periodic
    /// volume refresh.
    async fn all_tickers(&self, market_type: MarketType) -> Result<Vec<Ticker>, DataSourceError>;

    /// 24h ticker for a single market.
    async fn ticker(&self, market: &str) -> Result<Ticker, DataSourceError>;

    /// Most recent `limit` candles at the given interval (e.g. "1m"),
    /// oldest first.
    async fn klines(
        &self,
        market: &str,
        interval: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, DataSourceError>;

    /// Depth snapshot truncated to `depth` levels per side.
    async fn order_book(
        &self,
        market: &str,
        depth: usize,
    ) -> Result<OrderBookSnapshot, DataSourceError>;
}

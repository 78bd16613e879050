use thiserror::Error;

/// Errors from a market data source
///
/// Every fetch is independently failable. Inside an analysis pass these are
/// logged and the affected checks skipped; only discovery surfaces them to
/// the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DataSourceError {
    #[error("market not found: {0}")]
    MarketNotFound(String),

    #[error("data unavailable: {0}")]
    Unavailable(String),

    #[error("rate limited by upstream")]
    RateLimited,
}

/// Errors surfaced by the multi-market monitor
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MonitorError {
    /// Could not establish the initial market list; monitoring does not start
    #[error("market discovery failed: {0}")]
    Discovery(#[from] DataSourceError),

    #[error("no markets matched the discovery filter")]
    NoMarkets,
}

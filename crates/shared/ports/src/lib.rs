//! Sentinel Ports
//!
//! Boundary traits between the surveillance core and its collaborators.
//! The exchange wire protocol lives behind `MarketDataSource`; alert
//! delivery lives behind plain callbacks registered on the monitor.

pub mod error;
pub mod market_data;

pub use error::{DataSourceError, MonitorError};
pub use market_data::MarketDataSource;

//! Source Adapter - 平台音源获取实现

mod gateway_fetcher;

pub use gateway_fetcher::{GatewayFetcherConfig, GatewaySourceFetcher};

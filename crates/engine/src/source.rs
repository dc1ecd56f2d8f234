// In crates/engine/src/source.rs

use api_client::ExchangeClient;
use async_trait::async_trait;
use core_types::{Kline, Symbol};
use std::sync::Arc;
use strategies::KlineSource;

/// Feeds the default signal scorer with candles from the exchange.
pub struct ExchangeKlines {
    client: Arc<dyn ExchangeClient>,
}

impl ExchangeKlines {
    pub fn new(client: Arc<dyn ExchangeClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl KlineSource for ExchangeKlines {
    async fn recent_klines(&self, symbol: &Symbol, interval: &str, limit: u32) -> strategies::Result<Vec<Kline>> {
        self.client
            .klines(symbol, interval, limit)
            .await
            .map_err(|e| strategies::Error::Source(e.to_string()))
    }
}

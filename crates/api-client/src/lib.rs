// In crates/api-client/src/lib.rs

//! Exchange access for the trading engine.
//!
//! [`ExchangeClient`] is the seam every other crate talks to. [`ApiClient`] implements it
//! against the BingX perpetual swap REST API, and [`GuardedClient`] wraps any implementation
//! with an in-flight request limit and bounded retries.

use async_trait::async_trait;
use core_types::{
    AccountBalance, ContractSpec, ExchangePosition, Kline, MarketDepth, OrderId, OrderRequest,
    OrderState, Symbol,
};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;

pub mod client;
pub mod error;
pub mod guard;
pub mod retry;
pub mod types;

// Re-export public types
pub use client::ApiClient;
pub use error::{Error, Result};
pub use guard::GuardedClient;
pub use retry::RetryPolicy;

/// Everything the engine needs from a derivatives venue.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Lot and price rules for every tradable contract.
    async fn contract_specs(&self) -> Result<Vec<ContractSpec>>;

    /// Best bid and ask.
    async fn market_depth(&self, symbol: &Symbol) -> Result<MarketDepth>;

    async fn mark_price(&self, symbol: &Symbol) -> Result<Decimal>;

    async fn account(&self) -> Result<AccountBalance>;

    /// Non-zero positions keyed by symbol.
    async fn open_positions(&self) -> Result<HashMap<Symbol, ExchangePosition>>;

    /// Submits an order. Never retried by wrappers, since a lost acknowledgement
    /// can still mean the order rests on the book.
    async fn submit_order(&self, order: &OrderRequest) -> Result<OrderId>;

    async fn order_status(&self, symbol: &Symbol, order_id: &OrderId) -> Result<OrderState>;

    /// Cancels an order and returns its final state as reported by the venue.
    async fn cancel_order(&self, symbol: &Symbol, order_id: &OrderId) -> Result<OrderState>;

    async fn cancel_all_orders(&self, symbol: &Symbol) -> Result<()>;

    async fn set_leverage(&self, symbol: &Symbol, leverage: u32) -> Result<()>;

    /// Recent candles, oldest first.
    async fn klines(&self, symbol: &Symbol, interval: &str, limit: u32) -> Result<Vec<Kline>>;
}

#[async_trait]
impl<T: ExchangeClient + ?Sized> ExchangeClient for Arc<T> {
    async fn contract_specs(&self) -> Result<Vec<ContractSpec>> {
        (**self).contract_specs().await
    }

    async fn market_depth(&self, symbol: &Symbol) -> Result<MarketDepth> {
        (**self).market_depth(symbol).await
    }

    async fn mark_price(&self, symbol: &Symbol) -> Result<Decimal> {
        (**self).mark_price(symbol).await
    }

    async fn account(&self) -> Result<AccountBalance> {
        (**self).account().await
    }

    async fn open_positions(&self) -> Result<HashMap<Symbol, ExchangePosition>> {
        (**self).open_positions().await
    }

    async fn submit_order(&self, order: &OrderRequest) -> Result<OrderId> {
        (**self).submit_order(order).await
    }

    async fn order_status(&self, symbol: &Symbol, order_id: &OrderId) -> Result<OrderState> {
        (**self).order_status(symbol, order_id).await
    }

    async fn cancel_order(&self, symbol: &Symbol, order_id: &OrderId) -> Result<OrderState> {
        (**self).cancel_order(symbol, order_id).await
    }

    async fn cancel_all_orders(&self, symbol: &Symbol) -> Result<()> {
        (**self).cancel_all_orders(symbol).await
    }

    async fn set_leverage(&self, symbol: &Symbol, leverage: u32) -> Result<()> {
        (**self).set_leverage(symbol, leverage).await
    }

    async fn klines(&self, symbol: &Symbol, interval: &str, limit: u32) -> Result<Vec<Kline>> {
        (**self).klines(symbol, interval, limit).await
    }
}

// In crates/api-client/src/guard.rs

use crate::{Error, ExchangeClient, Result, RetryPolicy};
use async_trait::async_trait;
use core_types::{
    AccountBalance, ContractSpec, ExchangePosition, Kline, MarketDepth, OrderId, OrderRequest,
    OrderState, Symbol,
};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::future::Future;
use tokio::sync::{Semaphore, SemaphorePermit};

/// Wraps an [`ExchangeClient`] with a cap on concurrent requests and bounded retries.
///
/// Every attempt holds a permit for its duration, so retries queue behind other work
/// instead of bypassing the cap. Order submission is never retried.
pub struct GuardedClient<C> {
    inner: C,
    permits: Semaphore,
    retry: RetryPolicy,
}

impl<C: ExchangeClient> GuardedClient<C> {
    pub fn new(inner: C, max_in_flight: usize, retry: RetryPolicy) -> Self {
        Self { inner, permits: Semaphore::new(max_in_flight.max(1)), retry }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    async fn permit(&self) -> Result<SemaphorePermit<'_>> {
        self.permits
            .acquire()
            .await
            .map_err(|_| Error::Network("request limiter closed".into()))
    }

    async fn guarded<T, F, Fut>(&self, op: &'static str, call: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.retry
            .run(op, || {
                let fut = call();
                async move {
                    let _permit = self.permit().await?;
                    fut.await
                }
            })
            .await
    }
}

#[async_trait]
impl<C: ExchangeClient> ExchangeClient for GuardedClient<C> {
    async fn contract_specs(&self) -> Result<Vec<ContractSpec>> {
        self.guarded("contract_specs", || self.inner.contract_specs()).await
    }

    async fn market_depth(&self, symbol: &Symbol) -> Result<MarketDepth> {
        self.guarded("market_depth", || self.inner.market_depth(symbol)).await
    }

    async fn mark_price(&self, symbol: &Symbol) -> Result<Decimal> {
        self.guarded("mark_price", || self.inner.mark_price(symbol)).await
    }

    async fn account(&self) -> Result<AccountBalance> {
        self.guarded("account", || self.inner.account()).await
    }

    async fn open_positions(&self) -> Result<HashMap<Symbol, ExchangePosition>> {
        self.guarded("open_positions", || self.inner.open_positions()).await
    }

    async fn submit_order(&self, order: &OrderRequest) -> Result<OrderId> {
        let _permit = self.permit().await?;
        self.inner.submit_order(order).await
    }

    async fn order_status(&self, symbol: &Symbol, order_id: &OrderId) -> Result<OrderState> {
        self.guarded("order_status", || self.inner.order_status(symbol, order_id)).await
    }

    async fn cancel_order(&self, symbol: &Symbol, order_id: &OrderId) -> Result<OrderState> {
        self.guarded("cancel_order", || self.inner.cancel_order(symbol, order_id)).await
    }

    async fn cancel_all_orders(&self, symbol: &Symbol) -> Result<()> {
        self.guarded("cancel_all_orders", || self.inner.cancel_all_orders(symbol)).await
    }

    async fn set_leverage(&self, symbol: &Symbol, leverage: u32) -> Result<()> {
        self.guarded("set_leverage", || self.inner.set_leverage(symbol, leverage)).await
    }

    async fn klines(&self, symbol: &Symbol, interval: &str, limit: u32) -> Result<Vec<Kline>> {
        self.guarded("klines", || self.inner.klines(symbol, interval, limit)).await
    }
}

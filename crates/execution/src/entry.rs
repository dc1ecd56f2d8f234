// In crates/execution/src/entry.rs

use crate::exit::place_protection;
use crate::types::{EntryOutcome, EntryTimings};
use crate::{Error, Result};
use api_client::ExchangeClient;
use chrono::Utc;
use core_types::{
    ContractSpec, MarketDepth, OrderKind, OrderRequest, OrderState, OrderStatus, PendingEntry,
    Position, Side, SizingPlan,
};
use rust_decimal::Decimal;
use tokio::time::{Instant, sleep_until};

/// How a pending entry order ended up.
#[derive(Debug, Clone, PartialEq)]
enum Resolution {
    Filled { price: Decimal, quantity: Decimal },
    Cancelled,
    Rejected(String),
}

/// Limit price one tick inside the book on our own side, never crossing the spread.
pub fn maker_price(side: Side, depth: &MarketDepth, contract: &ContractSpec) -> Decimal {
    let tick = contract.tick_size();
    match side {
        Side::Long => {
            let price = contract.round_price(depth.best_bid + tick);
            if price < depth.best_ask { price } else { depth.best_bid }
        }
        Side::Short => {
            let price = contract.round_price(depth.best_ask - tick);
            if price > depth.best_bid { price } else { depth.best_ask }
        }
    }
}

/// Drives one entry attempt from submission to a filled position or back to idle.
///
/// The attempt is fully resolved before `enter` returns: the order either filled (wholly
/// or partly), was cancelled at the deadline, or was refused by the exchange. A fill
/// reported by the cancellation response is still a fill.
pub struct EntryExecutor<C> {
    client: C,
    timings: EntryTimings,
}

impl<C: ExchangeClient> EntryExecutor<C> {
    pub fn new(client: C, timings: EntryTimings) -> Self {
        Self { client, timings }
    }

    pub fn timings(&self) -> &EntryTimings {
        &self.timings
    }

    /// Submits the planned entry at `plan.entry_price` and waits for it to resolve.
    pub async fn enter(&self, plan: &SizingPlan, contract: &ContractSpec) -> Result<EntryOutcome> {
        let symbol = &contract.symbol;
        let request = OrderRequest {
            symbol: symbol.clone(),
            side: plan.side.entry_order_side(),
            position_side: plan.side,
            quantity: plan.quantity,
            kind: OrderKind::Limit { price: plan.entry_price, post_only: self.timings.post_only },
            reduce_only: false,
        };

        let order_id = match self.client.submit_order(&request).await {
            Ok(id) => id,
            Err(e) if !e.is_transient() => {
                tracing::warn!(symbol = %symbol, reason = %e, "Entry order rejected by the exchange.");
                return Ok(EntryOutcome::Rejected { reason: e.to_string() });
            }
            Err(e) => {
                // The order may still have reached the book without us learning its id.
                tracing::warn!(symbol = %symbol, error = %e, "Entry submission failed, sweeping open orders.");
                if let Err(sweep) = self.client.cancel_all_orders(symbol).await {
                    tracing::warn!(symbol = %symbol, error = %sweep, "Order sweep after failed submission failed.");
                }
                return Err(Error::TransientNetwork(e));
            }
        };

        let pending = PendingEntry {
            symbol: symbol.clone(),
            order_id,
            side: plan.side,
            requested_qty: plan.quantity,
            requested_price: plan.entry_price,
            submitted_at: Utc::now(),
        };
        tracing::info!(
            symbol = %symbol,
            order_id = %pending.order_id,
            side = %pending.side,
            quantity = %pending.requested_qty,
            price = %pending.requested_price,
            "Entry order submitted."
        );

        match self.resolve(&pending).await? {
            Resolution::Filled { price, quantity } => {
                let mut position = Position::from_fill(
                    symbol.clone(),
                    plan,
                    contract,
                    price,
                    quantity,
                    Utc::now(),
                );
                tracing::info!(
                    symbol = %symbol,
                    order_id = %pending.order_id,
                    fill_price = %price,
                    quantity = %quantity,
                    stop = %position.current_stop_price,
                    take_profit = %position.take_profit_price,
                    "Entry filled."
                );
                place_protection(&self.client, &mut position).await;
                Ok(EntryOutcome::Filled(position))
            }
            Resolution::Cancelled => {
                tracing::info!(symbol = %symbol, order_id = %pending.order_id, "Entry cancelled unfilled.");
                Ok(EntryOutcome::Cancelled { order_id: pending.order_id })
            }
            Resolution::Rejected(reason) => {
                tracing::warn!(symbol = %symbol, order_id = %pending.order_id, reason = %reason, "Entry order rejected.");
                Ok(EntryOutcome::Rejected { reason })
            }
        }
    }

    /// Polls until the order resolves or the deadline passes, then cancels.
    async fn resolve(&self, pending: &PendingEntry) -> Result<Resolution> {
        let symbol = &pending.symbol;
        let deadline = Instant::now() + self.timings.timeout;

        loop {
            sleep_until((Instant::now() + self.timings.poll_interval).min(deadline)).await;

            match self.client.order_status(symbol, &pending.order_id).await {
                Ok(state) => {
                    if let Some(resolution) = classify(&state, pending) {
                        return Ok(resolution);
                    }
                }
                Err(e) => {
                    tracing::warn!(symbol = %symbol, order_id = %pending.order_id, error = %e, "Entry status poll failed.");
                }
            }

            if Instant::now() >= deadline {
                break;
            }
        }

        tracing::info!(symbol = %symbol, order_id = %pending.order_id, "Entry deadline reached, cancelling.");
        match self.client.cancel_order(symbol, &pending.order_id).await {
            Ok(state) => Ok(classify(&state, pending).unwrap_or_else(|| settle(&state, pending))),
            Err(cancel_error) => {
                // Typically the order filled between the last poll and the cancel.
                tracing::warn!(symbol = %symbol, order_id = %pending.order_id, error = %cancel_error, "Cancel failed, re-querying the order.");
                let state = self
                    .client
                    .order_status(symbol, &pending.order_id)
                    .await
                    .map_err(|e| Error::Unresolved {
                        order_id: pending.order_id.to_string(),
                        reason: e.to_string(),
                    })?;
                classify(&state, pending).ok_or_else(|| Error::Unresolved {
                    order_id: pending.order_id.to_string(),
                    reason: format!("order still {:?} after a failed cancel: {cancel_error}", state.status),
                })
            }
        }
    }
}

fn filled_quantity(state: &OrderState, pending: &PendingEntry) -> Decimal {
    if state.status == OrderStatus::Filled && state.executed_qty.is_zero() {
        pending.requested_qty
    } else {
        state.executed_qty.min(pending.requested_qty)
    }
}

/// Maps a terminal order state to a resolution; `None` while the order still rests.
fn classify(state: &OrderState, pending: &PendingEntry) -> Option<Resolution> {
    let quantity = filled_quantity(state, pending);
    let price = state.avg_fill_price.unwrap_or(pending.requested_price);
    match state.status {
        OrderStatus::Filled => Some(Resolution::Filled { price, quantity }),
        OrderStatus::Cancelled | OrderStatus::Expired | OrderStatus::Rejected
            if quantity > Decimal::ZERO =>
        {
            Some(Resolution::Filled { price, quantity })
        }
        OrderStatus::Cancelled | OrderStatus::Expired => Some(Resolution::Cancelled),
        OrderStatus::Rejected => Some(Resolution::Rejected("order rejected by the exchange".into())),
        OrderStatus::New | OrderStatus::PartiallyFilled => None,
    }
}

/// Resolution of a cancel response that did not report a terminal status.
fn settle(state: &OrderState, pending: &PendingEntry) -> Resolution {
    let quantity = filled_quantity(state, pending);
    if quantity > Decimal::ZERO {
        Resolution::Filled { price: state.avg_fill_price.unwrap_or(pending.requested_price), quantity }
    } else {
        Resolution::Cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paper::{FillBehavior, PaperExchange};
    use core_types::{OrderSide, PositionPhase, Symbol};
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use std::time::Duration;

    fn contract() -> ContractSpec {
        ContractSpec {
            symbol: Symbol::from("SOL-USDT"),
            min_qty: dec!(0.1),
            step_size: dec!(0.1),
            price_precision: 2,
            qty_precision: 1,
            min_notional: dec!(5),
        }
    }

    fn plan(side: Side) -> SizingPlan {
        let sign = side.sign();
        SizingPlan {
            side,
            entry_price: dec!(100),
            quantity: dec!(2),
            stop_price: dec!(100) - sign * dec!(2),
            take_profit_price: dec!(100) + sign * dec!(6),
            partial_qty: dec!(1),
            risk_amount: dec!(4),
            atr: dec!(2.5),
            stop_distance: dec!(2),
        }
    }

    async fn setup(behavior: FillBehavior) -> (Arc<PaperExchange>, EntryExecutor<Arc<PaperExchange>>) {
        let paper = Arc::new(PaperExchange::new(dec!(1000)));
        paper.set_book(&contract().symbol, dec!(99.9), dec!(100.1)).await;
        paper.set_entry_behavior(behavior).await;
        let executor = EntryExecutor::new(paper.clone(), EntryTimings::default());
        (paper, executor)
    }

    #[test]
    fn maker_price_sits_one_tick_inside_the_book() {
        let spec = contract();
        let wide = MarketDepth { best_bid: dec!(99.90), best_ask: dec!(100.10) };
        assert_eq!(maker_price(Side::Long, &wide, &spec), dec!(99.91));
        assert_eq!(maker_price(Side::Short, &wide, &spec), dec!(100.09));

        // A one-tick spread leaves no room inside; join our own side instead of crossing.
        let tight = MarketDepth { best_bid: dec!(99.99), best_ask: dec!(100.00) };
        assert_eq!(maker_price(Side::Long, &tight, &spec), dec!(99.99));
        assert_eq!(maker_price(Side::Short, &tight, &spec), dec!(100.00));
    }

    #[tokio::test(start_paused = true)]
    async fn fill_creates_position_with_protection() {
        let (paper, executor) = setup(FillBehavior::AfterPolls(3)).await;
        let started = Instant::now();

        let outcome = executor.enter(&plan(Side::Long), &contract()).await.unwrap();
        let EntryOutcome::Filled(position) = outcome else {
            panic!("expected a fill, got {outcome:?}");
        };
        assert!(started.elapsed() < Duration::from_secs(8));
        assert_eq!(position.quantity, dec!(2));
        assert_eq!(position.phase, PositionPhase::Open);
        assert_eq!(position.current_stop_price, dec!(98));
        assert!(position.stop_order_id.is_some());
        assert!(position.take_profit_order_id.is_some());

        let resting = paper.open_orders(&contract().symbol).await;
        assert_eq!(resting.len(), 2);
        assert!(resting.iter().all(|o| o.reduce_only && o.side == OrderSide::Sell && o.quantity == dec!(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn unfilled_entry_is_cancelled_at_the_deadline() {
        let (paper, executor) = setup(FillBehavior::Never).await;
        let started = Instant::now();

        let outcome = executor.enter(&plan(Side::Short), &contract()).await.unwrap();
        assert!(matches!(outcome, EntryOutcome::Cancelled { .. }));
        assert!(started.elapsed() >= Duration::from_secs(8));
        assert!(started.elapsed() < Duration::from_secs(9));
        assert!(paper.position(&contract().symbol).await.is_none());
        assert!(paper.open_orders(&contract().symbol).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn fill_reported_on_cancel_still_opens_a_position() {
        let (paper, executor) = setup(FillBehavior::FillOnCancel).await;

        let outcome = executor.enter(&plan(Side::Long), &contract()).await.unwrap();
        let EntryOutcome::Filled(position) = outcome else {
            panic!("expected a fill, got {outcome:?}");
        };
        assert_eq!(position.quantity, dec!(2));
        assert_eq!(paper.position(&contract().symbol).await.unwrap().quantity, dec!(2));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_cancel_of_a_filled_order_opens_a_position() {
        let (paper, executor) = setup(FillBehavior::FillBeforeCancel).await;
        let started = Instant::now();

        let outcome = executor.enter(&plan(Side::Long), &contract()).await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(8));
        let EntryOutcome::Filled(position) = outcome else {
            panic!("expected the late fill to be kept, got {outcome:?}");
        };
        assert_eq!(position.quantity, dec!(2));
        assert_eq!(position.entry_price, dec!(100));
        assert!(paper.position(&contract().symbol).await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn partial_fill_sizes_position_to_executed_quantity() {
        let (paper, executor) = setup(FillBehavior::Partial(dec!(0.5))).await;

        let outcome = executor.enter(&plan(Side::Long), &contract()).await.unwrap();
        let EntryOutcome::Filled(position) = outcome else {
            panic!("expected a partial fill, got {outcome:?}");
        };
        assert_eq!(position.quantity, dec!(1));
        assert_eq!(position.partial_qty, dec!(0.5));
        let stop = paper
            .open_orders(&contract().symbol)
            .await
            .into_iter()
            .find(|o| matches!(o.kind, OrderKind::StopMarket { .. }))
            .unwrap();
        assert_eq!(stop.quantity, dec!(1));
    }

    #[tokio::test(start_paused = true)]
    async fn exchange_rejection_returns_to_idle() {
        let (paper, executor) = setup(FillBehavior::Reject("Insufficient margin".into())).await;

        let outcome = executor.enter(&plan(Side::Long), &contract()).await.unwrap();
        let EntryOutcome::Rejected { reason } = outcome else {
            panic!("expected a rejection, got {outcome:?}");
        };
        assert!(reason.contains("Insufficient margin"));
        assert!(paper.position(&contract().symbol).await.is_none());
    }
}

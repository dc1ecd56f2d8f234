// In crates/execution/src/exit.rs

use crate::Result;
use crate::types::ExitReport;
use api_client::ExchangeClient;
use core_types::{ExchangePosition, OrderKind, OrderRequest, Position, Side, Symbol};
use risk::ExitInstruction;
use rust_decimal::Decimal;

/// A reduce-only market order closing `quantity` of a `side` position.
pub fn close_order(symbol: &Symbol, side: Side, quantity: Decimal) -> OrderRequest {
    OrderRequest {
        symbol: symbol.clone(),
        side: side.exit_order_side(),
        position_side: side,
        quantity,
        kind: OrderKind::Market,
        reduce_only: true,
    }
}

fn stop_order(position: &Position) -> OrderRequest {
    OrderRequest {
        symbol: position.symbol.clone(),
        side: position.side.exit_order_side(),
        position_side: position.side,
        quantity: position.quantity,
        kind: OrderKind::StopMarket { trigger_price: position.current_stop_price },
        reduce_only: true,
    }
}

fn take_profit_order(position: &Position) -> OrderRequest {
    OrderRequest {
        symbol: position.symbol.clone(),
        side: position.side.exit_order_side(),
        position_side: position.side,
        quantity: position.quantity,
        kind: OrderKind::Limit { price: position.take_profit_price, post_only: false },
        reduce_only: true,
    }
}

/// Places the resting stop and take-profit orders for the whole remaining quantity.
///
/// Returns whether both were accepted. A missing protective order is logged; the position
/// manager still enforces the stop every cycle.
pub async fn place_protection<C: ExchangeClient + ?Sized>(client: &C, position: &mut Position) -> bool {
    let symbol = position.symbol.clone();

    position.stop_order_id = match client.submit_order(&stop_order(position)).await {
        Ok(id) => Some(id),
        Err(e) => {
            tracing::error!(symbol = %symbol, stop = %position.current_stop_price, error = %e, "Failed to place protective stop.");
            None
        }
    };
    position.take_profit_order_id = match client.submit_order(&take_profit_order(position)).await {
        Ok(id) => Some(id),
        Err(e) => {
            tracing::error!(symbol = %symbol, take_profit = %position.take_profit_price, error = %e, "Failed to place take-profit.");
            None
        }
    };

    position.stop_order_id.is_some() && position.take_profit_order_id.is_some()
}

/// Turns position-manager instructions into exchange orders.
pub struct ExitExecutor<C> {
    client: C,
}

impl<C: ExchangeClient> ExitExecutor<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    /// Applies one evaluation's instructions to a position the manager has already updated.
    ///
    /// Closes go out as reduce-only market orders. A full close also cancels every remaining
    /// order on the symbol; otherwise the protective orders are replaced to match the new
    /// stop and quantity.
    pub async fn apply(
        &self,
        position: &mut Position,
        instructions: &[ExitInstruction],
        mark: Decimal,
    ) -> Result<ExitReport> {
        let mut report = ExitReport::default();
        if instructions.is_empty() {
            return Ok(report);
        }

        let symbol = position.symbol.clone();
        for instruction in instructions {
            match instruction {
                ExitInstruction::ClosePartial { quantity, reason }
                | ExitInstruction::CloseAll { quantity, reason } => {
                    self.client.submit_order(&close_order(&symbol, position.side, *quantity)).await?;
                    let pnl = (mark - position.entry_price) * *quantity * position.side.sign();
                    report.closed_qty += *quantity;
                    report.realized_pnl += pnl;
                    tracing::info!(
                        symbol = %symbol,
                        reason = %reason,
                        quantity = %quantity,
                        mark = %mark,
                        pnl = %pnl,
                        "Position reduced."
                    );
                }
                ExitInstruction::MoveStop { stop_price } => {
                    tracing::info!(symbol = %symbol, stop = %stop_price, "Stop moved.");
                }
            }
        }

        if position.is_closed() {
            report.fully_closed = true;
            if let Err(e) = self.client.cancel_all_orders(&symbol).await {
                tracing::warn!(symbol = %symbol, error = %e, "Failed to cancel orders after a full close.");
            }
            position.stop_order_id = None;
            position.take_profit_order_id = None;
        } else {
            report.protection_refreshed = self.refresh_protection(position).await;
        }

        Ok(report)
    }

    /// Cancels the resting protective orders and places fresh ones.
    pub async fn refresh_protection(&self, position: &mut Position) -> bool {
        let symbol = position.symbol.clone();
        for id in [position.stop_order_id.take(), position.take_profit_order_id.take()]
            .into_iter()
            .flatten()
        {
            // A protective order that already triggered can no longer be cancelled.
            if let Err(e) = self.client.cancel_order(&symbol, &id).await {
                tracing::warn!(symbol = %symbol, order_id = %id, error = %e, "Failed to cancel protective order.");
            }
        }
        place_protection(&self.client, position).await
    }

    /// Closes an exchange position outright and cancels its orders.
    pub async fn flatten(&self, position: &ExchangePosition) -> Result<()> {
        self.client
            .submit_order(&close_order(&position.symbol, position.side, position.quantity))
            .await?;
        if let Err(e) = self.client.cancel_all_orders(&position.symbol).await {
            tracing::warn!(symbol = %position.symbol, error = %e, "Failed to cancel orders after flattening.");
        }
        tracing::info!(symbol = %position.symbol, quantity = %position.quantity, "Exchange position flattened.");
        Ok(())
    }

    /// Cancels every order on a symbol.
    pub async fn cancel_all(&self, symbol: &Symbol) -> Result<()> {
        self.client.cancel_all_orders(symbol).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paper::PaperExchange;
    use chrono::Utc;
    use core_types::{ContractSpec, OrderSide, PositionPhase};
    use risk::{ExitReason, ExitSettings, PositionManager};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

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

    fn position() -> Position {
        Position {
            symbol: contract().symbol,
            side: Side::Long,
            quantity: dec!(2),
            entry_price: dec!(100),
            original_stop_price: dec!(98),
            current_stop_price: dec!(98),
            take_profit_price: dec!(106),
            atr: dec!(2.5),
            stop_distance: dec!(2),
            partial_qty: dec!(1),
            phase: PositionPhase::Open,
            tp1_taken: false,
            opened_at: Utc::now(),
            stop_order_id: None,
            take_profit_order_id: None,
        }
    }

    async fn open(paper: &PaperExchange, position: &mut Position) {
        paper.set_book(&position.symbol, dec!(99.99), dec!(100.01)).await;
        paper.insert_position(&position.symbol, position.side, position.quantity, position.entry_price).await;
        assert!(place_protection(paper, position).await);
    }

    #[tokio::test]
    async fn partial_close_replaces_protection_for_the_remainder() {
        let paper = Arc::new(PaperExchange::new(dec!(1000)));
        let mut position = position();
        open(&paper, &mut position).await;
        let old_stop = position.stop_order_id.clone();

        let manager = PositionManager::new(ExitSettings::default());
        paper.set_mark(&position.symbol, dec!(101.5)).await;
        let instructions = manager.evaluate(&mut position, dec!(101.5), &contract());
        assert_eq!(
            instructions,
            vec![
                ExitInstruction::ClosePartial { quantity: dec!(1), reason: ExitReason::TakeProfitPartial },
                ExitInstruction::MoveStop { stop_price: dec!(100.7) },
            ]
        );

        let exits = ExitExecutor::new(paper.clone());
        let report = exits.apply(&mut position, &instructions, dec!(101.5)).await.unwrap();

        assert_eq!(report.closed_qty, dec!(1));
        assert_eq!(report.realized_pnl, dec!(1.5));
        assert!(!report.fully_closed);
        assert!(report.protection_refreshed);
        assert_ne!(position.stop_order_id, old_stop);

        let resting = paper.open_orders(&position.symbol).await;
        assert_eq!(resting.len(), 2);
        assert!(resting.iter().all(|o| o.quantity == dec!(1) && o.side == OrderSide::Sell));
        assert!(resting.iter().any(|o| o.kind == OrderKind::StopMarket { trigger_price: dec!(100.7) }));
        assert_eq!(paper.position(&position.symbol).await.unwrap().quantity, dec!(1));
    }

    #[tokio::test]
    async fn full_close_cancels_everything() {
        let paper = Arc::new(PaperExchange::new(dec!(1000)));
        let mut position = position();
        open(&paper, &mut position).await;

        let manager = PositionManager::new(ExitSettings::default());
        paper.set_mark(&position.symbol, dec!(97.5)).await;
        let instructions = manager.evaluate(&mut position, dec!(97.5), &contract());
        assert!(instructions.iter().any(ExitInstruction::is_full_close));

        let exits = ExitExecutor::new(paper.clone());
        let report = exits.apply(&mut position, &instructions, dec!(97.5)).await.unwrap();

        assert!(report.fully_closed);
        assert_eq!(report.realized_pnl, dec!(-5));
        assert!(paper.position(&position.symbol).await.is_none());
        assert!(paper.open_orders(&position.symbol).await.is_empty());
        assert_eq!(paper.cancel_all_calls().await, vec![position.symbol.clone()]);
    }

    #[tokio::test]
    async fn flatten_closes_an_unknown_position() {
        let paper = Arc::new(PaperExchange::new(dec!(1000)));
        let symbol = Symbol::from("DOGE-USDT");
        paper.set_book(&symbol, dec!(0.1), dec!(0.1002)).await;
        paper.insert_position(&symbol, Side::Short, dec!(500), dec!(0.11)).await;

        let exits = ExitExecutor::new(paper.clone());
        let exchange = paper.position(&symbol).await.unwrap();
        exits.flatten(&exchange).await.unwrap();

        assert!(paper.position(&symbol).await.is_none());
        let orders = paper.submitted_orders().await;
        assert_eq!(orders.last().map(|o| o.side), Some(OrderSide::Buy));
    }
}

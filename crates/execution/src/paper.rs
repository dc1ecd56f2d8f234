// In crates/execution/src/paper.rs

//! An in-process exchange with scriptable fill behaviour.
//!
//! Entry orders (non reduce-only limits) follow the configured [`FillBehavior`]. Market
//! orders fill immediately at the mark price. Reduce-only limit and stop orders rest until
//! cancelled. Positions, equity and realized PnL are tracked the way a hedge-mode venue
//! would report them.

use api_client::{Error, ExchangeClient, Result};
use async_trait::async_trait;
use chrono::Utc;
use core_types::{
    AccountBalance, ContractSpec, ExchangePosition, Kline, MarketDepth, OrderId, OrderKind,
    OrderRequest, OrderState, OrderStatus, Side, Symbol,
};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// How the paper venue treats entry orders.
#[derive(Debug, Clone, PartialEq)]
pub enum FillBehavior {
    /// Filled at the limit price as soon as they are submitted.
    Immediate,
    /// Filled once the order has been polled this many times.
    AfterPolls(u32),
    /// Never filled while resting.
    Never,
    /// Rests unfilled, then reports `Filled` on the cancellation response.
    FillOnCancel,
    /// Rests unfilled, then fills just before the cancel arrives so the cancel fails.
    FillBeforeCancel,
    /// Fills this fraction of the quantity immediately and never the rest.
    Partial(Decimal),
    /// Refused at submission with the given reason.
    Reject(String),
}

#[derive(Debug, Clone)]
struct PaperOrder {
    request: OrderRequest,
    status: OrderStatus,
    executed_qty: Decimal,
    avg_price: Option<Decimal>,
    polls: u32,
}

#[derive(Debug)]
struct PaperState {
    equity: Decimal,
    contracts: Vec<ContractSpec>,
    depth: HashMap<Symbol, MarketDepth>,
    marks: HashMap<Symbol, Decimal>,
    klines: HashMap<Symbol, Vec<Kline>>,
    positions: HashMap<Symbol, ExchangePosition>,
    orders: HashMap<OrderId, PaperOrder>,
    submitted: Vec<OrderRequest>,
    cancel_all_calls: Vec<Symbol>,
    leverage: HashMap<Symbol, u32>,
    entry_behavior: FillBehavior,
    account_unavailable: bool,
    next_id: u64,
}

pub struct PaperExchange {
    state: Mutex<PaperState>,
}

impl PaperExchange {
    pub fn new(equity: Decimal) -> Self {
        Self {
            state: Mutex::new(PaperState {
                equity,
                contracts: Vec::new(),
                depth: HashMap::new(),
                marks: HashMap::new(),
                klines: HashMap::new(),
                positions: HashMap::new(),
                orders: HashMap::new(),
                submitted: Vec::new(),
                cancel_all_calls: Vec::new(),
                leverage: HashMap::new(),
                entry_behavior: FillBehavior::Immediate,
                account_unavailable: false,
                next_id: 1,
            }),
        }
    }

    pub async fn add_contract(&self, spec: ContractSpec) {
        let mut state = self.state.lock().await;
        state.contracts.retain(|c| c.symbol != spec.symbol);
        state.contracts.push(spec);
    }

    /// Sets the book and derives the mark as the mid price.
    pub async fn set_book(&self, symbol: &Symbol, best_bid: Decimal, best_ask: Decimal) {
        let mut state = self.state.lock().await;
        state.depth.insert(symbol.clone(), MarketDepth { best_bid, best_ask });
        state.marks.insert(symbol.clone(), (best_bid + best_ask) / Decimal::TWO);
    }

    pub async fn set_mark(&self, symbol: &Symbol, mark: Decimal) {
        let mut state = self.state.lock().await;
        state.marks.insert(symbol.clone(), mark);
        if let Some(position) = state.positions.get_mut(symbol) {
            position.mark_price = mark;
            position.unrealized_pnl =
                (mark - position.entry_price) * position.quantity * position.side.sign();
        }
    }

    pub async fn set_klines(&self, symbol: &Symbol, klines: Vec<Kline>) {
        self.state.lock().await.klines.insert(symbol.clone(), klines);
    }

    pub async fn set_entry_behavior(&self, behavior: FillBehavior) {
        self.state.lock().await.entry_behavior = behavior;
    }

    pub async fn set_equity(&self, equity: Decimal) {
        self.state.lock().await.equity = equity;
    }

    pub async fn set_account_unavailable(&self, unavailable: bool) {
        self.state.lock().await.account_unavailable = unavailable;
    }

    /// Places a position directly, as if it had been opened outside this process.
    pub async fn insert_position(&self, symbol: &Symbol, side: Side, quantity: Decimal, entry_price: Decimal) {
        let mut state = self.state.lock().await;
        let mark = state.marks.get(symbol).copied().unwrap_or(entry_price);
        state.positions.insert(
            symbol.clone(),
            ExchangePosition {
                symbol: symbol.clone(),
                side,
                quantity,
                entry_price,
                mark_price: mark,
                unrealized_pnl: (mark - entry_price) * quantity * side.sign(),
            },
        );
    }

    pub async fn remove_position(&self, symbol: &Symbol) {
        self.state.lock().await.positions.remove(symbol);
    }

    pub async fn position(&self, symbol: &Symbol) -> Option<ExchangePosition> {
        self.state.lock().await.positions.get(symbol).cloned()
    }

    pub async fn equity(&self) -> Decimal {
        self.state.lock().await.equity
    }

    /// Every order submitted so far, in submission order.
    pub async fn submitted_orders(&self) -> Vec<OrderRequest> {
        self.state.lock().await.submitted.clone()
    }

    /// Orders still resting on the book for `symbol`.
    pub async fn open_orders(&self, symbol: &Symbol) -> Vec<OrderRequest> {
        let state = self.state.lock().await;
        state
            .orders
            .values()
            .filter(|o| &o.request.symbol == symbol && !o.status.is_terminal())
            .map(|o| o.request.clone())
            .collect()
    }

    pub async fn cancel_all_calls(&self) -> Vec<Symbol> {
        self.state.lock().await.cancel_all_calls.clone()
    }

    pub async fn leverage(&self, symbol: &Symbol) -> Option<u32> {
        self.state.lock().await.leverage.get(symbol).copied()
    }
}

impl PaperState {
    fn mark(&self, symbol: &Symbol) -> Result<Decimal> {
        self.marks
            .get(symbol)
            .copied()
            .ok_or_else(|| Error::ApiError { code: 109400, msg: format!("unknown symbol {symbol}") })
    }

    /// Applies a fill to the position book and books realized PnL for reductions.
    fn apply_fill(&mut self, request: &OrderRequest, quantity: Decimal, price: Decimal) {
        if quantity <= Decimal::ZERO {
            return;
        }
        let side = request.position_side;
        let opening = request.side == side.entry_order_side();
        let mark = self.marks.get(&request.symbol).copied().unwrap_or(price);

        if opening {
            let position = self.positions.entry(request.symbol.clone()).or_insert(ExchangePosition {
                symbol: request.symbol.clone(),
                side,
                quantity: Decimal::ZERO,
                entry_price: price,
                mark_price: mark,
                unrealized_pnl: Decimal::ZERO,
            });
            let total = position.quantity + quantity;
            position.entry_price = (position.entry_price * position.quantity + price * quantity) / total;
            position.quantity = total;
            position.unrealized_pnl = (mark - position.entry_price) * total * side.sign();
            return;
        }

        let Some(position) = self.positions.get_mut(&request.symbol) else {
            return;
        };
        let closed = quantity.min(position.quantity);
        self.equity += (price - position.entry_price) * closed * side.sign();
        position.quantity -= closed;
        if position.quantity.is_zero() {
            self.positions.remove(&request.symbol);
        }
    }

    fn state_of(id: &OrderId, order: &PaperOrder) -> OrderState {
        OrderState {
            order_id: id.clone(),
            status: order.status,
            avg_fill_price: order.avg_price,
            executed_qty: order.executed_qty,
            updated_at: Utc::now(),
        }
    }
}

#[async_trait]
impl ExchangeClient for PaperExchange {
    async fn contract_specs(&self) -> Result<Vec<ContractSpec>> {
        Ok(self.state.lock().await.contracts.clone())
    }

    async fn market_depth(&self, symbol: &Symbol) -> Result<MarketDepth> {
        let state = self.state.lock().await;
        state
            .depth
            .get(symbol)
            .copied()
            .ok_or_else(|| Error::ApiError { code: 109400, msg: format!("no book for {symbol}") })
    }

    async fn mark_price(&self, symbol: &Symbol) -> Result<Decimal> {
        self.state.lock().await.mark(symbol)
    }

    async fn account(&self) -> Result<AccountBalance> {
        let state = self.state.lock().await;
        if state.account_unavailable {
            return Err(Error::Network("paper account offline".into()));
        }
        let unrealized: Decimal = state.positions.values().map(|p| p.unrealized_pnl).sum();
        let equity = state.equity + unrealized;
        Ok(AccountBalance { equity, free_margin: equity })
    }

    async fn open_positions(&self) -> Result<HashMap<Symbol, ExchangePosition>> {
        let state = self.state.lock().await;
        if state.account_unavailable {
            return Err(Error::Network("paper account offline".into()));
        }
        Ok(state.positions.clone())
    }

    async fn submit_order(&self, order: &OrderRequest) -> Result<OrderId> {
        let mut state = self.state.lock().await;
        let mark = state.mark(&order.symbol)?;
        state.submitted.push(order.clone());

        let id = OrderId(state.next_id.to_string());
        state.next_id += 1;

        let mut paper = PaperOrder {
            request: order.clone(),
            status: OrderStatus::New,
            executed_qty: Decimal::ZERO,
            avg_price: None,
            polls: 0,
        };

        match order.kind {
            OrderKind::Market => {
                paper.status = OrderStatus::Filled;
                paper.executed_qty = order.quantity;
                paper.avg_price = Some(mark);
                state.apply_fill(order, order.quantity, mark);
            }
            OrderKind::Limit { price, .. } if !order.reduce_only => {
                match state.entry_behavior.clone() {
                    FillBehavior::Reject(reason) => {
                        return Err(Error::ApiError { code: 101204, msg: reason });
                    }
                    FillBehavior::Immediate => {
                        paper.status = OrderStatus::Filled;
                        paper.executed_qty = order.quantity;
                        paper.avg_price = Some(price);
                        state.apply_fill(order, order.quantity, price);
                    }
                    FillBehavior::Partial(fraction) => {
                        let filled = order.quantity * fraction;
                        paper.status = OrderStatus::PartiallyFilled;
                        paper.executed_qty = filled;
                        paper.avg_price = Some(price);
                        state.apply_fill(order, filled, price);
                    }
                    FillBehavior::AfterPolls(_)
                    | FillBehavior::Never
                    | FillBehavior::FillOnCancel
                    | FillBehavior::FillBeforeCancel => {}
                }
            }
            // Protective orders rest until cancelled.
            OrderKind::Limit { .. } | OrderKind::StopMarket { .. } => {}
        }

        state.orders.insert(id.clone(), paper);
        Ok(id)
    }

    async fn order_status(&self, symbol: &Symbol, order_id: &OrderId) -> Result<OrderState> {
        let mut state = self.state.lock().await;
        let behavior = state.entry_behavior.clone();
        let Some(mut order) = state.orders.get(order_id).cloned() else {
            return Err(Error::ApiError { code: 109414, msg: format!("order {order_id} not found on {symbol}") });
        };

        order.polls += 1;
        if let (FillBehavior::AfterPolls(n), OrderStatus::New) = (behavior, order.status) {
            if order.polls >= n {
                if let OrderKind::Limit { price, .. } = order.request.kind {
                    order.status = OrderStatus::Filled;
                    order.executed_qty = order.request.quantity;
                    order.avg_price = Some(price);
                    let request = order.request.clone();
                    state.apply_fill(&request, request.quantity, price);
                }
            }
        }

        let result = PaperState::state_of(order_id, &order);
        state.orders.insert(order_id.clone(), order);
        Ok(result)
    }

    async fn cancel_order(&self, symbol: &Symbol, order_id: &OrderId) -> Result<OrderState> {
        let mut state = self.state.lock().await;
        let behavior = state.entry_behavior.clone();
        let Some(mut order) = state.orders.get(order_id).cloned() else {
            return Err(Error::ApiError { code: 109414, msg: format!("order {order_id} not found on {symbol}") });
        };

        if order.status.is_terminal() {
            return Err(Error::ApiError {
                code: 109421,
                msg: format!("order {order_id} is already {:?}", order.status),
            });
        }

        let entry = !order.request.reduce_only;
        match (behavior, order.request.kind) {
            (FillBehavior::FillOnCancel, OrderKind::Limit { price, .. }) if entry => {
                let remaining = order.request.quantity - order.executed_qty;
                order.status = OrderStatus::Filled;
                order.executed_qty = order.request.quantity;
                order.avg_price = Some(price);
                let request = order.request.clone();
                state.apply_fill(&request, remaining, price);
            }
            (FillBehavior::FillBeforeCancel, OrderKind::Limit { price, .. }) if entry => {
                let remaining = order.request.quantity - order.executed_qty;
                order.status = OrderStatus::Filled;
                order.executed_qty = order.request.quantity;
                order.avg_price = Some(price);
                let request = order.request.clone();
                state.apply_fill(&request, remaining, price);
                state.orders.insert(order_id.clone(), order);
                return Err(Error::ApiError {
                    code: 109421,
                    msg: format!("order {order_id} is already filled"),
                });
            }
            _ => order.status = OrderStatus::Cancelled,
        }

        let result = PaperState::state_of(order_id, &order);
        state.orders.insert(order_id.clone(), order);
        Ok(result)
    }

    async fn cancel_all_orders(&self, symbol: &Symbol) -> Result<()> {
        let mut state = self.state.lock().await;
        state.cancel_all_calls.push(symbol.clone());
        for order in state.orders.values_mut() {
            if &order.request.symbol == symbol && !order.status.is_terminal() {
                order.status = OrderStatus::Cancelled;
            }
        }
        Ok(())
    }

    async fn set_leverage(&self, symbol: &Symbol, leverage: u32) -> Result<()> {
        self.state.lock().await.leverage.insert(symbol.clone(), leverage);
        Ok(())
    }

    async fn klines(&self, symbol: &Symbol, _interval: &str, limit: u32) -> Result<Vec<Kline>> {
        let state = self.state.lock().await;
        let klines = state.klines.get(symbol).cloned().unwrap_or_default();
        let skip = klines.len().saturating_sub(limit as usize);
        Ok(klines.into_iter().skip(skip).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exit::close_order;
    use core_types::OrderSide;
    use rust_decimal_macros::dec;

    fn entry(symbol: &Symbol, price: Decimal, quantity: Decimal) -> OrderRequest {
        OrderRequest {
            symbol: symbol.clone(),
            side: OrderSide::Buy,
            position_side: Side::Long,
            quantity,
            kind: OrderKind::Limit { price, post_only: true },
            reduce_only: false,
        }
    }

    #[tokio::test]
    async fn market_close_books_realized_pnl() {
        let paper = PaperExchange::new(dec!(1000));
        let symbol = Symbol::from("SOL-USDT");
        paper.set_book(&symbol, dec!(99.9), dec!(100.1)).await;
        paper.submit_order(&entry(&symbol, dec!(100), dec!(2))).await.unwrap();

        paper.set_mark(&symbol, dec!(105)).await;
        paper.submit_order(&close_order(&symbol, Side::Long, dec!(1))).await.unwrap();

        assert_eq!(paper.equity().await, dec!(1005));
        assert_eq!(paper.position(&symbol).await.unwrap().quantity, dec!(1));
    }

    #[tokio::test]
    async fn fill_on_cancel_reports_filled() {
        let paper = PaperExchange::new(dec!(1000));
        let symbol = Symbol::from("SOL-USDT");
        paper.set_book(&symbol, dec!(99.9), dec!(100.1)).await;
        paper.set_entry_behavior(FillBehavior::FillOnCancel).await;

        let id = paper.submit_order(&entry(&symbol, dec!(100), dec!(2))).await.unwrap();
        assert_eq!(paper.order_status(&symbol, &id).await.unwrap().status, OrderStatus::New);

        let cancelled = paper.cancel_order(&symbol, &id).await.unwrap();
        assert_eq!(cancelled.status, OrderStatus::Filled);
        assert_eq!(paper.position(&symbol).await.unwrap().quantity, dec!(2));
    }
}

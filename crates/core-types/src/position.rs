// In crates/core-types/src/position.rs

use crate::types::{ContractSpec, ExchangePosition, OrderId, Side, Symbol};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A fully validated order plan for one entry attempt.
///
/// Produced fresh by the sizing engine for every attempt and never persisted.
/// `quantity` is a multiple of the contract step, at least `min_qty`, and its notional
/// at `entry_price` satisfies the contract's minimum notional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizingPlan {
    pub side: Side,
    pub entry_price: Decimal,
    pub quantity: Decimal,
    pub stop_price: Decimal,
    pub take_profit_price: Decimal,
    pub partial_qty: Decimal,
    pub risk_amount: Decimal,
    /// ATR in absolute price units.
    pub atr: Decimal,
    pub stop_distance: Decimal,
}

impl SizingPlan {
    /// Distance from entry to the take-profit level, always positive.
    pub fn take_profit_distance(&self) -> Decimal {
        (self.take_profit_price - self.entry_price).abs()
    }

    /// Share of the position closed at the first take-profit.
    pub fn partial_fraction(&self) -> Decimal {
        if self.quantity.is_zero() {
            return Decimal::ZERO;
        }
        self.partial_qty / self.quantity
    }
}

/// An entry order that has been submitted and not yet resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingEntry {
    pub symbol: Symbol,
    pub order_id: OrderId,
    pub side: Side,
    pub requested_qty: Decimal,
    pub requested_price: Decimal,
    pub submitted_at: DateTime<Utc>,
}

/// Lifecycle phase of an open position. Phases only ever move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PositionPhase {
    Open,
    Tp1Done,
    BreakevenDone,
}

/// A live position owned by the position manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: Symbol,
    pub side: Side,
    /// Remaining quantity; only ever decreases through [`Position::reduce`].
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub original_stop_price: Decimal,
    /// Only ever moves in the favorable direction through [`Position::raise_stop`].
    pub current_stop_price: Decimal,
    pub take_profit_price: Decimal,
    pub atr: Decimal,
    /// One risk unit (1R) in price terms.
    pub stop_distance: Decimal,
    pub partial_qty: Decimal,
    pub phase: PositionPhase,
    /// Set once the first take-profit partial has been taken. Tracked apart from `phase`
    /// because breakeven can fire first when TP1 sits beyond one risk unit.
    #[serde(default)]
    pub tp1_taken: bool,
    pub opened_at: DateTime<Utc>,
    #[serde(default)]
    pub stop_order_id: Option<OrderId>,
    #[serde(default)]
    pub take_profit_order_id: Option<OrderId>,
}

impl Position {
    /// Builds a position from a filled entry.
    ///
    /// Stop and take-profit are re-anchored to the actual fill price, keeping the
    /// planned distances. The partial quantity is scaled when the fill was partial.
    pub fn from_fill(
        symbol: Symbol,
        plan: &SizingPlan,
        spec: &ContractSpec,
        fill_price: Decimal,
        filled_qty: Decimal,
        opened_at: DateTime<Utc>,
    ) -> Self {
        let sign = plan.side.sign();
        let stop = spec.round_price(fill_price - sign * plan.stop_distance);
        let take_profit = spec.round_price(fill_price + sign * plan.take_profit_distance());
        let partial_qty = if filled_qty == plan.quantity {
            plan.partial_qty
        } else {
            spec.floor_to_step(filled_qty * plan.partial_fraction())
        };

        Self {
            symbol,
            side: plan.side,
            quantity: filled_qty,
            entry_price: fill_price,
            original_stop_price: stop,
            current_stop_price: stop,
            take_profit_price: take_profit,
            atr: plan.atr,
            stop_distance: plan.stop_distance,
            partial_qty,
            phase: PositionPhase::Open,
            tp1_taken: false,
            opened_at,
            stop_order_id: None,
            take_profit_order_id: None,
        }
    }

    /// Rebuilds local state for a position the exchange reports but we have no record of.
    pub fn adopt(
        exchange: &ExchangePosition,
        spec: &ContractSpec,
        stop_pct: Decimal,
        reward_risk: Decimal,
        partial_fraction: Decimal,
        opened_at: DateTime<Utc>,
    ) -> Self {
        let sign = exchange.side.sign();
        let stop_distance = exchange.entry_price * stop_pct;
        let stop = spec.round_price(exchange.entry_price - sign * stop_distance);

        Self {
            symbol: exchange.symbol.clone(),
            side: exchange.side,
            quantity: exchange.quantity,
            entry_price: exchange.entry_price,
            original_stop_price: stop,
            current_stop_price: stop,
            take_profit_price: spec
                .round_price(exchange.entry_price + sign * stop_distance * reward_risk),
            atr: stop_distance,
            stop_distance,
            partial_qty: spec.floor_to_step(exchange.quantity * partial_fraction),
            phase: PositionPhase::Open,
            tp1_taken: false,
            opened_at,
            stop_order_id: None,
            take_profit_order_id: None,
        }
    }

    /// Price move from entry, positive when in our favor.
    pub fn favorable_move(&self, price: Decimal) -> Decimal {
        (price - self.entry_price) * self.side.sign()
    }

    /// Price level `r_multiple` risk units away from entry in the favorable direction.
    pub fn r_level(&self, r_multiple: Decimal) -> Decimal {
        self.entry_price + self.side.sign() * self.stop_distance * r_multiple
    }

    /// True once `price` is at or beyond `level` in the favorable direction.
    pub fn has_reached(&self, price: Decimal, level: Decimal) -> bool {
        match self.side {
            Side::Long => price >= level,
            Side::Short => price <= level,
        }
    }

    /// True when `price` has crossed the current stop against the position.
    pub fn stop_crossed(&self, price: Decimal) -> bool {
        match self.side {
            Side::Long => price <= self.current_stop_price,
            Side::Short => price >= self.current_stop_price,
        }
    }

    pub fn is_more_favorable_stop(&self, candidate: Decimal) -> bool {
        match self.side {
            Side::Long => candidate > self.current_stop_price,
            Side::Short => candidate < self.current_stop_price,
        }
    }

    /// Moves the stop to `candidate` if that is strictly more favorable. Returns whether it moved.
    pub fn raise_stop(&mut self, candidate: Decimal) -> bool {
        if self.is_more_favorable_stop(candidate) {
            self.current_stop_price = candidate;
            true
        } else {
            false
        }
    }

    /// Reduces the remaining quantity by `quantity` (clamped at zero). Returns what remains.
    pub fn reduce(&mut self, quantity: Decimal) -> Decimal {
        let quantity = quantity.max(Decimal::ZERO).min(self.quantity);
        self.quantity -= quantity;
        self.quantity
    }

    /// Advances to `phase` if it is later than the current one. Returns whether it moved.
    pub fn advance_phase(&mut self, phase: PositionPhase) -> bool {
        if phase > self.phase {
            self.phase = phase;
            true
        } else {
            false
        }
    }

    pub fn unrealized_pnl(&self, mark: Decimal) -> Decimal {
        self.favorable_move(mark) * self.quantity
    }

    /// Unrealized gain as a fraction of the entry price.
    pub fn pnl_pct(&self, mark: Decimal) -> Decimal {
        if self.entry_price.is_zero() {
            return Decimal::ZERO;
        }
        self.favorable_move(mark) / self.entry_price
    }

    pub fn is_closed(&self) -> bool {
        self.quantity <= Decimal::ZERO
    }
}

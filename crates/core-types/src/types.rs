// In crates/core-types/src/types.rs

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A trading pair symbol as the exchange names it (e.g., "BTC-USDT").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(pub String);

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Symbol {
    fn from(value: &str) -> Self {
        Symbol(value.to_string())
    }
}

/// Direction of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }

    /// +1 for long, -1 for short. Multiplying a price move by this makes favorable moves positive.
    pub fn sign(self) -> Decimal {
        match self {
            Side::Long => Decimal::ONE,
            Side::Short => Decimal::NEGATIVE_ONE,
        }
    }

    /// The order side that opens a position in this direction.
    pub fn entry_order_side(self) -> OrderSide {
        match self {
            Side::Long => OrderSide::Buy,
            Side::Short => OrderSide::Sell,
        }
    }

    /// The order side that reduces a position in this direction.
    pub fn exit_order_side(self) -> OrderSide {
        self.entry_order_side().opposite()
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => f.write_str("LONG"),
            Side::Short => f.write_str("SHORT"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn opposite(self) -> OrderSide {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => f.write_str("BUY"),
            OrderSide::Sell => f.write_str("SELL"),
        }
    }
}

/// Directional output of the signal scorer. Opaque to the core apart from these three numbers.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Signal {
    /// Strength of the long case, 0.0 to 1.0.
    pub long_strength: f64,
    /// Strength of the short case, 0.0 to 1.0.
    pub short_strength: f64,
    /// ATR as a fraction of the last price (e.g., 0.004 for 0.4%).
    pub volatility: f64,
}

impl Signal {
    /// Returns the dominant side and its strength, if one side is strictly stronger
    /// and reaches `min_strength`.
    pub fn direction(&self, min_strength: f64) -> Option<(Side, f64)> {
        let (side, strength) = if self.long_strength > self.short_strength {
            (Side::Long, self.long_strength)
        } else if self.short_strength > self.long_strength {
            (Side::Short, self.short_strength)
        } else {
            return None;
        };
        (strength > 0.0 && strength >= min_strength).then_some((side, strength))
    }
}

/// A single candlestick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kline {
    pub open_time: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// Largest scale a `Decimal` can carry.
pub const MAX_PRECISION: u32 = 28;

/// Per-symbol trading constraints published by the exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractSpec {
    pub symbol: Symbol,
    pub min_qty: Decimal,
    pub step_size: Decimal,
    pub price_precision: u32,
    pub qty_precision: u32,
    pub min_notional: Decimal,
}

impl ContractSpec {
    /// Checks the invariants every other component relies on.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| Error::InvalidContract {
            symbol: self.symbol.0.clone(),
            reason: reason.to_string(),
        };
        if self.step_size <= Decimal::ZERO {
            return Err(invalid("step size must be positive"));
        }
        if self.min_qty < self.step_size {
            return Err(invalid("minimum quantity is smaller than the step size"));
        }
        if self.min_notional < Decimal::ZERO {
            return Err(invalid("minimum notional is negative"));
        }
        if self.price_precision > MAX_PRECISION || self.qty_precision > MAX_PRECISION {
            return Err(invalid("precision exceeds 28 decimal places"));
        }
        Ok(())
    }

    /// Smallest price increment implied by the price precision, capped at `MAX_PRECISION`.
    pub fn tick_size(&self) -> Decimal {
        Decimal::new(1, self.price_precision.min(MAX_PRECISION))
    }

    pub fn floor_to_step(&self, quantity: Decimal) -> Decimal {
        ((quantity / self.step_size).floor() * self.step_size).normalize()
    }

    pub fn ceil_to_step(&self, quantity: Decimal) -> Decimal {
        ((quantity / self.step_size).ceil() * self.step_size).normalize()
    }

    pub fn round_to_step(&self, quantity: Decimal) -> Decimal {
        ((quantity / self.step_size).round() * self.step_size).normalize()
    }

    pub fn is_step_multiple(&self, quantity: Decimal) -> bool {
        (quantity % self.step_size).is_zero()
    }

    pub fn round_price(&self, price: Decimal) -> Decimal {
        price.round_dp(self.price_precision).normalize()
    }
}

/// Balance figures as reported by the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccountBalance {
    pub equity: Decimal,
    pub free_margin: Decimal,
}

/// Balance figures plus the locally tracked high-water mark.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub equity: Decimal,
    pub free_margin: Decimal,
    /// Never below `equity`; only ever ratchets upward.
    pub peak_equity: Decimal,
}

/// Top of the order book.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarketDepth {
    pub best_bid: Decimal,
    pub best_ask: Decimal,
}

impl MarketDepth {
    pub fn validate(&self, symbol: &Symbol) -> Result<()> {
        if self.best_bid <= Decimal::ZERO
            || self.best_ask <= Decimal::ZERO
            || self.best_bid > self.best_ask
        {
            return Err(Error::InvalidDepth {
                symbol: symbol.0.clone(),
                bid: self.best_bid.to_string(),
                ask: self.best_ask.to_string(),
            });
        }
        Ok(())
    }

    /// Relative spread, `(ask - bid) / bid`.
    pub fn spread_pct(&self) -> Decimal {
        if self.best_bid.is_zero() {
            return Decimal::MAX;
        }
        (self.best_ask - self.best_bid) / self.best_bid
    }
}

/// A position as the exchange reports it. The exchange is authoritative for these fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangePosition {
    pub symbol: Symbol,
    pub side: Side,
    /// Always positive; direction lives in `side`.
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub mark_price: Decimal,
    pub unrealized_pnl: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub String);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum OrderKind {
    /// Resting limit order. `post_only` orders are rejected instead of taking liquidity.
    Limit { price: Decimal, post_only: bool },
    Market,
    /// Market order triggered when the mark price crosses `trigger_price`.
    StopMarket { trigger_price: Decimal },
}

/// An order ready to be sent to the exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: Symbol,
    pub side: OrderSide,
    /// The position direction this order opens or reduces.
    pub position_side: Side,
    pub quantity: Decimal,
    pub kind: OrderKind,
    pub reduce_only: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
    Expired,
}

impl OrderStatus {
    /// Terminal statuses never change again.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected | OrderStatus::Expired
        )
    }
}

/// Order status as returned by a status query or a cancellation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderState {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub avg_fill_price: Option<Decimal>,
    pub executed_qty: Decimal,
    pub updated_at: DateTime<Utc>,
}

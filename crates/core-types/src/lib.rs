// In crates/core-types/src/lib.rs

pub mod error;
pub mod position;
pub mod types;

// Re-export the most important types for easy access from other crates.
pub use error::{Error, Result};
pub use position::{PendingEntry, Position, PositionPhase, SizingPlan};
pub use types::{
    AccountBalance, AccountSnapshot, ContractSpec, ExchangePosition, Kline, MarketDepth, OrderId,
    OrderKind, OrderRequest, OrderSide, OrderState, OrderStatus, Side, Signal, Symbol, MAX_PRECISION,
};

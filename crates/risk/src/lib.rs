// In crates/risk/src/lib.rs

//! Pure risk policy: how big to trade, when to get out, and when to stop trading.
//!
//! Nothing in this crate performs I/O. Every component takes the current state of the
//! world as arguments and returns a decision, so the orchestrator decides when to act.

pub mod breaker;
pub mod error;
pub mod manager;
pub mod sizing;
pub mod types;

// Re-export public types
pub use breaker::{BreakerDecision, CircuitBreaker, PortfolioState};
pub use error::{Error, Result, SizingRejection};
pub use manager::{ExitInstruction, ExitReason, PositionManager};
pub use sizing::{SizingEngine, SizingRequest};
pub use types::{BreakerSettings, ExitSettings, SizingSettings};

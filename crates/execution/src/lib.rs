// In crates/execution/src/lib.rs

//! Order execution: the entry state machine and the exit order layer.
//!
//! An entry attempt moves `IDLE -> ENTRY_PENDING -> POSITION_OPEN` inside
//! [`EntryExecutor::enter`] and always resolves before it returns. Once a position is open,
//! [`ExitExecutor`] turns the position manager's instructions into reduce-only orders.

pub mod entry;
pub mod error;
pub mod exit;
pub mod paper;
pub mod types;

// Re-export public types
pub use entry::{EntryExecutor, maker_price};
pub use error::{Error, Result};
pub use exit::{ExitExecutor, close_order, place_protection};
pub use paper::{FillBehavior, PaperExchange};
pub use types::{EntryOutcome, EntryTimings, ExitReport};

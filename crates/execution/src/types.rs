// In crates/execution/src/types.rs

use app_config::ExecutionSettings;
use core_types::{OrderId, Position};
use rust_decimal::Decimal;
use std::time::Duration;

/// Deadlines of a single entry attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryTimings {
    /// Total time an entry order may rest before it is cancelled.
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub post_only: bool,
}

impl From<&ExecutionSettings> for EntryTimings {
    fn from(settings: &ExecutionSettings) -> Self {
        Self {
            timeout: Duration::from_secs(settings.entry_timeout_secs),
            poll_interval: Duration::from_millis(settings.poll_interval_ms),
            post_only: settings.post_only,
        }
    }
}

impl Default for EntryTimings {
    fn default() -> Self {
        Self::from(&ExecutionSettings::default())
    }
}

/// How an entry attempt resolved. Every attempt ends in exactly one of these.
#[derive(Debug, Clone, PartialEq)]
pub enum EntryOutcome {
    /// The order filled, fully or partially. The position carries the protective order ids
    /// that could be placed.
    Filled(Position),
    /// Nothing filled before the deadline and the order was cancelled.
    Cancelled { order_id: OrderId },
    /// The exchange refused the order.
    Rejected { reason: String },
}

/// What the exit layer did with one batch of instructions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExitReport {
    pub closed_qty: Decimal,
    /// Realized PnL estimated at the mark the instructions were evaluated against.
    pub realized_pnl: Decimal,
    pub fully_closed: bool,
    pub protection_refreshed: bool,
}

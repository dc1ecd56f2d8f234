// In crates/engine/src/types.rs

use crate::reconciler::ReconcileReport;
use core_types::{Side, Symbol};
use risk::SizingRejection;
use rust_decimal::Decimal;
use std::fmt;

/// Why a symbol without a position did not get an entry this cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    NoSignal,
    SignalFailed(String),
    LowVolatility { volatility: f64 },
    LowLiquidity { volume_usd: Decimal },
    WideSpread { spread_pct: Decimal },
    NoSlot,
    MarketData(String),
    Sizing(SizingRejection),
    Rejected(String),
    Unfilled,
    Failed(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NoSignal => f.write_str("no qualifying signal"),
            SkipReason::SignalFailed(e) => write!(f, "signal unavailable: {e}"),
            SkipReason::LowVolatility { volatility } => write!(f, "volatility {volatility:.5} below minimum"),
            SkipReason::LowLiquidity { volume_usd } => write!(f, "kline volume {volume_usd} USD below minimum"),
            SkipReason::WideSpread { spread_pct } => write!(f, "spread {spread_pct} above maximum"),
            SkipReason::NoSlot => f.write_str("no free position slot"),
            SkipReason::MarketData(e) => write!(f, "market data unavailable: {e}"),
            SkipReason::Sizing(r) => write!(f, "sizing rejected: {r}"),
            SkipReason::Rejected(r) => write!(f, "exchange rejected entry: {r}"),
            SkipReason::Unfilled => f.write_str("entry cancelled unfilled"),
            SkipReason::Failed(e) => write!(f, "entry failed: {e}"),
        }
    }
}

/// Summary of one orchestrated cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub equity: Decimal,
    pub peak_equity: Decimal,
    pub drawdown_pct: Decimal,
    pub entries_halted: bool,
    pub liquidated: bool,
    pub reconcile: ReconcileReport,
    pub managed: usize,
    pub closed: Vec<Symbol>,
    pub realized_pnl: Decimal,
    pub opened: Vec<(Symbol, Side)>,
    pub skipped: Vec<(Symbol, SkipReason)>,
    pub open_positions: usize,
}

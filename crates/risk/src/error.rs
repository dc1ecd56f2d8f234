// In crates/risk/src/error.rs

use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid risk parameters: {0}")]
    InvalidParameters(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Why no compliant order plan could be built. The symbol is skipped; nothing is submitted.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SizingRejection {
    #[error("account equity is not positive ({equity})")]
    NonPositiveEquity { equity: Decimal },

    #[error("invalid price inputs: {0}")]
    InvalidPrice(String),

    #[error("contract constraints are unusable: {0}")]
    InvalidContract(String),

    #[error("no statistical edge (Kelly fraction {kelly_fraction})")]
    NoEdge { kelly_fraction: Decimal },

    #[error("quantity cannot reach minimum {min_qty} within the margin cap ({max_qty})")]
    BelowMinQty { min_qty: Decimal, max_qty: Decimal },

    #[error("notional {notional} is below minimum {min_notional} and cannot be raised within the margin cap")]
    BelowMinNotional { notional: Decimal, min_notional: Decimal },
}

// In crates/core-types/src/error.rs

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Invalid contract spec for {symbol}: {reason}")]
    InvalidContract { symbol: String, reason: String },

    #[error("Invalid market depth for {symbol}: bid {bid}, ask {ask}")]
    InvalidDepth { symbol: String, bid: String, ask: String },
}

pub type Result<T> = std::result::Result<T, Error>;

// In crates/strategies/src/error.rs

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Not enough klines: need {needed}, got {got}")]
    InsufficientData { needed: usize, got: usize },

    #[error("Indicator error: {0}")]
    Indicator(String),

    #[error("Kline source failed: {0}")]
    Source(String),
}

pub type Result<T> = std::result::Result<T, Error>;

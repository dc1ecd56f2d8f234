// In crates/engine/src/error.rs

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Without an account snapshot nothing in the cycle is safe to do.
    #[error("Account snapshot unavailable: {0}")]
    AccountUnavailable(String),

    #[error("Exchange position list unavailable: {0}")]
    PositionsUnavailable(String),

    #[error("Contract registry error: {0}")]
    Registry(String),

    #[error("Positions still open after liquidation: {0}")]
    Unflattened(String),

    #[error("Snapshot persistence failed: {0}")]
    Persistence(String),

    #[error("Execution error: {0}")]
    Execution(#[from] execution::Error),

    #[error("Exchange error: {0}")]
    Exchange(#[from] api_client::Error),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Persistence(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Persistence(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

// In crates/execution/src/error.rs

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The exchange could not be reached, even after retries.
    #[error("Transient network failure: {0}")]
    TransientNetwork(#[source] api_client::Error),

    /// The exchange refused the request; retrying would not help.
    #[error("Exchange rejected the request: {reason}")]
    ExchangeRejection { reason: String },

    #[error("Entry order {order_id} could not be resolved: {reason}")]
    Unresolved { order_id: String, reason: String },
}

impl From<api_client::Error> for Error {
    fn from(e: api_client::Error) -> Self {
        if e.is_transient() {
            Error::TransientNetwork(e)
        } else {
            Error::ExchangeRejection { reason: e.to_string() }
        }
    }
}

impl Error {
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::TransientNetwork(_) | Error::Unresolved { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

// In crates/api-client/src/error.rs

use thiserror::Error;

/// BingX error code for request-rate limiting.
const RATE_LIMITED: i64 = 100410;
/// BingX error code for an internal server error.
const SERVER_ERROR: i64 = 100500;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to build the API client: {0}")]
    ClientBuildError(String),
    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(#[from] serde_json::Error),
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("API error: code {code}, msg: {msg}")]
    ApiError { code: i64, msg: String },
    #[error("Unexpected response: {0}")]
    InvalidResponse(String),
    #[error("Network error: {0}")]
    Network(String),
}

impl Error {
    /// Whether retrying the same request later could succeed.
    ///
    /// Exchange rejections (bad lot size, insufficient margin, unknown order) are final.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::RequestFailed(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Error::Http { status, .. } => *status == 429 || *status >= 500,
            Error::ApiError { code, .. } => *code == RATE_LIMITED || *code == SERVER_ERROR,
            Error::Network(_) => true,
            Error::ClientBuildError(_) | Error::DeserializationFailed(_) | Error::InvalidResponse(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

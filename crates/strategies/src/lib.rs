// In crates/strategies/src/lib.rs

use async_trait::async_trait;
use core_types::{Kline, Signal, Symbol};

pub mod error;
pub mod micro_score;
pub mod types;

pub use error::{Error, Result};
pub use micro_score::{KlineSignalProvider, MicroScore};

/// The source of directional signals consumed by the engine.
///
/// The engine treats the returned [`Signal`] as opaque: it only reads the two strengths
/// and the volatility. How they are produced is entirely up to the implementation.
#[async_trait]
pub trait SignalProvider: Send + Sync {
    /// The name of the provider, for logs.
    fn name(&self) -> &'static str;

    async fn signal(&self, symbol: &Symbol) -> Result<Signal>;
}

/// Anything that can supply recent candles, newest last.
#[async_trait]
pub trait KlineSource: Send + Sync {
    async fn recent_klines(&self, symbol: &Symbol, interval: &str, limit: u32) -> Result<Vec<Kline>>;
}

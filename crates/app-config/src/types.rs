// In crates/app-config/src/types.rs

use core_types::Symbol;
use risk::types::{BreakerSettings, ExitSettings, SizingSettings};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use strategies::types::MicroScoreSettings;

#[derive(Deserialize, Debug, Clone)]
pub struct Settings {
    /// The application's general settings.
    pub app: AppSettings,
    /// Credentials and endpoints for the exchange.
    pub exchange: ExchangeSettings,
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub execution: ExecutionSettings,
    #[serde(default)]
    pub sizing: SizingSettings,
    #[serde(default)]
    pub exits: ExitSettings,
    #[serde(default)]
    pub breaker: BreakerSettings,
    #[serde(default)]
    pub signal: MicroScoreSettings,
}

#[derive(Deserialize, Debug, Clone)]
pub struct AppSettings {
    /// The environment the application is running in (e.g., "development", "production").
    pub environment: String,
    /// The log level for the application.
    pub log_level: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ExchangeSettings {
    pub api_key: String,
    pub secret_key: String,
    /// The REST API base URL (e.g., "https://open-api.bingx.com").
    pub rest_base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_recv_window_ms")]
    pub recv_window_ms: u64,
    /// Hedge mode keeps separate LONG and SHORT positions per symbol. In one-way mode
    /// every order is sent with `positionSide=BOTH` and closes carry `reduceOnly`.
    #[serde(default = "default_hedge_mode")]
    pub hedge_mode: bool,
}

/// Scheduling, filtering and concurrency limits of the cycle orchestrator.
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct EngineSettings {
    pub symbols: Vec<String>,
    pub cycle_interval_secs: u64,
    /// Deadline for the account and position fetches at the start of a cycle.
    pub cycle_timeout_secs: u64,
    pub max_in_flight_requests: usize,
    pub max_open_positions: usize,
    pub min_signal_strength: f64,
    /// Minimum ATR as a fraction of price.
    pub min_volatility_pct: f64,
    pub max_spread_pct: Decimal,
    /// Minimum quote volume (close times volume) of the latest kline; zero disables the check.
    pub min_volume_usd: Decimal,
    pub snapshot_path: String,
    pub sweep_stale_orders: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            symbols: vec![
                "BTC-USDT".into(),
                "ETH-USDT".into(),
                "SOL-USDT".into(),
                "XRP-USDT".into(),
                "DOGE-USDT".into(),
            ],
            cycle_interval_secs: 2,
            cycle_timeout_secs: 5,
            max_in_flight_requests: 8,
            max_open_positions: 3,
            min_signal_strength: 0.0,
            min_volatility_pct: 0.0015,
            max_spread_pct: dec!(0.001),
            min_volume_usd: dec!(80000),
            snapshot_path: "state/positions.json".into(),
            sweep_stale_orders: true,
        }
    }
}

impl EngineSettings {
    pub fn symbols(&self) -> Vec<Symbol> {
        self.symbols.iter().map(|s| Symbol(s.clone())).collect()
    }
}

/// Bounded exponential backoff shared by every idempotent network call.
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct RetrySettings {
    /// Total attempts including the first one.
    pub max_attempts: usize,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self { max_attempts: 3, base_delay_ms: 200, max_delay_ms: 2_000 }
    }
}

/// Entry order handling.
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ExecutionSettings {
    pub entry_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub post_only: bool,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self { entry_timeout_secs: 8, poll_interval_ms: 500, post_only: true }
    }
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_recv_window_ms() -> u64 {
    5_000
}

fn default_hedge_mode() -> bool {
    true
}

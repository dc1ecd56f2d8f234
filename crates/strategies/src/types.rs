// In crates/strategies/src/types.rs

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct MicroScoreSettings {
    pub kline_interval: String,
    pub kline_limit: u32,
    pub rsi_period: usize,
    pub ema_fast_period: usize,
    pub ema_slow_period: usize,
    pub atr_period: usize,
    pub volume_window: usize,
    /// Last-bar volume must exceed the rolling mean by this factor.
    pub min_volume_ratio: f64,
}

impl Default for MicroScoreSettings {
    fn default() -> Self {
        Self {
            kline_interval: "1m".into(),
            kline_limit: 150,
            rsi_period: 14,
            ema_fast_period: 9,
            ema_slow_period: 21,
            atr_period: 14,
            volume_window: 20,
            min_volume_ratio: 1.2,
        }
    }
}

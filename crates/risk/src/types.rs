// In crates/risk/src/types.rs

use crate::{Error, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Parameters of the risk-sizing engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SizingSettings {
    /// Fraction of equity risked per trade (0.0025 = 0.25%).
    pub risk_fraction_per_trade: Decimal,
    /// Stop distance in ATR units.
    pub stop_atr_multiplier: Decimal,
    /// Minimum stop distance as a fraction of the entry price.
    pub min_stop_floor_pct: Decimal,
    /// Estimated probability that a trade reaches its target.
    pub estimated_win_rate: Decimal,
    /// Reward:risk ratio used for the take-profit level and the Kelly estimate.
    pub take_profit_rr: Decimal,
    /// Multiple of full Kelly actually used.
    pub kelly_cap: Decimal,
    pub leverage: u32,
    /// Fraction of leveraged equity a single position may use.
    pub max_margin_utilization_pct: Decimal,
    /// Fraction of the position closed at the first take-profit.
    pub partial_exit_fraction: Decimal,
}

impl Default for SizingSettings {
    fn default() -> Self {
        Self {
            risk_fraction_per_trade: dec!(0.0025),
            stop_atr_multiplier: dec!(0.8),
            min_stop_floor_pct: dec!(0.001),
            estimated_win_rate: dec!(0.55),
            take_profit_rr: dec!(3),
            kelly_cap: dec!(0.25),
            leverage: 5,
            max_margin_utilization_pct: dec!(0.3),
            partial_exit_fraction: dec!(0.5),
        }
    }
}

impl SizingSettings {
    pub fn validate(&self) -> Result<()> {
        ensure_fraction("risk_fraction_per_trade", self.risk_fraction_per_trade)?;
        ensure_fraction("estimated_win_rate", self.estimated_win_rate)?;
        ensure_fraction("kelly_cap", self.kelly_cap)?;
        ensure_fraction("max_margin_utilization_pct", self.max_margin_utilization_pct)?;
        ensure_fraction("partial_exit_fraction", self.partial_exit_fraction)?;
        if self.stop_atr_multiplier <= Decimal::ZERO && self.min_stop_floor_pct <= Decimal::ZERO {
            return Err(Error::InvalidParameters(
                "either stop_atr_multiplier or min_stop_floor_pct must be positive".into(),
            ));
        }
        if self.take_profit_rr <= Decimal::ZERO {
            return Err(Error::InvalidParameters("take_profit_rr must be positive".into()));
        }
        if self.leverage == 0 {
            return Err(Error::InvalidParameters("leverage must be at least 1".into()));
        }
        Ok(())
    }
}

/// Parameters of the per-position exit rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExitSettings {
    /// Adverse move from entry, as a fraction of entry, that closes everything regardless of ATR.
    pub hard_stop_pct: Decimal,
    /// First take-profit level in R units.
    pub tp1_multiplier: Decimal,
    /// Fraction of the remaining quantity closed when the stop moves to breakeven.
    pub breakeven_exit_fraction: Decimal,
    /// Trailing distance from the mark in R units.
    pub trail_multiplier: Decimal,
    /// Unrealized gain, as a fraction of entry, that closes everything.
    pub profit_target_pct: Decimal,
    /// Stop distance, as a fraction of entry, for positions adopted from the exchange.
    pub adopted_stop_pct: Decimal,
}

impl Default for ExitSettings {
    fn default() -> Self {
        Self {
            hard_stop_pct: dec!(0.03),
            tp1_multiplier: dec!(0.7),
            breakeven_exit_fraction: dec!(0.1),
            trail_multiplier: dec!(0.4),
            profit_target_pct: dec!(0.05),
            adopted_stop_pct: dec!(0.01),
        }
    }
}

impl ExitSettings {
    pub fn validate(&self) -> Result<()> {
        ensure_fraction("breakeven_exit_fraction", self.breakeven_exit_fraction)?;
        for (name, value) in [
            ("hard_stop_pct", self.hard_stop_pct),
            ("tp1_multiplier", self.tp1_multiplier),
            ("trail_multiplier", self.trail_multiplier),
            ("profit_target_pct", self.profit_target_pct),
            ("adopted_stop_pct", self.adopted_stop_pct),
        ] {
            if value <= Decimal::ZERO {
                return Err(Error::InvalidParameters(format!("{name} must be positive")));
            }
        }
        Ok(())
    }
}

/// Parameters of the portfolio circuit breaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerSettings {
    /// Drawdown from peak equity above which new entries are halted.
    pub max_drawdown_stop_pct: Decimal,
    /// How long entries stay halted after a drawdown trip. Zero halts for the tripping cycle only.
    pub cooldown_secs: u64,
    /// Realized plus unrealized PnL, as a fraction of equity, that triggers profit-lock liquidation.
    pub profit_lock_pct: Decimal,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            max_drawdown_stop_pct: dec!(0.05),
            cooldown_secs: 60,
            profit_lock_pct: dec!(0.1),
        }
    }
}

impl BreakerSettings {
    pub fn validate(&self) -> Result<()> {
        ensure_fraction("max_drawdown_stop_pct", self.max_drawdown_stop_pct)?;
        if self.profit_lock_pct <= Decimal::ZERO {
            return Err(Error::InvalidParameters("profit_lock_pct must be positive".into()));
        }
        Ok(())
    }
}

fn ensure_fraction(name: &str, value: Decimal) -> Result<()> {
    if value <= Decimal::ZERO || value > Decimal::ONE {
        return Err(Error::InvalidParameters(format!(
            "{name} must be in (0, 1], got {value}"
        )));
    }
    Ok(())
}

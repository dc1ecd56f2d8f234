// In crates/risk/src/sizing.rs

use crate::SizingRejection;
use crate::types::SizingSettings;
use core_types::{ContractSpec, Side, SizingPlan};
use rust_decimal::Decimal;

/// Inputs for one entry attempt.
#[derive(Debug, Clone)]
pub struct SizingRequest<'a> {
    pub side: Side,
    pub entry_price: Decimal,
    /// ATR in absolute price units.
    pub atr: Decimal,
    pub equity: Decimal,
    pub contract: &'a ContractSpec,
}

/// Turns a directional decision into an exchange-compliant order plan.
///
/// The quantity is the smaller of the risk-limited and Kelly-limited sizes, capped by
/// the per-symbol margin budget, then snapped to the contract's lot step. Lot and
/// notional minimums may raise the quantity, but never past the margin cap: when they
/// would, the attempt is rejected instead of being undersized.
#[derive(Debug, Clone)]
pub struct SizingEngine {
    settings: SizingSettings,
}

impl SizingEngine {
    pub fn new(settings: SizingSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &SizingSettings {
        &self.settings
    }

    /// `max(atr × stop multiplier, entry × floor)`.
    pub fn stop_distance(&self, entry_price: Decimal, atr: Decimal) -> Decimal {
        (atr * self.settings.stop_atr_multiplier)
            .max(entry_price * self.settings.min_stop_floor_pct)
    }

    /// Quantity that loses exactly the per-trade risk budget at `stop_distance`, before lot rounding.
    pub fn risk_limited_quantity(&self, equity: Decimal, stop_distance: Decimal) -> Decimal {
        if stop_distance <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        equity * self.settings.risk_fraction_per_trade / stop_distance
    }

    /// Full Kelly fraction `W - (1 - W) / R`.
    pub fn kelly_fraction(&self) -> Decimal {
        let win = self.settings.estimated_win_rate;
        let reward_risk = self.settings.take_profit_rr;
        if reward_risk <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        win - (Decimal::ONE - win) / reward_risk
    }

    pub fn plan(&self, request: &SizingRequest<'_>) -> Result<SizingPlan, SizingRejection> {
        let SizingRequest { side, entry_price, atr, equity, contract } = *request;

        if equity <= Decimal::ZERO {
            return Err(SizingRejection::NonPositiveEquity { equity });
        }
        if entry_price <= Decimal::ZERO || atr < Decimal::ZERO {
            return Err(SizingRejection::InvalidPrice(format!(
                "entry {entry_price}, atr {atr}"
            )));
        }
        contract
            .validate()
            .map_err(|e| SizingRejection::InvalidContract(e.to_string()))?;

        let risk_amount = equity * self.settings.risk_fraction_per_trade;
        let stop_distance = self.stop_distance(entry_price, atr);
        if stop_distance <= Decimal::ZERO {
            return Err(SizingRejection::InvalidPrice(format!(
                "stop distance is zero at entry {entry_price}"
            )));
        }

        let risk_qty = risk_amount / stop_distance;

        let kelly_fraction = self.kelly_fraction();
        if kelly_fraction <= Decimal::ZERO {
            return Err(SizingRejection::NoEdge { kelly_fraction });
        }
        let kelly_qty = equity * kelly_fraction * self.settings.kelly_cap / stop_distance;

        // Margin cap, expressed as the largest lot-compliant quantity it allows.
        let margin_budget = equity
            * Decimal::from(self.settings.leverage)
            * self.settings.max_margin_utilization_pct;
        let max_qty = contract.floor_to_step(margin_budget / entry_price);

        let mut quantity = contract.round_to_step(risk_qty.min(kelly_qty));
        if quantity > max_qty {
            quantity = max_qty;
        }

        let min_qty = contract.ceil_to_step(contract.min_qty);
        if quantity < min_qty {
            if min_qty > max_qty {
                return Err(SizingRejection::BelowMinQty { min_qty: contract.min_qty, max_qty });
            }
            quantity = min_qty;
        }

        if quantity * entry_price < contract.min_notional {
            let needed = contract.ceil_to_step(contract.min_notional / entry_price);
            if needed > max_qty {
                return Err(SizingRejection::BelowMinNotional {
                    notional: quantity * entry_price,
                    min_notional: contract.min_notional,
                });
            }
            quantity = needed;
        }

        let sign = side.sign();
        let stop_price = contract.round_price(entry_price - sign * stop_distance);
        let take_profit_price = contract
            .round_price(entry_price + sign * stop_distance * self.settings.take_profit_rr);
        let partial_qty = contract.floor_to_step(quantity * self.settings.partial_exit_fraction);

        Ok(SizingPlan {
            side,
            entry_price,
            quantity,
            stop_price,
            take_profit_price,
            partial_qty,
            risk_amount,
            atr,
            stop_distance,
        })
    }
}

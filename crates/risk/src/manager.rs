// In crates/risk/src/manager.rs

use crate::types::ExitSettings;
use core_types::{ContractSpec, Position, PositionPhase};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitReason {
    HardStop,
    TakeProfitPartial,
    Breakeven,
    StopOut,
    ProfitTarget,
    CircuitBreaker,
    Shutdown,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExitReason::HardStop => "hard-stop",
            ExitReason::TakeProfitPartial => "tp1",
            ExitReason::Breakeven => "breakeven",
            ExitReason::StopOut => "stop-out",
            ExitReason::ProfitTarget => "profit-target",
            ExitReason::CircuitBreaker => "circuit-breaker",
            ExitReason::Shutdown => "shutdown",
        };
        f.write_str(name)
    }
}

/// An action for the order layer. The position manager never opens or adds to a position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ExitInstruction {
    ClosePartial { quantity: Decimal, reason: ExitReason },
    CloseAll { quantity: Decimal, reason: ExitReason },
    MoveStop { stop_price: Decimal },
}

impl ExitInstruction {
    pub fn is_full_close(&self) -> bool {
        matches!(self, ExitInstruction::CloseAll { .. })
    }
}

/// Evaluates the exit rules of a single position against the current mark price.
///
/// Rules run in a fixed order: hard percentage stop, first take-profit, breakeven,
/// trailing stop, stop-out, absolute profit target. The position is updated in place
/// (quantity, stop, phase) as instructions are emitted, so calling `evaluate` twice
/// with the same mark yields nothing the second time.
#[derive(Debug, Clone)]
pub struct PositionManager {
    settings: ExitSettings,
}

impl PositionManager {
    pub fn new(settings: ExitSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ExitSettings {
        &self.settings
    }

    pub fn evaluate(
        &self,
        position: &mut Position,
        mark: Decimal,
        contract: &ContractSpec,
    ) -> Vec<ExitInstruction> {
        let mut out = Vec::new();
        if position.is_closed() || mark <= Decimal::ZERO {
            return out;
        }

        // 1. Hard percentage stop, independent of ATR.
        if -position.pnl_pct(mark) > self.settings.hard_stop_pct {
            close_all(position, ExitReason::HardStop, &mut out);
            return out;
        }

        // 2. First take-profit. Still due after breakeven when TP1 sits beyond 1R.
        if !position.tp1_taken
            && position.has_reached(mark, position.r_level(self.settings.tp1_multiplier))
        {
            position.tp1_taken = true;
            position.advance_phase(PositionPhase::Tp1Done);
            let partial = position.partial_qty;
            if close_partial(position, partial, contract, ExitReason::TakeProfitPartial, &mut out) {
                return out;
            }
        }

        // 3. Breakeven at 1R.
        if position.phase < PositionPhase::BreakevenDone
            && position.has_reached(mark, position.r_level(Decimal::ONE))
        {
            position.advance_phase(PositionPhase::BreakevenDone);
            let extra = contract.floor_to_step(position.quantity * self.settings.breakeven_exit_fraction);
            if close_partial(position, extra, contract, ExitReason::Breakeven, &mut out) {
                return out;
            }
            let entry = position.entry_price;
            if position.raise_stop(entry) {
                move_stop(entry, &mut out);
            }
        }

        // 4. Trailing stop once the first target has been taken.
        if position.phase >= PositionPhase::Tp1Done {
            let trail = position.stop_distance * self.settings.trail_multiplier;
            let candidate = contract.round_price(mark - position.side.sign() * trail);
            if position.raise_stop(candidate) {
                move_stop(candidate, &mut out);
            }
        }

        // 5. Stop-out.
        if position.stop_crossed(mark) {
            close_all(position, ExitReason::StopOut, &mut out);
            return out;
        }

        // 6. Absolute profit target.
        if position.pnl_pct(mark) > self.settings.profit_target_pct {
            close_all(position, ExitReason::ProfitTarget, &mut out);
        }

        out
    }

    /// Closes the whole remaining quantity for a reason outside the per-position rules.
    pub fn force_close(&self, position: &mut Position, reason: ExitReason) -> Vec<ExitInstruction> {
        let mut out = Vec::new();
        if !position.is_closed() {
            close_all(position, reason, &mut out);
        }
        out
    }
}

fn close_all(position: &mut Position, reason: ExitReason, out: &mut Vec<ExitInstruction>) {
    let quantity = position.quantity;
    position.reduce(quantity);
    // A pending stop move is moot once everything is closed.
    out.retain(|i| !matches!(i, ExitInstruction::MoveStop { .. }));
    out.push(ExitInstruction::CloseAll { quantity, reason });
}

/// Returns true when the close consumed the whole position.
fn close_partial(
    position: &mut Position,
    quantity: Decimal,
    contract: &ContractSpec,
    reason: ExitReason,
    out: &mut Vec<ExitInstruction>,
) -> bool {
    let quantity = quantity.min(position.quantity);
    if quantity <= Decimal::ZERO {
        return false;
    }
    // Never leave a remainder the exchange would refuse to close.
    if position.quantity - quantity < contract.min_qty {
        close_all(position, reason, out);
        return true;
    }
    position.reduce(quantity);
    out.push(ExitInstruction::ClosePartial { quantity, reason });
    false
}

fn move_stop(stop_price: Decimal, out: &mut Vec<ExitInstruction>) {
    out.retain(|i| !matches!(i, ExitInstruction::MoveStop { .. }));
    out.push(ExitInstruction::MoveStop { stop_price });
}

// In crates/risk/src/breaker.rs

use crate::types::BreakerSettings;
use chrono::{DateTime, Duration, Utc};
use core_types::AccountSnapshot;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Portfolio-wide risk state, recomputed at the start of every cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioState {
    pub peak_equity: Decimal,
    pub cumulative_realized_pnl: Decimal,
    pub drawdown_pct: Decimal,
    pub halt_new_entries: bool,
    pub cooldown_until: Option<DateTime<Utc>>,
}

impl Default for PortfolioState {
    fn default() -> Self {
        Self {
            peak_equity: Decimal::ZERO,
            cumulative_realized_pnl: Decimal::ZERO,
            drawdown_pct: Decimal::ZERO,
            halt_new_entries: false,
            cooldown_until: None,
        }
    }
}

/// Outcome of one breaker evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum BreakerDecision {
    Normal,
    /// Existing positions are still managed; only new entries are suppressed.
    HaltEntries {
        drawdown_pct: Decimal,
        cooldown_until: Option<DateTime<Utc>>,
    },
    /// Close everything and cancel every order.
    Liquidate { locked_pnl: Decimal },
}

impl BreakerDecision {
    pub fn allows_entries(&self) -> bool {
        matches!(self, BreakerDecision::Normal)
    }
}

/// Drawdown halt and profit-lock liquidation across the whole account.
///
/// The breaker owns [`PortfolioState`] and never touches positions itself; it only
/// tells the orchestrator what is allowed this cycle.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    settings: BreakerSettings,
    state: PortfolioState,
}

impl CircuitBreaker {
    pub fn new(settings: BreakerSettings) -> Self {
        Self { settings, state: PortfolioState::default() }
    }

    /// Resumes from persisted figures after a restart.
    pub fn restore(settings: BreakerSettings, peak_equity: Decimal, cumulative_realized_pnl: Decimal) -> Self {
        Self {
            settings,
            state: PortfolioState {
                peak_equity,
                cumulative_realized_pnl,
                ..PortfolioState::default()
            },
        }
    }

    pub fn state(&self) -> &PortfolioState {
        &self.state
    }

    pub fn record_realized(&mut self, pnl: Decimal) {
        self.state.cumulative_realized_pnl += pnl;
    }

    pub fn evaluate(
        &mut self,
        snapshot: &AccountSnapshot,
        unrealized_pnl: Decimal,
        now: DateTime<Utc>,
    ) -> BreakerDecision {
        let state = &mut self.state;
        state.peak_equity = state.peak_equity.max(snapshot.peak_equity).max(snapshot.equity);
        state.drawdown_pct = if state.peak_equity > Decimal::ZERO {
            ((state.peak_equity - snapshot.equity) / state.peak_equity).max(Decimal::ZERO)
        } else {
            Decimal::ZERO
        };

        let total_pnl = state.cumulative_realized_pnl + unrealized_pnl;
        if snapshot.equity > Decimal::ZERO
            && total_pnl > snapshot.equity * self.settings.profit_lock_pct
        {
            tracing::error!(
                locked_pnl = %total_pnl,
                equity = %snapshot.equity,
                "Circuit breaker tripped: profit-lock liquidation."
            );
            // The lock is taken; counting starts over.
            state.cumulative_realized_pnl = Decimal::ZERO;
            state.halt_new_entries = true;
            return BreakerDecision::Liquidate { locked_pnl: total_pnl };
        }

        if state.drawdown_pct > self.settings.max_drawdown_stop_pct {
            let cooldown_until = (self.settings.cooldown_secs > 0)
                .then(|| now + Duration::seconds(self.settings.cooldown_secs as i64));
            state.cooldown_until = cooldown_until;
            state.halt_new_entries = true;
            tracing::error!(
                drawdown_pct = %state.drawdown_pct,
                peak_equity = %state.peak_equity,
                equity = %snapshot.equity,
                "Circuit breaker tripped: drawdown limit exceeded, halting new entries."
            );
            return BreakerDecision::HaltEntries { drawdown_pct: state.drawdown_pct, cooldown_until };
        }

        if let Some(until) = state.cooldown_until {
            if now < until {
                state.halt_new_entries = true;
                return BreakerDecision::HaltEntries {
                    drawdown_pct: state.drawdown_pct,
                    cooldown_until: Some(until),
                };
            }
            state.cooldown_until = None;
        }

        state.halt_new_entries = false;
        BreakerDecision::Normal
    }
}

// In crates/engine/src/reconciler.rs

use crate::registry::ContractRegistry;
use app_config::Settings;
use chrono::{DateTime, Utc};
use core_types::{ExchangePosition, Position, Symbol};
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Parameters for rebuilding a position the exchange knows about and we do not.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdoptionPolicy {
    pub stop_pct: Decimal,
    pub reward_risk: Decimal,
    pub partial_fraction: Decimal,
}

impl From<&Settings> for AdoptionPolicy {
    fn from(settings: &Settings) -> Self {
        Self {
            stop_pct: settings.exits.adopted_stop_pct,
            reward_risk: settings.sizing.take_profit_rr,
            partial_fraction: settings.sizing.partial_exit_fraction,
        }
    }
}

/// What reconciliation changed. Every entry is a resolved state desync.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileReport {
    /// Local positions the exchange no longer reports.
    pub dropped: Vec<Symbol>,
    /// Exchange positions we had no record of.
    pub adopted: Vec<Symbol>,
    /// Local positions shrunk to the exchange quantity.
    pub reduced: Vec<Symbol>,
    /// Local positions rebuilt because side or size disagreed upward.
    pub rebuilt: Vec<Symbol>,
    /// Exchange positions on symbols outside the registry, left alone.
    pub unmanaged: Vec<Symbol>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.dropped.is_empty()
            && self.adopted.is_empty()
            && self.reduced.is_empty()
            && self.rebuilt.is_empty()
    }

    /// Positions that need fresh protective orders.
    pub fn needs_protection(&self) -> impl Iterator<Item = &Symbol> {
        self.adopted.iter().chain(&self.rebuilt).chain(&self.reduced)
    }
}

/// Aligns local positions with the exchange's authoritative list. The exchange always wins.
pub fn reconcile(
    local: &mut HashMap<Symbol, Position>,
    exchange: &HashMap<Symbol, ExchangePosition>,
    registry: &ContractRegistry,
    policy: &AdoptionPolicy,
    now: DateTime<Utc>,
) -> ReconcileReport {
    let mut report = ReconcileReport::default();

    local.retain(|symbol, _| {
        let keep = exchange.contains_key(symbol);
        if !keep {
            tracing::warn!(symbol = %symbol, "State desync: local position not on the exchange, dropping it.");
            report.dropped.push(symbol.clone());
        }
        keep
    });

    for (symbol, remote) in exchange {
        let Some(spec) = registry.get(symbol) else {
            report.unmanaged.push(symbol.clone());
            continue;
        };
        let adopt = || {
            Position::adopt(remote, spec, policy.stop_pct, policy.reward_risk, policy.partial_fraction, now)
        };

        match local.get_mut(symbol) {
            None => {
                tracing::warn!(
                    symbol = %symbol,
                    side = %remote.side,
                    quantity = %remote.quantity,
                    entry = %remote.entry_price,
                    "State desync: adopting unknown exchange position."
                );
                local.insert(symbol.clone(), adopt());
                report.adopted.push(symbol.clone());
            }
            Some(position) if position.side != remote.side || remote.quantity > position.quantity => {
                tracing::warn!(
                    symbol = %symbol,
                    local_side = %position.side,
                    local_qty = %position.quantity,
                    exchange_side = %remote.side,
                    exchange_qty = %remote.quantity,
                    "State desync: rebuilding position from the exchange."
                );
                let mut rebuilt = adopt();
                if position.side == remote.side {
                    rebuilt.raise_stop(position.current_stop_price);
                    rebuilt.advance_phase(position.phase);
                    rebuilt.tp1_taken = position.tp1_taken;
                    rebuilt.opened_at = position.opened_at;
                }
                // Kept so the protection refresh cancels the orders sized for the old position.
                rebuilt.stop_order_id = position.stop_order_id.take();
                rebuilt.take_profit_order_id = position.take_profit_order_id.take();
                *position = rebuilt;
                report.rebuilt.push(symbol.clone());
            }
            Some(position) if remote.quantity < position.quantity => {
                tracing::warn!(
                    symbol = %symbol,
                    local_qty = %position.quantity,
                    exchange_qty = %remote.quantity,
                    "State desync: exchange reports a smaller position, reducing."
                );
                let excess = position.quantity - remote.quantity;
                position.reduce(excess);
                position.partial_qty = position.partial_qty.min(position.quantity);
                report.reduced.push(symbol.clone());
            }
            Some(_) => {}
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::{ContractSpec, OrderId, PositionPhase, Side};
    use rust_decimal_macros::dec;

    fn registry() -> ContractRegistry {
        let spec = ContractSpec {
            symbol: Symbol::from("ETH-USDT"),
            min_qty: dec!(0.01),
            step_size: dec!(0.01),
            price_precision: 2,
            qty_precision: 2,
            min_notional: dec!(5),
        };
        ContractRegistry::from_specs(vec![spec], &[Symbol::from("ETH-USDT")])
    }

    fn policy() -> AdoptionPolicy {
        AdoptionPolicy { stop_pct: dec!(0.01), reward_risk: dec!(3), partial_fraction: dec!(0.5) }
    }

    fn remote(side: Side, quantity: Decimal) -> ExchangePosition {
        ExchangePosition {
            symbol: Symbol::from("ETH-USDT"),
            side,
            quantity,
            entry_price: dec!(2000),
            mark_price: dec!(2010),
            unrealized_pnl: dec!(10),
        }
    }

    fn exchange_with(position: ExchangePosition) -> HashMap<Symbol, ExchangePosition> {
        HashMap::from([(position.symbol.clone(), position)])
    }

    fn local_long(quantity: Decimal) -> HashMap<Symbol, Position> {
        let mut local = HashMap::new();
        reconcile(&mut local, &exchange_with(remote(Side::Long, quantity)), &registry(), &policy(), Utc::now());
        local
    }

    #[test]
    fn unknown_exchange_position_is_adopted() {
        let mut local = HashMap::new();
        let report = reconcile(&mut local, &exchange_with(remote(Side::Long, dec!(1))), &registry(), &policy(), Utc::now());

        assert_eq!(report.adopted, vec![Symbol::from("ETH-USDT")]);
        let position = &local[&Symbol::from("ETH-USDT")];
        assert_eq!(position.current_stop_price, dec!(1980));
        assert_eq!(position.take_profit_price, dec!(2060));
        assert_eq!(position.partial_qty, dec!(0.5));
        assert_eq!(position.phase, PositionPhase::Open);
    }

    #[test]
    fn local_position_missing_on_exchange_is_dropped() {
        let mut local = local_long(dec!(1));
        let report = reconcile(&mut local, &HashMap::new(), &registry(), &policy(), Utc::now());
        assert_eq!(report.dropped, vec![Symbol::from("ETH-USDT")]);
        assert!(local.is_empty());
    }

    #[test]
    fn smaller_exchange_quantity_reduces_local() {
        let mut local = local_long(dec!(1));
        let report = reconcile(&mut local, &exchange_with(remote(Side::Long, dec!(0.4))), &registry(), &policy(), Utc::now());
        assert_eq!(report.reduced, vec![Symbol::from("ETH-USDT")]);
        let position = &local[&Symbol::from("ETH-USDT")];
        assert_eq!(position.quantity, dec!(0.4));
        assert_eq!(position.partial_qty, dec!(0.4));
    }

    #[test]
    fn larger_exchange_quantity_rebuilds_but_keeps_progress() {
        let mut local = local_long(dec!(1));
        {
            let position = local.get_mut(&Symbol::from("ETH-USDT")).unwrap();
            position.raise_stop(dec!(2005));
            position.advance_phase(PositionPhase::Tp1Done);
            position.tp1_taken = true;
            position.reduce(dec!(0.5));
        }

        let report = reconcile(&mut local, &exchange_with(remote(Side::Long, dec!(1))), &registry(), &policy(), Utc::now());

        assert_eq!(report.rebuilt, vec![Symbol::from("ETH-USDT")]);
        let position = &local[&Symbol::from("ETH-USDT")];
        assert_eq!(position.quantity, dec!(1));
        assert_eq!(position.current_stop_price, dec!(2005));
        assert_eq!(position.phase, PositionPhase::Tp1Done);
        assert!(position.tp1_taken);
    }

    #[test]
    fn rebuilt_position_keeps_the_old_order_ids_for_cancellation() {
        let mut local = local_long(dec!(1));
        {
            let position = local.get_mut(&Symbol::from("ETH-USDT")).unwrap();
            position.stop_order_id = Some(OrderId("stop-1".into()));
            position.take_profit_order_id = Some(OrderId("tp-1".into()));
        }

        reconcile(&mut local, &exchange_with(remote(Side::Short, dec!(1))), &registry(), &policy(), Utc::now());

        let position = &local[&Symbol::from("ETH-USDT")];
        assert_eq!(position.side, Side::Short);
        assert_eq!(position.stop_order_id, Some(OrderId("stop-1".into())));
        assert_eq!(position.take_profit_order_id, Some(OrderId("tp-1".into())));
        assert!(!position.tp1_taken);
    }

    #[test]
    fn flipped_side_is_rebuilt_from_scratch() {
        let mut local = local_long(dec!(1));
        let report = reconcile(&mut local, &exchange_with(remote(Side::Short, dec!(1))), &registry(), &policy(), Utc::now());
        assert_eq!(report.rebuilt.len(), 1);
        let position = &local[&Symbol::from("ETH-USDT")];
        assert_eq!(position.side, Side::Short);
        assert_eq!(position.current_stop_price, dec!(2020));
    }

    #[test]
    fn matching_state_is_clean() {
        let mut local = local_long(dec!(1));
        let report = reconcile(&mut local, &exchange_with(remote(Side::Long, dec!(1))), &registry(), &policy(), Utc::now());
        assert!(report.is_clean());
    }

    #[test]
    fn symbols_outside_the_registry_are_left_alone() {
        let mut local = HashMap::new();
        let mut stray = remote(Side::Long, dec!(3));
        stray.symbol = Symbol::from("PEPE-USDT");
        let report = reconcile(&mut local, &exchange_with(stray), &registry(), &policy(), Utc::now());
        assert_eq!(report.unmanaged, vec![Symbol::from("PEPE-USDT")]);
        assert!(local.is_empty());
    }
}

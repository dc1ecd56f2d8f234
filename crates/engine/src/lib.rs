// In crates/engine/src/lib.rs

//! The cycle orchestrator.
//!
//! One [`Engine::run_cycle`] call takes an account snapshot, reconciles local positions
//! with the exchange, consults the circuit breaker, manages open positions and finally
//! attempts new entries. Per-symbol work runs concurrently; every piece of shared state
//! is owned by the engine and only mutated between those concurrent sections.

pub mod account;
pub mod error;
pub mod reconciler;
pub mod registry;
pub mod source;
pub mod store;
pub mod types;

pub use account::AccountTracker;
pub use error::{Error, Result};
pub use reconciler::{AdoptionPolicy, ReconcileReport, reconcile};
pub use registry::ContractRegistry;
pub use source::ExchangeKlines;
pub use store::{EngineSnapshot, SnapshotStore};
pub use types::{CycleReport, SkipReason};

use anyhow::Context;
use api_client::ExchangeClient;
use app_config::{EngineSettings, Settings};
use chrono::Utc;
use core_types::{ContractSpec, ExchangePosition, Position, Side, Symbol};
use execution::{EntryExecutor, EntryOutcome, EntryTimings, ExitExecutor, ExitReport, maker_price};
use futures::future::join_all;
use risk::{BreakerDecision, CircuitBreaker, ExitReason, PositionManager, SizingEngine, SizingRequest};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use strategies::SignalProvider;
use tokio::time::{MissedTickBehavior, timeout};

type Client = Arc<dyn ExchangeClient>;

/// A symbol that passed the signal filters this cycle.
struct Candidate {
    symbol: Symbol,
    side: Side,
    strength: f64,
    volatility: f64,
}

pub struct Engine {
    settings: EngineSettings,
    client: Client,
    signals: Arc<dyn SignalProvider>,
    registry: ContractRegistry,
    account: AccountTracker,
    breaker: CircuitBreaker,
    sizing: SizingEngine,
    manager: PositionManager,
    entries: EntryExecutor<Client>,
    exits: ExitExecutor<Client>,
    adoption: AdoptionPolicy,
    kline_interval: String,
    store: SnapshotStore,
    positions: HashMap<Symbol, Position>,
}

impl Engine {
    /// Loads contracts, sets leverage, restores the last snapshot and reconciles it with
    /// the exchange before the first cycle.
    pub async fn bootstrap(
        settings: &Settings,
        client: Client,
        signals: Arc<dyn SignalProvider>,
    ) -> Result<Self> {
        let engine_settings = settings.engine.clone();
        let registry = ContractRegistry::load(client.as_ref(), &engine_settings.symbols()).await?;

        for symbol in registry.symbols() {
            if let Err(e) = client.set_leverage(symbol, settings.sizing.leverage).await {
                tracing::warn!(symbol = %symbol, error = %e, "Failed to set leverage.");
            }
        }

        let store = SnapshotStore::new(&engine_settings.snapshot_path);
        let restored = store.load()?;
        let (account, breaker, positions) = match restored {
            Some(snapshot) => {
                tracing::info!(
                    positions = snapshot.positions.len(),
                    peak_equity = %snapshot.peak_equity,
                    saved_at = %snapshot.saved_at,
                    "Restored engine snapshot."
                );
                (
                    AccountTracker::with_peak(snapshot.peak_equity),
                    CircuitBreaker::restore(
                        settings.breaker.clone(),
                        snapshot.peak_equity,
                        snapshot.cumulative_realized_pnl,
                    ),
                    snapshot.positions,
                )
            }
            None => (AccountTracker::default(), CircuitBreaker::new(settings.breaker.clone()), HashMap::new()),
        };

        let mut engine = Self {
            client: client.clone(),
            signals,
            registry,
            account,
            breaker,
            sizing: SizingEngine::new(settings.sizing.clone()),
            manager: PositionManager::new(settings.exits.clone()),
            entries: EntryExecutor::new(client.clone(), EntryTimings::from(&settings.execution)),
            exits: ExitExecutor::new(client),
            adoption: AdoptionPolicy::from(settings),
            kline_interval: settings.signal.kline_interval.clone(),
            store,
            positions,
            settings: engine_settings,
        };

        let exchange = engine
            .client
            .open_positions()
            .await
            .map_err(|e| Error::PositionsUnavailable(e.to_string()))?;
        engine.reconcile_with(&exchange).await;

        if engine.settings.sweep_stale_orders {
            for symbol in engine.registry.symbols() {
                if exchange.contains_key(symbol) {
                    continue;
                }
                if let Err(e) = engine.client.cancel_all_orders(symbol).await {
                    tracing::warn!(symbol = %symbol, error = %e, "Stale order sweep failed.");
                }
            }
        }

        tracing::info!(
            symbols = engine.registry.len(),
            positions = engine.positions.len(),
            provider = engine.signals.name(),
            "Engine bootstrapped."
        );
        Ok(engine)
    }

    pub fn registry(&self) -> &ContractRegistry {
        &self.registry
    }

    pub fn positions(&self) -> &HashMap<Symbol, Position> {
        &self.positions
    }

    pub fn portfolio(&self) -> &risk::PortfolioState {
        self.breaker.state()
    }

    /// Runs one full cycle. Only a missing account snapshot or position list aborts it.
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        let now = Utc::now();
        let deadline = Duration::from_secs(self.settings.cycle_timeout_secs);

        let snapshot = timeout(deadline, self.account.refresh(self.client.as_ref()))
            .await
            .map_err(|_| Error::AccountUnavailable("timed out".into()))?
            .map_err(|e| Error::AccountUnavailable(e.to_string()))?;
        let exchange = timeout(deadline, self.client.open_positions())
            .await
            .map_err(|_| Error::PositionsUnavailable("timed out".into()))?
            .map_err(|e| Error::PositionsUnavailable(e.to_string()))?;

        let mut report = CycleReport {
            equity: snapshot.equity,
            reconcile: self.reconcile_with(&exchange).await,
            ..CycleReport::default()
        };

        let unrealized: Decimal = exchange.values().map(|p| p.unrealized_pnl).sum();
        let decision = self.breaker.evaluate(&snapshot, unrealized, now);
        let state = self.breaker.state();
        report.peak_equity = state.peak_equity;
        report.drawdown_pct = state.drawdown_pct;
        report.entries_halted = !decision.allows_entries();

        if let BreakerDecision::Liquidate { locked_pnl } = decision {
            tracing::error!(locked_pnl = %locked_pnl, "Liquidating every position.");
            report.closed = self.liquidate(ExitReason::CircuitBreaker).await;
            report.liquidated = true;
            self.persist();
            self.log_report(&report);
            return Ok(report);
        }

        let managed = self.manage_positions().await;
        report.managed = managed.len();
        for (symbol, outcome) in managed {
            match outcome {
                Ok(exit) => {
                    if !exit.realized_pnl.is_zero() {
                        self.breaker.record_realized(exit.realized_pnl);
                        report.realized_pnl += exit.realized_pnl;
                    }
                    if exit.fully_closed {
                        report.closed.push(symbol);
                    }
                }
                Err(e) => tracing::warn!(symbol = %symbol, error = %e, "Position management failed."),
            }
        }
        self.positions.retain(|_, p| !p.is_closed());

        if decision.allows_entries() {
            let occupied = self.positions.len().max(exchange.len());
            let (opened, skipped) = self.attempt_entries(&exchange, occupied, snapshot.equity).await;
            for position in opened {
                report.opened.push((position.symbol.clone(), position.side));
                self.positions.insert(position.symbol.clone(), position);
            }
            report.skipped = skipped;
        }

        report.open_positions = self.positions.len();
        self.persist();
        self.log_report(&report);
        Ok(report)
    }

    /// Drives cycles on a fixed interval until `shutdown` resolves, then liquidates.
    pub async fn run(&mut self, shutdown: impl Future<Output = ()>) -> anyhow::Result<()> {
        let mut ticker = tokio::time::interval(Duration::from_secs(self.settings.cycle_interval_secs.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested.");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.run_cycle().await {
                        tracing::warn!(error = %e, "Cycle aborted.");
                    }
                }
            }
        }

        self.shutdown().await.context("shutdown liquidation failed")
    }

    /// Closes every position, local and exchange-reported, and cancels every order.
    pub async fn shutdown(&mut self) -> Result<()> {
        let closed = self.liquidate(ExitReason::Shutdown).await;
        self.persist();
        tracing::info!(closed = closed.len(), "Shutdown liquidation complete.");

        let remaining = self.client.open_positions().await?;
        let stuck: Vec<String> = remaining
            .keys()
            .filter(|s| self.registry.get(s).is_some())
            .map(ToString::to_string)
            .collect();
        if !stuck.is_empty() {
            return Err(Error::Unflattened(stuck.join(", ")));
        }
        Ok(())
    }

    async fn reconcile_with(&mut self, exchange: &HashMap<Symbol, ExchangePosition>) -> ReconcileReport {
        let report = reconcile(&mut self.positions, exchange, &self.registry, &self.adoption, Utc::now());
        // A position that vanished usually left one protective order behind when the other fired.
        for symbol in &report.dropped {
            if let Err(e) = self.exits.cancel_all(symbol).await {
                tracing::warn!(symbol = %symbol, error = %e, "Failed to cancel orders of a dropped position.");
            }
        }
        for symbol in report.needs_protection() {
            if let Some(position) = self.positions.get_mut(symbol) {
                self.exits.refresh_protection(position).await;
            }
        }
        report
    }

    /// Evaluates every open position against its mark, concurrently across symbols.
    async fn manage_positions(&mut self) -> Vec<(Symbol, execution::Result<ExitReport>)> {
        let client = &self.client;
        let registry = &self.registry;
        let manager = &self.manager;
        let exits = &self.exits;

        let tasks = self.positions.iter_mut().map(|(symbol, position)| async move {
            let Some(contract) = registry.get(symbol) else {
                return (symbol.clone(), Ok(ExitReport::default()));
            };
            let mark = match client.mark_price(symbol).await {
                Ok(mark) => mark,
                Err(e) => return (symbol.clone(), Err(e.into())),
            };
            let instructions = manager.evaluate(position, mark, contract);
            (symbol.clone(), exits.apply(position, &instructions, mark).await)
        });
        join_all(tasks).await
    }

    /// Collects signals for flat symbols, filters and ranks them, then enters the best.
    async fn attempt_entries(
        &self,
        exchange: &HashMap<Symbol, ExchangePosition>,
        occupied: usize,
        equity: Decimal,
    ) -> (Vec<Position>, Vec<(Symbol, SkipReason)>) {
        let mut skipped = Vec::new();
        let flat: Vec<&Symbol> = self
            .registry
            .symbols()
            .iter()
            .filter(|s| !self.positions.contains_key(*s) && !exchange.contains_key(*s))
            .collect();

        let signals = join_all(flat.iter().map(|symbol| self.signals.signal(symbol))).await;

        let mut candidates = Vec::new();
        for (symbol, signal) in flat.into_iter().zip(signals) {
            let signal = match signal {
                Ok(signal) => signal,
                Err(e) => {
                    skipped.push((symbol.clone(), SkipReason::SignalFailed(e.to_string())));
                    continue;
                }
            };
            let Some((side, strength)) = signal.direction(self.settings.min_signal_strength) else {
                skipped.push((symbol.clone(), SkipReason::NoSignal));
                continue;
            };
            if signal.volatility < self.settings.min_volatility_pct {
                skipped.push((symbol.clone(), SkipReason::LowVolatility { volatility: signal.volatility }));
                continue;
            }
            candidates.push(Candidate { symbol: symbol.clone(), side, strength, volatility: signal.volatility });
        }

        let mut candidates = self.filter_liquid(candidates, &mut skipped).await;
        candidates.sort_by(|a, b| b.strength.total_cmp(&a.strength));
        let slots = self.settings.max_open_positions.saturating_sub(occupied);
        for late in candidates.split_off(slots.min(candidates.len())) {
            skipped.push((late.symbol, SkipReason::NoSlot));
        }

        let attempts = candidates.iter().filter_map(|candidate| {
            let contract = self.registry.get(&candidate.symbol)?;
            Some(self.enter(candidate, contract, equity))
        });

        let mut opened = Vec::new();
        for (symbol, result) in join_all(attempts).await {
            match result {
                Ok(position) => opened.push(position),
                Err(reason) => skipped.push((symbol, reason)),
            }
        }

        for (symbol, reason) in &skipped {
            tracing::info!(symbol = %symbol, reason = %reason, "Entry skipped.");
        }
        (opened, skipped)
    }

    /// Drops candidates whose latest kline traded less than `min_volume_usd` in quote terms.
    async fn filter_liquid(
        &self,
        candidates: Vec<Candidate>,
        skipped: &mut Vec<(Symbol, SkipReason)>,
    ) -> Vec<Candidate> {
        let minimum = self.settings.min_volume_usd;
        if minimum <= Decimal::ZERO {
            return candidates;
        }
        let volumes = join_all(
            candidates
                .iter()
                .map(|c| self.client.klines(&c.symbol, &self.kline_interval, 1)),
        )
        .await;

        let mut liquid = Vec::with_capacity(candidates.len());
        for (candidate, klines) in candidates.into_iter().zip(volumes) {
            let last = match klines {
                Ok(mut klines) => klines.pop(),
                Err(e) => {
                    skipped.push((candidate.symbol, SkipReason::MarketData(e.to_string())));
                    continue;
                }
            };
            let Some(last) = last else {
                skipped.push((candidate.symbol, SkipReason::MarketData("no klines returned".into())));
                continue;
            };
            let volume_usd = last.close * last.volume;
            if volume_usd < minimum {
                skipped.push((candidate.symbol, SkipReason::LowLiquidity { volume_usd }));
                continue;
            }
            liquid.push(candidate);
        }
        liquid
    }

    /// One entry attempt, fully resolved before it returns.
    async fn enter(
        &self,
        candidate: &Candidate,
        contract: &ContractSpec,
        equity: Decimal,
    ) -> (Symbol, std::result::Result<Position, SkipReason>) {
        let symbol = candidate.symbol.clone();
        let depth = match self.client.market_depth(&symbol).await {
            Ok(depth) => depth,
            Err(e) => return (symbol, Err(SkipReason::MarketData(e.to_string()))),
        };
        if let Err(e) = depth.validate(&symbol) {
            return (symbol, Err(SkipReason::MarketData(e.to_string())));
        }
        let spread_pct = depth.spread_pct();
        if spread_pct > self.settings.max_spread_pct {
            return (symbol, Err(SkipReason::WideSpread { spread_pct }));
        }

        let entry_price = maker_price(candidate.side, &depth, contract);
        let volatility = Decimal::from_f64(candidate.volatility).unwrap_or(Decimal::ZERO).round_dp(8);
        let atr = volatility * entry_price;
        let request = SizingRequest { side: candidate.side, entry_price, atr, equity, contract };
        let plan = match self.sizing.plan(&request) {
            Ok(plan) => plan,
            Err(rejection) => return (symbol, Err(SkipReason::Sizing(rejection))),
        };
        tracing::info!(
            symbol = %symbol,
            side = %plan.side,
            strength = candidate.strength,
            quantity = %plan.quantity,
            entry = %plan.entry_price,
            stop = %plan.stop_price,
            take_profit = %plan.take_profit_price,
            risk = %plan.risk_amount,
            "Entry planned."
        );

        let outcome = match self.entries.enter(&plan, contract).await {
            Ok(EntryOutcome::Filled(position)) => Ok(position),
            Ok(EntryOutcome::Cancelled { .. }) => Err(SkipReason::Unfilled),
            Ok(EntryOutcome::Rejected { reason }) => Err(SkipReason::Rejected(reason)),
            Err(e) => Err(SkipReason::Failed(e.to_string())),
        };
        (symbol, outcome)
    }

    /// Force-closes every local position, flattens whatever else the exchange reports on
    /// registered symbols, and cancels all their orders. Returns the closed symbols.
    async fn liquidate(&mut self, reason: ExitReason) -> Vec<Symbol> {
        let mut closed = Vec::new();
        for (symbol, position) in self.positions.iter_mut() {
            let mark = match self.client.mark_price(symbol).await {
                Ok(mark) => mark,
                Err(e) => {
                    tracing::warn!(symbol = %symbol, error = %e, "Mark unavailable during liquidation; using entry price.");
                    position.entry_price
                }
            };
            let instructions = self.manager.force_close(position, reason);
            match self.exits.apply(position, &instructions, mark).await {
                Ok(_) => closed.push(symbol.clone()),
                Err(e) => tracing::error!(symbol = %symbol, error = %e, "Liquidation close failed."),
            }
        }
        self.positions.clear();

        match self.client.open_positions().await {
            Ok(remaining) => {
                for position in remaining.values().filter(|p| self.registry.get(&p.symbol).is_some()) {
                    match self.exits.flatten(position).await {
                        Ok(()) => closed.push(position.symbol.clone()),
                        Err(e) => tracing::error!(symbol = %position.symbol, error = %e, "Failed to flatten exchange position."),
                    }
                }
            }
            Err(e) => tracing::error!(error = %e, "Could not list exchange positions during liquidation."),
        }

        for symbol in self.registry.symbols() {
            if let Err(e) = self.exits.cancel_all(symbol).await {
                tracing::warn!(symbol = %symbol, error = %e, "Failed to cancel orders during liquidation.");
            }
        }
        closed.sort();
        closed.dedup();
        closed
    }

    fn persist(&self) {
        let state = self.breaker.state();
        let snapshot = EngineSnapshot {
            saved_at: Utc::now(),
            peak_equity: state.peak_equity.max(self.account.peak_equity()),
            cumulative_realized_pnl: state.cumulative_realized_pnl,
            positions: self.positions.clone(),
        };
        if let Err(e) = self.store.save(&snapshot) {
            tracing::error!(path = %self.store.path().display(), error = %e, "Failed to persist snapshot.");
        }
    }

    fn log_report(&self, report: &CycleReport) {
        tracing::info!(
            equity = %report.equity,
            peak_equity = %report.peak_equity,
            drawdown_pct = %report.drawdown_pct,
            halted = report.entries_halted,
            liquidated = report.liquidated,
            managed = report.managed,
            closed = report.closed.len(),
            opened = report.opened.len(),
            skipped = report.skipped.len(),
            open_positions = report.open_positions,
            "Cycle complete."
        );
    }
}

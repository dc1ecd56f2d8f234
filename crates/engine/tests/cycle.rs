// In crates/engine/tests/cycle.rs

use api_client::ExchangeClient;
use app_config::{AppSettings, EngineSettings, ExchangeSettings, Settings};
use async_trait::async_trait;
use core_types::{ContractSpec, Kline, PositionPhase, Side, Signal, Symbol};
use engine::{Engine, Error, SkipReason, SnapshotStore};
use execution::{FillBehavior, PaperExchange};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use strategies::SignalProvider;

/// Returns whatever signal the test configured for a symbol, or a flat one.
#[derive(Default)]
struct FixedSignals {
    signals: Mutex<HashMap<Symbol, Signal>>,
}

impl FixedSignals {
    fn set(&self, symbol: &str, long_strength: f64, short_strength: f64, volatility: f64) {
        self.signals
            .lock()
            .unwrap()
            .insert(Symbol::from(symbol), Signal { long_strength, short_strength, volatility });
    }
}

#[async_trait]
impl SignalProvider for FixedSignals {
    fn name(&self) -> &'static str {
        "fixed"
    }

    async fn signal(&self, symbol: &Symbol) -> strategies::Result<Signal> {
        Ok(self.signals.lock().unwrap().get(symbol).copied().unwrap_or_default())
    }
}

fn contract(symbol: &str, step: Decimal, price_precision: u32) -> ContractSpec {
    ContractSpec {
        symbol: Symbol::from(symbol),
        min_qty: step,
        step_size: step,
        price_precision,
        qty_precision: step.scale(),
        min_notional: dec!(5),
    }
}

fn kline(close: Decimal, volume: Decimal) -> Kline {
    Kline { open_time: 0, open: close, high: close, low: close, close, volume }
}

fn settings(snapshot: &Path) -> Settings {
    Settings {
        app: AppSettings { environment: "test".into(), log_level: "debug".into() },
        exchange: ExchangeSettings {
            api_key: "key".into(),
            secret_key: "secret".into(),
            rest_base_url: "http://localhost".into(),
            request_timeout_secs: 5,
            recv_window_ms: 5_000,
            hedge_mode: true,
        },
        engine: EngineSettings {
            symbols: vec!["BTC-USDT".into(), "SOL-USDT".into()],
            snapshot_path: snapshot.to_string_lossy().into_owned(),
            ..EngineSettings::default()
        },
        retry: Default::default(),
        execution: Default::default(),
        sizing: Default::default(),
        exits: Default::default(),
        breaker: Default::default(),
        signal: Default::default(),
    }
}

struct Harness {
    paper: Arc<PaperExchange>,
    signals: Arc<FixedSignals>,
    settings: Settings,
    _dir: tempfile::TempDir,
}

impl Harness {
    async fn new(equity: Decimal) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let paper = Arc::new(PaperExchange::new(equity));
        paper.add_contract(contract("BTC-USDT", dec!(0.001), 1)).await;
        paper.add_contract(contract("SOL-USDT", dec!(0.1), 2)).await;
        paper.set_book(&Symbol::from("BTC-USDT"), dec!(59999.9), dec!(60000.1)).await;
        paper.set_book(&Symbol::from("SOL-USDT"), dec!(99.99), dec!(100.01)).await;
        paper.set_klines(&Symbol::from("BTC-USDT"), vec![kline(dec!(60000), dec!(10))]).await;
        paper.set_klines(&Symbol::from("SOL-USDT"), vec![kline(dec!(100), dec!(5000))]).await;
        Self {
            paper,
            signals: Arc::new(FixedSignals::default()),
            settings: settings(&dir.path().join("positions.json")),
            _dir: dir,
        }
    }

    async fn engine(&self) -> Engine {
        let client: Arc<dyn ExchangeClient> = self.paper.clone();
        Engine::bootstrap(&self.settings, client, self.signals.clone()).await.unwrap()
    }

    fn store(&self) -> SnapshotStore {
        SnapshotStore::new(&self.settings.engine.snapshot_path)
    }
}

#[tokio::test(start_paused = true)]
async fn strong_signal_opens_a_protected_position() {
    let h = Harness::new(dec!(10000)).await;
    h.signals.set("BTC-USDT", 0.8, 0.1, 0.004);
    let mut engine = h.engine().await;

    let report = engine.run_cycle().await.unwrap();

    let btc = Symbol::from("BTC-USDT");
    assert_eq!(report.opened, vec![(btc.clone(), Side::Long)]);
    assert!(report.skipped.iter().any(|(s, r)| s == &Symbol::from("SOL-USDT") && *r == SkipReason::NoSignal));

    // 0.25% of 10000 risked over a 192 stop distance (0.8 x ATR of 240).
    let position = &engine.positions()[&btc];
    assert_eq!(position.quantity, dec!(0.130));
    assert_eq!(position.entry_price, dec!(60000.0));
    assert_eq!(position.current_stop_price, dec!(59808.0));
    assert_eq!(h.paper.position(&btc).await.unwrap().quantity, dec!(0.130));
    assert_eq!(h.paper.open_orders(&btc).await.len(), 2);
    assert_eq!(h.paper.leverage(&btc).await, Some(5));
}

#[tokio::test(start_paused = true)]
async fn drawdown_halt_blocks_entries_but_keeps_managing() {
    let h = Harness::new(dec!(1000)).await;
    let mut engine = h.engine().await;
    engine.run_cycle().await.unwrap();

    let sol = Symbol::from("SOL-USDT");
    h.paper.insert_position(&sol, Side::Long, dec!(2), dec!(100)).await;
    h.paper.set_equity(dec!(940)).await;
    h.paper.set_mark(&sol, dec!(98.5)).await;
    h.signals.set("BTC-USDT", 0.9, 0.0, 0.004);

    let report = engine.run_cycle().await.unwrap();

    assert!(report.entries_halted);
    assert!(report.drawdown_pct > dec!(0.05));
    assert_eq!(report.reconcile.adopted, vec![sol.clone()]);
    assert_eq!(report.closed, vec![sol.clone()]);
    assert!(report.opened.is_empty());
    assert!(h.paper.position(&sol).await.is_none());
    assert!(h.paper.position(&Symbol::from("BTC-USDT")).await.is_none());
}

#[tokio::test(start_paused = true)]
async fn missing_account_snapshot_aborts_the_cycle() {
    let h = Harness::new(dec!(10000)).await;
    h.signals.set("BTC-USDT", 0.8, 0.1, 0.004);
    let mut engine = h.engine().await;
    h.paper.set_account_unavailable(true).await;

    let err = engine.run_cycle().await.unwrap_err();

    assert!(matches!(err, Error::AccountUnavailable(_)));
    assert!(h.paper.submitted_orders().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn bootstrap_adopts_and_protects_unknown_positions() {
    let h = Harness::new(dec!(10000)).await;
    let sol = Symbol::from("SOL-USDT");
    h.paper.insert_position(&sol, Side::Short, dec!(3), dec!(100)).await;

    let engine = h.engine().await;

    let position = &engine.positions()[&sol];
    assert_eq!(position.side, Side::Short);
    assert_eq!(position.current_stop_price, dec!(101));
    assert_eq!(position.phase, PositionPhase::Open);
    assert_eq!(h.paper.open_orders(&sol).await.len(), 2);
    // Stale orders are only swept where nothing is open.
    assert_eq!(h.paper.cancel_all_calls().await, vec![Symbol::from("BTC-USDT")]);
}

#[tokio::test(start_paused = true)]
async fn profit_lock_liquidates_everything() {
    let h = Harness::new(dec!(1000)).await;
    let mut engine = h.engine().await;

    let sol = Symbol::from("SOL-USDT");
    h.paper.insert_position(&sol, Side::Long, dec!(10), dec!(100)).await;
    h.paper.set_mark(&sol, dec!(112)).await;

    let report = engine.run_cycle().await.unwrap();

    assert!(report.liquidated);
    assert!(report.opened.is_empty());
    assert!(engine.positions().is_empty());
    assert!(h.paper.position(&sol).await.is_none());
    assert_eq!(engine.portfolio().cumulative_realized_pnl, Decimal::ZERO);
    assert_eq!(h.paper.equity().await, dec!(1120));
}

#[tokio::test(start_paused = true)]
async fn unfilled_entry_is_cancelled_and_skipped() {
    let h = Harness::new(dec!(10000)).await;
    h.signals.set("BTC-USDT", 0.8, 0.1, 0.004);
    h.paper.set_entry_behavior(FillBehavior::Never).await;
    let mut engine = h.engine().await;

    let report = engine.run_cycle().await.unwrap();

    assert!(report.opened.is_empty());
    assert!(report.skipped.contains(&(Symbol::from("BTC-USDT"), SkipReason::Unfilled)));
    assert!(engine.positions().is_empty());
    assert!(h.paper.open_orders(&Symbol::from("BTC-USDT")).await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn open_slots_go_to_the_strongest_signals() {
    let mut h = Harness::new(dec!(10000)).await;
    h.settings.engine.max_open_positions = 1;
    h.signals.set("BTC-USDT", 0.6, 0.0, 0.004);
    h.signals.set("SOL-USDT", 0.0, 0.9, 0.004);
    let mut engine = h.engine().await;

    let report = engine.run_cycle().await.unwrap();

    assert_eq!(report.opened, vec![(Symbol::from("SOL-USDT"), Side::Short)]);
    assert!(report.skipped.contains(&(Symbol::from("BTC-USDT"), SkipReason::NoSlot)));
}

#[tokio::test(start_paused = true)]
async fn snapshot_survives_a_restart() {
    let h = Harness::new(dec!(10000)).await;
    h.signals.set("BTC-USDT", 0.8, 0.1, 0.004);
    let mut engine = h.engine().await;
    engine.run_cycle().await.unwrap();

    let saved = h.store().load().unwrap().unwrap();
    assert_eq!(saved.positions.len(), 1);
    assert_eq!(saved.peak_equity, dec!(10000));

    h.signals.set("BTC-USDT", 0.0, 0.0, 0.004);
    let restarted = h.engine().await;
    let btc = Symbol::from("BTC-USDT");
    assert_eq!(restarted.positions()[&btc], saved.positions[&btc]);
    assert_eq!(restarted.portfolio().peak_equity, dec!(10000));
}

#[tokio::test(start_paused = true)]
async fn shutdown_flattens_and_clears_the_snapshot() {
    let h = Harness::new(dec!(10000)).await;
    h.signals.set("BTC-USDT", 0.8, 0.1, 0.004);
    let mut engine = h.engine().await;
    engine.run_cycle().await.unwrap();
    let sol = Symbol::from("SOL-USDT");
    h.paper.insert_position(&sol, Side::Short, dec!(1), dec!(100)).await;

    engine.shutdown().await.unwrap();

    assert!(h.paper.position(&Symbol::from("BTC-USDT")).await.is_none());
    assert!(h.paper.position(&sol).await.is_none());
    assert!(h.paper.open_orders(&Symbol::from("BTC-USDT")).await.is_empty());
    assert!(h.store().load().unwrap().unwrap().positions.is_empty());
}

#[tokio::test(start_paused = true)]
async fn thin_volume_blocks_the_entry() {
    let h = Harness::new(dec!(10000)).await;
    h.signals.set("BTC-USDT", 0.8, 0.1, 0.004);
    let btc = Symbol::from("BTC-USDT");
    // 1.2 BTC at 60000 is 72000 USD, under the 80000 default.
    h.paper.set_klines(&btc, vec![kline(dec!(60000), dec!(0.5)), kline(dec!(60000), dec!(1.2))]).await;
    let mut engine = h.engine().await;

    let report = engine.run_cycle().await.unwrap();

    assert!(report.opened.is_empty());
    assert!(report.skipped.contains(&(btc.clone(), SkipReason::LowLiquidity { volume_usd: dec!(72000) })));
    assert!(h.paper.submitted_orders().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn vanished_position_leaves_no_resting_orders() {
    let h = Harness::new(dec!(10000)).await;
    h.signals.set("BTC-USDT", 0.8, 0.1, 0.004);
    let mut engine = h.engine().await;
    engine.run_cycle().await.unwrap();
    let btc = Symbol::from("BTC-USDT");
    assert_eq!(h.paper.open_orders(&btc).await.len(), 2);

    // Closed outside the engine, e.g. the stop fired while the take-profit kept resting.
    h.paper.remove_position(&btc).await;
    h.signals.set("BTC-USDT", 0.0, 0.0, 0.004);
    let report = engine.run_cycle().await.unwrap();

    assert_eq!(report.reconcile.dropped, vec![btc.clone()]);
    assert!(engine.positions().is_empty());
    assert!(h.paper.open_orders(&btc).await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn shrunk_position_is_reprotected_without_duplicates() {
    let h = Harness::new(dec!(10000)).await;
    h.signals.set("BTC-USDT", 0.8, 0.1, 0.004);
    let mut engine = h.engine().await;
    engine.run_cycle().await.unwrap();
    let btc = Symbol::from("BTC-USDT");

    h.paper.insert_position(&btc, Side::Long, dec!(0.065), dec!(60000)).await;
    let report = engine.run_cycle().await.unwrap();

    assert_eq!(report.reconcile.reduced, vec![btc.clone()]);
    let resting = h.paper.open_orders(&btc).await;
    assert_eq!(resting.len(), 2);
    assert!(resting.iter().all(|o| o.quantity == dec!(0.065)));
    assert_eq!(engine.positions()[&btc].quantity, dec!(0.065));
}

#[tokio::test(start_paused = true)]
async fn flipped_position_is_reprotected_without_duplicates() {
    let h = Harness::new(dec!(10000)).await;
    h.signals.set("BTC-USDT", 0.8, 0.1, 0.004);
    let mut engine = h.engine().await;
    engine.run_cycle().await.unwrap();
    let btc = Symbol::from("BTC-USDT");

    h.paper.insert_position(&btc, Side::Short, dec!(0.2), dec!(60000)).await;
    let report = engine.run_cycle().await.unwrap();

    assert_eq!(report.reconcile.rebuilt, vec![btc.clone()]);
    let resting = h.paper.open_orders(&btc).await;
    assert_eq!(resting.len(), 2);
    assert!(resting.iter().all(|o| o.position_side == Side::Short && o.quantity == dec!(0.2)));
}

// In crates/engine/src/store.rs

use crate::Result;
use chrono::{DateTime, Utc};
use core_types::{Position, Symbol};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Everything needed to resume after a crash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub saved_at: DateTime<Utc>,
    pub peak_equity: Decimal,
    pub cumulative_realized_pnl: Decimal,
    pub positions: HashMap<Symbol, Position>,
}

/// JSON snapshot file, replaced atomically on every save.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes to a sibling temporary file and renames it over the snapshot.
    pub fn save(&self, snapshot: &EngineSnapshot) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(snapshot)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Reads the last snapshot. A missing file is a fresh start; a corrupt one is ignored.
    pub fn load(&self) -> Result<Option<EngineSnapshot>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_slice(&bytes) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Ignoring corrupt snapshot.");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::{PositionPhase, Side};
    use rust_decimal_macros::dec;

    fn snapshot() -> EngineSnapshot {
        let symbol = Symbol::from("BTC-USDT");
        let position = Position {
            symbol: symbol.clone(),
            side: Side::Short,
            quantity: dec!(0.012),
            entry_price: dec!(61000),
            original_stop_price: dec!(61500),
            current_stop_price: dec!(61200),
            take_profit_price: dec!(59500),
            atr: dec!(600),
            stop_distance: dec!(500),
            partial_qty: dec!(0.006),
            phase: PositionPhase::Tp1Done,
            tp1_taken: true,
            opened_at: Utc::now(),
            stop_order_id: None,
            take_profit_order_id: None,
        };
        EngineSnapshot {
            saved_at: Utc::now(),
            peak_equity: dec!(1250.5),
            cumulative_realized_pnl: dec!(12.25),
            positions: HashMap::from([(symbol, position)]),
        }
    }

    #[test]
    fn save_then_load_restores_positions() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("state").join("positions.json"));

        let saved = snapshot();
        store.save(&saved).unwrap();
        let loaded = store.load().unwrap().unwrap();

        assert_eq!(loaded, saved);
        assert!(!dir.path().join("state").join("positions.json.tmp").exists());
    }

    #[test]
    fn missing_file_is_a_fresh_start() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("positions.json"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn corrupt_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("positions.json");
        fs::write(&path, b"{ not json").unwrap();
        assert!(SnapshotStore::new(path).load().unwrap().is_none());
    }
}

// In crates/engine/src/registry.rs

use crate::{Error, Result};
use api_client::ExchangeClient;
use core_types::{ContractSpec, Symbol};
use std::collections::HashMap;

/// Per-symbol trading constraints, loaded once at startup and read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct ContractRegistry {
    specs: HashMap<Symbol, ContractSpec>,
    /// Configured symbols that have a valid spec, in configuration order.
    order: Vec<Symbol>,
}

impl ContractRegistry {
    /// Fetches every contract and keeps the configured symbols with a valid spec.
    pub async fn load<C: ExchangeClient + ?Sized>(client: &C, symbols: &[Symbol]) -> Result<Self> {
        let specs = client.contract_specs().await?;
        let registry = Self::from_specs(specs, symbols);
        if registry.is_empty() {
            return Err(Error::Registry("none of the configured symbols is tradable".into()));
        }
        tracing::info!(count = registry.len(), "Contract registry loaded.");
        Ok(registry)
    }

    pub fn from_specs(specs: Vec<ContractSpec>, symbols: &[Symbol]) -> Self {
        let mut by_symbol: HashMap<Symbol, ContractSpec> =
            specs.into_iter().map(|s| (s.symbol.clone(), s)).collect();

        let mut registry = Self::default();
        for symbol in symbols {
            let Some(spec) = by_symbol.remove(symbol) else {
                tracing::warn!(symbol = %symbol, "Configured symbol has no tradable contract; skipping.");
                continue;
            };
            if let Err(e) = spec.validate() {
                tracing::warn!(symbol = %symbol, error = %e, "Contract spec rejected; skipping.");
                continue;
            }
            registry.order.push(symbol.clone());
            registry.specs.insert(symbol.clone(), spec);
        }
        registry
    }

    pub fn get(&self, symbol: &Symbol) -> Option<&ContractSpec> {
        self.specs.get(symbol)
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.order
    }

    pub fn specs(&self) -> impl Iterator<Item = &ContractSpec> {
        self.order.iter().filter_map(|s| self.specs.get(s))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

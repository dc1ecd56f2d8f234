// In crates/engine/src/account.rs

use api_client::ExchangeClient;
use core_types::{AccountBalance, AccountSnapshot};
use rust_decimal::Decimal;

/// Produces account snapshots and owns the peak-equity high-water mark.
///
/// The peak only ever moves up.
#[derive(Debug, Clone, Default)]
pub struct AccountTracker {
    peak_equity: Decimal,
}

impl AccountTracker {
    pub fn with_peak(peak_equity: Decimal) -> Self {
        Self { peak_equity: peak_equity.max(Decimal::ZERO) }
    }

    pub fn peak_equity(&self) -> Decimal {
        self.peak_equity
    }

    /// Ratchets the peak with a fresh balance and returns the resulting snapshot.
    pub fn observe(&mut self, balance: AccountBalance) -> AccountSnapshot {
        self.peak_equity = self.peak_equity.max(balance.equity);
        AccountSnapshot {
            equity: balance.equity,
            free_margin: balance.free_margin,
            peak_equity: self.peak_equity,
        }
    }

    pub async fn refresh<C: ExchangeClient + ?Sized>(&mut self, client: &C) -> api_client::Result<AccountSnapshot> {
        let balance = client.account().await?;
        Ok(self.observe(balance))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn balance(equity: Decimal) -> AccountBalance {
        AccountBalance { equity, free_margin: equity }
    }

    #[test]
    fn peak_ratchets_up_only() {
        let mut tracker = AccountTracker::with_peak(dec!(1000));
        assert_eq!(tracker.observe(balance(dec!(940))).peak_equity, dec!(1000));
        assert_eq!(tracker.observe(balance(dec!(1020))).peak_equity, dec!(1020));
        let snapshot = tracker.observe(balance(dec!(990)));
        assert_eq!(snapshot.peak_equity, dec!(1020));
        assert_eq!(snapshot.equity, dec!(990));
        assert!(snapshot.peak_equity >= snapshot.equity);
    }
}

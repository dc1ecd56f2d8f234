// In crates/api-client/src/types.rs
//
// Wire shapes of the BingX perpetual swap REST API. Every endpoint decodes into exactly
// one of these structs, and every conversion into a core type happens here.

use crate::{Error, Result};
use chrono::{TimeZone, Utc};
use core_types::{
    AccountBalance, ContractSpec, ExchangePosition, Kline, MarketDepth, OrderId, OrderState,
    OrderStatus, Side, Symbol, MAX_PRECISION,
};
use rust_decimal::Decimal;
use serde::Deserialize;

/// The `{code, msg, data}` wrapper around every response.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub code: i64,
    #[serde(default)]
    pub msg: String,
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    /// Checks the code once and hands back the payload.
    pub fn into_data(self) -> Result<T> {
        if self.code != 0 {
            return Err(Error::ApiError { code: self.code, msg: self.msg });
        }
        self.data
            .ok_or_else(|| Error::InvalidResponse("missing data field".to_string()))
    }
}

/// Order ids arrive as numbers on some endpoints and strings on others.
#[derive(Debug, Deserialize, Clone)]
#[serde(untagged)]
pub enum RawId {
    Num(i64),
    Str(String),
}

impl From<RawId> for OrderId {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Num(n) => OrderId(n.to_string()),
            RawId::Str(s) => OrderId(s),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RawContract {
    pub symbol: String,
    pub quantity_precision: u32,
    pub price_precision: u32,
    #[serde(default)]
    pub trade_min_quantity: Option<Decimal>,
    #[serde(default, rename = "tradeMinUSDT")]
    pub trade_min_usdt: Option<Decimal>,
    /// 1 = tradable.
    #[serde(default)]
    pub status: Option<i64>,
}

impl RawContract {
    pub fn is_tradable(&self) -> bool {
        self.status.is_none_or(|s| s == 1)
    }

    /// Precisions are carried as reported; `ContractSpec::validate` rejects out-of-range ones.
    pub fn into_spec(self) -> ContractSpec {
        let step_size = Decimal::new(1, self.quantity_precision.min(MAX_PRECISION));
        ContractSpec {
            symbol: Symbol(self.symbol),
            min_qty: self.trade_min_quantity.unwrap_or(step_size).max(step_size),
            step_size,
            price_precision: self.price_precision,
            qty_precision: self.quantity_precision,
            min_notional: self.trade_min_usdt.unwrap_or(Decimal::ZERO),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RawDepth {
    pub bids: Vec<(Decimal, Decimal)>,
    pub asks: Vec<(Decimal, Decimal)>,
}

impl RawDepth {
    /// Best bid is the highest bid and best ask the lowest ask, whatever order the levels arrive in.
    pub fn into_depth(self, symbol: &Symbol) -> Result<MarketDepth> {
        let best_bid = self.bids.iter().map(|(p, _)| *p).max();
        let best_ask = self.asks.iter().map(|(p, _)| *p).min();
        match (best_bid, best_ask) {
            (Some(best_bid), Some(best_ask)) => Ok(MarketDepth { best_bid, best_ask }),
            _ => Err(Error::InvalidResponse(format!("empty order book for {symbol}"))),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RawPremiumIndex {
    pub mark_price: Decimal,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct RawBalanceFields {
    #[serde(default)]
    pub asset: Option<String>,
    #[serde(default)]
    pub balance: Option<Decimal>,
    #[serde(default)]
    pub equity: Option<Decimal>,
    #[serde(default)]
    pub available_margin: Option<Decimal>,
}

impl RawBalanceFields {
    fn into_balance(self) -> Result<AccountBalance> {
        let equity = self
            .equity
            .or(self.balance)
            .ok_or_else(|| Error::InvalidResponse("balance without equity".to_string()))?;
        Ok(AccountBalance { equity, free_margin: self.available_margin.unwrap_or(equity) })
    }
}

/// Every shape the balance endpoint has been observed to return.
#[derive(Debug, Deserialize, Clone)]
#[serde(untagged)]
pub enum RawBalance {
    /// `[{"asset": "USDT", "equity": "..."}]`
    List(Vec<RawBalanceFields>),
    /// `{"balance": {"equity": "...", "availableMargin": "..."}}`
    Nested { balance: RawBalanceFields },
    /// `{"balance": "123.45"}`
    NestedScalar { balance: Decimal },
    /// `"123.45"`
    Scalar(Decimal),
}

impl RawBalance {
    pub fn into_balance(self) -> Result<AccountBalance> {
        match self {
            RawBalance::Nested { balance } => balance.into_balance(),
            RawBalance::NestedScalar { balance } | RawBalance::Scalar(balance) => {
                Ok(AccountBalance { equity: balance, free_margin: balance })
            }
            RawBalance::List(accounts) => {
                let pick = accounts
                    .iter()
                    .position(|a| a.asset.as_deref() == Some("USDT"))
                    .unwrap_or(0);
                accounts
                    .into_iter()
                    .nth(pick)
                    .ok_or_else(|| Error::InvalidResponse("empty balance list".to_string()))?
                    .into_balance()
            }
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RawPosition {
    pub symbol: String,
    /// "LONG", "SHORT" or "BOTH".
    #[serde(default)]
    pub position_side: Option<String>,
    pub position_amt: Decimal,
    pub avg_price: Decimal,
    #[serde(default)]
    pub mark_price: Option<Decimal>,
    #[serde(default)]
    pub unrealized_profit: Option<Decimal>,
}

impl RawPosition {
    /// `None` for flat entries.
    pub fn into_position(self) -> Option<ExchangePosition> {
        if self.position_amt.is_zero() {
            return None;
        }
        let side = match self.position_side.as_deref() {
            Some("LONG") => Side::Long,
            Some("SHORT") => Side::Short,
            _ if self.position_amt.is_sign_negative() => Side::Short,
            _ => Side::Long,
        };
        Some(ExchangePosition {
            symbol: Symbol(self.symbol),
            side,
            quantity: self.position_amt.abs(),
            entry_price: self.avg_price,
            mark_price: self.mark_price.unwrap_or(self.avg_price),
            unrealized_pnl: self.unrealized_profit.unwrap_or(Decimal::ZERO),
        })
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RawOrderWrapper {
    pub order: RawOrder,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RawOrder {
    pub order_id: RawId,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub avg_price: Option<Decimal>,
    #[serde(default)]
    pub executed_qty: Option<Decimal>,
    #[serde(default)]
    pub update_time: Option<i64>,
}

impl RawOrder {
    pub fn into_state(self) -> Result<OrderState> {
        let status = match self.status.as_deref() {
            Some("NEW") | Some("PENDING") => OrderStatus::New,
            Some("PARTIALLY_FILLED") => OrderStatus::PartiallyFilled,
            Some("FILLED") => OrderStatus::Filled,
            Some("CANCELED") | Some("CANCELLED") => OrderStatus::Cancelled,
            Some("FAILED") | Some("REJECTED") => OrderStatus::Rejected,
            Some("EXPIRED") => OrderStatus::Expired,
            other => {
                return Err(Error::InvalidResponse(format!("unknown order status {other:?}")));
            }
        };
        let avg_fill_price = self.avg_price.filter(|p| *p > Decimal::ZERO);
        let updated_at = self
            .update_time
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .unwrap_or_else(Utc::now);
        Ok(OrderState {
            order_id: self.order_id.into(),
            status,
            avg_fill_price,
            executed_qty: self.executed_qty.unwrap_or(Decimal::ZERO),
            updated_at,
        })
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RawKline {
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub time: i64,
}

impl From<RawKline> for Kline {
    fn from(raw: RawKline) -> Self {
        Kline {
            open_time: raw.time,
            open: raw.open,
            high: raw.high,
            low: raw.low,
            close: raw.close,
            volume: raw.volume,
        }
    }
}

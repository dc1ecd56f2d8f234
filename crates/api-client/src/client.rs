// In crates/api-client/src/client.rs

use crate::types::{
    Envelope, RawBalance, RawContract, RawDepth, RawKline, RawOrderWrapper, RawPosition,
    RawPremiumIndex,
};
use crate::{Error, ExchangeClient, Result};
use app_config::ExchangeSettings;
use async_trait::async_trait;
use chrono::Utc;
use core_types::{
    AccountBalance, ContractSpec, ExchangePosition, Kline, MarketDepth, OrderId, OrderKind,
    OrderRequest, OrderState, Side, Symbol,
};
use hmac::{Hmac, Mac};
use reqwest::{Client, Method};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use sha2::Sha256;
use std::collections::HashMap;
use std::time::Duration;

// Create a type alias for the HMAC-SHA256 implementation.
type HmacSha256 = Hmac<Sha256>;

/// Signed REST client for the BingX perpetual swap API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    /// The persistent HTTP client.
    http_client: Client,
    api_key: String,
    secret_key: String,
    /// The base URL, e.g. `https://open-api.bingx.com`.
    base_url: String,
    recv_window_ms: u64,
    hedge_mode: bool,
}

impl ApiClient {
    /// Constructs a new ApiClient from the exchange settings.
    pub fn new(settings: &ExchangeSettings) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .user_agent(concat!("perp-lifecycle/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::ClientBuildError(e.to_string()))?;

        Ok(Self {
            http_client,
            api_key: settings.api_key.clone(),
            secret_key: settings.secret_key.clone(),
            base_url: settings.rest_base_url.trim_end_matches('/').to_string(),
            recv_window_ms: settings.recv_window_ms,
            hedge_mode: settings.hedge_mode,
        })
    }

    /// Generates a hex HMAC-SHA256 signature for a query string.
    fn sign(&self, query_string: &str) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(self.secret_key.as_bytes())
            .map_err(|e| Error::ClientBuildError(format!("invalid secret key: {e}")))?;
        mac.update(query_string.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    fn encode(params: &[(&str, String)]) -> String {
        params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Sends a request and unwraps the `{code, msg, data}` envelope.
    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        mut params: Vec<(&str, String)>,
        signed: bool,
    ) -> Result<T> {
        let query = if signed {
            params.push(("recvWindow", self.recv_window_ms.to_string()));
            params.push(("timestamp", Utc::now().timestamp_millis().to_string()));
            let query = Self::encode(&params);
            let signature = self.sign(&query)?;
            format!("{query}&signature={signature}")
        } else {
            Self::encode(&params)
        };

        let url = if query.is_empty() {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}{}?{}", self.base_url, path, query)
        };

        let mut builder = self.http_client.request(method.clone(), &url);
        if signed {
            builder = builder.header("X-BX-APIKEY", &self.api_key);
        }

        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            tracing::warn!(%method, path, status = status.as_u16(), "Exchange returned an HTTP error.");
            return Err(Error::Http { status: status.as_u16(), body: text });
        }

        let envelope: Envelope<T> = serde_json::from_str(&text)?;
        envelope.into_data()
    }

    /// In hedge mode the exchange rejects `reduceOnly`; the `positionSide` opposite to the
    /// order side already makes the order a close.
    fn order_params(order: &OrderRequest, hedge_mode: bool) -> Vec<(&'static str, String)> {
        let position_side = match (hedge_mode, order.position_side) {
            (false, _) => "BOTH",
            (true, Side::Long) => "LONG",
            (true, Side::Short) => "SHORT",
        };
        let mut params = vec![
            ("symbol", order.symbol.0.clone()),
            ("side", order.side.to_string()),
            ("positionSide", position_side.to_string()),
            ("quantity", order.quantity.normalize().to_string()),
        ];
        if !hedge_mode && order.reduce_only {
            params.push(("reduceOnly", "true".into()));
        }
        match order.kind {
            OrderKind::Limit { price, post_only } => {
                params.push(("type", "LIMIT".into()));
                params.push(("price", price.normalize().to_string()));
                let tif = if post_only { "PostOnly" } else { "GTC" };
                params.push(("timeInForce", tif.into()));
            }
            OrderKind::Market => params.push(("type", "MARKET".into())),
            OrderKind::StopMarket { trigger_price } => {
                params.push(("type", "STOP_MARKET".into()));
                params.push(("stopPrice", trigger_price.normalize().to_string()));
                params.push(("workingType", "MARK_PRICE".into()));
            }
        }
        params
    }
}

/// Keys positions by symbol. A hedge account holding both sides of one symbol cannot be
/// represented, so the larger side is kept and the collision is logged.
fn index_positions(positions: impl IntoIterator<Item = ExchangePosition>) -> HashMap<Symbol, ExchangePosition> {
    let mut by_symbol: HashMap<Symbol, ExchangePosition> = HashMap::new();
    for position in positions {
        match by_symbol.get(&position.symbol) {
            Some(existing) => {
                tracing::error!(
                    symbol = %position.symbol,
                    kept_side = %existing.side,
                    kept_qty = %existing.quantity,
                    other_side = %position.side,
                    other_qty = %position.quantity,
                    "Exchange reports both position sides on one symbol."
                );
                if position.quantity > existing.quantity {
                    by_symbol.insert(position.symbol.clone(), position);
                }
            }
            None => {
                by_symbol.insert(position.symbol.clone(), position);
            }
        }
    }
    by_symbol
}

#[async_trait]
impl ExchangeClient for ApiClient {
    async fn contract_specs(&self) -> Result<Vec<ContractSpec>> {
        let raw: Vec<RawContract> = self
            .request(Method::GET, "/openApi/swap/v2/quote/contracts", vec![], false)
            .await?;
        Ok(raw
            .into_iter()
            .filter(RawContract::is_tradable)
            .map(RawContract::into_spec)
            .collect())
    }

    async fn market_depth(&self, symbol: &Symbol) -> Result<MarketDepth> {
        let raw: RawDepth = self
            .request(
                Method::GET,
                "/openApi/swap/v2/quote/depth",
                vec![("symbol", symbol.0.clone()), ("limit", "5".into())],
                false,
            )
            .await?;
        raw.into_depth(symbol)
    }

    async fn mark_price(&self, symbol: &Symbol) -> Result<Decimal> {
        let raw: RawPremiumIndex = self
            .request(
                Method::GET,
                "/openApi/swap/v2/quote/premiumIndex",
                vec![("symbol", symbol.0.clone())],
                false,
            )
            .await?;
        Ok(raw.mark_price)
    }

    async fn account(&self) -> Result<AccountBalance> {
        let raw: RawBalance = self
            .request(Method::GET, "/openApi/swap/v2/user/balance", vec![], true)
            .await?;
        raw.into_balance()
    }

    async fn open_positions(&self) -> Result<HashMap<Symbol, ExchangePosition>> {
        let raw: Vec<RawPosition> = self
            .request(Method::GET, "/openApi/swap/v2/user/positions", vec![], true)
            .await?;
        Ok(index_positions(raw.into_iter().filter_map(RawPosition::into_position)))
    }

    async fn submit_order(&self, order: &OrderRequest) -> Result<OrderId> {
        let raw: RawOrderWrapper = self
            .request(Method::POST, "/openApi/swap/v2/trade/order", Self::order_params(order, self.hedge_mode), true)
            .await?;
        Ok(raw.order.order_id.into())
    }

    async fn order_status(&self, symbol: &Symbol, order_id: &OrderId) -> Result<OrderState> {
        let raw: RawOrderWrapper = self
            .request(
                Method::GET,
                "/openApi/swap/v2/trade/order",
                vec![("symbol", symbol.0.clone()), ("orderId", order_id.0.clone())],
                true,
            )
            .await?;
        raw.order.into_state()
    }

    async fn cancel_order(&self, symbol: &Symbol, order_id: &OrderId) -> Result<OrderState> {
        let raw: RawOrderWrapper = self
            .request(
                Method::DELETE,
                "/openApi/swap/v2/trade/order",
                vec![("symbol", symbol.0.clone()), ("orderId", order_id.0.clone())],
                true,
            )
            .await?;
        raw.order.into_state()
    }

    async fn cancel_all_orders(&self, symbol: &Symbol) -> Result<()> {
        let _: serde_json::Value = self
            .request(
                Method::DELETE,
                "/openApi/swap/v2/trade/allOpenOrders",
                vec![("symbol", symbol.0.clone())],
                true,
            )
            .await?;
        Ok(())
    }

    async fn set_leverage(&self, symbol: &Symbol, leverage: u32) -> Result<()> {
        for side in ["LONG", "SHORT"] {
            let _: serde_json::Value = self
                .request(
                    Method::POST,
                    "/openApi/swap/v2/trade/leverage",
                    vec![
                        ("symbol", symbol.0.clone()),
                        ("side", side.to_string()),
                        ("leverage", leverage.to_string()),
                    ],
                    true,
                )
                .await?;
        }
        Ok(())
    }

    async fn klines(&self, symbol: &Symbol, interval: &str, limit: u32) -> Result<Vec<Kline>> {
        let raw: Vec<RawKline> = self
            .request(
                Method::GET,
                "/openApi/swap/v3/quote/klines",
                vec![
                    ("symbol", symbol.0.clone()),
                    ("interval", interval.to_string()),
                    ("limit", limit.to_string()),
                ],
                false,
            )
            .await?;
        let mut klines: Vec<Kline> = raw.into_iter().map(Kline::from).collect();
        // The endpoint returns newest first.
        klines.sort_by_key(|k| k.open_time);
        Ok(klines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::OrderSide;
    use rust_decimal_macros::dec;

    fn client() -> ApiClient {
        ApiClient::new(&ExchangeSettings {
            api_key: "key".into(),
            secret_key: "secret".into(),
            rest_base_url: "https://open-api.bingx.com/".into(),
            request_timeout_secs: 5,
            recv_window_ms: 5000,
            hedge_mode: true,
        })
        .unwrap()
    }

    #[test]
    fn signature_is_hex_hmac_of_query() {
        let signature = client().sign("symbol=BTC-USDT&timestamp=1700000000000").unwrap();
        assert_eq!(signature.len(), 64);
        assert!(signature.chars().all(|c| c.is_ascii_hexdigit()));
        // Deterministic for the same input.
        assert_eq!(signature, client().sign("symbol=BTC-USDT&timestamp=1700000000000").unwrap());
    }

    #[test]
    fn post_only_limit_order_params() {
        let order = OrderRequest {
            symbol: Symbol::from("BTC-USDT"),
            side: OrderSide::Buy,
            position_side: Side::Long,
            quantity: dec!(0.0100),
            kind: OrderKind::Limit { price: dec!(60000.50), post_only: true },
            reduce_only: false,
        };
        let params = ApiClient::order_params(&order, true);
        let query = ApiClient::encode(&params);
        assert_eq!(
            query,
            "symbol=BTC-USDT&side=BUY&positionSide=LONG&quantity=0.01&type=LIMIT&price=60000.5&timeInForce=PostOnly"
        );
    }

    #[test]
    fn protective_stop_params() {
        let order = OrderRequest {
            symbol: Symbol::from("BTC-USDT"),
            side: OrderSide::Sell,
            position_side: Side::Long,
            quantity: dec!(0.01),
            kind: OrderKind::StopMarket { trigger_price: dec!(59000) },
            reduce_only: true,
        };
        let params = ApiClient::order_params(&order, true);
        assert!(params.contains(&("type", "STOP_MARKET".to_string())));
        assert!(params.contains(&("stopPrice", "59000".to_string())));
        assert!(params.contains(&("positionSide", "LONG".to_string())));
        assert!(!params.iter().any(|(k, _)| *k == "reduceOnly"));
    }

    #[test]
    fn one_way_mode_marks_closes_reduce_only() {
        let close = OrderRequest {
            symbol: Symbol::from("ETH-USDT"),
            side: OrderSide::Buy,
            position_side: Side::Short,
            quantity: dec!(0.5),
            kind: OrderKind::Market,
            reduce_only: true,
        };
        let params = ApiClient::order_params(&close, false);
        assert!(params.contains(&("positionSide", "BOTH".to_string())));
        assert!(params.contains(&("reduceOnly", "true".to_string())));

        let entry = OrderRequest { reduce_only: false, side: OrderSide::Sell, ..close };
        let params = ApiClient::order_params(&entry, false);
        assert!(!params.iter().any(|(k, _)| *k == "reduceOnly"));
    }

    fn exchange_position(side: Side, quantity: Decimal) -> ExchangePosition {
        ExchangePosition {
            symbol: Symbol::from("BTC-USDT"),
            side,
            quantity,
            entry_price: dec!(60000),
            mark_price: dec!(60000),
            unrealized_pnl: Decimal::ZERO,
        }
    }

    #[test]
    fn both_sides_on_one_symbol_keep_the_larger() {
        let indexed = index_positions(vec![
            exchange_position(Side::Long, dec!(0.02)),
            exchange_position(Side::Short, dec!(0.05)),
        ]);
        assert_eq!(indexed.len(), 1);
        let kept = &indexed[&Symbol::from("BTC-USDT")];
        assert_eq!((kept.side, kept.quantity), (Side::Short, dec!(0.05)));

        let indexed = index_positions(vec![
            exchange_position(Side::Long, dec!(0.05)),
            exchange_position(Side::Short, dec!(0.02)),
        ]);
        assert_eq!(indexed[&Symbol::from("BTC-USDT")].side, Side::Long);
    }

    #[test]
    fn base_url_is_trimmed() {
        assert_eq!(client().base_url, "https://open-api.bingx.com");
    }
}

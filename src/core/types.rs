use crate::core::errors::ClientError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// One price level of an order-book ladder.
///
/// Decimal values throughout this module stay verbatim strings: the
/// exchange emits arbitrary-precision decimals and callers decide how to
/// parse them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: String,
    pub quantity: String,
}

/// Order-book snapshot (REST `depth`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderBook {
    pub last_update_id: i64,
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
}

/// Incremental order-book change (`depthUpdate` stream).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepthUpdate {
    pub event_type: String,
    pub event_time: i64,
    pub symbol: String,
    /// Underlying pair, present on delivery streams only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pair: Option<String>,
    pub first_update_id: i64,
    pub final_update_id: i64,
    pub bid_depth: Vec<BookLevel>,
    pub ask_depth: Vec<BookLevel>,
}

/// Top-N order-book snapshot (`depth<levels>` stream).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialDepth {
    pub symbol: String,
    pub level: u16,
    pub last_update_id: i64,
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
}

/// OHLCV bar (`kline` stream).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Candle {
    pub event_type: String,
    pub event_time: i64,
    pub symbol: String,
    pub start_time: i64,
    pub close_time: i64,
    pub first_trade_id: i64,
    pub last_trade_id: i64,
    pub interval: String,
    pub open: String,
    pub high: String,
    pub low: String,
    pub close: String,
    pub volume: String,
    pub trades: i64,
    pub is_final: bool,
    pub quote_volume: String,
    pub buy_volume: String,
    pub quote_buy_volume: String,
}

/// Rolling 24h statistics (`ticker` stream).
///
/// Best bid/ask and previous-day close exist on spot wire messages only;
/// the derivatives lines omit them.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticker {
    pub event_type: String,
    pub event_time: i64,
    pub symbol: String,
    pub price_change: String,
    pub price_change_percent: String,
    pub weighted_avg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev_day_close: Option<String>,
    pub cur_day_close: String,
    pub close_trade_quantity: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_bid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_bid_quantity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_ask: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_ask_quantity: Option<String>,
    pub open: String,
    pub high: String,
    pub low: String,
    pub volume: String,
    pub volume_quote: String,
    pub open_time: i64,
    pub close_time: i64,
    pub first_trade_id: i64,
    pub last_trade_id: i64,
    pub total_trades: i64,
}

/// Compact daily statistics (`miniTicker` stream).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MiniTicker {
    pub event_type: String,
    pub event_time: i64,
    pub symbol: String,
    pub cur_day_close: String,
    pub open: String,
    pub high: String,
    pub low: String,
    pub volume: String,
    pub volume_quote: String,
}

/// Coalesced fills at one price (`aggTrade` stream).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggTrade {
    pub event_type: String,
    pub event_time: i64,
    pub timestamp: i64,
    pub symbol: String,
    pub price: String,
    pub quantity: String,
    pub is_buyer_maker: bool,
    /// Spot streams flag whether the trade was at the best price.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub was_best_price: Option<bool>,
    pub agg_id: i64,
    pub first_id: i64,
    pub last_id: i64,
}

/// Single raw fill (`trade` stream).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketTrade {
    pub event_type: String,
    pub event_time: i64,
    pub trade_time: i64,
    pub symbol: String,
    pub price: String,
    pub quantity: String,
    pub is_buyer_maker: bool,
    pub trade_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buyer_order_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seller_order_id: Option<i64>,
}

/// Forced liquidation order (`forceOrder` stream, derivatives only).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiquidationOrder {
    pub symbol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pair: Option<String>,
    pub side: String,
    pub order_type: String,
    pub time_in_force: String,
    pub quantity: String,
    pub price: String,
    pub average_price: String,
    pub status: String,
    pub last_filled_quantity: String,
    pub accumulated_quantity: String,
    pub time: i64,
}

/// OHLCV bar from the REST candles endpoint (the wire shape is a
/// positional array).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestCandle {
    pub open_time: i64,
    pub open: String,
    pub high: String,
    pub low: String,
    pub close: String,
    pub volume: String,
    pub close_time: i64,
    pub quote_volume: String,
    pub trades: i64,
    pub base_asset_volume: String,
    pub quote_asset_volume: String,
}

/// Best bid/ask summary from the REST bookTicker endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookTicker {
    pub symbol: String,
    pub bid_price: String,
    pub bid_qty: String,
    pub ask_price: String,
    pub ask_qty: String,
}

/// One asset row in an account snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountBalance {
    pub asset: String,
    pub free: String,
    pub locked: String,
}

/// Account balances pushed on the user stream.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountPosition {
    pub event_type: String,
    pub event_time: i64,
    pub last_account_update: i64,
    pub balances: Vec<AccountBalance>,
}

/// Single-asset balance delta pushed on the user stream.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceUpdate {
    pub event_type: String,
    pub event_time: i64,
    pub asset: String,
    pub balance_delta: String,
    pub clear_time: i64,
}

/// Order state change pushed on the user stream (`executionReport`).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReport {
    pub event_type: String,
    pub event_time: i64,
    pub symbol: String,
    pub new_client_order_id: String,
    pub original_client_order_id: String,
    pub side: String,
    pub order_type: String,
    pub time_in_force: String,
    pub quantity: String,
    pub price: String,
    pub execution_type: String,
    pub stop_price: String,
    pub iceberg_quantity: String,
    pub order_status: String,
    pub order_reject_reason: String,
    pub order_id: i64,
    pub order_time: i64,
    pub last_trade_quantity: String,
    pub total_trade_quantity: String,
    pub price_last_trade: String,
    pub commission: String,
    pub commission_asset: Option<String>,
    pub trade_id: i64,
    pub is_order_working: bool,
    pub is_buyer_maker: bool,
    pub creation_time: i64,
    pub total_quote_trade_quantity: String,
    pub order_list_id: i64,
    pub quote_order_quantity: String,
    pub last_quote_transacted: String,
}

/// Margin-call warning on a derivatives user stream.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarginCall {
    pub event_type: String,
    pub event_time: i64,
    pub cross_wallet_balance: Option<String>,
    pub positions: Vec<MarginCallPosition>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarginCallPosition {
    pub symbol: String,
    pub position_side: String,
    pub position_amount: String,
    pub margin_type: String,
    pub isolated_wallet: String,
    pub mark_price: String,
    pub unrealized_pnl: String,
    pub maintenance_margin_required: String,
}

/// Balance/position refresh on a derivatives user stream.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FuturesAccountUpdate {
    pub event_type: String,
    pub event_time: i64,
    pub transaction_time: i64,
    pub event_reason_type: String,
    pub balances: Vec<FuturesBalance>,
    pub positions: Vec<FuturesPosition>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FuturesBalance {
    pub asset: String,
    pub wallet_balance: String,
    pub cross_wallet_balance: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FuturesPosition {
    pub symbol: String,
    pub position_amount: String,
    pub entry_price: String,
    pub accumulated_realized: String,
    pub unrealized_pnl: String,
    pub margin_type: String,
    pub isolated_wallet: String,
    pub position_side: String,
}

/// Order state change on a derivatives user stream (`ORDER_TRADE_UPDATE`).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FuturesOrderUpdate {
    pub event_type: String,
    pub event_time: i64,
    pub transaction_time: i64,
    pub symbol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pair: Option<String>,
    pub client_order_id: String,
    pub side: String,
    pub order_type: String,
    pub time_in_force: String,
    pub quantity: String,
    pub price: String,
    pub average_price: String,
    pub stop_price: String,
    pub execution_type: String,
    pub order_status: String,
    pub order_id: i64,
    pub last_trade_quantity: String,
    pub total_trade_quantity: String,
    pub price_last_trade: String,
    pub commission_asset: Option<String>,
    pub commission: Option<String>,
    pub order_time: i64,
    pub trade_id: i64,
    pub is_buyer_maker: bool,
    pub is_reduce_only: bool,
    pub position_side: String,
    pub realized_profit: String,
}

/// Push message on an authenticated user-data stream.
///
/// Unmapped event types pass through untouched so new exchange events
/// never get dropped on the floor.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum UserDataEvent {
    AccountPosition(AccountPosition),
    BalanceUpdate(BalanceUpdate),
    ExecutionReport(Box<ExecutionReport>),
    MarginCall(MarginCall),
    FuturesAccountUpdate(FuturesAccountUpdate),
    FuturesOrderUpdate(Box<FuturesOrderUpdate>),
    Unknown { event_type: String, data: Value },
}

impl UserDataEvent {
    pub fn event_type(&self) -> &str {
        match self {
            Self::AccountPosition(e) => &e.event_type,
            Self::BalanceUpdate(e) => &e.event_type,
            Self::ExecutionReport(e) => &e.event_type,
            Self::MarginCall(e) => &e.event_type,
            Self::FuturesAccountUpdate(e) => &e.event_type,
            Self::FuturesOrderUpdate(e) => &e.event_type,
            Self::Unknown { event_type, .. } => event_type,
        }
    }
}

/// Event delivered on a streaming subscription channel.
///
/// Every subscription emits the full set internally; lifecycle and error
/// kinds are filtered at the subscriber boundary unless the client
/// configuration opted in.
#[derive(Debug)]
pub enum StreamEvent<T> {
    /// The underlying socket (re)connected.
    Open,
    Message(T),
    Error(ClientError),
    /// The underlying socket closed; reconnection follows unless the
    /// subscription was explicitly closed.
    Closed { code: Option<u16>, reason: String },
}

/// Last-seen rate-limit headers for one API host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RateLimitInfo {
    pub used_weight: Option<String>,
    pub used_weight_1m: Option<String>,
    pub order_count_10s: Option<String>,
    pub order_count_1m: Option<String>,
    pub order_count_1h: Option<String>,
    pub order_count_1d: Option<String>,
}

impl RateLimitInfo {
    fn apply(&mut self, name: &str, value: &str) {
        let slot = match name {
            "x-mbx-used-weight" => &mut self.used_weight,
            "x-mbx-used-weight-1m" => &mut self.used_weight_1m,
            "x-mbx-order-count-10s" => &mut self.order_count_10s,
            "x-mbx-order-count-1m" => &mut self.order_count_1m,
            "x-mbx-order-count-1h" => &mut self.order_count_1h,
            "x-mbx-order-count-1d" => &mut self.order_count_1d,
            _ => return,
        };
        *slot = Some(value.to_string());
    }
}

/// Per-host rate-limit header cache, owned by the client instance.
///
/// Informational only: values are recorded on every response and never
/// read back into request construction.
#[derive(Debug, Clone, Default)]
pub struct RateLimitTracker {
    inner: Arc<RwLock<HashMap<String, RateLimitInfo>>>,
}

impl RateLimitTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record headers from one response; non-rate-limit headers are ignored.
    pub(crate) fn record<'a>(&self, host: &str, headers: impl Iterator<Item = (&'a str, &'a str)>) {
        let mut guard = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        for (name, value) in headers {
            let lower = name.to_ascii_lowercase();
            if lower.starts_with("x-mbx-") {
                guard.entry(host.to_string()).or_default().apply(&lower, value);
            }
        }
    }

    /// Last-seen values for one host.
    pub fn for_host(&self, host: &str) -> Option<RateLimitInfo> {
        match self.inner.read() {
            Ok(guard) => guard.get(host).cloned(),
            Err(poisoned) => poisoned.into_inner().get(host).cloned(),
        }
    }

    /// Snapshot of every host seen so far.
    pub fn snapshot(&self) -> HashMap<String, RateLimitInfo> {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracker_records_only_rate_limit_headers() {
        let tracker = RateLimitTracker::new();
        tracker.record(
            "api.binance.com",
            [
                ("x-mbx-used-weight", "12"),
                ("x-mbx-used-weight-1m", "12"),
                ("content-type", "application/json"),
            ]
            .into_iter(),
        );

        let info = tracker.for_host("api.binance.com").unwrap();
        assert_eq!(info.used_weight.as_deref(), Some("12"));
        assert_eq!(info.used_weight_1m.as_deref(), Some("12"));
        assert_eq!(info.order_count_1m, None);
        assert!(tracker.for_host("fapi.binance.com").is_none());
    }

    #[test]
    fn tracker_overwrites_per_host() {
        let tracker = RateLimitTracker::new();
        tracker.record("api.binance.com", [("x-mbx-used-weight", "1")].into_iter());
        tracker.record("api.binance.com", [("x-mbx-used-weight", "7")].into_iter());
        tracker.record("fapi.binance.com", [("x-mbx-used-weight", "3")].into_iter());

        assert_eq!(
            tracker
                .for_host("api.binance.com")
                .unwrap()
                .used_weight
                .as_deref(),
            Some("7")
        );
        assert_eq!(tracker.snapshot().len(), 2);
    }

    #[test]
    fn unknown_user_event_keeps_payload() {
        let event = UserDataEvent::Unknown {
            event_type: "newEventKind".to_string(),
            data: serde_json::json!({"e": "newEventKind", "x": 1}),
        };
        assert_eq!(event.event_type(), "newEventKind");
    }
}

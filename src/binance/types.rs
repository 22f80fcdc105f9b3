//! Wire shapes as the exchange sends them: dense single/double-letter
//! keys, decimal values as strings. The transformers in
//! [`crate::binance::transforms`] turn these into the normalized records
//! of [`crate::core::types`].

use serde::Deserialize;

/// `[price, quantity]` ladder entry used across book messages.
pub type WireLevel = [String; 2];

#[derive(Debug, Clone, Deserialize)]
pub struct WireDepthUpdate {
    #[serde(rename = "e")]
    pub event_type: String,
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "s")]
    pub symbol: String,
    /// Underlying pair; delivery streams only.
    #[serde(rename = "ps", default)]
    pub pair: Option<String>,
    #[serde(rename = "U")]
    pub first_update_id: i64,
    #[serde(rename = "u")]
    pub final_update_id: i64,
    #[serde(rename = "b")]
    pub bids: Vec<WireLevel>,
    #[serde(rename = "a")]
    pub asks: Vec<WireLevel>,
}

/// Top-N book snapshot. Symbol and level are not part of the payload;
/// they come from the subscription context.
#[derive(Debug, Clone, Deserialize)]
pub struct WirePartialDepth {
    #[serde(rename = "lastUpdateId")]
    pub last_update_id: i64,
    pub bids: Vec<WireLevel>,
    pub asks: Vec<WireLevel>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireKline {
    #[serde(rename = "e")]
    pub event_type: String,
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "ps", default)]
    pub pair: Option<String>,
    #[serde(rename = "k")]
    pub kline: WireKlineData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireKlineData {
    #[serde(rename = "t")]
    pub start_time: i64,
    #[serde(rename = "T")]
    pub close_time: i64,
    #[serde(rename = "i")]
    pub interval: String,
    #[serde(rename = "f")]
    pub first_trade_id: i64,
    #[serde(rename = "L")]
    pub last_trade_id: i64,
    #[serde(rename = "o")]
    pub open: String,
    #[serde(rename = "c")]
    pub close: String,
    #[serde(rename = "h")]
    pub high: String,
    #[serde(rename = "l")]
    pub low: String,
    #[serde(rename = "v")]
    pub volume: String,
    #[serde(rename = "n")]
    pub trades: i64,
    #[serde(rename = "x")]
    pub is_final: bool,
    #[serde(rename = "q")]
    pub quote_volume: String,
    #[serde(rename = "V")]
    pub buy_volume: String,
    #[serde(rename = "Q")]
    pub quote_buy_volume: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireTicker {
    #[serde(rename = "e")]
    pub event_type: String,
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "p")]
    pub price_change: String,
    #[serde(rename = "P")]
    pub price_change_percent: String,
    #[serde(rename = "w")]
    pub weighted_avg: String,
    /// Previous day close; spot only.
    #[serde(rename = "x", default)]
    pub prev_day_close: Option<String>,
    #[serde(rename = "c")]
    pub cur_day_close: String,
    #[serde(rename = "Q")]
    pub close_trade_quantity: String,
    #[serde(rename = "b", default)]
    pub best_bid: Option<String>,
    #[serde(rename = "B", default)]
    pub best_bid_quantity: Option<String>,
    #[serde(rename = "a", default)]
    pub best_ask: Option<String>,
    #[serde(rename = "A", default)]
    pub best_ask_quantity: Option<String>,
    #[serde(rename = "o")]
    pub open: String,
    #[serde(rename = "h")]
    pub high: String,
    #[serde(rename = "l")]
    pub low: String,
    #[serde(rename = "v")]
    pub volume: String,
    #[serde(rename = "q")]
    pub volume_quote: String,
    #[serde(rename = "O")]
    pub open_time: i64,
    #[serde(rename = "C")]
    pub close_time: i64,
    #[serde(rename = "F")]
    pub first_trade_id: i64,
    #[serde(rename = "L")]
    pub last_trade_id: i64,
    #[serde(rename = "n")]
    pub total_trades: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireMiniTicker {
    #[serde(rename = "e")]
    pub event_type: String,
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "c")]
    pub cur_day_close: String,
    #[serde(rename = "o")]
    pub open: String,
    #[serde(rename = "h")]
    pub high: String,
    #[serde(rename = "l")]
    pub low: String,
    #[serde(rename = "v")]
    pub volume: String,
    #[serde(rename = "q")]
    pub volume_quote: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireAggTrade {
    #[serde(rename = "e")]
    pub event_type: String,
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "T")]
    pub timestamp: i64,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "p")]
    pub price: String,
    #[serde(rename = "q")]
    pub quantity: String,
    #[serde(rename = "m")]
    pub is_buyer_maker: bool,
    /// Spot only.
    #[serde(rename = "M", default)]
    pub was_best_price: Option<bool>,
    #[serde(rename = "a")]
    pub agg_id: i64,
    #[serde(rename = "f")]
    pub first_id: i64,
    #[serde(rename = "l")]
    pub last_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireTrade {
    #[serde(rename = "e")]
    pub event_type: String,
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "T")]
    pub trade_time: i64,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "t")]
    pub trade_id: i64,
    #[serde(rename = "p")]
    pub price: String,
    #[serde(rename = "q")]
    pub quantity: String,
    #[serde(rename = "m")]
    pub is_buyer_maker: bool,
    #[serde(rename = "b", default)]
    pub buyer_order_id: Option<i64>,
    #[serde(rename = "a", default)]
    pub seller_order_id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireForceOrder {
    #[serde(rename = "e")]
    pub event_type: String,
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "o")]
    pub order: WireForceOrderData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireForceOrderData {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "ps", default)]
    pub pair: Option<String>,
    #[serde(rename = "S")]
    pub side: String,
    #[serde(rename = "o")]
    pub order_type: String,
    #[serde(rename = "f")]
    pub time_in_force: String,
    #[serde(rename = "q")]
    pub quantity: String,
    #[serde(rename = "p")]
    pub price: String,
    #[serde(rename = "ap")]
    pub average_price: String,
    #[serde(rename = "X")]
    pub status: String,
    #[serde(rename = "l")]
    pub last_filled_quantity: String,
    #[serde(rename = "z")]
    pub accumulated_quantity: String,
    #[serde(rename = "T")]
    pub time: i64,
}

// User-data stream payloads

#[derive(Debug, Clone, Deserialize)]
pub struct WireAccountPosition {
    #[serde(rename = "e")]
    pub event_type: String,
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "u")]
    pub last_account_update: i64,
    #[serde(rename = "B")]
    pub balances: Vec<WireAccountBalance>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireAccountBalance {
    #[serde(rename = "a")]
    pub asset: String,
    #[serde(rename = "f")]
    pub free: String,
    #[serde(rename = "l")]
    pub locked: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireBalanceUpdate {
    #[serde(rename = "e")]
    pub event_type: String,
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "a")]
    pub asset: String,
    #[serde(rename = "d")]
    pub balance_delta: String,
    #[serde(rename = "T")]
    pub clear_time: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireExecutionReport {
    #[serde(rename = "e")]
    pub event_type: String,
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "c")]
    pub new_client_order_id: String,
    #[serde(rename = "C")]
    pub original_client_order_id: String,
    #[serde(rename = "S")]
    pub side: String,
    #[serde(rename = "o")]
    pub order_type: String,
    #[serde(rename = "f")]
    pub time_in_force: String,
    #[serde(rename = "q")]
    pub quantity: String,
    #[serde(rename = "p")]
    pub price: String,
    #[serde(rename = "x")]
    pub execution_type: String,
    #[serde(rename = "P")]
    pub stop_price: String,
    #[serde(rename = "F")]
    pub iceberg_quantity: String,
    #[serde(rename = "X")]
    pub order_status: String,
    #[serde(rename = "r")]
    pub order_reject_reason: String,
    #[serde(rename = "i")]
    pub order_id: i64,
    #[serde(rename = "T")]
    pub order_time: i64,
    #[serde(rename = "l")]
    pub last_trade_quantity: String,
    #[serde(rename = "z")]
    pub total_trade_quantity: String,
    #[serde(rename = "L")]
    pub price_last_trade: String,
    #[serde(rename = "n")]
    pub commission: String,
    #[serde(rename = "N", default)]
    pub commission_asset: Option<String>,
    #[serde(rename = "t")]
    pub trade_id: i64,
    #[serde(rename = "w")]
    pub is_order_working: bool,
    #[serde(rename = "m")]
    pub is_buyer_maker: bool,
    #[serde(rename = "O")]
    pub creation_time: i64,
    #[serde(rename = "Z")]
    pub total_quote_trade_quantity: String,
    #[serde(rename = "g")]
    pub order_list_id: i64,
    #[serde(rename = "Q")]
    pub quote_order_quantity: String,
    #[serde(rename = "Y")]
    pub last_quote_transacted: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireMarginCall {
    #[serde(rename = "e")]
    pub event_type: String,
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "cw", default)]
    pub cross_wallet_balance: Option<String>,
    #[serde(rename = "p")]
    pub positions: Vec<WireMarginCallPosition>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireMarginCallPosition {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "ps")]
    pub position_side: String,
    #[serde(rename = "pa")]
    pub position_amount: String,
    #[serde(rename = "mt")]
    pub margin_type: String,
    #[serde(rename = "iw")]
    pub isolated_wallet: String,
    #[serde(rename = "mp")]
    pub mark_price: String,
    #[serde(rename = "up")]
    pub unrealized_pnl: String,
    #[serde(rename = "mm")]
    pub maintenance_margin_required: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireFuturesAccountUpdate {
    #[serde(rename = "e")]
    pub event_type: String,
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "T")]
    pub transaction_time: i64,
    #[serde(rename = "a")]
    pub data: WireFuturesAccountData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireFuturesAccountData {
    #[serde(rename = "m")]
    pub event_reason_type: String,
    #[serde(rename = "B")]
    pub balances: Vec<WireFuturesBalance>,
    #[serde(rename = "P", default)]
    pub positions: Vec<WireFuturesPosition>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireFuturesBalance {
    #[serde(rename = "a")]
    pub asset: String,
    #[serde(rename = "wb")]
    pub wallet_balance: String,
    #[serde(rename = "cw")]
    pub cross_wallet_balance: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireFuturesPosition {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "pa")]
    pub position_amount: String,
    #[serde(rename = "ep")]
    pub entry_price: String,
    #[serde(rename = "cr")]
    pub accumulated_realized: String,
    #[serde(rename = "up")]
    pub unrealized_pnl: String,
    #[serde(rename = "mt")]
    pub margin_type: String,
    #[serde(rename = "iw")]
    pub isolated_wallet: String,
    #[serde(rename = "ps")]
    pub position_side: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireFuturesOrderUpdate {
    #[serde(rename = "e")]
    pub event_type: String,
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "T")]
    pub transaction_time: i64,
    #[serde(rename = "o")]
    pub order: WireFuturesOrderData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireFuturesOrderData {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "c")]
    pub client_order_id: String,
    #[serde(rename = "S")]
    pub side: String,
    #[serde(rename = "o")]
    pub order_type: String,
    #[serde(rename = "f")]
    pub time_in_force: String,
    #[serde(rename = "q")]
    pub quantity: String,
    #[serde(rename = "p")]
    pub price: String,
    #[serde(rename = "ap")]
    pub average_price: String,
    #[serde(rename = "sp")]
    pub stop_price: String,
    #[serde(rename = "x")]
    pub execution_type: String,
    #[serde(rename = "X")]
    pub order_status: String,
    #[serde(rename = "i")]
    pub order_id: i64,
    #[serde(rename = "l")]
    pub last_trade_quantity: String,
    #[serde(rename = "z")]
    pub total_trade_quantity: String,
    #[serde(rename = "L")]
    pub price_last_trade: String,
    #[serde(rename = "N", default)]
    pub commission_asset: Option<String>,
    #[serde(rename = "n", default)]
    pub commission: Option<String>,
    #[serde(rename = "T")]
    pub order_time: i64,
    #[serde(rename = "t")]
    pub trade_id: i64,
    #[serde(rename = "m")]
    pub is_buyer_maker: bool,
    #[serde(rename = "R")]
    pub is_reduce_only: bool,
    #[serde(rename = "ps")]
    pub position_side: String,
    #[serde(rename = "rp")]
    pub realized_profit: String,
}

// REST response shapes

#[derive(Debug, Clone, Deserialize)]
pub struct RawOrderBook {
    #[serde(rename = "lastUpdateId")]
    pub last_update_id: i64,
    pub bids: Vec<WireLevel>,
    pub asks: Vec<WireLevel>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawSymbolPrice {
    pub symbol: String,
    pub price: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountInformation {
    pub maker_commission: i64,
    pub taker_commission: i64,
    pub buyer_commission: i64,
    pub seller_commission: i64,
    pub can_trade: bool,
    pub can_withdraw: bool,
    pub can_deposit: bool,
    pub update_time: i64,
    pub balances: Vec<crate::core::types::AccountBalance>,
}

//! Stream message transformers: pure, stateless mappings from decoded
//! wire messages to normalized records. Always optional - every
//! subscription has a raw variant that bypasses them.

use crate::binance::types::{
    RawOrderBook, WireAccountPosition, WireAggTrade, WireBalanceUpdate, WireDepthUpdate,
    WireExecutionReport, WireForceOrder, WireFuturesAccountUpdate, WireFuturesOrderUpdate,
    WireKline, WireLevel, WireMarginCall, WireMiniTicker, WirePartialDepth, WireTicker, WireTrade,
};
use crate::core::errors::ClientError;
use crate::core::types::{
    AccountBalance, AccountPosition, AggTrade, BalanceUpdate, BookLevel, Candle, DepthUpdate,
    ExecutionReport, FuturesAccountUpdate, FuturesBalance, FuturesOrderUpdate, FuturesPosition,
    LiquidationOrder, MarginCall, MarginCallPosition, MarketTrade, MiniTicker, OrderBook,
    PartialDepth, RestCandle, Ticker, UserDataEvent,
};
use serde_json::Value;

fn decode<T: serde::de::DeserializeOwned>(kind: &str, value: &Value) -> Result<T, ClientError> {
    serde_json::from_value(value.clone())
        .map_err(|e| ClientError::Decode(format!("Failed to parse {kind}: {e}")))
}

fn levels(wire: Vec<WireLevel>) -> Vec<BookLevel> {
    wire.into_iter()
        .map(|[price, quantity]| BookLevel { price, quantity })
        .collect()
}

pub fn depth_update(value: &Value) -> Result<DepthUpdate, ClientError> {
    let wire: WireDepthUpdate = decode("depth update", value)?;
    Ok(DepthUpdate {
        event_type: wire.event_type,
        event_time: wire.event_time,
        symbol: wire.symbol,
        pair: wire.pair,
        first_update_id: wire.first_update_id,
        final_update_id: wire.final_update_id,
        bid_depth: levels(wire.bids),
        ask_depth: levels(wire.asks),
    })
}

/// Partial-depth payloads do not carry the symbol or level; both come
/// from the subscription that opened the socket.
pub fn partial_depth(symbol: &str, level: u16, value: &Value) -> Result<PartialDepth, ClientError> {
    let wire: WirePartialDepth = decode("partial depth", value)?;
    Ok(PartialDepth {
        symbol: symbol.to_string(),
        level,
        last_update_id: wire.last_update_id,
        bids: levels(wire.bids),
        asks: levels(wire.asks),
    })
}

pub fn candle(value: &Value) -> Result<Candle, ClientError> {
    let wire: WireKline = decode("candle", value)?;
    let k = wire.kline;
    Ok(Candle {
        event_type: wire.event_type,
        event_time: wire.event_time,
        symbol: wire.symbol,
        start_time: k.start_time,
        close_time: k.close_time,
        first_trade_id: k.first_trade_id,
        last_trade_id: k.last_trade_id,
        interval: k.interval,
        open: k.open,
        high: k.high,
        low: k.low,
        close: k.close,
        volume: k.volume,
        trades: k.trades,
        is_final: k.is_final,
        quote_volume: k.quote_volume,
        buy_volume: k.buy_volume,
        quote_buy_volume: k.quote_buy_volume,
    })
}

pub fn ticker(value: &Value) -> Result<Ticker, ClientError> {
    let wire: WireTicker = decode("ticker", value)?;
    Ok(Ticker {
        event_type: wire.event_type,
        event_time: wire.event_time,
        symbol: wire.symbol,
        price_change: wire.price_change,
        price_change_percent: wire.price_change_percent,
        weighted_avg: wire.weighted_avg,
        prev_day_close: wire.prev_day_close,
        cur_day_close: wire.cur_day_close,
        close_trade_quantity: wire.close_trade_quantity,
        best_bid: wire.best_bid,
        best_bid_quantity: wire.best_bid_quantity,
        best_ask: wire.best_ask,
        best_ask_quantity: wire.best_ask_quantity,
        open: wire.open,
        high: wire.high,
        low: wire.low,
        volume: wire.volume,
        volume_quote: wire.volume_quote,
        open_time: wire.open_time,
        close_time: wire.close_time,
        first_trade_id: wire.first_trade_id,
        last_trade_id: wire.last_trade_id,
        total_trades: wire.total_trades,
    })
}

pub fn mini_ticker(value: &Value) -> Result<MiniTicker, ClientError> {
    let wire: WireMiniTicker = decode("mini ticker", value)?;
    Ok(MiniTicker {
        event_type: wire.event_type,
        event_time: wire.event_time,
        symbol: wire.symbol,
        cur_day_close: wire.cur_day_close,
        open: wire.open,
        high: wire.high,
        low: wire.low,
        volume: wire.volume,
        volume_quote: wire.volume_quote,
    })
}

pub fn agg_trade(value: &Value) -> Result<AggTrade, ClientError> {
    let wire: WireAggTrade = decode("aggregate trade", value)?;
    Ok(AggTrade {
        event_type: wire.event_type,
        event_time: wire.event_time,
        timestamp: wire.timestamp,
        symbol: wire.symbol,
        price: wire.price,
        quantity: wire.quantity,
        is_buyer_maker: wire.is_buyer_maker,
        was_best_price: wire.was_best_price,
        agg_id: wire.agg_id,
        first_id: wire.first_id,
        last_id: wire.last_id,
    })
}

pub fn trade(value: &Value) -> Result<MarketTrade, ClientError> {
    let wire: WireTrade = decode("trade", value)?;
    Ok(MarketTrade {
        event_type: wire.event_type,
        event_time: wire.event_time,
        trade_time: wire.trade_time,
        symbol: wire.symbol,
        price: wire.price,
        quantity: wire.quantity,
        is_buyer_maker: wire.is_buyer_maker,
        trade_id: wire.trade_id,
        buyer_order_id: wire.buyer_order_id,
        seller_order_id: wire.seller_order_id,
    })
}

pub fn liquidation(value: &Value) -> Result<LiquidationOrder, ClientError> {
    let wire: WireForceOrder = decode("liquidation order", value)?;
    let order = wire.order;
    Ok(LiquidationOrder {
        symbol: order.symbol,
        pair: order.pair,
        side: order.side,
        order_type: order.order_type,
        time_in_force: order.time_in_force,
        quantity: order.quantity,
        price: order.price,
        average_price: order.average_price,
        status: order.status,
        last_filled_quantity: order.last_filled_quantity,
        accumulated_quantity: order.accumulated_quantity,
        time: order.time,
    })
}

/// Dispatch a user-data push message on its `e` tag.
///
/// Unmapped event types pass through with the raw payload attached so
/// callers still see them.
pub fn user_data(value: &Value) -> Result<UserDataEvent, ClientError> {
    let event_type = value
        .get("e")
        .and_then(Value::as_str)
        .ok_or_else(|| ClientError::Decode("user data message without event type".to_string()))?;

    match event_type {
        "outboundAccountPosition" => {
            let wire: WireAccountPosition = decode("account position", value)?;
            Ok(UserDataEvent::AccountPosition(AccountPosition {
                event_type: wire.event_type,
                event_time: wire.event_time,
                last_account_update: wire.last_account_update,
                balances: wire
                    .balances
                    .into_iter()
                    .map(|b| AccountBalance {
                        asset: b.asset,
                        free: b.free,
                        locked: b.locked,
                    })
                    .collect(),
            }))
        }
        "balanceUpdate" => {
            let wire: WireBalanceUpdate = decode("balance update", value)?;
            Ok(UserDataEvent::BalanceUpdate(BalanceUpdate {
                event_type: wire.event_type,
                event_time: wire.event_time,
                asset: wire.asset,
                balance_delta: wire.balance_delta,
                clear_time: wire.clear_time,
            }))
        }
        "executionReport" => {
            let wire: WireExecutionReport = decode("execution report", value)?;
            Ok(UserDataEvent::ExecutionReport(Box::new(ExecutionReport {
                event_type: wire.event_type,
                event_time: wire.event_time,
                symbol: wire.symbol,
                new_client_order_id: wire.new_client_order_id,
                original_client_order_id: wire.original_client_order_id,
                side: wire.side,
                order_type: wire.order_type,
                time_in_force: wire.time_in_force,
                quantity: wire.quantity,
                price: wire.price,
                execution_type: wire.execution_type,
                stop_price: wire.stop_price,
                iceberg_quantity: wire.iceberg_quantity,
                order_status: wire.order_status,
                order_reject_reason: wire.order_reject_reason,
                order_id: wire.order_id,
                order_time: wire.order_time,
                last_trade_quantity: wire.last_trade_quantity,
                total_trade_quantity: wire.total_trade_quantity,
                price_last_trade: wire.price_last_trade,
                commission: wire.commission,
                commission_asset: wire.commission_asset,
                trade_id: wire.trade_id,
                is_order_working: wire.is_order_working,
                is_buyer_maker: wire.is_buyer_maker,
                creation_time: wire.creation_time,
                total_quote_trade_quantity: wire.total_quote_trade_quantity,
                order_list_id: wire.order_list_id,
                quote_order_quantity: wire.quote_order_quantity,
                last_quote_transacted: wire.last_quote_transacted,
            })))
        }
        "MARGIN_CALL" => {
            let wire: WireMarginCall = decode("margin call", value)?;
            Ok(UserDataEvent::MarginCall(MarginCall {
                event_type: wire.event_type,
                event_time: wire.event_time,
                cross_wallet_balance: wire.cross_wallet_balance,
                positions: wire
                    .positions
                    .into_iter()
                    .map(|p| MarginCallPosition {
                        symbol: p.symbol,
                        position_side: p.position_side,
                        position_amount: p.position_amount,
                        margin_type: p.margin_type,
                        isolated_wallet: p.isolated_wallet,
                        mark_price: p.mark_price,
                        unrealized_pnl: p.unrealized_pnl,
                        maintenance_margin_required: p.maintenance_margin_required,
                    })
                    .collect(),
            }))
        }
        "ACCOUNT_UPDATE" => {
            let wire: WireFuturesAccountUpdate = decode("account update", value)?;
            Ok(UserDataEvent::FuturesAccountUpdate(FuturesAccountUpdate {
                event_type: wire.event_type,
                event_time: wire.event_time,
                transaction_time: wire.transaction_time,
                event_reason_type: wire.data.event_reason_type,
                balances: wire
                    .data
                    .balances
                    .into_iter()
                    .map(|b| FuturesBalance {
                        asset: b.asset,
                        wallet_balance: b.wallet_balance,
                        cross_wallet_balance: b.cross_wallet_balance,
                    })
                    .collect(),
                positions: wire
                    .data
                    .positions
                    .into_iter()
                    .map(|p| FuturesPosition {
                        symbol: p.symbol,
                        position_amount: p.position_amount,
                        entry_price: p.entry_price,
                        accumulated_realized: p.accumulated_realized,
                        unrealized_pnl: p.unrealized_pnl,
                        margin_type: p.margin_type,
                        isolated_wallet: p.isolated_wallet,
                        position_side: p.position_side,
                    })
                    .collect(),
            }))
        }
        "ORDER_TRADE_UPDATE" => {
            let wire: WireFuturesOrderUpdate = decode("order trade update", value)?;
            let order = wire.order;
            Ok(UserDataEvent::FuturesOrderUpdate(Box::new(
                FuturesOrderUpdate {
                    event_type: wire.event_type,
                    event_time: wire.event_time,
                    transaction_time: wire.transaction_time,
                    symbol: order.symbol,
                    pair: None,
                    client_order_id: order.client_order_id,
                    side: order.side,
                    order_type: order.order_type,
                    time_in_force: order.time_in_force,
                    quantity: order.quantity,
                    price: order.price,
                    average_price: order.average_price,
                    stop_price: order.stop_price,
                    execution_type: order.execution_type,
                    order_status: order.order_status,
                    order_id: order.order_id,
                    last_trade_quantity: order.last_trade_quantity,
                    total_trade_quantity: order.total_trade_quantity,
                    price_last_trade: order.price_last_trade,
                    commission_asset: order.commission_asset,
                    commission: order.commission,
                    order_time: order.order_time,
                    trade_id: order.trade_id,
                    is_buyer_maker: order.is_buyer_maker,
                    is_reduce_only: order.is_reduce_only,
                    position_side: order.position_side,
                    realized_profit: order.realized_profit,
                },
            )))
        }
        _ => Ok(UserDataEvent::Unknown {
            event_type: event_type.to_string(),
            data: value.clone(),
        }),
    }
}

// REST response transforms

pub fn order_book(value: &Value) -> Result<OrderBook, ClientError> {
    let wire: RawOrderBook = decode("order book", value)?;
    Ok(OrderBook {
        last_update_id: wire.last_update_id,
        bids: levels(wire.bids),
        asks: levels(wire.asks),
    })
}

/// REST candles arrive as positional arrays.
pub fn rest_candles(value: &Value) -> Result<Vec<RestCandle>, ClientError> {
    let rows = value
        .as_array()
        .ok_or_else(|| ClientError::Decode("Failed to parse candles: expected array".to_string()))?;

    rows.iter().map(rest_candle).collect()
}

fn rest_candle(row: &Value) -> Result<RestCandle, ClientError> {
    let idx_i64 = |i: usize| {
        row.get(i)
            .and_then(Value::as_i64)
            .ok_or_else(|| ClientError::Decode(format!("Failed to parse candle field {i}")))
    };
    let idx_str = |i: usize| {
        row.get(i)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ClientError::Decode(format!("Failed to parse candle field {i}")))
    };

    Ok(RestCandle {
        open_time: idx_i64(0)?,
        open: idx_str(1)?,
        high: idx_str(2)?,
        low: idx_str(3)?,
        close: idx_str(4)?,
        volume: idx_str(5)?,
        close_time: idx_i64(6)?,
        quote_volume: idx_str(7)?,
        trades: idx_i64(8)?,
        base_asset_volume: idx_str(9)?,
        quote_asset_volume: idx_str(10)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn order_book_snapshot_normalizes_ladders() {
        let raw = json!({
            "lastUpdateId": 1,
            "asks": [["1", "2"]],
            "bids": [["3", "4"]]
        });
        let book = order_book(&raw).unwrap();
        assert_eq!(book.last_update_id, 1);
        assert_eq!(book.asks[0].price, "1");
        assert_eq!(book.asks[0].quantity, "2");
        assert_eq!(book.bids[0].price, "3");
        assert_eq!(book.bids[0].quantity, "4");
    }

    #[test]
    fn depth_update_renames_every_field() {
        let raw = json!({
            "e": "depthUpdate",
            "E": 1508612956950i64,
            "s": "ETHUSDT",
            "U": 18331571, "u": 18331580,
            "b": [["0.04896500", "0.00000000"]],
            "a": [["0.04910600", "0.00000000"]]
        });
        let update = depth_update(&raw).unwrap();
        assert_eq!(update.event_type, "depthUpdate");
        assert_eq!(update.event_time, 1_508_612_956_950);
        assert_eq!(update.symbol, "ETHUSDT");
        assert_eq!(update.pair, None);
        assert_eq!(update.first_update_id, 18_331_571);
        assert_eq!(update.final_update_id, 18_331_580);
        assert_eq!(update.bid_depth[0].price, "0.04896500");
        assert_eq!(update.ask_depth[0].quantity, "0.00000000");
    }

    #[test]
    fn delivery_depth_update_carries_pair() {
        let raw = json!({
            "e": "depthUpdate", "E": 1591269996801i64,
            "s": "BTCUSD_200626", "ps": "BTCUSD",
            "U": 17, "u": 28,
            "b": [["9517.6", "10"]], "a": []
        });
        let update = depth_update(&raw).unwrap();
        assert_eq!(update.pair.as_deref(), Some("BTCUSD"));
    }

    #[test]
    fn candle_transform_maps_nested_payload() {
        let raw = json!({
            "e": "kline", "E": 1508613500314i64, "s": "ETHBTC",
            "k": {
                "t": 1508613480000i64, "T": 1508613539999i64, "s": "ETHBTC",
                "i": "1m", "f": 3412, "L": 3430,
                "o": "0.04890000", "c": "0.04891000", "h": "0.04891500",
                "l": "0.04889000", "v": "58.55500000", "n": 19, "x": false,
                "q": "2.86400000", "V": "17.45300000", "Q": "0.85400000", "B": "0"
            }
        });
        let bar = candle(&raw).unwrap();
        assert_eq!(bar.symbol, "ETHBTC");
        assert_eq!(bar.interval, "1m");
        assert_eq!(bar.start_time, 1_508_613_480_000);
        assert_eq!(bar.open, "0.04890000");
        assert_eq!(bar.buy_volume, "17.45300000");
        assert!(!bar.is_final);
    }

    #[test]
    fn spot_ticker_keeps_best_bid_futures_omits_it() {
        let spot = json!({
            "e": "24hrTicker", "E": 123456789i64, "s": "BNBBTC",
            "p": "0.0015", "P": "250.00", "w": "0.0018", "x": "0.0009",
            "c": "0.0025", "Q": "10", "b": "0.0024", "B": "10",
            "a": "0.0026", "A": "100", "o": "0.0010", "h": "0.0025",
            "l": "0.0010", "v": "10000", "q": "18", "O": 0, "C": 86400000i64,
            "F": 0, "L": 18150, "n": 18151
        });
        let t = ticker(&spot).unwrap();
        assert_eq!(t.best_bid.as_deref(), Some("0.0024"));
        assert_eq!(t.prev_day_close.as_deref(), Some("0.0009"));

        let futures = json!({
            "e": "24hrTicker", "E": 123456789i64, "s": "BTCUSDT",
            "p": "0.0015", "P": "250.00", "w": "0.0018",
            "c": "0.0025", "Q": "10", "o": "0.0010", "h": "0.0025",
            "l": "0.0010", "v": "10000", "q": "18", "O": 0, "C": 86400000i64,
            "F": 0, "L": 18150, "n": 18151
        });
        let t = ticker(&futures).unwrap();
        assert_eq!(t.best_bid, None);
        assert_eq!(t.prev_day_close, None);
    }

    #[test]
    fn execution_report_renames_per_mapping_table() {
        let raw = json!({
            "e": "executionReport", "E": 1499405658658i64, "s": "ETHBTC",
            "c": "mUvoqJxFIILMdfAW5iGSOW", "C": "",
            "S": "BUY", "o": "LIMIT", "f": "GTC",
            "q": "1.00000000", "p": "0.10264410",
            "x": "NEW", "P": "0.00000000", "F": "0.00000000",
            "X": "NEW", "r": "NONE", "i": 4293153,
            "T": 1499405658657i64, "l": "0.00000000", "z": "0.00000000",
            "L": "0.00000000", "n": "0", "N": null, "t": -1,
            "w": true, "m": false, "O": 1499405658657i64,
            "Z": "0.00000000", "g": -1, "Q": "0.00000000", "Y": "0.00000000"
        });
        let event = user_data(&raw).unwrap();
        match event {
            UserDataEvent::ExecutionReport(report) => {
                assert_eq!(report.event_type, "executionReport");
                assert_eq!(report.new_client_order_id, "mUvoqJxFIILMdfAW5iGSOW");
                assert_eq!(report.side, "BUY");
                assert_eq!(report.order_type, "LIMIT");
                assert_eq!(report.time_in_force, "GTC");
                assert_eq!(report.execution_type, "NEW");
                assert_eq!(report.order_status, "NEW");
                assert_eq!(report.order_reject_reason, "NONE");
                assert_eq!(report.order_id, 4_293_153);
                assert_eq!(report.commission_asset, None);
                assert_eq!(report.trade_id, -1);
                assert!(report.is_order_working);
                assert!(!report.is_buyer_maker);
                assert_eq!(report.order_list_id, -1);
            }
            other => panic!("expected execution report, got {other:?}"),
        }
    }

    #[test]
    fn unknown_user_event_passes_through_with_payload() {
        let raw = json!({"e": "listStatus", "E": 1i64, "weird": true});
        let event = user_data(&raw).unwrap();
        match event {
            UserDataEvent::Unknown { event_type, data } => {
                assert_eq!(event_type, "listStatus");
                assert_eq!(data.get("weird"), Some(&json!(true)));
            }
            other => panic!("expected unknown event, got {other:?}"),
        }
    }

    #[test]
    fn partial_depth_takes_context_from_subscription() {
        let raw = json!({
            "lastUpdateId": 160,
            "bids": [["0.0024", "10"]],
            "asks": [["0.0026", "100"]]
        });
        let depth = partial_depth("ETHBTC", 5, &raw).unwrap();
        assert_eq!(depth.symbol, "ETHBTC");
        assert_eq!(depth.level, 5);
        assert_eq!(depth.last_update_id, 160);
        assert_eq!(depth.bids[0].price, "0.0024");
    }

    #[test]
    fn rest_candles_map_positional_fields() {
        let raw = json!([[
            1508403120000i64, "0.05158100", "0.05158100", "0.05138100",
            "0.05138100", "234.17900000", 1508403179999i64, "12.02366342",
            107, "82.28900000", "4.22640582", "0"
        ]]);
        let candles = rest_candles(&raw).unwrap();
        assert_eq!(candles.len(), 1);
        assert_eq!(candles[0].open_time, 1_508_403_120_000);
        assert_eq!(candles[0].close, "0.05138100");
        assert_eq!(candles[0].trades, 107);
        assert_eq!(candles[0].quote_asset_volume, "4.22640582");
    }

    #[test]
    fn liquidation_order_unwraps_envelope() {
        let raw = json!({
            "e": "forceOrder", "E": 1568014460893i64,
            "o": {
                "s": "BTCUSDT", "S": "SELL", "o": "LIMIT", "f": "IOC",
                "q": "0.014", "p": "9910", "ap": "9910", "X": "FILLED",
                "l": "0.014", "z": "0.014", "T": 1568014460893i64
            }
        });
        let order = liquidation(&raw).unwrap();
        assert_eq!(order.symbol, "BTCUSDT");
        assert_eq!(order.side, "SELL");
        assert_eq!(order.average_price, "9910");
        assert_eq!(order.pair, None);
    }
}

pub mod codec;
pub mod endpoints;
pub mod rest;
pub mod streams;
pub mod transforms;
pub mod types;
pub mod user_data;

use crate::core::config::ClientConfig;
use crate::core::errors::ClientError;
use crate::core::products::Product;
use crate::core::types::{
    AggTrade, BookTicker, Candle, DepthUpdate, LiquidationOrder, MarketTrade, MiniTicker,
    OrderBook, PartialDepth, RateLimitTracker, RestCandle, Ticker, UserDataEvent,
};
use codec::{all_market_url, raw_stream_url, stream_name};
use endpoints::{HttpMethod, Security};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use streams::{open_streams, StreamSpec};

// Re-export main types for easier importing
pub use rest::{BinanceRest, Params};
pub use streams::{Subscription, Transform};
pub use types::AccountInformation;
pub use user_data::UserStreamTiming;

/// Binance client: typed REST wrappers over the endpoint table, the
/// streaming subscription factory, and per-product user-data streams.
///
/// Cloning is cheap; clones share the HTTP connection pool and the
/// rate-limit cache. Every stream opened through a clone is still fully
/// independent.
#[derive(Clone, Debug)]
pub struct BinanceClient {
    config: Arc<ClientConfig>,
    rest: BinanceRest,
    rate_limits: RateLimitTracker,
}

impl BinanceClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let config = Arc::new(config);
        let rate_limits = RateLimitTracker::new();
        let rest = BinanceRest::new(Arc::clone(&config), rate_limits.clone())?;
        Ok(Self {
            config,
            rest,
            rate_limits,
        })
    }

    /// Last-seen rate-limit headers, keyed by API host. Informational
    /// only; never fed back into request construction.
    pub fn rate_limits(&self) -> &RateLimitTracker {
        &self.rate_limits
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    // ----- REST: spot public -----

    pub async fn ping(&self) -> Result<bool, ClientError> {
        self.rest
            .dispatch(&endpoints::PING, &Params::new())
            .await
            .map(|_| true)
    }

    /// Exchange clock in epoch milliseconds.
    pub async fn time(&self) -> Result<i64, ClientError> {
        self.rest.server_time(Product::Spot).await
    }

    pub async fn exchange_info(&self) -> Result<Value, ClientError> {
        self.rest
            .dispatch(&endpoints::EXCHANGE_INFO, &Params::new())
            .await
    }

    /// Order-book snapshot, normalized into price/quantity levels.
    pub async fn book(&self, params: Params) -> Result<OrderBook, ClientError> {
        let value = self.rest.dispatch(&endpoints::BOOK, &params).await?;
        transforms::order_book(&value)
    }

    /// OHLCV bars. `interval` defaults to `5m` when not supplied.
    pub async fn candles(&self, params: Params) -> Result<Vec<RestCandle>, ClientError> {
        let params = if params.get("interval").is_none() {
            params.with("interval", "5m")
        } else {
            params
        };
        let value = self.rest.dispatch(&endpoints::CANDLES, &params).await?;
        transforms::rest_candles(&value)
    }

    pub async fn agg_trades(&self, params: Params) -> Result<Value, ClientError> {
        self.rest.dispatch(&endpoints::AGG_TRADES, &params).await
    }

    pub async fn trades(&self, params: Params) -> Result<Value, ClientError> {
        self.rest.dispatch(&endpoints::TRADES, &params).await
    }

    pub async fn daily_stats(&self, params: Params) -> Result<Value, ClientError> {
        self.rest.dispatch(&endpoints::DAILY_STATS, &params).await
    }

    pub async fn avg_price(&self, params: Params) -> Result<Value, ClientError> {
        self.rest.dispatch(&endpoints::AVG_PRICE, &params).await
    }

    /// Latest price per symbol, flattened to a symbol -> price map.
    pub async fn prices(&self) -> Result<HashMap<String, String>, ClientError> {
        let value = self.rest.dispatch(&endpoints::PRICES, &Params::new()).await?;
        let rows: Vec<types::RawSymbolPrice> = serde_json::from_value(value)
            .map_err(|e| ClientError::Decode(format!("Failed to parse prices: {e}")))?;
        Ok(rows.into_iter().map(|row| (row.symbol, row.price)).collect())
    }

    pub async fn book_tickers(&self) -> Result<Vec<BookTicker>, ClientError> {
        let value = self
            .rest
            .dispatch(&endpoints::BOOK_TICKERS, &Params::new())
            .await?;
        serde_json::from_value(value)
            .map_err(|e| ClientError::Decode(format!("Failed to parse book tickers: {e}")))
    }

    // ----- REST: spot signed -----

    pub async fn order(&self, params: Params) -> Result<Value, ClientError> {
        self.rest.dispatch(&endpoints::ORDER, &params).await
    }

    /// Validate an order without placing it.
    pub async fn order_test(&self, params: Params) -> Result<Value, ClientError> {
        self.rest.dispatch(&endpoints::ORDER_TEST, &params).await
    }

    pub async fn get_order(&self, params: Params) -> Result<Value, ClientError> {
        self.rest.dispatch(&endpoints::GET_ORDER, &params).await
    }

    pub async fn cancel_order(&self, params: Params) -> Result<Value, ClientError> {
        self.rest.dispatch(&endpoints::CANCEL_ORDER, &params).await
    }

    pub async fn open_orders(&self, params: Params) -> Result<Value, ClientError> {
        self.rest.dispatch(&endpoints::OPEN_ORDERS, &params).await
    }

    pub async fn all_orders(&self, params: Params) -> Result<Value, ClientError> {
        self.rest.dispatch(&endpoints::ALL_ORDERS, &params).await
    }

    pub async fn account_info(&self, params: Params) -> Result<AccountInformation, ClientError> {
        let value = self.rest.dispatch(&endpoints::ACCOUNT_INFO, &params).await?;
        serde_json::from_value(value)
            .map_err(|e| ClientError::Decode(format!("Failed to parse account info: {e}")))
    }

    pub async fn my_trades(&self, params: Params) -> Result<Value, ClientError> {
        self.rest.dispatch(&endpoints::MY_TRADES, &params).await
    }

    // ----- REST: futures -----

    pub async fn futures_ping(&self) -> Result<bool, ClientError> {
        self.rest
            .dispatch(&endpoints::FUTURES_PING, &Params::new())
            .await
            .map(|_| true)
    }

    pub async fn futures_time(&self) -> Result<i64, ClientError> {
        self.rest.server_time(Product::Futures).await
    }

    pub async fn futures_book(&self, params: Params) -> Result<OrderBook, ClientError> {
        let value = self.rest.dispatch(&endpoints::FUTURES_BOOK, &params).await?;
        transforms::order_book(&value)
    }

    pub async fn futures_candles(&self, params: Params) -> Result<Vec<RestCandle>, ClientError> {
        let params = if params.get("interval").is_none() {
            params.with("interval", "5m")
        } else {
            params
        };
        let value = self
            .rest
            .dispatch(&endpoints::FUTURES_CANDLES, &params)
            .await?;
        transforms::rest_candles(&value)
    }

    // ----- REST: escape hatches -----

    /// Unsigned call to any endpoint, for operations the typed surface
    /// does not cover.
    pub async fn public_request(
        &self,
        method: HttpMethod,
        path: &str,
        params: Params,
    ) -> Result<Value, ClientError> {
        self.rest.public_call(method, path, &params).await
    }

    /// Signed call to any endpoint.
    pub async fn private_request(
        &self,
        method: HttpMethod,
        path: &str,
        params: Params,
    ) -> Result<Value, ClientError> {
        self.rest
            .private_call(method, path, &params, Security::Signed)
            .await
    }

    // ----- Streams -----

    fn per_symbol_specs<T>(
        &self,
        product: Product,
        symbols: &[&str],
        channel: &str,
        transform: Transform<T>,
    ) -> Vec<StreamSpec<T>> {
        let base = self.config.ws_base(product);
        symbols
            .iter()
            .map(|symbol| {
                let stream = stream_name(symbol, channel);
                StreamSpec {
                    url: raw_stream_url(&base, &stream),
                    label: format!("{product}:{stream}"),
                    transform: Arc::clone(&transform),
                }
            })
            .collect()
    }

    fn subscribe<T: Send + 'static>(&self, specs: Vec<StreamSpec<T>>) -> Subscription<T> {
        open_streams(
            specs,
            self.config.emit_socket_events,
            self.config.emit_stream_errors,
        )
    }

    /// Incremental order-book changes, one socket per symbol.
    pub fn depth_stream(&self, product: Product, symbols: &[&str]) -> Subscription<DepthUpdate> {
        let transform: Transform<DepthUpdate> = Arc::new(|v| transforms::depth_update(v));
        self.subscribe(self.per_symbol_specs(product, symbols, "depth", transform))
    }

    /// Top-N order-book snapshots at a fixed depth per symbol.
    pub fn partial_depth_stream(
        &self,
        product: Product,
        levels: &[(&str, u16)],
    ) -> Subscription<PartialDepth> {
        let base = self.config.ws_base(product);
        let specs = levels
            .iter()
            .map(|(symbol, level)| {
                let stream = stream_name(symbol, &format!("depth{level}"));
                let symbol = (*symbol).to_string();
                let level = *level;
                StreamSpec {
                    url: raw_stream_url(&base, &stream),
                    label: format!("{product}:{stream}"),
                    transform: Arc::new(move |v: &Value| transforms::partial_depth(&symbol, level, v))
                        as Transform<PartialDepth>,
                }
            })
            .collect();
        self.subscribe(specs)
    }

    pub fn candle_stream(
        &self,
        product: Product,
        symbols: &[&str],
        interval: &str,
    ) -> Subscription<Candle> {
        let transform: Transform<Candle> = Arc::new(|v| transforms::candle(v));
        let channel = format!("kline_{interval}");
        self.subscribe(self.per_symbol_specs(product, symbols, &channel, transform))
    }

    pub fn ticker_stream(&self, product: Product, symbols: &[&str]) -> Subscription<Ticker> {
        let transform: Transform<Ticker> = Arc::new(|v| transforms::ticker(v));
        self.subscribe(self.per_symbol_specs(product, symbols, "ticker", transform))
    }

    /// 24h tickers for every market, one aggregate socket. Each message
    /// carries the batch of tickers that changed.
    pub fn all_tickers_stream(&self, product: Product) -> Subscription<Vec<Ticker>> {
        let transform: Transform<Vec<Ticker>> = Arc::new(|value: &Value| {
            value
                .as_array()
                .ok_or_else(|| {
                    ClientError::Decode("Failed to parse all-market tickers: expected array".to_string())
                })?
                .iter()
                .map(transforms::ticker)
                .collect()
        });
        let base = self.config.ws_base(product);
        self.subscribe(vec![StreamSpec {
            url: all_market_url(&base, "ticker"),
            label: format!("{product}:!ticker"),
            transform,
        }])
    }

    pub fn mini_ticker_stream(&self, product: Product, symbols: &[&str]) -> Subscription<MiniTicker> {
        let transform: Transform<MiniTicker> = Arc::new(|v| transforms::mini_ticker(v));
        self.subscribe(self.per_symbol_specs(product, symbols, "miniTicker", transform))
    }

    pub fn all_mini_tickers_stream(&self, product: Product) -> Subscription<Vec<MiniTicker>> {
        let transform: Transform<Vec<MiniTicker>> = Arc::new(|value: &Value| {
            value
                .as_array()
                .ok_or_else(|| {
                    ClientError::Decode(
                        "Failed to parse all-market mini tickers: expected array".to_string(),
                    )
                })?
                .iter()
                .map(transforms::mini_ticker)
                .collect()
        });
        let base = self.config.ws_base(product);
        self.subscribe(vec![StreamSpec {
            url: all_market_url(&base, "miniTicker"),
            label: format!("{product}:!miniTicker"),
            transform,
        }])
    }

    pub fn trades_stream(&self, product: Product, symbols: &[&str]) -> Subscription<MarketTrade> {
        let transform: Transform<MarketTrade> = Arc::new(|v| transforms::trade(v));
        self.subscribe(self.per_symbol_specs(product, symbols, "trade", transform))
    }

    pub fn agg_trades_stream(&self, product: Product, symbols: &[&str]) -> Subscription<AggTrade> {
        let transform: Transform<AggTrade> = Arc::new(|v| transforms::agg_trade(v));
        self.subscribe(self.per_symbol_specs(product, symbols, "aggTrade", transform))
    }

    /// Forced liquidations per symbol; derivatives products only.
    pub fn liquidations_stream(
        &self,
        product: Product,
        symbols: &[&str],
    ) -> Subscription<LiquidationOrder> {
        let transform: Transform<LiquidationOrder> = Arc::new(|v| transforms::liquidation(v));
        self.subscribe(self.per_symbol_specs(product, symbols, "forceOrder", transform))
    }

    pub fn all_liquidations_stream(&self, product: Product) -> Subscription<LiquidationOrder> {
        let transform: Transform<LiquidationOrder> = Arc::new(|v| transforms::liquidation(v));
        let base = self.config.ws_base(product);
        self.subscribe(vec![StreamSpec {
            url: all_market_url(&base, "forceOrder"),
            label: format!("{product}:!forceOrder"),
            transform,
        }])
    }

    /// Untransformed messages for explicit stream paths, one socket per
    /// path. The bypass for anything the typed surface does not cover.
    pub fn raw_stream(&self, product: Product, streams: &[&str]) -> Subscription<Value> {
        let base = self.config.ws_base(product);
        let specs = streams
            .iter()
            .map(|stream| StreamSpec {
                url: raw_stream_url(&base, stream),
                label: format!("{product}:{stream}"),
                transform: Arc::new(|value: &Value| Ok(value.clone())) as Transform<Value>,
            })
            .collect();
        self.subscribe(specs)
    }

    /// Authenticated user-data stream for one product.
    ///
    /// Fails fast without credentials; afterwards the session acquires
    /// its listen key, renews it on a timer, and rebuilds itself with a
    /// fresh key whenever renewal fails or the socket drops.
    pub fn user_data_stream(
        &self,
        product: Product,
    ) -> Result<Subscription<UserDataEvent>, ClientError> {
        self.user_data_stream_with_timing(product, user_data::UserStreamTiming::default())
    }

    /// [`Self::user_data_stream`] with explicit session timers, for
    /// pointing at stub exchanges.
    pub fn user_data_stream_with_timing(
        &self,
        product: Product,
        timing: user_data::UserStreamTiming,
    ) -> Result<Subscription<UserDataEvent>, ClientError> {
        if !self.config.has_credentials() {
            return Err(ClientError::missing_credentials());
        }
        Ok(user_data::open_user_stream(
            self.rest.clone(),
            product,
            self.config.ws_base(product),
            timing,
            self.config.emit_socket_events,
            self.config.emit_stream_errors,
        ))
    }
}

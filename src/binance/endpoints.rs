use crate::core::errors::ClientError;
use crate::core::products::Product;
use crate::binance::rest::Params;

/// HTTP verb of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => Self::GET,
            HttpMethod::Post => Self::POST,
            HttpMethod::Put => Self::PUT,
            HttpMethod::Delete => Self::DELETE,
        }
    }
}

/// Authentication level of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Security {
    /// No credentials involved.
    Public,
    /// Needs the API-key header but no signature fields (listen-key
    /// operations).
    ApiKey,
    /// Needs the API-key header plus `timestamp` and `signature` params.
    Signed,
}

/// One row of the endpoint table: everything the caller primitives need
/// to dispatch an operation. Immutable, defined at startup.
#[derive(Debug, Clone, Copy)]
pub struct EndpointDescriptor {
    /// Method name surfaced in validation errors.
    pub name: &'static str,
    pub path: &'static str,
    pub method: HttpMethod,
    pub product: Product,
    pub security: Security,
    pub required_params: &'static [&'static str],
}

impl EndpointDescriptor {
    /// Check required-parameter presence before any network I/O.
    pub fn validate(&self, params: &Params) -> Result<(), ClientError> {
        for required in self.required_params {
            if params.get(required).is_none() {
                return Err(ClientError::missing_parameter(self.name, required));
            }
        }
        Ok(())
    }
}

macro_rules! endpoint {
    ($konst:ident, $name:literal, $path:literal, $method:ident, $product:ident, $security:ident, [$($param:literal),*]) => {
        pub const $konst: EndpointDescriptor = EndpointDescriptor {
            name: $name,
            path: $path,
            method: HttpMethod::$method,
            product: Product::$product,
            security: Security::$security,
            required_params: &[$($param),*],
        };
    };
}

// Spot public
endpoint!(PING, "ping", "/api/v3/ping", Get, Spot, Public, []);
endpoint!(TIME, "time", "/api/v3/time", Get, Spot, Public, []);
endpoint!(EXCHANGE_INFO, "exchangeInfo", "/api/v3/exchangeInfo", Get, Spot, Public, []);
endpoint!(BOOK, "book", "/api/v3/depth", Get, Spot, Public, ["symbol"]);
endpoint!(CANDLES, "candles", "/api/v3/klines", Get, Spot, Public, ["symbol"]);
endpoint!(AGG_TRADES, "aggTrades", "/api/v3/aggTrades", Get, Spot, Public, ["symbol"]);
endpoint!(TRADES, "trades", "/api/v3/trades", Get, Spot, Public, ["symbol"]);
endpoint!(DAILY_STATS, "dailyStats", "/api/v3/ticker/24hr", Get, Spot, Public, []);
endpoint!(AVG_PRICE, "avgPrice", "/api/v3/avgPrice", Get, Spot, Public, ["symbol"]);
endpoint!(PRICES, "prices", "/api/v3/ticker/price", Get, Spot, Public, []);
endpoint!(BOOK_TICKERS, "allBookTickers", "/api/v3/ticker/bookTicker", Get, Spot, Public, []);

// Spot signed
endpoint!(ORDER, "order", "/api/v3/order", Post, Spot, Signed, ["symbol", "side", "quantity"]);
endpoint!(ORDER_TEST, "orderTest", "/api/v3/order/test", Post, Spot, Signed, ["symbol", "side", "quantity"]);
endpoint!(GET_ORDER, "getOrder", "/api/v3/order", Get, Spot, Signed, ["symbol"]);
endpoint!(CANCEL_ORDER, "cancelOrder", "/api/v3/order", Delete, Spot, Signed, ["symbol"]);
endpoint!(OPEN_ORDERS, "openOrders", "/api/v3/openOrders", Get, Spot, Signed, []);
endpoint!(ALL_ORDERS, "allOrders", "/api/v3/allOrders", Get, Spot, Signed, ["symbol"]);
endpoint!(ACCOUNT_INFO, "accountInfo", "/api/v3/account", Get, Spot, Signed, []);
endpoint!(MY_TRADES, "myTrades", "/api/v3/myTrades", Get, Spot, Signed, ["symbol"]);

// Futures
endpoint!(FUTURES_PING, "futuresPing", "/fapi/v1/ping", Get, Futures, Public, []);
endpoint!(FUTURES_TIME, "futuresTime", "/fapi/v1/time", Get, Futures, Public, []);
endpoint!(FUTURES_BOOK, "futuresBook", "/fapi/v1/depth", Get, Futures, Public, ["symbol"]);
endpoint!(FUTURES_CANDLES, "futuresCandles", "/fapi/v1/klines", Get, Futures, Public, ["symbol"]);

/// Listen-key acquisition for a product's user-data stream.
pub const fn create_listen_key(product: Product) -> EndpointDescriptor {
    EndpointDescriptor {
        name: "createListenKey",
        path: product.listen_key_path(),
        method: HttpMethod::Post,
        product,
        security: Security::ApiKey,
        required_params: &[],
    }
}

/// Periodic keep-alive of an issued listen key.
pub const fn keep_alive_listen_key(product: Product) -> EndpointDescriptor {
    EndpointDescriptor {
        name: "keepAliveListenKey",
        path: product.listen_key_path(),
        method: HttpMethod::Put,
        product,
        security: Security::ApiKey,
        required_params: &[],
    }
}

/// Advisory release of a listen key; the exchange also expires idle keys
/// on its own.
pub const fn close_listen_key(product: Product) -> EndpointDescriptor {
    EndpointDescriptor {
        name: "closeListenKey",
        path: product.listen_key_path(),
        method: HttpMethod::Delete,
        product,
        security: Security::ApiKey,
        required_params: &[],
    }
}

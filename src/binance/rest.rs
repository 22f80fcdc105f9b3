use crate::binance::endpoints::{EndpointDescriptor, HttpMethod, Security};
use crate::core::config::ClientConfig;
use crate::core::errors::ClientError;
use crate::core::kernel::rest::{HttpClient, HttpClientConfig};
use crate::core::kernel::signer;
use crate::core::products::{rest_host_for_path, Product};
use crate::core::types::RateLimitTracker;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Ordered request parameters.
///
/// Insertion order is preserved all the way into the query string, which
/// matters because the signature is computed over that exact ordering.
#[derive(Debug, Clone, Default)]
pub struct Params(Vec<(String, String)>);

impl Params {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a parameter, replacing an earlier entry with the same key.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl ToString) {
        let key = key.into();
        let value = value.to_string();
        if let Some(entry) = self.0.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
        } else {
            self.0.push((key, value));
        }
    }

    /// Append only when the value is present; keeps optional parameters
    /// off the wire entirely.
    #[must_use]
    pub fn with_optional(mut self, key: impl Into<String>, value: Option<impl ToString>) -> Self {
        if let Some(value) = value {
            self.set(key, value);
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: ToString> FromIterator<(K, V)> for Params {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut params = Self::new();
        for (k, v) in iter {
            params.set(k, v);
        }
        params
    }
}

/// Request signer / caller: builds query strings, signs what must be
/// signed, dispatches, and hands back normalized JSON.
#[derive(Clone, Debug)]
pub struct BinanceRest {
    http: HttpClient,
    config: Arc<ClientConfig>,
}

impl BinanceRest {
    pub fn new(
        config: Arc<ClientConfig>,
        rate_limits: RateLimitTracker,
    ) -> Result<Self, ClientError> {
        let http_config = HttpClientConfig {
            proxy: config.proxy.clone(),
            ..HttpClientConfig::default()
        };
        let http = HttpClient::new(http_config, rate_limits)?;
        Ok(Self { http, config })
    }

    /// Product implied by a path prefix; `/fapi` and `/dapi` paths route
    /// to their hosts no matter which product the caller started from.
    fn product_for_path(path: &str) -> Product {
        if path.starts_with("/fapi") {
            Product::Futures
        } else if path.starts_with("/dapi") {
            Product::Delivery
        } else {
            Product::Spot
        }
    }

    fn url_for(&self, path: &str, query: &str) -> String {
        let host = if path.starts_with("/papi") {
            rest_host_for_path(path, self.config.testnet).to_string()
        } else {
            self.config.rest_base(Self::product_for_path(path))
        };
        format!("{host}{path}{query}")
    }

    /// Unsigned call: parameters ride in the query string as given.
    #[instrument(skip(self, params), fields(path = %path))]
    pub async fn public_call(
        &self,
        method: HttpMethod,
        path: &str,
        params: &Params,
    ) -> Result<Value, ClientError> {
        let query = signer::make_query_string(params.iter());
        let url = self.url_for(path, &query);
        self.http.send(method.into(), &url, &[]).await
    }

    /// Exchange clock in epoch milliseconds, one unsigned round trip.
    pub async fn server_time(&self, product: Product) -> Result<i64, ClientError> {
        let value = self
            .public_call(HttpMethod::Get, product.server_time_path(), &Params::new())
            .await?;
        value
            .get("serverTime")
            .and_then(Value::as_i64)
            .ok_or_else(|| ClientError::Decode("serverTime missing from response".to_string()))
    }

    /// Signed call.
    ///
    /// Builds a fresh outbound parameter record (the caller's input is
    /// never mutated), resolves the timestamp from the injected clock or
    /// a server-time round trip, strips the `useServerTime` flag before
    /// it can reach the signature or the wire, and appends `timestamp`
    /// and `signature` unless the endpoint suppresses them.
    #[instrument(skip(self, params), fields(path = %path))]
    pub async fn private_call(
        &self,
        method: HttpMethod,
        path: &str,
        params: &Params,
        security: Security,
    ) -> Result<Value, ClientError> {
        if !self.config.has_credentials() {
            return Err(ClientError::missing_credentials());
        }

        let mut outbound = Params::new();
        let mut use_server_time = self.config.use_server_time;
        for (key, value) in params.iter() {
            if key == "useServerTime" {
                use_server_time = use_server_time || value == "true";
                continue;
            }
            outbound.set(key, value);
        }

        if security == Security::Signed {
            let timestamp = if use_server_time {
                self.server_time(Self::product_for_path(path)).await?
            } else {
                self.config.now_millis()
            };
            outbound.set("timestamp", timestamp);

            let signature =
                signer::generate_signature(self.config.api_secret(), &signer::canonical_query(outbound.iter()));
            outbound.set("signature", signature);
        }

        let query = signer::make_query_string(outbound.iter());
        let url = self.url_for(path, &query);
        let api_key = self.config.api_key().to_string();
        self.http
            .send(method.into(), &url, &[("X-MBX-APIKEY", api_key.as_str())])
            .await
    }

    /// Descriptor-driven dispatch used by every typed wrapper.
    ///
    /// Credential presence is checked before parameter validation, and
    /// both before any network I/O.
    pub async fn dispatch(
        &self,
        descriptor: &EndpointDescriptor,
        params: &Params,
    ) -> Result<Value, ClientError> {
        if descriptor.security != Security::Public && !self.config.has_credentials() {
            return Err(ClientError::missing_credentials());
        }
        descriptor.validate(params)?;
        debug!(endpoint = descriptor.name, "dispatching");

        match descriptor.security {
            Security::Public => {
                self.public_call(descriptor.method, descriptor.path, params)
                    .await
            }
            Security::ApiKey | Security::Signed => {
                self.private_call(descriptor.method, descriptor.path, params, descriptor.security)
                    .await
            }
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_preserve_insertion_order() {
        let params = Params::new()
            .with("symbol", "ETHBTC")
            .with("limit", 50)
            .with("fromId", 7);
        let keys: Vec<&str> = params.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["symbol", "limit", "fromId"]);
    }

    #[test]
    fn params_replace_in_place() {
        let params = Params::new()
            .with("symbol", "ETHBTC")
            .with("limit", 50)
            .with("symbol", "BTCUSDT");
        let entries: Vec<(&str, &str)> = params.iter().collect();
        assert_eq!(entries, vec![("symbol", "BTCUSDT"), ("limit", "50")]);
    }

    #[test]
    fn optional_params_stay_off_the_wire() {
        let params = Params::new()
            .with("symbol", "ETHBTC")
            .with_optional("limit", None::<u32>)
            .with_optional("interval", Some("1m"));
        assert_eq!(params.get("limit"), None);
        assert_eq!(params.get("interval"), Some("1m"));
    }

    #[test]
    fn url_routing_honors_path_prefix() {
        assert_eq!(BinanceRest::product_for_path("/api/v3/depth"), Product::Spot);
        assert_eq!(
            BinanceRest::product_for_path("/sapi/v1/userDataStream"),
            Product::Spot
        );
        assert_eq!(
            BinanceRest::product_for_path("/fapi/v1/depth"),
            Product::Futures
        );
        assert_eq!(
            BinanceRest::product_for_path("/dapi/v1/klines"),
            Product::Delivery
        );
    }
}

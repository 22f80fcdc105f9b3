use crate::core::products::Product;
use secrecy::{ExposeSecret, Secret};
use serde::{Serialize, Serializer};
use std::env;
use std::sync::Arc;

/// Injectable time source returning epoch milliseconds.
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

/// Per-product host overrides; unset entries fall back to the defaults
/// in [`Product`].
#[derive(Debug, Clone, Default)]
pub struct HostOverrides {
    pub spot: Option<String>,
    pub futures: Option<String>,
    pub delivery: Option<String>,
}

impl HostOverrides {
    pub fn get(&self, product: Product) -> Option<&str> {
        match product {
            Product::Spot | Product::Margin => self.spot.as_deref(),
            Product::Futures => self.futures.as_deref(),
            Product::Delivery => self.delivery.as_deref(),
        }
    }
}

/// Client construction options.
///
/// Credentials are optional: a key-less client serves public endpoints
/// and market-data streams, and fails fast on anything that must be
/// signed.
#[derive(Clone)]
pub struct ClientConfig {
    pub(crate) api_key: Secret<String>,
    pub(crate) api_secret: Secret<String>,
    pub testnet: bool,
    pub rest_hosts: HostOverrides,
    pub ws_hosts: HostOverrides,
    pub proxy: Option<String>,
    pub use_server_time: bool,
    /// Forward socket open/close lifecycle events to subscribers.
    pub emit_socket_events: bool,
    /// Forward stream/session errors to subscribers instead of
    /// swallowing them behind self-healing reconnects.
    pub emit_stream_errors: bool,
    pub(crate) clock: Option<Clock>,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_key", &"[REDACTED]")
            .field("api_secret", &"[REDACTED]")
            .field("testnet", &self.testnet)
            .field("rest_hosts", &self.rest_hosts)
            .field("ws_hosts", &self.ws_hosts)
            .field("proxy", &self.proxy)
            .field("use_server_time", &self.use_server_time)
            .field("has_clock", &self.clock.is_some())
            .finish_non_exhaustive()
    }
}

// Never expose secrets in serialization
impl Serialize for ClientConfig {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("ClientConfig", 4)?;
        state.serialize_field("api_key", "[REDACTED]")?;
        state.serialize_field("api_secret", "[REDACTED]")?;
        state.serialize_field("testnet", &self.testnet)?;
        state.serialize_field("proxy", &self.proxy)?;
        state.end()
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::read_only()
    }
}

impl ClientConfig {
    /// Create a new configuration with API credentials.
    #[must_use]
    pub fn new(api_key: String, api_secret: String) -> Self {
        Self {
            api_key: Secret::new(api_key),
            api_secret: Secret::new(api_secret),
            testnet: false,
            rest_hosts: HostOverrides::default(),
            ws_hosts: HostOverrides::default(),
            proxy: None,
            use_server_time: false,
            emit_socket_events: false,
            emit_stream_errors: false,
            clock: None,
        }
    }

    /// Configuration for public endpoints only, no credentials.
    #[must_use]
    pub fn read_only() -> Self {
        Self::new(String::new(), String::new())
    }

    /// Create configuration from environment variables.
    ///
    /// Expected environment variables:
    /// - `{PREFIX}_API_KEY` (e.g., `BINANCE_API_KEY`)
    /// - `{PREFIX}_API_SECRET`
    /// - `{PREFIX}_TESTNET` (optional, defaults to false)
    pub fn from_env(prefix: &str) -> Result<Self, ConfigError> {
        let api_key_var = format!("{}_API_KEY", prefix.to_uppercase());
        let api_secret_var = format!("{}_API_SECRET", prefix.to_uppercase());
        let testnet_var = format!("{}_TESTNET", prefix.to_uppercase());

        let api_key = env::var(&api_key_var)
            .map_err(|_| ConfigError::MissingEnvironmentVariable(api_key_var))?;
        let api_secret = env::var(&api_secret_var)
            .map_err(|_| ConfigError::MissingEnvironmentVariable(api_secret_var))?;

        let testnet = env::var(&testnet_var)
            .unwrap_or_else(|_| "false".to_string())
            .parse::<bool>()
            .unwrap_or(false);

        Ok(Self::new(api_key, api_secret).testnet(testnet))
    }

    /// Create configuration from a .env file and environment variables.
    ///
    /// **Security Warning**: Never commit .env files to version control!
    #[cfg(feature = "env-file")]
    pub fn from_env_file(prefix: &str) -> Result<Self, ConfigError> {
        match dotenv::dotenv() {
            Ok(_) => {}
            Err(dotenv::Error::Io(io_err)) if io_err.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(ConfigError::InvalidConfiguration(format!(
                    "Failed to load .env file: {e}"
                )));
            }
        }
        Self::from_env(prefix)
    }

    /// Check whether both credentials are present.
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        !self.api_key.expose_secret().is_empty() && !self.api_secret.expose_secret().is_empty()
    }

    #[must_use]
    pub const fn testnet(mut self, testnet: bool) -> Self {
        self.testnet = testnet;
        self
    }

    #[must_use]
    pub fn rest_host(mut self, product: Product, host: impl Into<String>) -> Self {
        let slot = match product {
            Product::Spot | Product::Margin => &mut self.rest_hosts.spot,
            Product::Futures => &mut self.rest_hosts.futures,
            Product::Delivery => &mut self.rest_hosts.delivery,
        };
        *slot = Some(host.into());
        self
    }

    #[must_use]
    pub fn ws_host(mut self, product: Product, host: impl Into<String>) -> Self {
        let slot = match product {
            Product::Spot | Product::Margin => &mut self.ws_hosts.spot,
            Product::Futures => &mut self.ws_hosts.futures,
            Product::Delivery => &mut self.ws_hosts.delivery,
        };
        *slot = Some(host.into());
        self
    }

    #[must_use]
    pub fn proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    /// Resolve signed-call timestamps through a server-time round trip
    /// instead of the local clock.
    #[must_use]
    pub const fn use_server_time(mut self, enabled: bool) -> Self {
        self.use_server_time = enabled;
        self
    }

    #[must_use]
    pub const fn emit_socket_events(mut self, enabled: bool) -> Self {
        self.emit_socket_events = enabled;
        self
    }

    #[must_use]
    pub const fn emit_stream_errors(mut self, enabled: bool) -> Self {
        self.emit_stream_errors = enabled;
        self
    }

    /// Inject a custom time source (epoch milliseconds).
    #[must_use]
    pub fn clock(mut self, clock: Clock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Current epoch milliseconds from the injected clock, or wall clock.
    pub fn now_millis(&self) -> i64 {
        self.clock
            .as_ref()
            .map_or_else(|| chrono::Utc::now().timestamp_millis(), |clock| clock())
    }

    pub(crate) fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }

    pub(crate) fn api_secret(&self) -> &str {
        self.api_secret.expose_secret()
    }

    /// REST base for a product: testnet wins, then overrides, then default.
    pub fn rest_base(&self, product: Product) -> String {
        if self.testnet {
            return product.rest_base(true).to_string();
        }
        self.rest_hosts
            .get(product)
            .map_or_else(|| product.rest_base(false).to_string(), str::to_string)
    }

    /// WebSocket base for a product, same precedence as [`Self::rest_base`].
    pub fn ws_base(&self, product: Product) -> String {
        if self.testnet {
            return product.ws_base(true).to_string();
        }
        self.ws_hosts
            .get(product)
            .map_or_else(|| product.ws_base(false).to_string(), str::to_string)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvironmentVariable(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_only_has_no_credentials() {
        assert!(!ClientConfig::read_only().has_credentials());
        assert!(ClientConfig::new("k".into(), "s".into()).has_credentials());
    }

    #[test]
    fn testnet_beats_host_override() {
        let config = ClientConfig::read_only()
            .rest_host(Product::Spot, "https://example.test")
            .testnet(true);
        assert_eq!(
            config.rest_base(Product::Spot),
            "https://testnet.binance.vision"
        );
    }

    #[test]
    fn override_beats_default() {
        let config = ClientConfig::read_only().ws_host(Product::Futures, "wss://example.test");
        assert_eq!(config.ws_base(Product::Futures), "wss://example.test");
        assert_eq!(
            config.ws_base(Product::Spot),
            "wss://stream.binance.com:9443"
        );
    }

    #[test]
    fn injected_clock_is_used() {
        let config = ClientConfig::read_only().clock(Arc::new(|| 1_499_827_319_559));
        assert_eq!(config.now_millis(), 1_499_827_319_559);
    }

    #[test]
    fn serialization_redacts_secrets() {
        let config = ClientConfig::new("key".into(), "secret".into());
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
        assert!(json.contains("[REDACTED]"));
    }
}

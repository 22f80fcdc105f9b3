use crate::core::errors::ClientError;
use crate::core::types::RateLimitTracker;
use reqwest::{Client, Method, Response};
use serde_json::Value;
use tracing::{instrument, trace};

/// Configuration for the HTTP layer.
#[derive(Clone, Debug)]
pub struct HttpClientConfig {
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// User agent string to include in requests
    pub user_agent: String,
    /// Optional proxy URL applied to every request
    pub proxy: Option<String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            user_agent: "mbx/0.1".to_string(),
            proxy: None,
        }
    }
}

/// Thin reqwest wrapper: dispatches prepared requests and normalizes
/// responses into the crate error taxonomy.
///
/// Every response's headers flow into the client-owned
/// [`RateLimitTracker`] before the body is inspected; recording never
/// affects call success or failure.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    rate_limits: RateLimitTracker,
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient").finish_non_exhaustive()
    }
}

impl HttpClient {
    pub fn new(config: HttpClientConfig, rate_limits: RateLimitTracker) -> Result<Self, ClientError> {
        let mut builder = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_seconds))
            .user_agent(&config.user_agent);

        if let Some(proxy) = &config.proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| ClientError::Configuration(format!("Invalid proxy URL: {e}")))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| ClientError::Configuration(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            rate_limits,
        })
    }

    /// Send a request; the query string is already part of `url`.
    ///
    /// All parameters ride in the URL on this exchange, so requests carry
    /// no body.
    #[instrument(skip(self, headers), fields(method = %method))]
    pub async fn send(
        &self,
        method: Method,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<Value, ClientError> {
        let mut request = self.client.request(method, url);
        for (key, value) in headers {
            request = request.header(*key, *value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ClientError::Network(format!("Request failed: {e}")))?;

        self.handle_response(response).await
    }

    /// Normalize a response: 2xx parses as JSON; a non-2xx body carrying
    /// the exchange's `{code, msg}` shape becomes [`ClientError::Exchange`],
    /// anything else (proxy pages, HTML, truncation) becomes
    /// [`ClientError::Transport`] with the raw material attached.
    async fn handle_response(&self, response: Response) -> Result<Value, ClientError> {
        let status = response.status();
        let host = response
            .url()
            .host_str()
            .unwrap_or_default()
            .to_string();

        self.rate_limits.record(
            &host,
            response
                .headers()
                .iter()
                .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v))),
        );

        let status_text = status.canonical_reason().unwrap_or("Unknown").to_string();
        let text = response
            .text()
            .await
            .map_err(|e| ClientError::Network(format!("Failed to read response body: {e}")))?;

        trace!(%status, "response body: {}", text);

        if status.is_success() {
            if text.is_empty() {
                return Ok(Value::Null);
            }
            return serde_json::from_str(&text)
                .map_err(|e| ClientError::Decode(format!("Failed to parse JSON response: {e}")));
        }

        match serde_json::from_str::<Value>(&text) {
            Ok(body) if body.get("code").is_some() || body.get("msg").is_some() => {
                let code = body
                    .get("code")
                    .and_then(Value::as_i64)
                    .unwrap_or_else(|| i64::from(status.as_u16()));
                let message = body.get("msg").and_then(Value::as_str).map_or_else(
                    || format!("{} {}", status.as_u16(), status_text),
                    str::to_string,
                );
                Err(ClientError::Exchange { code, message })
            }
            _ => Err(ClientError::Transport {
                status: status.as_u16(),
                status_text,
                body: text,
            }),
        }
    }
}

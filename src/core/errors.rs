use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    /// Missing credentials or parameters, detected before any network I/O.
    #[error("{0}")]
    Configuration(String),

    /// Non-2xx response whose body carried the exchange's own error shape.
    #[error("{message}")]
    Exchange { code: i64, message: String },

    /// Non-2xx response with a body the exchange did not produce
    /// (intermediary/proxy failure page, HTML error, truncated body).
    #[error("{status} {status_text}")]
    Transport {
        status: u16,
        status_text: String,
        body: String,
    },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Connection timeout: {0}")]
    ConnectionTimeout(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::core::config::ConfigError),
}

impl ClientError {
    /// Credentials are absent for a call that must be signed.
    pub fn missing_credentials() -> Self {
        Self::Configuration(
            "You need to pass an API key and secret to make authenticated calls.".to_string(),
        )
    }

    /// A required parameter is absent; named after the calling method.
    pub fn missing_parameter(method: &str, param: &str) -> Self {
        Self::Configuration(format!("Method {method} requires {param} parameter."))
    }

    /// The exchange's numeric error code, when the response carried one.
    pub fn code(&self) -> Option<i64> {
        match self {
            Self::Exchange { code, .. } => Some(*code),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_credentials_message_is_stable() {
        let err = ClientError::missing_credentials();
        assert_eq!(
            err.to_string(),
            "You need to pass an API key and secret to make authenticated calls."
        );
    }

    #[test]
    fn missing_parameter_names_method_and_field() {
        let err = ClientError::missing_parameter("candles", "symbol");
        assert_eq!(err.to_string(), "Method candles requires symbol parameter.");
    }

    #[test]
    fn exchange_error_exposes_code() {
        let err = ClientError::Exchange {
            code: -1100,
            message: "Illegal characters found in parameter".to_string(),
        };
        assert_eq!(err.code(), Some(-1100));
        assert_eq!(err.to_string(), "Illegal characters found in parameter");
    }
}

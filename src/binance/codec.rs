use crate::core::errors::ClientError;
use crate::core::kernel::WsCodec;
use serde_json::Value;
use tokio_tungstenite::tungstenite::Message;

/// Frame decoder for the exchange's push streams.
///
/// Yields the JSON payload of each data frame. Combined-stream envelopes
/// (`{"stream": ..., "data": ...}`) are unwrapped, and control-channel
/// acknowledgements (`{"result": ..., "id": ...}`) are filtered out so
/// they never reach a transformer.
pub struct BinanceCodec;

impl WsCodec for BinanceCodec {
    type Message = Value;

    fn decode_message(&self, message: Message) -> Result<Option<Self::Message>, ClientError> {
        let text = match message {
            Message::Text(text) => text,
            Message::Binary(data) => String::from_utf8(data).map_err(|e| {
                ClientError::Decode(format!("Invalid UTF-8 in binary message: {e}"))
            })?,
            _ => return Ok(None),
        };

        let value: Value =
            serde_json::from_str(&text).map_err(|e| ClientError::Decode(format!("Failed to parse JSON: {e}")))?;

        if value.get("stream").is_some() {
            if let Some(data) = value.get("data") {
                return Ok(Some(data.clone()));
            }
        }

        if value.get("id").is_some() && value.get("result").is_some() {
            return Ok(None);
        }

        Ok(Some(value))
    }
}

/// `<lowercased-symbol>@<channel>` stream identifier.
pub fn stream_name(symbol: &str, channel: &str) -> String {
    format!("{}@{}", symbol.to_lowercase(), channel)
}

/// Connection URL for one raw stream.
pub fn raw_stream_url(base: &str, stream: &str) -> String {
    format!("{base}/ws/{stream}")
}

/// Connection URL for an all-market aggregate stream (`!<channel>@arr`).
pub fn all_market_url(base: &str, channel: &str) -> String {
    format!("{base}/ws/!{channel}@arr")
}

/// Connection URL for an authenticated user-data stream.
pub fn user_stream_url(base: &str, listen_key: &str) -> String {
    format!("{base}/ws/{listen_key}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stream_names_lowercase_the_symbol() {
        assert_eq!(stream_name("ETHBTC", "depth"), "ethbtc@depth");
        assert_eq!(stream_name("ETHBTC", "kline_1m"), "ethbtc@kline_1m");
        assert_eq!(stream_name("btcusdt", "depth5"), "btcusdt@depth5");
    }

    #[test]
    fn urls_follow_path_scheme() {
        let base = "wss://stream.binance.com:9443";
        assert_eq!(
            raw_stream_url(base, "ethbtc@trade"),
            "wss://stream.binance.com:9443/ws/ethbtc@trade"
        );
        assert_eq!(
            all_market_url(base, "ticker"),
            "wss://stream.binance.com:9443/ws/!ticker@arr"
        );
        assert_eq!(
            user_stream_url(base, "pqia91ma19a5s61cv6a81va65sdf19v8"),
            "wss://stream.binance.com:9443/ws/pqia91ma19a5s61cv6a81va65sdf19v8"
        );
    }

    #[test]
    fn combined_stream_envelope_is_unwrapped() {
        let codec = BinanceCodec;
        let frame = json!({
            "stream": "ethbtc@trade",
            "data": {"e": "trade", "s": "ETHBTC"}
        });
        let decoded = codec
            .decode_message(Message::Text(frame.to_string()))
            .unwrap()
            .unwrap();
        assert_eq!(decoded.get("e"), Some(&json!("trade")));
        assert!(decoded.get("stream").is_none());
    }

    #[test]
    fn subscription_acks_are_filtered() {
        let codec = BinanceCodec;
        let ack = json!({"result": null, "id": 1});
        assert!(codec
            .decode_message(Message::Text(ack.to_string()))
            .unwrap()
            .is_none());
    }

    #[test]
    fn direct_payloads_pass_through() {
        let codec = BinanceCodec;
        let frame = json!({"e": "depthUpdate", "s": "ETHBTC"});
        let decoded = codec
            .decode_message(Message::Text(frame.to_string()))
            .unwrap()
            .unwrap();
        assert_eq!(decoded.get("e"), Some(&json!("depthUpdate")));
    }
}

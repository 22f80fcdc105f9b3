use crate::core::errors::ClientError;
use tokio_tungstenite::tungstenite::Message;

/// Codec trait for decoding exchange WebSocket frames.
///
/// Subscriptions on this exchange are expressed in the connection URL
/// path, so the codec's only job is turning raw data frames into typed
/// messages. Control frames (ping, pong, close) are handled at the
/// transport level and never reach the codec.
pub trait WsCodec: Send + Sync + 'static {
    /// The type representing parsed messages from this exchange
    type Message: Send + Sync;

    /// Decode a raw WebSocket message into a typed message
    ///
    /// # Returns
    /// - `Ok(Some(message))` - Successfully decoded message
    /// - `Ok(None)` - Message was ignored/filtered by codec
    /// - `Err(error)` - Failed to decode message
    fn decode_message(&self, message: Message) -> Result<Option<Self::Message>, ClientError>;
}

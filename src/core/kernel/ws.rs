use crate::core::errors::ClientError;
use crate::core::kernel::codec::WsCodec;
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::sleep;
use tokio_retry::strategy::ExponentialBackoff;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, instrument, warn};

/// Transport timing parameters.
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// Abort a connection attempt that has not completed within this window.
    pub connect_timeout_ms: u64,
    /// First reconnect delay after an unexpected closure.
    pub reconnect_min_ms: u64,
    /// Ceiling the reconnect delay grows toward on repeated failures.
    pub reconnect_max_ms: u64,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 4_000,
            reconnect_min_ms: 4_000,
            reconnect_max_ms: 10_000,
        }
    }
}

/// Event surfaced by the transport. A closed set: subscribing to a kind
/// is the subscriber's choice, the transport always emits all of them.
#[derive(Debug)]
pub enum WsEvent<M> {
    /// The socket (re)connected. Emitted once per physical connection.
    Open,
    Message(M),
    Error(ClientError),
    /// The socket closed. Unless the handle was closed with
    /// `keep_closed`, a reconnect attempt follows.
    Closed { code: Option<u16>, reason: String },
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Single physical WebSocket session over tungstenite.
///
/// Pings are answered at this level; data frames are decoded through the
/// codec.
pub struct TungsteniteWs<C: WsCodec> {
    url: String,
    label: String,
    stream: Option<WsStream>,
    connected: bool,
    codec: C,
    connect_timeout: Duration,
}

impl<C: WsCodec> TungsteniteWs<C> {
    pub fn new(url: String, label: String, codec: C) -> Self {
        Self {
            url,
            label,
            stream: None,
            connected: false,
            codec,
            connect_timeout: Duration::from_millis(WsConfig::default().connect_timeout_ms),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    #[instrument(skip(self), fields(label = %self.label, url = %self.url))]
    pub async fn connect(&mut self) -> Result<(), ClientError> {
        let attempt = tokio::time::timeout(self.connect_timeout, connect_async(&self.url));

        let (stream, _) = attempt
            .await
            .map_err(|_| {
                ClientError::ConnectionTimeout(format!(
                    "WebSocket connection to {} timed out",
                    self.url
                ))
            })?
            .map_err(|e| ClientError::Network(format!("WebSocket connection failed: {e}")))?;

        self.stream = Some(stream);
        self.connected = true;
        Ok(())
    }

    /// Next decoded event from the wire.
    ///
    /// Returns `None` when the peer vanished without a close frame; the
    /// caller decides whether that ends the logical connection.
    pub async fn next_event(&mut self) -> Option<WsEvent<C::Message>> {
        loop {
            let stream = self.stream.as_mut()?;
            match stream.next().await {
                Some(Ok(Message::Ping(payload))) => {
                    if let Err(e) = stream.send(Message::Pong(payload)).await {
                        warn!(label = %self.label, "failed to answer ping: {e}");
                    }
                }
                Some(Ok(Message::Pong(_))) => {}
                Some(Ok(Message::Close(frame))) => {
                    self.connected = false;
                    let (code, reason) = frame.map_or((None, String::new()), |f| {
                        (Some(u16::from(f.code)), f.reason.into_owned())
                    });
                    return Some(WsEvent::Closed { code, reason });
                }
                Some(Ok(message)) => match self.codec.decode_message(message) {
                    Ok(Some(decoded)) => return Some(WsEvent::Message(decoded)),
                    Ok(None) => {}
                    Err(e) => return Some(WsEvent::Error(e)),
                },
                Some(Err(e)) => {
                    self.connected = false;
                    return Some(WsEvent::Error(ClientError::Network(format!(
                        "WebSocket error: {e}"
                    ))));
                }
                None => {
                    self.connected = false;
                    return None;
                }
            }
        }
    }

    /// Send a close frame and drop the physical connection.
    pub async fn close(&mut self, code: u16, reason: &str) {
        if let Some(mut stream) = self.stream.take() {
            let frame = CloseFrame {
                code: CloseCode::from(code),
                reason: reason.to_string().into(),
            };
            let _ = stream.send(Message::Close(Some(frame))).await;
            let _ = stream.close(None).await;
        }
        self.connected = false;
    }
}

/// Reconnect delay schedule: exponential growth from the minimum toward
/// the maximum, each delay jittered within `[min, current]`.
fn backoff_schedule(config: &WsConfig) -> impl Iterator<Item = Duration> + '_ {
    let min = Duration::from_millis(config.reconnect_min_ms);
    ExponentialBackoff::from_millis(2)
        .factor(config.reconnect_min_ms / 2)
        .max_delay(Duration::from_millis(config.reconnect_max_ms))
        .map(move |delay| bounded_jitter(delay, min))
}

fn bounded_jitter(delay: Duration, min: Duration) -> Duration {
    if delay <= min {
        return delay;
    }
    let span = (delay - min).as_millis() as u64;
    min + Duration::from_millis(rand::thread_rng().gen_range(0..=span))
}

/// Stable logical socket over an unreliable physical one.
///
/// Any closure not requested through [`ReconnectWs::close`] schedules a
/// redial, retrying indefinitely; the handle survives across physical
/// connections, so registered consumers never re-attach anything.
/// Messages in flight while the socket is down are dropped, not queued:
/// these are best-effort market-data feeds, and the gap is the
/// documented cost of self-healing.
pub struct ReconnectWs<C: WsCodec> {
    inner: TungsteniteWs<C>,
    config: WsConfig,
    keep_closed: bool,
    ever_connected: bool,
}

impl<C: WsCodec> ReconnectWs<C> {
    pub fn new(url: String, label: String, codec: C) -> Self {
        Self::with_config(url, label, codec, WsConfig::default())
    }

    pub fn with_config(url: String, label: String, codec: C, config: WsConfig) -> Self {
        let inner = TungsteniteWs::new(url, label, codec)
            .with_connect_timeout(Duration::from_millis(config.connect_timeout_ms));
        Self {
            inner,
            config,
            keep_closed: false,
            ever_connected: false,
        }
    }

    pub fn url(&self) -> &str {
        self.inner.url()
    }

    /// Whether a physical connection is currently up. A decode error on
    /// a healthy socket leaves this true; a broken socket flips it.
    pub fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    /// Dial until a connection lands. Failures are retried silently with
    /// the bounded backoff schedule; there is no retry ceiling.
    ///
    /// The very first dial of a fresh handle goes out immediately; after
    /// an unexpected closure the first retry already waits the minimum
    /// backoff.
    async fn reconnect(&mut self) {
        let mut schedule = backoff_schedule(&self.config);
        let mut attempt: u32 = 0;

        if self.ever_connected {
            let delay = schedule
                .next()
                .unwrap_or_else(|| Duration::from_millis(self.config.reconnect_min_ms));
            sleep(delay).await;
        }

        loop {
            match self.inner.connect().await {
                Ok(()) => {
                    if attempt > 0 {
                        debug!(label = %self.inner.label, attempts = attempt + 1, "reconnected");
                    }
                    self.ever_connected = true;
                    return;
                }
                Err(e) => {
                    attempt += 1;
                    let delay = schedule
                        .next()
                        .unwrap_or_else(|| Duration::from_millis(self.config.reconnect_max_ms));
                    warn!(
                        label = %self.inner.label,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "connection failed: {e}; retrying"
                    );
                    sleep(delay).await;
                }
            }
        }
    }

    /// Next event on the logical socket.
    ///
    /// Drives the initial dial as well as every redial; `Open` is
    /// emitted for each physical connection established. Returns `None`
    /// only after the handle was closed with `keep_closed`.
    pub async fn next_event(&mut self) -> Option<WsEvent<C::Message>> {
        if self.keep_closed {
            return None;
        }
        if !self.inner.is_connected() {
            self.reconnect().await;
            return Some(WsEvent::Open);
        }
        match self.inner.next_event().await {
            Some(event) => Some(event),
            // Peer vanished without a close frame: same as a close.
            None => Some(WsEvent::Closed {
                code: None,
                reason: String::new(),
            }),
        }
    }

    /// Close with code 1000. With `keep_closed` set, every future
    /// reconnect is suppressed and the handle is spent; otherwise the
    /// closure counts as transient and the next [`Self::next_event`]
    /// call redials. Closing twice is a no-op.
    pub async fn close(&mut self, keep_closed: bool) {
        if keep_closed {
            self.keep_closed = true;
        }
        self.inner.close(1000, "").await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_timing_parameters() {
        let config = WsConfig::default();
        assert_eq!(config.connect_timeout_ms, 4_000);
        assert_eq!(config.reconnect_min_ms, 4_000);
        assert_eq!(config.reconnect_max_ms, 10_000);
    }

    #[test]
    fn backoff_stays_within_bounds() {
        let config = WsConfig::default();
        let delays: Vec<Duration> = backoff_schedule(&config).take(8).collect();
        for delay in &delays {
            assert!(*delay >= Duration::from_millis(config.reconnect_min_ms));
            assert!(*delay <= Duration::from_millis(config.reconnect_max_ms));
        }
    }

    #[test]
    fn backoff_first_delay_is_minimum() {
        let config = WsConfig::default();
        let first = backoff_schedule(&config).next().unwrap();
        assert_eq!(first, Duration::from_millis(config.reconnect_min_ms));
    }

    #[test]
    fn jitter_never_exceeds_raw_delay() {
        let min = Duration::from_millis(4_000);
        for _ in 0..100 {
            let jittered = bounded_jitter(Duration::from_millis(10_000), min);
            assert!(jittered >= min);
            assert!(jittered <= Duration::from_millis(10_000));
        }
    }
}

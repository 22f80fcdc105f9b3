//! Listen-key lifecycle: the session state machine behind authenticated
//! user-data streams.
//!
//! The exchange expires a listen key that is not renewed inside a fixed
//! window, so a failed renewal carries the same weight as a dropped
//! socket: the logical session is dead and gets rebuilt from scratch
//! with a freshly issued key. The old key is never revived.

use crate::binance::codec::{user_stream_url, BinanceCodec};
use crate::binance::endpoints;
use crate::binance::rest::{BinanceRest, Params};
use crate::binance::streams::{closed, Subscription};
use crate::binance::transforms;
use crate::core::errors::ClientError;
use crate::core::kernel::{ReconnectWs, WsEvent};
use crate::core::products::Product;
use crate::core::types::{StreamEvent, UserDataEvent};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, warn};

/// Keep-alive cadence while a session is active.
const RENEWAL_INTERVAL: Duration = Duration::from_secs(50);
/// Delay before a dead session is rebuilt with a fresh key.
const REACQUIRE_DELAY: Duration = Duration::from_secs(30);

/// Session timer settings. The defaults renew well inside the
/// exchange's expiry window; override them only when pointing at a stub
/// exchange.
#[derive(Debug, Clone)]
pub struct UserStreamTiming {
    pub renewal_interval: Duration,
    pub reacquire_delay: Duration,
}

impl Default for UserStreamTiming {
    fn default() -> Self {
        Self {
            renewal_interval: RENEWAL_INTERVAL,
            reacquire_delay: REACQUIRE_DELAY,
        }
    }
}

/// Session states walked by the driver task. Idle is the instant before
/// the task spawns; Active lives inside [`SessionDriver::run_active`].
/// No session state is ever touched by more than one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Acquiring,
    Reconnecting,
    Closed,
}

/// Outcome of one active session: why it ended.
enum SessionEnd {
    /// Renewal failed or the transport dropped; rebuild with a new key.
    Rebuild,
    /// The user closed the stream.
    Closed,
}

/// Open an authenticated user-data stream for one product.
///
/// Returns immediately; acquisition, renewal and recovery run in a
/// driver task that the returned subscription controls. Closing the
/// subscription releases the listen key (best effort) and closes the
/// transport with reconnection suppressed.
pub(crate) fn open_user_stream(
    rest: BinanceRest,
    product: Product,
    ws_base: String,
    timing: UserStreamTiming,
    emit_socket_events: bool,
    emit_stream_errors: bool,
) -> Subscription<UserDataEvent> {
    let (tx, rx) = mpsc::channel(1024);
    let (close_tx, close_rx) = watch::channel(false);

    let driver = SessionDriver {
        rest,
        product,
        ws_base,
        timing,
        emit_socket_events,
        emit_stream_errors,
        tx,
        close_rx,
    };
    tokio::spawn(driver.run());

    Subscription::from_parts(rx, close_tx)
}

struct SessionDriver {
    rest: BinanceRest,
    product: Product,
    ws_base: String,
    timing: UserStreamTiming,
    emit_socket_events: bool,
    emit_stream_errors: bool,
    tx: mpsc::Sender<StreamEvent<UserDataEvent>>,
    close_rx: watch::Receiver<bool>,
}

impl SessionDriver {
    async fn run(mut self) {
        let mut state = SessionState::Acquiring;
        let mut consecutive_failures: u32 = 0;

        loop {
            debug!(product = %self.product, ?state, "user stream session");
            match state {
                SessionState::Acquiring => {
                    if self.user_closed() {
                        state = SessionState::Closed;
                        continue;
                    }
                    match self.acquire().await {
                        Ok(key) => {
                            // Close requested while acquisition was in
                            // flight: the fresh key is released right away.
                            if self.user_closed() {
                                self.release(&key).await;
                                state = SessionState::Closed;
                                continue;
                            }
                            consecutive_failures = 0;
                            state = match self.run_active(&key).await {
                                SessionEnd::Rebuild => SessionState::Reconnecting,
                                SessionEnd::Closed => {
                                    self.release(&key).await;
                                    SessionState::Closed
                                }
                            };
                        }
                        Err(e) => {
                            consecutive_failures += 1;
                            warn!(product = %self.product, "listen key acquisition failed: {e}");
                            if consecutive_failures > 1 {
                                self.emit_error(e).await;
                            }
                            state = SessionState::Reconnecting;
                        }
                    }
                }
                SessionState::Reconnecting => {
                    if self.wait_reacquire_delay().await {
                        state = SessionState::Closed;
                    } else {
                        state = SessionState::Acquiring;
                    }
                }
                SessionState::Closed => {
                    debug!(product = %self.product, "user stream closed");
                    return;
                }
            }
        }
    }

    /// Active state: transport open on the key's channel, renewal timer
    /// armed. Returns when the session dies or the user closes it.
    async fn run_active(&mut self, key: &str) -> SessionEnd {
        let url = user_stream_url(&self.ws_base, key);
        let mut ws = ReconnectWs::new(url, format!("{}-user", self.product), BinanceCodec);

        let mut renewal = interval(self.timing.renewal_interval);
        renewal.set_missed_tick_behavior(MissedTickBehavior::Delay);
        renewal.tick().await; // the first tick completes immediately

        let mut close_rx = self.close_rx.clone();

        loop {
            tokio::select! {
                () = closed(&mut close_rx) => {
                    // Renewal timer dies with this scope; transport is
                    // closed for good.
                    ws.close(true).await;
                    return SessionEnd::Closed;
                }
                _ = renewal.tick() => {
                    let params = Params::new().with("listenKey", key);
                    if let Err(e) = self
                        .rest
                        .dispatch(&endpoints::keep_alive_listen_key(self.product), &params)
                        .await
                    {
                        warn!(product = %self.product, "listen key renewal failed: {e}");
                        self.emit_error(e).await;
                        ws.close(true).await;
                        return SessionEnd::Rebuild;
                    }
                }
                event = ws.next_event() => {
                    match event {
                        Some(WsEvent::Open) => {
                            if self.emit_socket_events {
                                self.emit(StreamEvent::Open).await;
                            }
                        }
                        Some(WsEvent::Message(value)) => {
                            match transforms::user_data(&value) {
                                Ok(user_event) => self.emit(StreamEvent::Message(user_event)).await,
                                Err(e) => self.emit_error(e).await,
                            }
                        }
                        Some(WsEvent::Error(e)) => {
                            let socket_dead = !ws.is_connected();
                            self.emit_error(e).await;
                            if socket_dead {
                                // An unexpected drop invalidates the whole
                                // session, not just the socket.
                                ws.close(true).await;
                                return SessionEnd::Rebuild;
                            }
                        }
                        Some(WsEvent::Closed { code, reason }) => {
                            if self.emit_socket_events {
                                self.emit(StreamEvent::Closed { code, reason }).await;
                            }
                            ws.close(true).await;
                            return SessionEnd::Rebuild;
                        }
                        None => {
                            // Only reachable after close(keep_closed).
                            return SessionEnd::Closed;
                        }
                    }
                }
            }
        }
    }

    async fn acquire(&self) -> Result<String, ClientError> {
        let value = self
            .rest
            .dispatch(&endpoints::create_listen_key(self.product), &Params::new())
            .await?;
        value
            .get("listenKey")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ClientError::Decode("listenKey missing from response".to_string()))
    }

    /// Best-effort key release. Failure is swallowed: the exchange
    /// expires idle keys on its own, release is advisory.
    async fn release(&self, key: &str) {
        let params = Params::new().with("listenKey", key);
        if let Err(e) = self
            .rest
            .dispatch(&endpoints::close_listen_key(self.product), &params)
            .await
        {
            debug!(product = %self.product, "listen key release failed (ignored): {e}");
        }
    }

    fn user_closed(&self) -> bool {
        *self.close_rx.borrow() || self.tx.is_closed()
    }

    /// Sit out the re-acquisition delay; true when the user closed the
    /// stream in the interim.
    async fn wait_reacquire_delay(&mut self) -> bool {
        let mut close_rx = self.close_rx.clone();
        tokio::select! {
            () = sleep(self.timing.reacquire_delay) => self.user_closed(),
            () = closed(&mut close_rx) => true,
        }
    }

    async fn emit(&self, event: StreamEvent<UserDataEvent>) {
        let _ = self.tx.send(event).await;
    }

    async fn emit_error(&self, error: ClientError) {
        if self.emit_stream_errors {
            self.emit(StreamEvent::Error(error)).await;
        }
    }
}

use crate::binance::codec::BinanceCodec;
use crate::core::errors::ClientError;
use crate::core::kernel::{ReconnectWs, WsEvent};
use crate::core::types::StreamEvent;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::debug;

const CHANNEL_CAPACITY: usize = 1024;

/// Wire-payload to record mapping attached to one socket.
pub type Transform<T> = Arc<dyn Fn(&Value) -> Result<T, ClientError> + Send + Sync>;

/// One socket to open: connection URL plus the transformer for its
/// payloads.
pub(crate) struct StreamSpec<T> {
    pub url: String,
    pub label: String,
    pub transform: Transform<T>,
}

/// Handle to one streaming call.
///
/// A call over N symbols owns N logical sockets; all of them feed this
/// single receiver, and [`Subscription::close`] closes all of them as a
/// unit. There is no partial close. Dropping the handle closes the set
/// as well.
pub struct Subscription<T> {
    events: mpsc::Receiver<StreamEvent<T>>,
    close_tx: watch::Sender<bool>,
}

impl<T> Subscription<T> {
    /// Assemble a handle around an externally driven channel (the
    /// user-data session driver feeds its own).
    pub(crate) fn from_parts(
        events: mpsc::Receiver<StreamEvent<T>>,
        close_tx: watch::Sender<bool>,
    ) -> Self {
        Self { events, close_tx }
    }

    /// Next event from any socket of this subscription.
    pub async fn recv(&mut self) -> Option<StreamEvent<T>> {
        self.events.recv().await
    }

    /// Next data message, skipping lifecycle and error events.
    pub async fn next_message(&mut self) -> Option<T> {
        while let Some(event) = self.events.recv().await {
            if let StreamEvent::Message(message) = event {
                return Some(message);
            }
        }
        None
    }

    /// Close every socket opened for this call, permanently.
    ///
    /// Reconnection is suppressed from here on. Closing an already
    /// closed subscription is a no-op: timers and network events may
    /// race a caller-initiated close.
    pub fn close(&self) {
        let _ = self.close_tx.send(true);
    }
}

impl<T> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("closed", &*self.close_tx.borrow())
            .finish_non_exhaustive()
    }
}

/// Resolves once the subscription is closed, by handle or by drop.
pub(crate) async fn closed(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// Open one reconnecting socket per entry and pump every event into a
/// single channel.
///
/// Data messages always flow; `Open`/`Closed` lifecycle events and
/// errors are filtered here at the subscriber boundary according to the
/// opt-in flags - internally everything is always emitted.
pub(crate) fn open_streams<T: Send + 'static>(
    specs: Vec<StreamSpec<T>>,
    emit_socket_events: bool,
    emit_stream_errors: bool,
) -> Subscription<T> {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (close_tx, _) = watch::channel(false);

    for spec in specs {
        let tx = tx.clone();
        let mut close_rx = close_tx.subscribe();

        tokio::spawn(async move {
            let mut ws = ReconnectWs::new(spec.url, spec.label.clone(), BinanceCodec);
            loop {
                tokio::select! {
                    () = closed(&mut close_rx) => {
                        ws.close(true).await;
                        debug!(label = %spec.label, "subscription closed");
                        break;
                    }
                    event = ws.next_event() => {
                        let Some(event) = event else { break };
                        let outbound = match event {
                            WsEvent::Open => emit_socket_events.then_some(StreamEvent::Open),
                            WsEvent::Closed { code, reason } => {
                                emit_socket_events.then_some(StreamEvent::Closed { code, reason })
                            }
                            WsEvent::Error(e) => {
                                emit_stream_errors.then_some(StreamEvent::Error(e))
                            }
                            WsEvent::Message(value) => match (spec.transform)(&value) {
                                Ok(message) => Some(StreamEvent::Message(message)),
                                Err(e) => emit_stream_errors.then_some(StreamEvent::Error(e)),
                            },
                        };
                        if let Some(outbound) = outbound {
                            if tx.send(outbound).await.is_err() {
                                // Receiver gone: treat like an explicit close.
                                ws.close(true).await;
                                break;
                            }
                        }
                    }
                }
            }
        });
    }

    Subscription {
        events: rx,
        close_tx,
    }
}

//! Shared stub servers for integration tests.

use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Once;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::Message;

static TRACING: Once = Once::new();

/// Log output for failing runs; safe to call from every test.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}

/// What a stub WebSocket server does with one accepted connection.
#[derive(Debug, Clone)]
pub enum WsConnPlan {
    /// Send these text frames, then drop the connection without a close
    /// handshake.
    SendThenDrop(Vec<String>),
    /// Send these text frames, then hold the connection open until the
    /// peer goes away.
    SendThenHold(Vec<String>),
}

pub struct WsStub {
    pub addr: SocketAddr,
    /// Connections accepted so far.
    pub connections: Arc<AtomicUsize>,
    /// Request paths of accepted connections, in order.
    pub paths: Arc<Mutex<Vec<String>>>,
}

impl WsStub {
    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn seen_paths(&self) -> Vec<String> {
        self.paths.lock().unwrap().clone()
    }
}

/// Start a WebSocket stub; `script` decides the plan per connection
/// index (0-based).
pub async fn start_ws_stub<F>(script: F) -> WsStub
where
    F: Fn(usize) -> WsConnPlan + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind ws stub");
    let addr = listener.local_addr().expect("stub addr");
    let connections = Arc::new(AtomicUsize::new(0));
    let paths = Arc::new(Mutex::new(Vec::new()));

    let stub = WsStub {
        addr,
        connections: connections.clone(),
        paths: paths.clone(),
    };

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let index = connections.fetch_add(1, Ordering::SeqCst);
            let plan = script(index);
            let paths = paths.clone();

            tokio::spawn(async move {
                let callback = |request: &Request, response: Response| {
                    paths
                        .lock()
                        .unwrap()
                        .push(request.uri().path().to_string());
                    Ok(response)
                };
                let Ok(mut ws) = accept_hdr_async(socket, callback).await else {
                    return;
                };

                match plan {
                    WsConnPlan::SendThenDrop(frames) => {
                        for frame in frames {
                            if ws.send(Message::Text(frame)).await.is_err() {
                                return;
                            }
                        }
                        // Drop without close handshake.
                    }
                    WsConnPlan::SendThenHold(frames) => {
                        for frame in frames {
                            if ws.send(Message::Text(frame)).await.is_err() {
                                return;
                            }
                        }
                        while let Some(message) = ws.next().await {
                            if message.is_err() {
                                break;
                            }
                        }
                    }
                }
            });
        }
    });

    stub
}

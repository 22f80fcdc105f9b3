/// Transport kernel - exchange-agnostic plumbing for REST and WebSocket
///
/// The kernel contains only transport logic and generic interfaces:
///
/// - `HttpClient`: reqwest-backed dispatch and response normalization
/// - `TungsteniteWs` / `ReconnectWs`: WebSocket session and its
///   self-healing wrapper
/// - `signer`: canonical query strings and HMAC-SHA256 signatures
/// - `WsCodec`: pluggable frame decoding
///
/// Exchange semantics (paths, parameter rules, message shapes) live in
/// the surface module that composes these pieces.
pub mod codec;
pub mod rest;
pub mod signer;
pub mod ws;

// Re-export key types for convenience
pub use codec::WsCodec;
pub use rest::{HttpClient, HttpClientConfig};
pub use ws::{ReconnectWs, TungsteniteWs, WsConfig, WsEvent};

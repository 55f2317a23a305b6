//! Transport-agnostic halves of a driver's bidirectional connection.
//!
//! `driver-session` doesn't know or care whether the socket underneath is a WebSocket, a raw TCP
//! framed connection, or a test double; `ride-gateway` adapts axum's `WebSocket` split halves to
//! these traits.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport closed")]
    Closed,
    #[error("transport I/O failure")]
    Io(#[source] Box<dyn std::error::Error + Send + Sync>),
}

#[async_trait]
pub trait FrameReader: Send {
    /// Returns `None` once the underlying transport has closed cleanly.
    async fn recv(&mut self) -> Option<Result<String, TransportError>>;
}

#[async_trait]
pub trait FrameWriter: Send {
    async fn send(&mut self, text: String) -> Result<(), TransportError>;
}

//! Adapts axum's split `WebSocket` halves to `driver-session`'s transport-agnostic traits.
//!
//! Grounded in the teacher's `websocket_compat` shim (`ws.rs`), which performs the same kind of
//! adaptation -- axum `Message` to the session engine's own wire representation -- just one layer
//! further down (bytes, not whole text frames) because the teacher tunnels an unrelated binary
//! protocol rather than terminating JSON frames itself.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use driver_session::{FrameReader, FrameWriter, TransportError};
use futures::stream::SplitStream;
use futures::{SinkExt as _, StreamExt as _};

pub struct AxumFrameReader {
    inner: SplitStream<WebSocket>,
}

impl AxumFrameReader {
    pub fn new(inner: SplitStream<WebSocket>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl FrameReader for AxumFrameReader {
    async fn recv(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            match self.inner.next().await {
                Some(Ok(Message::Text(text))) => return Some(Ok(text.to_string())),
                Some(Ok(Message::Close(_))) | None => return None,
                Some(Ok(_)) => continue, // ping/pong/binary: not a frame, keep reading
                Some(Err(err)) => return Some(Err(TransportError::Io(Box::new(err)))),
            }
        }
    }
}

pub struct AxumFrameWriter {
    inner: futures::stream::SplitSink<WebSocket, Message>,
}

impl AxumFrameWriter {
    pub fn new(inner: futures::stream::SplitSink<WebSocket, Message>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl FrameWriter for AxumFrameWriter {
    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        self.inner
            .send(Message::Text(text.into()))
            .await
            .map_err(|err| TransportError::Io(Box::new(err)))
    }
}

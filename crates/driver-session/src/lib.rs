//! Per-connection authenticated driver session: frame demultiplexing against a [`GeoIndex`].
//!
//! [`session::run_session`] owns one connection end to end; `ride-gateway` performs the WebSocket
//! upgrade and bearer-token handshake and hands the split transport halves in.

pub mod frame;
pub mod session;
pub mod transport;

pub use crate::frame::{ClientFrame, FrameError, ServerFrame};
pub use crate::session::{run_session, DEFAULT_CALL_DEADLINE};
pub use crate::transport::{FrameReader, FrameWriter, TransportError};

//! Contract for publishing to a partitioned, keyed message bus.
//!
//! Partition selection is a hash of the key, so messages sharing a key preserve relative order on
//! the bus. `send` only waits for transport handoff, not broker acknowledgement; the caller must
//! not treat a successful `send` as a durability guarantee beyond "accepted by the client".

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("producer is shut down")]
    Closed,
    #[error("failed to hand message off to the transport")]
    Send(#[source] Box<dyn std::error::Error + Send + Sync>),
}

#[async_trait]
pub trait Producer: Send + Sync {
    /// Hands `payload` off to the transport for asynchronous delivery to `topic`, partitioned by
    /// `key`. Returns once the transport has accepted the message, not once a broker has
    /// acknowledged it; delivery failures surface later on the producer's own feedback path and
    /// must never unwind the caller's database transaction.
    async fn send(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<(), BusError>;

    /// Drains in-flight deliveries and shuts the producer down.
    async fn close(&self);
}

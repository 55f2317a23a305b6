//! Kafka implementation of [`message_bus::Producer`] on top of `rdkafka`'s [`ThreadedProducer`].
//!
//! `ThreadedProducer` wraps a `BaseProducer` with its own background polling thread, so `send`
//! enqueues the record onto librdkafka's internal queue and returns immediately -- it does not
//! wait for a broker acknowledgement. Delivery success or failure is reported later, off the
//! caller's path, through the [`DeliveryLogger`] context's `delivery` callback, driven by that
//! same background thread. This mirrors the original's genuinely fire-and-forget
//! `sarama.AsyncProducer`, where `Input()` only enqueues and delivery reports land on separate
//! channels.
//!
//! Partitioning by key-hash is the default behavior of the Kafka client's partitioner, so keying
//! every `send` call (rather than leaving the key empty) is what gives us same-key ordering on
//! the bus.

#[macro_use]
extern crate tracing;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use message_bus::{BusError, Producer};
use rdkafka::message::Message as _;
use rdkafka::producer::{BaseRecord, DeliveryResult, ProducerContext, ThreadedProducer};
use rdkafka::{ClientConfig, ClientContext};

const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Default)]
struct DeliveryLogger;

impl ClientContext for DeliveryLogger {}

impl ProducerContext for DeliveryLogger {
    type DeliveryOpaque = ();

    fn delivery(&self, result: &DeliveryResult<'_>, _opaque: Self::DeliveryOpaque) {
        match result {
            Ok(message) => trace!(
                topic = message.topic(),
                partition = message.partition(),
                offset = message.offset(),
                "message delivered to the bus"
            ),
            Err((error, message)) => {
                warn!(topic = message.topic(), error = %error, "bus failed to deliver message")
            }
        }
    }
}

pub struct KafkaProducer {
    inner: Arc<ThreadedProducer<DeliveryLogger>>,
}

impl KafkaProducer {
    pub fn connect(brokers: &str) -> anyhow::Result<Self> {
        let inner = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "10000")
            .create_with_context(DeliveryLogger)
            .map_err(|e| anyhow::anyhow!("failed to create kafka producer: {e}"))?;

        Ok(Self { inner: Arc::new(inner) })
    }
}

#[async_trait]
impl Producer for KafkaProducer {
    async fn send(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<(), BusError> {
        let record = BaseRecord::to(topic).key(key).payload(&payload);

        match self.inner.send(record) {
            Ok(()) => {
                trace!(topic, key, "message enqueued for the bus");
                Ok(())
            }
            Err((error, _record)) => {
                warn!(topic, key, error = %error, "failed to enqueue message for the bus");
                Err(BusError::Send(Box::new(error)))
            }
        }
    }

    async fn close(&self) {
        let producer = self.inner.clone();
        tokio::task::spawn_blocking(move || producer.flush(FLUSH_TIMEOUT)).await.ok();
    }
}

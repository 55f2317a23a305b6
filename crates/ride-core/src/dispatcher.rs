use std::str::FromStr as _;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt as _;
use message_bus::Producer;
use ride_store::{Repository, Tx as _};
use ride_types::RideStatus;
use session_task::{ChildTask, ShutdownSignal, Task};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Default interval of the outbox reconciliation sweep.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Publishes outbox rows to the message bus and retires them.
///
/// Consumes one merged stream of candidate outbox ids, fed by two sources: live channel
/// notifications from the repository's listener, and a periodic sweep over the whole outbox table
/// that catches rows whose notification was missed (listener reconnect gap, dropped broadcast
/// receiver, crash between insert and notify). Both sources funnel into the same internal channel
/// so there is exactly one consumer path and no risk of processing a row twice concurrently.
pub struct OutboxDispatcher {
    repo: Arc<dyn Repository>,
    producer: Arc<dyn Producer>,
    table: String,
    topic: String,
    key: String,
    sweep_interval: Duration,
}

impl OutboxDispatcher {
    /// `topic` and `key` are the configured `ride.driver_topic`/`ride.driver_key` routing values
    /// (§6): every published message carries the same configured key, not a per-ride one, so
    /// publications to the driver fleet preserve relative order on the bus.
    pub fn new(
        repo: Arc<dyn Repository>,
        producer: Arc<dyn Producer>,
        table: impl Into<String>,
        topic: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            repo,
            producer,
            table: table.into(),
            topic: topic.into(),
            key: key.into(),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    fn outbox_table(&self) -> String {
        format!("{}_outbox", self.table)
    }

    fn events_channel(&self) -> String {
        format!("{}_events", self.table)
    }

    async fn handle_one(&self, outbox_id: i64) -> anyhow::Result<()> {
        let mut tx = self.repo.begin_transaction().await?;

        let select = format!("SELECT * FROM {} WHERE id = $1 FOR UPDATE", self.outbox_table());
        let row = tx.query_row(&select, &[outbox_id.into()]).await?;
        let row = match row {
            Some(row) => row,
            None => {
                // Already retired by a concurrent handler (a sweep hit racing a live
                // notification for the same row). Not an error.
                tx.rollback().await.ok();
                return Ok(());
            }
        };

        let ride_id = row.get_i64("ride_id").ok_or_else(|| anyhow::anyhow!("outbox row missing ride_id"))?;
        let status_str = row.get_text("status").ok_or_else(|| anyhow::anyhow!("outbox row missing status"))?;
        let status = RideStatus::from_str(status_str).map_err(|_| anyhow::anyhow!("unrecognized status `{status_str}`"))?;

        if status == RideStatus::PassengerAccepted {
            let payload =
                serde_json::json!({ "id": outbox_id, "ride_id": ride_id, "status": status.as_str() }).to_string();
            match self.producer.send(&self.topic, &self.key, payload.into_bytes()).await {
                Ok(()) => {
                    self.retire(tx.as_mut(), outbox_id).await?;
                    tx.commit().await?;
                    debug!(ride_id, outbox_id, "published and retired outbox row");
                }
                Err(err) => {
                    tx.rollback().await.ok();
                    warn!(ride_id, outbox_id, error = %err, "publish failed, leaving outbox row for retry");
                }
            }
        } else {
            self.retire(tx.as_mut(), outbox_id).await?;
            tx.commit().await?;
            debug!(ride_id, outbox_id, status = status.as_str(), "retired non-publishing outbox row");
        }

        Ok(())
    }

    async fn retire(&self, tx: &mut dyn ride_store::Tx, outbox_id: i64) -> Result<(), ride_store::StoreError> {
        let delete = format!("DELETE FROM {} WHERE id = $1", self.outbox_table());
        tx.exec(&delete, &[outbox_id.into()]).await?;
        Ok(())
    }
}

#[async_trait]
impl Task for OutboxDispatcher {
    type Output = anyhow::Result<()>;

    const NAME: &'static str = "outbox-dispatcher";

    async fn run(self, mut shutdown_signal: ShutdownSignal) -> anyhow::Result<()> {
        self.repo.listen(&self.events_channel()).await?;

        let (tx, mut rx) = mpsc::channel::<i64>(256);

        let notify_forwarder = {
            let tx = tx.clone();
            let mut notifications = self.repo.notifications();
            ChildTask::spawn(async move {
                while let Some(notification) = notifications.next().await {
                    if let Ok(id) = notification.payload.parse::<i64>() {
                        if tx.send(id).await.is_err() {
                            break;
                        }
                    }
                }
            })
        };

        let sweep_forwarder = {
            let tx = tx.clone();
            let dispatcher = OutboxDispatcherSweepHandle {
                repo: self.repo.clone(),
                table: self.table.clone(),
            };
            let interval = self.sweep_interval;
            ChildTask::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                loop {
                    ticker.tick().await;
                    dispatcher.sweep_once(&tx).await;
                }
            })
        };
        drop(tx);

        info!(table = %self.table, topic = %self.topic, "outbox dispatcher started");

        loop {
            tokio::select! {
                _ = shutdown_signal.wait() => {
                    info!("outbox dispatcher shutting down");
                    break;
                }
                maybe_id = rx.recv() => {
                    match maybe_id {
                        Some(id) => {
                            if let Err(err) = self.handle_one(id).await {
                                warn!(outbox_id = id, error = %err, "failed to process outbox row");
                            }
                        }
                        None => break,
                    }
                }
            }
        }

        notify_forwarder.abort();
        sweep_forwarder.abort();
        self.producer.close().await;
        self.repo.close_listener().await;

        Ok(())
    }
}

/// A thin view of the dispatcher's sweep behavior, split out so the sweep forwarder task doesn't
/// need to hold the `Producer` (which it never touches) across its own spawned future.
struct OutboxDispatcherSweepHandle {
    repo: Arc<dyn Repository>,
    table: String,
}

impl OutboxDispatcherSweepHandle {
    async fn sweep_once(&self, tx: &mpsc::Sender<i64>) {
        let statement = format!("SELECT id FROM {}_outbox ORDER BY id", self.table);
        match self.repo.query(&statement, &[]).await {
            Ok(rows) => {
                for row in rows {
                    if let Some(id) = row.get_i64("id") {
                        if tx.send(id).await.is_err() {
                            return;
                        }
                    }
                }
            }
            Err(err) => warn!(error = %err, "reconciliation sweep query failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::test_support::{FakeProducer, FakeRepository};

    async fn insert_outbox_row(repo: &dyn Repository, table: &str, ride_id: i64, status: RideStatus) -> i64 {
        let mut tx = repo.begin_transaction().await.unwrap();
        let insert = format!("INSERT INTO {table}_outbox (ride_id, status) VALUES ($1, $2) RETURNING id");
        let row = tx.query_row(&insert, &[ride_id.into(), status.as_str().into()]).await.unwrap().unwrap();
        let id = row.get_i64("id").unwrap();
        tx.commit().await.unwrap();
        id
    }

    #[tokio::test]
    async fn publishes_exactly_once_and_retires_passenger_accepted_rows() {
        let fake_repo = Arc::new(FakeRepository::new());
        let repo: Arc<dyn Repository> = fake_repo.clone();
        let producer = Arc::new(FakeProducer::new());
        let bus: Arc<dyn Producer> = producer.clone();

        let outbox_id = insert_outbox_row(repo.as_ref(), "ride", 42, RideStatus::PassengerAccepted).await;

        let dispatcher = OutboxDispatcher::new(repo.clone(), bus, "ride", "driver-topic", "driver-key");
        dispatcher.handle_one(outbox_id).await.unwrap();

        let sent = producer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "driver-topic");
        assert_eq!(sent[0].1, "driver-key");
        assert!(!fake_repo.row_exists("ride_outbox", outbox_id));
    }

    #[tokio::test]
    async fn retires_without_publishing_for_non_accepted_status() {
        let fake_repo = Arc::new(FakeRepository::new());
        let repo: Arc<dyn Repository> = fake_repo.clone();
        let producer = Arc::new(FakeProducer::new());
        let bus: Arc<dyn Producer> = producer.clone();

        let outbox_id = insert_outbox_row(repo.as_ref(), "ride", 7, RideStatus::Requested).await;

        let dispatcher = OutboxDispatcher::new(repo.clone(), bus, "ride", "driver-topic", "driver-key");
        dispatcher.handle_one(outbox_id).await.unwrap();

        assert!(producer.sent().is_empty());
        assert!(!fake_repo.row_exists("ride_outbox", outbox_id));
    }

    #[tokio::test]
    async fn ignores_a_row_already_retired_by_a_concurrent_handler() {
        let fake_repo = Arc::new(FakeRepository::new());
        let repo: Arc<dyn Repository> = fake_repo.clone();
        let bus: Arc<dyn Producer> = Arc::new(FakeProducer::new());

        let dispatcher = OutboxDispatcher::new(repo, bus, "ride", "driver-topic", "driver-key");

        dispatcher.handle_one(999).await.unwrap();
    }

    #[tokio::test]
    async fn publish_failure_leaves_the_outbox_row_for_retry() {
        let fake_repo = Arc::new(FakeRepository::new());
        let repo: Arc<dyn Repository> = fake_repo.clone();
        let producer = Arc::new(FakeProducer::new());
        producer.fail_next_send();
        let bus: Arc<dyn Producer> = producer.clone();

        let outbox_id = insert_outbox_row(repo.as_ref(), "ride", 5, RideStatus::PassengerAccepted).await;

        let dispatcher = OutboxDispatcher::new(repo.clone(), bus, "ride", "driver-topic", "driver-key");
        dispatcher.handle_one(outbox_id).await.unwrap();

        assert!(producer.sent().is_empty());
        assert!(fake_repo.row_exists("ride_outbox", outbox_id));
    }
}

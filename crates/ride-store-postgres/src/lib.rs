//! PostgreSQL implementation of [`ride_store::Repository`].
//!
//! Two connections matter here: the pooled connections used for transactional reads/writes, and
//! the single long-lived `PgListener` connection used for `LISTEN`/`NOTIFY`. The listener runs in
//! its own background task and forwards notifications onto a broadcast channel so that
//! `notifications()` can be called any number of times and every subscriber sees the same stream.

#[macro_use]
extern crate tracing;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt as _;
use parking_lot::Mutex;
use ride_store::{Notification, NotificationStream, Repository, Row, StoreError, Tx, Value};
use sqlx::postgres::{PgListener, PgPoolOptions};
use sqlx::{Column as _, PgPool, Postgres, Row as _, TypeInfo as _};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Idle period after which the listener issues a liveness probe instead of waiting forever.
const LISTENER_IDLE_PROBE: Duration = Duration::from_secs(90);
const LISTENER_RECONNECT_BACKOFF: Duration = Duration::from_secs(2);
const NOTIFICATION_BUFFER: usize = 1024;

pub struct PgRepository {
    pool: PgPool,
    channels: Arc<Mutex<Vec<String>>>,
    notify_tx: broadcast::Sender<Notification>,
    cancel: CancellationToken,
    listener_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl PgRepository {
    pub async fn connect(dsn: &str) -> anyhow::Result<Arc<Self>> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(dsn)
            .await
            .map_err(|e| anyhow::anyhow!("failed to connect to the relational store: {e}"))?;

        let (notify_tx, _) = broadcast::channel(NOTIFICATION_BUFFER);

        Ok(Arc::new(Self {
            pool,
            channels: Arc::new(Mutex::new(Vec::new())),
            notify_tx,
            cancel: CancellationToken::new(),
            listener_task: Mutex::new(None),
        }))
    }

    fn ensure_listener_running(&self) {
        let mut slot = self.listener_task.lock();
        if slot.is_some() {
            return;
        }

        let pool = self.pool.clone();
        let channels = Arc::clone(&self.channels);
        let notify_tx = self.notify_tx.clone();
        let cancel = self.cancel.clone();

        *slot = Some(tokio::task::spawn(run_listener(pool, channels, notify_tx, cancel)));
    }
}

#[async_trait]
impl Repository for PgRepository {
    async fn create_table(&self, ddl: &str) -> Result<(), StoreError> {
        trace!(sql = %ddl, "create table");

        sqlx::query(ddl)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Query(Box::new(e)))?;

        Ok(())
    }

    async fn begin_transaction(&self) -> Result<Box<dyn Tx>, StoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Connection(Box::new(e)))?;

        Ok(Box::new(PgTx { tx: Some(tx) }))
    }

    async fn listen(&self, channel: &str) -> Result<(), StoreError> {
        {
            let mut channels = self.channels.lock();
            if !channels.iter().any(|c| c == channel) {
                channels.push(channel.to_owned());
            }
        }

        self.ensure_listener_running();

        Ok(())
    }

    fn notifications(&self) -> NotificationStream {
        let rx = self.notify_tx.subscribe();
        tokio_stream::wrappers::BroadcastStream::new(rx)
            .filter_map(|item| async move { item.ok() })
            .boxed()
    }

    async fn close_listener(&self) {
        self.cancel.cancel();

        let handle = self.listener_task.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    async fn query(&self, statement: &str, params: &[Value]) -> Result<Vec<Row>, StoreError> {
        let mut query = sqlx::query(statement);
        for param in params {
            query = bind_value(query, param);
        }

        let rows = query.fetch_all(&self.pool).await.map_err(map_query_error)?;

        Ok(rows.into_iter().map(pg_row_to_row).collect())
    }
}

struct PgTx {
    tx: Option<sqlx::Transaction<'static, Postgres>>,
}

impl PgTx {
    fn tx_mut(&mut self) -> Result<&mut sqlx::Transaction<'static, Postgres>, StoreError> {
        self.tx.as_mut().ok_or(StoreError::TransactionFinished)
    }
}

#[async_trait]
impl Tx for PgTx {
    async fn exec(&mut self, statement: &str, params: &[Value]) -> Result<u64, StoreError> {
        let tx = self.tx_mut()?;

        let mut query = sqlx::query(statement);
        for param in params {
            query = bind_value(query, param);
        }

        let result = query.execute(&mut **tx).await.map_err(map_query_error)?;

        Ok(result.rows_affected())
    }

    async fn query_row(&mut self, statement: &str, params: &[Value]) -> Result<Option<Row>, StoreError> {
        let tx = self.tx_mut()?;

        let mut query = sqlx::query(statement);
        for param in params {
            query = bind_value(query, param);
        }

        let row = query.fetch_optional(&mut **tx).await.map_err(map_query_error)?;

        Ok(row.map(pg_row_to_row))
    }

    async fn query(&mut self, statement: &str, params: &[Value]) -> Result<Vec<Row>, StoreError> {
        let tx = self.tx_mut()?;

        let mut query = sqlx::query(statement);
        for param in params {
            query = bind_value(query, param);
        }

        let rows = query.fetch_all(&mut **tx).await.map_err(map_query_error)?;

        Ok(rows.into_iter().map(pg_row_to_row).collect())
    }

    async fn notify(&mut self, channel: &str, payload: &str) -> Result<(), StoreError> {
        self.exec("SELECT pg_notify($1, $2)", &[channel.into(), payload.into()])
            .await?;
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        let tx = self.tx.take().ok_or(StoreError::TransactionFinished)?;
        tx.commit().await.map_err(|e| StoreError::Query(Box::new(e)))
    }

    async fn rollback(mut self: Box<Self>) -> Result<(), StoreError> {
        let tx = self.tx.take().ok_or(StoreError::TransactionFinished)?;
        tx.rollback().await.map_err(|e| StoreError::Query(Box::new(e)))
    }
}

/// Postgres SQLSTATE for `unique_violation`.
const UNIQUE_VIOLATION: &str = "23505";

/// Distinguishes a uniqueness violation from every other query failure, so callers can surface it
/// as a `Conflict` rather than a generic `StoreError::Query`.
fn map_query_error(error: sqlx::Error) -> StoreError {
    let is_unique_violation = error
        .as_database_error()
        .and_then(|db_error| db_error.code())
        .is_some_and(|code| code == UNIQUE_VIOLATION);

    if is_unique_violation {
        StoreError::Conflict(Box::new(error))
    } else {
        StoreError::Query(Box::new(error))
    }
}

fn bind_value<'q>(
    query: sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments>,
    value: &'q Value,
) -> sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments> {
    match value {
        Value::I64(v) => query.bind(v),
        Value::F64(v) => query.bind(v),
        Value::Text(v) => query.bind(v.as_str()),
        Value::Null => query.bind(Option::<i64>::None),
    }
}

/// Maps a `PgRow` down to the backend-agnostic [`Row`] shape, probing column types by name since
/// the generic `Value` enum doesn't know the schema up front.
fn pg_row_to_row(row: sqlx::postgres::PgRow) -> Row {
    let mut columns = Vec::with_capacity(row.columns().len());

    for (index, column) in row.columns().iter().enumerate() {
        let name = column.name().to_owned();

        let value = match column.type_info().name() {
            "INT4" | "INT8" | "INT2" => row.try_get::<i64, _>(index).map(Value::I64),
            "FLOAT4" | "FLOAT8" | "NUMERIC" => row.try_get::<f64, _>(index).map(Value::F64),
            _ => row.try_get::<String, _>(index).map(Value::Text),
        }
        .unwrap_or(Value::Null);

        columns.push((name, value));
    }

    Row::new(columns)
}

async fn run_listener(
    pool: PgPool,
    channels: Arc<Mutex<Vec<String>>>,
    notify_tx: broadcast::Sender<Notification>,
    cancel: CancellationToken,
) {
    loop {
        if cancel.is_cancelled() {
            return;
        }

        let mut listener = match PgListener::connect_with(&pool).await {
            Ok(listener) => listener,
            Err(error) => {
                error!(error = %error, "failed to establish notification listener, retrying");
                tokio::time::sleep(LISTENER_RECONNECT_BACKOFF).await;
                continue;
            }
        };

        let tracked: Vec<String> = channels.lock().clone();
        let mut listen_failed = false;
        for channel in &tracked {
            if let Err(error) = listener.listen(channel).await {
                error!(error = %error, %channel, "failed to listen on channel, reconnecting");
                listen_failed = true;
                break;
            }
        }
        if listen_failed {
            tokio::time::sleep(LISTENER_RECONNECT_BACKOFF).await;
            continue;
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                outcome = tokio::time::timeout(LISTENER_IDLE_PROBE, listener.recv()) => {
                    match outcome {
                        Ok(Ok(notification)) => {
                            let _ = notify_tx.send(Notification {
                                channel: notification.channel().to_owned(),
                                payload: notification.payload().to_owned(),
                            });
                        }
                        Ok(Err(error)) => {
                            warn!(error = %error, "notification listener connection lost, reconnecting");
                            break;
                        }
                        Err(_elapsed) => {
                            if let Err(error) = listener.ping().await {
                                warn!(error = %error, "liveness probe failed, reconnecting");
                                break;
                            }
                        }
                    }
                }
            }
        }
    }
}

//! Contract for transactional access to the relational store backing the ride core.
//!
//! Modeled the way `job-queue`/`job-queue-libsql` split a storage contract from its backend:
//! this crate owns the trait, `ride-store-postgres` owns the one real implementation.

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to acquire a connection")]
    Connection(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("query failed")]
    Query(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("uniqueness violation")]
    Conflict(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("transaction already finished")]
    TransactionFinished,
    #[error("notification listener is closed")]
    ListenerClosed,
}

/// A bound parameter for a parameterised statement.
#[derive(Debug, Clone)]
pub enum Value {
    I64(i64),
    F64(f64),
    Text(String),
    Null,
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::I64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::F64(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_owned())
    }
}

impl From<Option<i64>> for Value {
    fn from(v: Option<i64>) -> Self {
        v.map(Value::I64).unwrap_or(Value::Null)
    }
}

/// A single result row, addressed by column name.
#[derive(Debug, Clone, Default)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

impl Row {
    pub fn new(columns: Vec<(String, Value)>) -> Self {
        Self { columns }
    }

    fn find(&self, name: &str) -> Option<&Value> {
        self.columns.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        match self.find(name) {
            Some(Value::I64(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_f64(&self, name: &str) -> Option<f64> {
        match self.find(name) {
            Some(Value::F64(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_text(&self, name: &str) -> Option<&str> {
        match self.find(name) {
            Some(Value::Text(v)) => Some(v.as_str()),
            _ => None,
        }
    }
}

/// A notification received on a listened-to channel.
#[derive(Debug, Clone)]
pub struct Notification {
    pub channel: String,
    pub payload: String,
}

pub type NotificationStream = BoxStream<'static, Notification>;

/// An in-progress transaction. Every state-changing operation on the ride core performs its
/// writes through exactly one `Tx`, then calls [`Tx::commit`]; any error before that rolls back
/// implicitly on drop or explicitly via [`Tx::rollback`].
#[async_trait]
pub trait Tx: Send {
    async fn exec(&mut self, statement: &str, params: &[Value]) -> Result<u64, StoreError>;

    async fn query_row(&mut self, statement: &str, params: &[Value]) -> Result<Option<Row>, StoreError>;

    async fn query(&mut self, statement: &str, params: &[Value]) -> Result<Vec<Row>, StoreError>;

    /// Issues a channel notification. Part of the same transaction; only observable by listeners
    /// once this transaction commits.
    async fn notify(&mut self, channel: &str, payload: &str) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

#[async_trait]
pub trait Repository: Send + Sync {
    /// Idempotently creates a table from a DDL statement. Called once at startup.
    async fn create_table(&self, ddl: &str) -> Result<(), StoreError>;

    async fn begin_transaction(&self) -> Result<Box<dyn Tx>, StoreError>;

    /// Starts (or confirms) a listener on `channel`. The repository owns a long-lived listener
    /// connection separate from the transactional pool; it issues a liveness probe if idle for
    /// 90s or more, and may silently re-establish the listener on transport failure.
    async fn listen(&self, channel: &str) -> Result<(), StoreError>;

    /// The lazy, infinite stream of notifications for every channel this repository listens to.
    fn notifications(&self) -> NotificationStream;

    /// Closes the listener, terminating the notification stream.
    async fn close_listener(&self);

    /// Runs a read-only query outside of an explicit transaction (used by the reconciliation
    /// sweep, which does not need transactional isolation).
    async fn query(&self, statement: &str, params: &[Value]) -> Result<Vec<Row>, StoreError>;
}

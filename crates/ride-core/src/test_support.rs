//! In-memory fakes of the store and bus contracts, used only by this crate's own tests.
//!
//! `RideCore`/`OutboxDispatcher` talk to their collaborators purely through `Repository`/`Tx`'s
//! parameterised-statement interface, so a usable fake doesn't need a real SQL engine -- only to
//! recognize the fixed, small set of statement shapes this crate itself issues (one `INSERT ...
//! RETURNING id` shape, one `SELECT * ... WHERE id = $1` shape, one `UPDATE` shape, one `DELETE`
//! shape). Each `Table` snapshot is cloned into a transaction at `begin_transaction` and only
//! written back to the shared store on `commit`, so a rolled-back (or dropped) transaction leaves
//! the store exactly as it was.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream::{self, StreamExt as _};
use message_bus::{BusError, Producer};
use ride_store::{Notification, NotificationStream, Repository, Row, StoreError, Tx, Value};

#[derive(Default, Clone)]
struct Table {
    rows: Vec<Vec<(String, Value)>>,
    next_id: i64,
}

impl Table {
    fn insert(&mut self, mut columns: Vec<(String, Value)>) -> i64 {
        self.next_id += 1;
        let id = self.next_id;
        columns.insert(0, ("id".to_owned(), Value::I64(id)));
        self.rows.push(columns);
        id
    }

    fn find(&self, id: i64) -> Option<Vec<(String, Value)>> {
        self.rows.iter().find(|row| row_id(row) == Some(id)).cloned()
    }

    fn update(&mut self, id: i64, updates: &[(String, Value)]) -> u64 {
        match self.rows.iter_mut().find(|row| row_id(row) == Some(id)) {
            Some(row) => {
                for (name, value) in updates {
                    match row.iter_mut().find(|(n, _)| n == name) {
                        Some(slot) => slot.1 = value.clone(),
                        None => row.push((name.clone(), value.clone())),
                    }
                }
                1
            }
            None => 0,
        }
    }

    fn delete(&mut self, id: i64) -> u64 {
        let before = self.rows.len();
        self.rows.retain(|row| row_id(row) != Some(id));
        (before - self.rows.len()) as u64
    }
}

fn row_id(row: &[(String, Value)]) -> Option<i64> {
    row.iter().find(|(name, _)| name == "id").and_then(|(_, value)| match value {
        Value::I64(id) => Some(*id),
        _ => None,
    })
}

pub(crate) struct FakeRepository {
    tables: Arc<Mutex<BTreeMap<String, Table>>>,
    notifications: Arc<Mutex<Vec<Notification>>>,
    faults: Arc<Mutex<HashSet<String>>>,
}

impl FakeRepository {
    pub(crate) fn new() -> Self {
        Self {
            tables: Arc::new(Mutex::new(BTreeMap::new())),
            notifications: Arc::new(Mutex::new(Vec::new())),
            faults: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub(crate) fn row_exists(&self, table: &str, id: i64) -> bool {
        self.tables.lock().unwrap().get(table).is_some_and(|t| t.find(id).is_some())
    }

    pub(crate) fn row_count(&self, table: &str) -> usize {
        self.tables.lock().unwrap().get(table).map(|t| t.rows.len()).unwrap_or(0)
    }

    /// The next insert into `table` fails instead of succeeding, simulating the outbox insert
    /// failing after the ride insert has already happened within the same transaction.
    pub(crate) fn fail_next_insert(&self, table: &str) {
        self.faults.lock().unwrap().insert(table.to_owned());
    }

    pub(crate) fn notified_ids(&self) -> Vec<String> {
        self.notifications.lock().unwrap().iter().map(|n| n.payload.clone()).collect()
    }
}

#[async_trait]
impl Repository for FakeRepository {
    async fn create_table(&self, _ddl: &str) -> Result<(), StoreError> {
        Ok(())
    }

    async fn begin_transaction(&self) -> Result<Box<dyn Tx>, StoreError> {
        let snapshot = self.tables.lock().unwrap().clone();
        Ok(Box::new(FakeTx {
            tables: snapshot,
            shared_tables: self.tables.clone(),
            shared_notifications: self.notifications.clone(),
            faults: self.faults.clone(),
            pending_notifications: Vec::new(),
            finished: false,
        }))
    }

    async fn listen(&self, _channel: &str) -> Result<(), StoreError> {
        Ok(())
    }

    fn notifications(&self) -> NotificationStream {
        stream::empty().boxed()
    }

    async fn close_listener(&self) {}

    async fn query(&self, statement: &str, params: &[Value]) -> Result<Vec<Row>, StoreError> {
        let mut tables = self.tables.lock().unwrap();
        Ok(execute(&mut tables, &self.faults, statement, params)?.rows)
    }
}

struct FakeTx {
    tables: BTreeMap<String, Table>,
    shared_tables: Arc<Mutex<BTreeMap<String, Table>>>,
    shared_notifications: Arc<Mutex<Vec<Notification>>>,
    faults: Arc<Mutex<HashSet<String>>>,
    pending_notifications: Vec<Notification>,
    finished: bool,
}

impl FakeTx {
    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.finished {
            Err(StoreError::TransactionFinished)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Tx for FakeTx {
    async fn exec(&mut self, statement: &str, params: &[Value]) -> Result<u64, StoreError> {
        self.ensure_open()?;
        Ok(execute(&mut self.tables, &self.faults, statement, params)?.affected)
    }

    async fn query_row(&mut self, statement: &str, params: &[Value]) -> Result<Option<Row>, StoreError> {
        self.ensure_open()?;
        Ok(execute(&mut self.tables, &self.faults, statement, params)?.rows.into_iter().next())
    }

    async fn query(&mut self, statement: &str, params: &[Value]) -> Result<Vec<Row>, StoreError> {
        self.ensure_open()?;
        Ok(execute(&mut self.tables, &self.faults, statement, params)?.rows)
    }

    async fn notify(&mut self, channel: &str, payload: &str) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.pending_notifications
            .push(Notification { channel: channel.to_owned(), payload: payload.to_owned() });
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.finished = true;
        *self.shared_tables.lock().unwrap() = std::mem::take(&mut self.tables);
        self.shared_notifications.lock().unwrap().extend(std::mem::take(&mut self.pending_notifications));
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<(), StoreError> {
        self.finished = true;
        Ok(())
    }
}

struct ExecResult {
    rows: Vec<Row>,
    affected: u64,
}

/// Interprets the fixed set of statement shapes `RideCore`/`OutboxDispatcher` issue. Not a SQL
/// engine: every branch below corresponds to exactly one `format!` call site in `core.rs`/
/// `dispatcher.rs`.
fn execute(
    tables: &mut BTreeMap<String, Table>,
    faults: &Mutex<HashSet<String>>,
    statement: &str,
    params: &[Value],
) -> Result<ExecResult, StoreError> {
    let statement = statement.trim();

    if statement.contains("RETURNING id") {
        let table_name = word_between(statement, "INTO ", " (");
        if faults.lock().unwrap().remove(&table_name) {
            return Err(StoreError::Query("injected fault".into()));
        }
        let columns = insert_columns(statement, params);
        let id = tables.entry(table_name).or_default().insert(columns);
        return Ok(ExecResult { rows: vec![Row::new(vec![("id".to_owned(), Value::I64(id))])], affected: 1 });
    }

    if let Some(rest) = statement.strip_prefix("SELECT * FROM ") {
        if rest.contains("ORDER BY id") {
            let table_name = word_before(rest, " ORDER BY");
            let mut rows: Vec<Row> =
                tables.get(&table_name).map(|t| t.rows.clone()).unwrap_or_default().into_iter().map(Row::new).collect();
            rows.sort_by_key(|r| r.get_i64("id").unwrap_or(0));
            return Ok(ExecResult { affected: rows.len() as u64, rows });
        }

        let table_name = word_before(rest, " WHERE");
        let id = expect_i64(&params[0])?;
        let rows: Vec<Row> = tables.get(&table_name).and_then(|t| t.find(id)).into_iter().map(Row::new).collect();
        return Ok(ExecResult { affected: rows.len() as u64, rows });
    }

    if let Some(rest) = statement.strip_prefix("SELECT id FROM ") {
        let table_name = word_before(rest, " ORDER BY");
        let mut rows: Vec<Row> =
            tables.get(&table_name).map(|t| t.rows.clone()).unwrap_or_default().into_iter().map(Row::new).collect();
        rows.sort_by_key(|r| r.get_i64("id").unwrap_or(0));
        return Ok(ExecResult { affected: rows.len() as u64, rows });
    }

    if let Some(rest) = statement.strip_prefix("UPDATE ") {
        let table_name = word_before(rest, " SET");
        // "SET status = $1, driver_id = $2 WHERE id = $3" -- the only UPDATE shape this crate issues.
        let id = expect_i64(&params[2])?;
        let updates =
            vec![("status".to_owned(), params[0].clone()), ("driver_id".to_owned(), params[1].clone())];
        let affected = tables.entry(table_name).or_default().update(id, &updates);
        return Ok(ExecResult { rows: Vec::new(), affected });
    }

    if let Some(rest) = statement.strip_prefix("DELETE FROM ") {
        let table_name = word_before(rest, " WHERE");
        let id = expect_i64(&params[0])?;
        let affected = tables.entry(table_name).or_default().delete(id);
        return Ok(ExecResult { rows: Vec::new(), affected });
    }

    panic!("fake store cannot interpret statement: {statement}")
}

fn insert_columns(statement: &str, params: &[Value]) -> Vec<(String, Value)> {
    let cols_start = statement.find('(').expect("insert missing column list") + 1;
    let cols_end = statement[cols_start..].find(')').expect("insert missing column list close") + cols_start;
    let columns: Vec<&str> = statement[cols_start..cols_end].split(',').map(str::trim).collect();

    let values_kw = "VALUES (";
    let values_start = statement.find(values_kw).expect("insert missing VALUES") + values_kw.len();
    let values_end = statement[values_start..].find(')').expect("insert missing VALUES close") + values_start;
    let values: Vec<&str> = statement[values_start..values_end].split(',').map(str::trim).collect();

    columns
        .into_iter()
        .zip(values)
        .map(|(col, val)| {
            let value = if val == "NULL" {
                Value::Null
            } else {
                let index: usize = val.trim_start_matches('$').parse().expect("placeholder index");
                params[index - 1].clone()
            };
            (col.to_owned(), value)
        })
        .collect()
}

fn word_between(s: &str, start_after: &str, end_before: &str) -> String {
    let start = s.find(start_after).expect("expected marker") + start_after.len();
    let rest = &s[start..];
    let end = rest.find(end_before).unwrap_or(rest.len());
    rest[..end].trim().to_owned()
}

fn word_before(s: &str, end_before: &str) -> String {
    let end = s.find(end_before).unwrap_or(s.len());
    s[..end].trim().to_owned()
}

fn expect_i64(value: &Value) -> Result<i64, StoreError> {
    match value {
        Value::I64(v) => Ok(*v),
        _ => Err(StoreError::Query("expected integer parameter".into())),
    }
}

pub(crate) struct FakeProducer {
    sent: Mutex<Vec<(String, String, Vec<u8>)>>,
    fail_next: Mutex<bool>,
}

impl FakeProducer {
    pub(crate) fn new() -> Self {
        Self { sent: Mutex::new(Vec::new()), fail_next: Mutex::new(false) }
    }

    pub(crate) fn sent(&self) -> Vec<(String, String, Vec<u8>)> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn fail_next_send(&self) {
        *self.fail_next.lock().unwrap() = true;
    }
}

#[async_trait]
impl Producer for FakeProducer {
    async fn send(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<(), BusError> {
        let mut fail_next = self.fail_next.lock().unwrap();
        if *fail_next {
            *fail_next = false;
            return Err(BusError::Send(Box::new(std::io::Error::new(std::io::ErrorKind::Other, "fake producer failure"))));
        }
        drop(fail_next);

        self.sent.lock().unwrap().push((topic.to_owned(), key.to_owned(), payload));
        Ok(())
    }

    async fn close(&self) {}
}

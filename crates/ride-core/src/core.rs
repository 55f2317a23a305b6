use std::str::FromStr as _;
use std::sync::Arc;

use ride_billing::Biller;
use ride_store::{Repository, Row, StoreError, Tx, Value};
use ride_types::{Coordinate, Ride, RideStatus, OUTBOX_COLUMNS, RIDE_COLUMNS};
use thiserror::Error;
use tracing::instrument;

use crate::ddl::create_table_ddl;
use crate::state_machine::RideOperation;

#[derive(Debug, Error)]
pub enum RideCoreError {
    #[error("ride {0} not found")]
    NotFound(i64),
    #[error("operation `{operation}` is not permitted from status `{from}`")]
    Conflict { operation: &'static str, from: RideStatus },
    #[error("persistence failure")]
    Store(#[from] StoreError),
}

/// Authoritative writer of ride rows and atomic emitter of outbox rows.
///
/// Owns the table name the whole subsystem is keyed on: the outbox table is `<table>_outbox`,
/// the notification channel is `<table>_events`.
pub struct RideCore {
    repo: Arc<dyn Repository>,
    table: String,
}

impl RideCore {
    pub fn new(repo: Arc<dyn Repository>, table: impl Into<String>) -> Self {
        Self { repo, table: table.into() }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn outbox_table(&self) -> String {
        format!("{}_outbox", self.table)
    }

    pub fn events_channel(&self) -> String {
        format!("{}_events", self.table)
    }

    /// Creates the ride and outbox tables if they don't already exist. Idempotent; call once at
    /// startup before accepting traffic.
    pub async fn bootstrap(&self) -> Result<(), RideCoreError> {
        self.repo
            .create_table(&create_table_ddl(&self.table, RIDE_COLUMNS))
            .await?;
        self.repo
            .create_table(&create_table_ddl(&self.outbox_table(), OUTBOX_COLUMNS))
            .await?;
        self.repo.listen(&self.events_channel()).await?;
        Ok(())
    }

    pub async fn get(&self, ride_id: i64) -> Result<Ride, RideCoreError> {
        let rows = self
            .repo
            .query(&format!("SELECT * FROM {} WHERE id = $1", self.table), &[ride_id.into()])
            .await?;

        rows.into_iter()
            .next()
            .map(row_to_ride)
            .transpose()?
            .ok_or(RideCoreError::NotFound(ride_id))
    }

    pub async fn list(&self) -> Result<Vec<Ride>, RideCoreError> {
        let rows = self.repo.query(&format!("SELECT * FROM {} ORDER BY id", self.table), &[]).await?;
        rows.into_iter().map(row_to_ride).collect()
    }

    /// Creates a ride at price `biller.estimate(src, dst)`, status `requested`. Performs the
    /// atomic write protocol: ride insert, outbox insert, notification, commit, all in one
    /// transaction.
    #[instrument(skip(self, biller))]
    pub async fn estimate(
        &self,
        passenger_id: i64,
        src: Coordinate,
        dst: Coordinate,
        biller: &Biller,
    ) -> Result<Ride, RideCoreError> {
        let price = biller.estimate(src, dst);
        let status = RideStatus::Requested;

        let mut tx = self.repo.begin_transaction().await?;

        let insert = format!(
            "INSERT INTO {} (passenger_id, driver_id, price, status, src_lat, src_lon, dst_lat, dst_lon) \
             VALUES ($1, NULL, $2, $3, $4, $5, $6, $7) RETURNING id",
            self.table
        );
        let row = tx
            .query_row(
                &insert,
                &[
                    passenger_id.into(),
                    price.into(),
                    status.as_str().into(),
                    src.lat.into(),
                    src.lon.into(),
                    dst.lat.into(),
                    dst.lon.into(),
                ],
            )
            .await?;

        let row = match row {
            Some(row) => row,
            None => return Err(StoreError::Query("insert returned no row".into()).into()),
        };
        let ride_id = row.get_i64("id").ok_or_else(|| StoreError::Query("missing id".into()))?;

        if let Err(err) = self.write_outbox_and_notify(tx.as_mut(), ride_id, status).await {
            tx.rollback().await.ok();
            return Err(err.into());
        }

        tx.commit().await?;

        Ok(Ride { id: ride_id, passenger_id, driver_id: None, price, status, src, dst })
    }

    /// Applies `operation` to `ride_id` if permitted from its current status. Performs the same
    /// atomic write protocol as [`RideCore::estimate`]: update, outbox insert, notify, commit, all
    /// under one row lock so a concurrent transition on the same ride serializes behind it.
    #[instrument(skip(self))]
    pub async fn transition(
        &self,
        ride_id: i64,
        operation: RideOperation,
        driver_id: Option<i64>,
    ) -> Result<Ride, RideCoreError> {
        let mut tx = self.repo.begin_transaction().await?;

        let select = format!("SELECT * FROM {} WHERE id = $1 FOR UPDATE", self.table);
        let row = tx.query_row(&select, &[ride_id.into()]).await?;
        let row = match row {
            Some(row) => row,
            None => {
                tx.rollback().await.ok();
                return Err(RideCoreError::NotFound(ride_id));
            }
        };
        let current = row_to_ride(row)?;

        if !operation.is_permitted_from(current.status) {
            tx.rollback().await.ok();
            return Err(RideCoreError::Conflict { operation: operation.as_str(), from: current.status });
        }

        let target = operation.target_status();
        let driver_id = driver_id.or(current.driver_id);

        let update = format!("UPDATE {} SET status = $1, driver_id = $2 WHERE id = $3", self.table);
        tx.exec(&update, &[target.as_str().into(), driver_id.into(), ride_id.into()]).await?;

        if let Err(err) = self.write_outbox_and_notify(tx.as_mut(), ride_id, target).await {
            tx.rollback().await.ok();
            return Err(err.into());
        }

        tx.commit().await?;

        Ok(Ride { status: target, driver_id, ..current })
    }

    /// Inserts the outbox row and issues the channel notification carrying its id. Shared by every
    /// state-changing operation so the atomic write protocol has exactly one implementation.
    async fn write_outbox_and_notify(
        &self,
        tx: &mut dyn Tx,
        ride_id: i64,
        status: RideStatus,
    ) -> Result<(), StoreError> {
        let insert = format!(
            "INSERT INTO {} (ride_id, status) VALUES ($1, $2) RETURNING id",
            self.outbox_table()
        );
        let row = tx
            .query_row(&insert, &[ride_id.into(), status.as_str().into()])
            .await?
            .ok_or_else(|| StoreError::Query("outbox insert returned no row".into()))?;
        let outbox_id = row.get_i64("id").ok_or_else(|| StoreError::Query("missing outbox id".into()))?;

        tx.notify(&self.events_channel(), &outbox_id.to_string()).await
    }
}

fn row_to_ride(row: Row) -> Result<Ride, RideCoreError> {
    let status_str = row
        .get_text("status")
        .ok_or_else(|| StoreError::Query("missing status column".into()))?;
    let status = RideStatus::from_str(status_str)
        .map_err(|_| StoreError::Query(format!("unrecognized status `{status_str}`").into()))?;

    Ok(Ride {
        id: row.get_i64("id").ok_or_else(|| StoreError::Query("missing id".into()))?,
        passenger_id: row
            .get_i64("passenger_id")
            .ok_or_else(|| StoreError::Query("missing passenger_id".into()))?,
        driver_id: row.get_i64("driver_id"),
        price: row.get_f64("price").ok_or_else(|| StoreError::Query("missing price".into()))?,
        status,
        src: Coordinate::new(
            row.get_f64("src_lat").ok_or_else(|| StoreError::Query("missing src_lat".into()))?,
            row.get_f64("src_lon").ok_or_else(|| StoreError::Query("missing src_lon".into()))?,
        ),
        dst: Coordinate::new(
            row.get_f64("dst_lat").ok_or_else(|| StoreError::Query("missing dst_lat".into()))?,
            row.get_f64("dst_lon").ok_or_else(|| StoreError::Query("missing dst_lon".into()))?,
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeRepository;

    fn biller() -> Biller {
        Biller::new(2.0, 1.0)
    }

    fn coords() -> (Coordinate, Coordinate) {
        (Coordinate::new(40.7128, -74.0060), Coordinate::new(40.7580, -73.9855))
    }

    #[tokio::test]
    async fn estimate_then_transition_moves_status_and_keeps_outbox_fed() {
        let fake_repo = Arc::new(FakeRepository::new());
        let repo: Arc<dyn Repository> = fake_repo.clone();
        let core = RideCore::new(repo, "ride");
        let (src, dst) = coords();

        let ride = core.estimate(1, src, dst, &biller()).await.unwrap();
        assert_eq!(ride.status, RideStatus::Requested);
        assert_eq!(fake_repo.row_count("ride_outbox"), 1);

        let accepted = core.transition(ride.id, RideOperation::Accept, None).await.unwrap();
        assert_eq!(accepted.status, RideStatus::PassengerAccepted);
        assert_eq!(fake_repo.row_count("ride_outbox"), 2);
    }

    /// Property 9: a transition not permitted from the ride's current status is rejected and
    /// performs no write.
    #[tokio::test]
    async fn transition_rejects_a_disallowed_operation_and_writes_nothing() {
        let fake_repo = Arc::new(FakeRepository::new());
        let repo: Arc<dyn Repository> = fake_repo.clone();
        let core = RideCore::new(repo, "ride");
        let (src, dst) = coords();

        let ride = core.estimate(7, src, dst, &biller()).await.unwrap();
        let outbox_rows_before = fake_repo.row_count("ride_outbox");

        // `driver_accept` is only permitted from `passenger_accepted`; the ride is still
        // `requested`.
        let result = core.transition(ride.id, RideOperation::DriverAccept, Some(99)).await;

        assert!(matches!(result, Err(RideCoreError::Conflict { operation: "driver_accept", from: RideStatus::Requested })));

        let unchanged = core.get(ride.id).await.unwrap();
        assert_eq!(unchanged.status, RideStatus::Requested);
        assert_eq!(unchanged.driver_id, None);
        assert_eq!(fake_repo.row_count("ride_outbox"), outbox_rows_before);
    }

    /// Property 7: if the transaction aborts after the ride insert but before the outbox insert
    /// commits, the store is left exactly as it was -- no orphaned ride row.
    #[tokio::test]
    async fn failed_outbox_insert_leaves_the_store_unchanged() {
        let fake_repo = Arc::new(FakeRepository::new());
        let repo: Arc<dyn Repository> = fake_repo.clone();
        let core = RideCore::new(repo, "ride");
        let (src, dst) = coords();

        fake_repo.fail_next_insert("ride_outbox");

        let result = core.estimate(3, src, dst, &biller()).await;

        assert!(result.is_err());
        assert_eq!(fake_repo.row_count("ride"), 0);
        assert_eq!(fake_repo.row_count("ride_outbox"), 0);
        assert!(fake_repo.notified_ids().is_empty());
    }
}

//! Driver-location index ("LocationManager" in the source).
//!
//! Abstracted as a trait because a production deployment points `geo.addr` at an external
//! geospatial index service; [`InMemoryGeoIndex`] is the self-contained implementation used when
//! no such service is configured, and in tests.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use ride_types::{haversine_km, Coordinate};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GeoError {
    #[error("geo index backend is unreachable")]
    Unreachable(#[source] Box<dyn std::error::Error + Send + Sync>),
}

#[async_trait]
pub trait GeoIndex: Send + Sync {
    /// Upserts a driver's position. Later calls overwrite earlier ones for the same driver.
    async fn save(&self, driver_id: i64, position: Coordinate) -> Result<(), GeoError>;

    /// Idempotent; removing a driver that isn't present is not an error.
    async fn remove(&self, driver_id: i64) -> Result<(), GeoError>;

    /// Every driver within `radius_km` (inclusive) of `origin`, ascending by distance.
    async fn nearby(&self, origin: Coordinate, radius_km: f64) -> Result<Vec<i64>, GeoError>;
}

#[derive(Default)]
pub struct InMemoryGeoIndex {
    positions: RwLock<HashMap<i64, Coordinate>>,
}

impl InMemoryGeoIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GeoIndex for InMemoryGeoIndex {
    async fn save(&self, driver_id: i64, position: Coordinate) -> Result<(), GeoError> {
        self.positions.write().insert(driver_id, position);
        Ok(())
    }

    async fn remove(&self, driver_id: i64) -> Result<(), GeoError> {
        self.positions.write().remove(&driver_id);
        Ok(())
    }

    async fn nearby(&self, origin: Coordinate, radius_km: f64) -> Result<Vec<i64>, GeoError> {
        let mut within: Vec<(i64, f64)> = self
            .positions
            .read()
            .iter()
            .map(|(&driver_id, &position)| (driver_id, haversine_km(origin, position)))
            .filter(|&(_, distance)| distance <= radius_km)
            .collect();

        within.sort_by(|a, b| a.1.total_cmp(&b.1));

        Ok(within.into_iter().map(|(driver_id, _)| driver_id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn remove_on_unknown_driver_is_a_no_op() {
        let index = InMemoryGeoIndex::new();
        index.remove(42).await.expect("idempotent remove");
        index.remove(42).await.expect("repeated remove stays fine");
    }

    #[tokio::test]
    async fn save_overwrites_earlier_position() {
        let index = InMemoryGeoIndex::new();
        index.save(1, Coordinate::new(10.0, 10.0)).await.unwrap();
        index.save(1, Coordinate::new(20.0, 20.0)).await.unwrap();

        let nearby = index.nearby(Coordinate::new(20.0, 20.0), 1.0).await.unwrap();
        assert_eq!(nearby, vec![1]);
    }

    #[tokio::test]
    async fn nearby_orders_ascending_and_respects_radius() {
        let index = InMemoryGeoIndex::new();
        let origin = Coordinate::new(40.7128, -74.0000);

        // Roughly 1.5, 3.5 and 5.5 km east of `origin`.
        let lon_per_km = 1.0 / (111.320 * origin.lat.to_radians().cos());
        index.save(1, Coordinate::new(origin.lat, origin.lon + 1.5 * lon_per_km)).await.unwrap();
        index.save(2, Coordinate::new(origin.lat, origin.lon + 3.5 * lon_per_km)).await.unwrap();
        index.save(3, Coordinate::new(origin.lat, origin.lon + 5.5 * lon_per_km)).await.unwrap();

        assert_eq!(index.nearby(origin, 4.0).await.unwrap(), vec![1, 2]);
        assert_eq!(index.nearby(origin, 1.0).await.unwrap(), Vec::<i64>::new());
        assert_eq!(index.nearby(origin, 10.0).await.unwrap(), vec![1, 2, 3]);
    }
}

//! Entity shapes shared by the repository, the ride core, and the HTTP surface.
//!
//! Column descriptors ([`ColumnDescriptor`], [`RIDE_COLUMNS`], [`OUTBOX_COLUMNS`]) replace the
//! runtime struct-tag reflection of the original implementation with an explicit, compile-time
//! table: each entity lists its own columns, and DDL generation (`ride-store-postgres`) walks the
//! table instead of inspecting the struct via reflection.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

/// A SQL type a column can be declared with. Mirrors the semantic-type -> SQL-type contract in
/// the ride core specification: integer -> INTEGER, real -> FLOAT, string/enum -> TEXT,
/// boolean -> BOOLEAN, nullable integer -> INTEGER NULL, and the `id` attribute -> SERIAL PRIMARY KEY.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    SerialPrimaryKey,
    Integer,
    NullableInteger,
    Float,
    Text,
    Boolean,
}

impl SqlType {
    pub fn as_ddl(self) -> &'static str {
        match self {
            SqlType::SerialPrimaryKey => "SERIAL PRIMARY KEY",
            SqlType::Integer => "INTEGER NOT NULL",
            SqlType::NullableInteger => "INTEGER",
            SqlType::Float => "FLOAT NOT NULL",
            SqlType::Text => "TEXT NOT NULL",
            SqlType::Boolean => "BOOLEAN NOT NULL",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ColumnDescriptor {
    pub name: &'static str,
    pub ty: SqlType,
}

pub const RIDE_TABLE_SUFFIX_OUTBOX: &str = "_outbox";
pub const RIDE_TABLE_SUFFIX_EVENTS: &str = "_events";

/// Columns of the ride table, in declaration order.
pub const RIDE_COLUMNS: &[ColumnDescriptor] = &[
    ColumnDescriptor { name: "id", ty: SqlType::SerialPrimaryKey },
    ColumnDescriptor { name: "passenger_id", ty: SqlType::Integer },
    ColumnDescriptor { name: "driver_id", ty: SqlType::NullableInteger },
    ColumnDescriptor { name: "price", ty: SqlType::Float },
    ColumnDescriptor { name: "status", ty: SqlType::Text },
    ColumnDescriptor { name: "src_lat", ty: SqlType::Float },
    ColumnDescriptor { name: "src_lon", ty: SqlType::Float },
    ColumnDescriptor { name: "dst_lat", ty: SqlType::Float },
    ColumnDescriptor { name: "dst_lon", ty: SqlType::Float },
];

/// Columns of the `<ride_table>_outbox` table, in declaration order.
pub const OUTBOX_COLUMNS: &[ColumnDescriptor] = &[
    ColumnDescriptor { name: "id", ty: SqlType::SerialPrimaryKey },
    ColumnDescriptor { name: "ride_id", ty: SqlType::Integer },
    ColumnDescriptor { name: "status", ty: SqlType::Text },
];

/// The closed set of ride statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RideStatus {
    Requested,
    PassengerAccepted,
    PassengerDenied,
    Matched,
    PickingUp,
    InTransit,
    PassengerDropped,
    PassengerCancelled,
    DriverCancelled,
    Errored,
    Deleted,
}

impl RideStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RideStatus::Requested => "requested",
            RideStatus::PassengerAccepted => "passenger_accepted",
            RideStatus::PassengerDenied => "passenger_denied",
            RideStatus::Matched => "matched",
            RideStatus::PickingUp => "picking_up",
            RideStatus::InTransit => "in_transit",
            RideStatus::PassengerDropped => "passenger_dropped",
            RideStatus::PassengerCancelled => "passenger_cancelled",
            RideStatus::DriverCancelled => "driver_cancelled",
            RideStatus::Errored => "errored",
            RideStatus::Deleted => "deleted",
        }
    }

    /// A terminal status admits no further transitions except `delete`.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RideStatus::PassengerDenied
                | RideStatus::PassengerDropped
                | RideStatus::PassengerCancelled
                | RideStatus::DriverCancelled
                | RideStatus::Errored
                | RideStatus::Deleted
        )
    }
}

impl fmt::Display for RideStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct UnknownRideStatus;

impl fmt::Display for UnknownRideStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("unrecognized ride status")
    }
}

impl std::error::Error for UnknownRideStatus {}

impl FromStr for RideStatus {
    type Err = UnknownRideStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "requested" => RideStatus::Requested,
            "passenger_accepted" => RideStatus::PassengerAccepted,
            "passenger_denied" => RideStatus::PassengerDenied,
            "matched" => RideStatus::Matched,
            "picking_up" => RideStatus::PickingUp,
            "in_transit" => RideStatus::InTransit,
            "passenger_dropped" => RideStatus::PassengerDropped,
            "passenger_cancelled" => RideStatus::PassengerCancelled,
            "driver_cancelled" => RideStatus::DriverCancelled,
            "errored" => RideStatus::Errored,
            "deleted" => RideStatus::Deleted,
            _ => return Err(UnknownRideStatus),
        })
    }
}

/// WGS-84 latitude/longitude pair, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Mean Earth radius in kilometres, fixed by the specification (not the slightly different
/// WGS-84 mean radius some geodesy crates default to) so that price and distance calculations are
/// reproducible to the last bit across the Biller and the GeoIndex.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two coordinates, in kilometres.
pub fn haversine_km(a: Coordinate, b: Coordinate) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ride {
    pub id: i64,
    pub passenger_id: i64,
    pub driver_id: Option<i64>,
    pub price: f64,
    pub status: RideStatus,
    pub src: Coordinate,
    pub dst: Coordinate,
}

/// A per-transition event envelope. The existence of a row is the only durable trigger for
/// publication; the dispatcher (`ride-core`) has exclusive authority to consume (delete) it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RideOutbox {
    pub id: i64,
    pub ride_id: i64,
    pub status: RideStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Driver {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub phone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Passenger {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub phone: String,
}

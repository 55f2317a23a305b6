//! `/v1/rides` — ride creation (via `Biller::estimate`), read access, and state transitions.
//!
//! Unlike drivers/passengers, a ride has no free-form field update: every mutation after creation
//! goes through the state machine in `ride-core`, so there is no `PUT /v1/rides/{id}` handler.
//! `DELETE /v1/rides/{id}` is wired to the `delete` operation (a soft delete, per DESIGN.md) rather
//! than a row removal, keeping the REST verb but preserving the ride's audit trail.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use ride_core::RideOperation;
use ride_types::{Coordinate, Ride, RideStatus};
use serde::{Deserialize, Serialize};

use crate::http::HttpError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateRideBody {
    pub passenger_id: i64,
    pub src_lat: f64,
    pub src_lon: f64,
    pub dst_lat: f64,
    pub dst_lon: f64,
}

#[derive(Debug, Serialize)]
pub struct CoordinateBody {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Deserialize)]
pub struct RideActionBody {
    pub driver_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct RideView {
    pub id: i64,
    pub passenger_id: i64,
    pub driver_id: Option<i64>,
    pub price: f64,
    pub status: RideStatus,
    pub src: CoordinateBody,
    pub dst: CoordinateBody,
}

impl From<Ride> for RideView {
    fn from(ride: Ride) -> Self {
        Self {
            id: ride.id,
            passenger_id: ride.passenger_id,
            driver_id: ride.driver_id,
            price: ride.price,
            status: ride.status,
            src: CoordinateBody { lat: ride.src.lat, lon: ride.src.lon },
            dst: CoordinateBody { lat: ride.dst.lat, lon: ride.dst.lon },
        }
    }
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/v1/rides", post(create).get(list))
        .route("/v1/rides/{id}", get(get_one).delete(delete))
        .route("/v1/rides/{id}/{operation}", post(transition))
}

async fn create(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateRideBody>,
) -> Result<(StatusCode, Json<RideView>), HttpError> {
    let src = Coordinate::new(body.src_lat, body.src_lon);
    let dst = Coordinate::new(body.dst_lat, body.dst_lon);
    let ride = state.rides.estimate(body.passenger_id, src, dst, &state.biller).await?;
    Ok((StatusCode::CREATED, Json(ride.into())))
}

async fn list(State(state): State<Arc<AppState>>) -> Result<Json<Vec<RideView>>, HttpError> {
    let rides = state.rides.list().await?;
    Ok(Json(rides.into_iter().map(Into::into).collect()))
}

async fn get_one(State(state): State<Arc<AppState>>, Path(id): Path<i64>) -> Result<Json<RideView>, HttpError> {
    let ride = state.rides.get(id).await?;
    Ok(Json(ride.into()))
}

async fn transition(
    State(state): State<Arc<AppState>>,
    Path((id, operation)): Path<(i64, String)>,
    body: Option<Json<RideActionBody>>,
) -> Result<Json<RideView>, HttpError> {
    let operation = RideOperation::from_str(&operation)
        .ok_or_else(|| HttpError::bad_request(format!("unrecognized ride operation `{operation}`")))?;
    let driver_id = body.and_then(|Json(body)| body.driver_id);

    let ride = state.rides.transition(id, operation, driver_id).await?;
    Ok(Json(ride.into()))
}

async fn delete(State(state): State<Arc<AppState>>, Path(id): Path<i64>) -> Result<StatusCode, HttpError> {
    state.rides.transition(id, RideOperation::Delete, None).await?;
    Ok(StatusCode::NO_CONTENT)
}

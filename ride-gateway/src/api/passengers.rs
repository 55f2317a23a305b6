//! `/v1/passengers` — thin CRUD over the `Passenger` entity.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::entities::EntityRecord;
use crate::http::HttpError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PassengerBody {
    pub name: String,
    pub email: String,
    pub phone: String,
}

#[derive(Debug, Serialize)]
pub struct PassengerView {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub phone: String,
}

impl From<EntityRecord> for PassengerView {
    fn from(record: EntityRecord) -> Self {
        Self { id: record.id, name: record.name, email: record.email, phone: record.phone }
    }
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/v1/passengers", post(create).get(list))
        .route("/v1/passengers/{id}", get(get_one).put(update).delete(delete))
}

async fn create(
    State(state): State<Arc<AppState>>,
    Json(body): Json<PassengerBody>,
) -> Result<(StatusCode, Json<PassengerView>), HttpError> {
    let record = state.passengers.create(&body.name, &body.email, &body.phone).await?;
    Ok((StatusCode::CREATED, Json(record.into())))
}

async fn list(State(state): State<Arc<AppState>>) -> Result<Json<Vec<PassengerView>>, HttpError> {
    let records = state.passengers.list().await?;
    Ok(Json(records.into_iter().map(Into::into).collect()))
}

async fn get_one(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<PassengerView>, HttpError> {
    let record = state
        .passengers
        .get(id)
        .await?
        .ok_or_else(|| HttpError::not_found(format!("passenger {id} not found")))?;
    Ok(Json(record.into()))
}

async fn update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<PassengerBody>,
) -> Result<Json<PassengerView>, HttpError> {
    let record = state
        .passengers
        .update(id, &body.name, &body.email, &body.phone)
        .await?
        .ok_or_else(|| HttpError::not_found(format!("passenger {id} not found")))?;
    Ok(Json(record.into()))
}

async fn delete(State(state): State<Arc<AppState>>, Path(id): Path<i64>) -> Result<StatusCode, HttpError> {
    if !state.passengers.delete(id).await? {
        return Err(HttpError::not_found(format!("passenger {id} not found")));
    }
    Ok(StatusCode::NO_CONTENT)
}

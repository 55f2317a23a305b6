//! `/v1/drivers` — thin CRUD over the `Driver` entity.

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
pub struct DriverBody {
    pub name: String,
    pub email: String,
    pub phone: String,
}

#[derive(Debug, Serialize)]
pub struct DriverView {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub phone: String,
}

impl From<EntityRecord> for DriverView {
    fn from(record: EntityRecord) -> Self {
        Self { id: record.id, name: record.name, email: record.email, phone: record.phone }
    }
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/v1/drivers", post(create).get(list))
        .route("/v1/drivers/{id}", get(get_one).put(update).delete(delete))
}

async fn create(
    State(state): State<Arc<AppState>>,
    Json(body): Json<DriverBody>,
) -> Result<(StatusCode, Json<DriverView>), HttpError> {
    let record = state.drivers.create(&body.name, &body.email, &body.phone).await?;
    Ok((StatusCode::CREATED, Json(record.into())))
}

async fn list(State(state): State<Arc<AppState>>) -> Result<Json<Vec<DriverView>>, HttpError> {
    let records = state.drivers.list().await?;
    Ok(Json(records.into_iter().map(Into::into).collect()))
}

async fn get_one(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<DriverView>, HttpError> {
    let record = state
        .drivers
        .get(id)
        .await?
        .ok_or_else(|| HttpError::not_found(format!("driver {id} not found")))?;
    Ok(Json(record.into()))
}

async fn update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<DriverBody>,
) -> Result<Json<DriverView>, HttpError> {
    let record = state
        .drivers
        .update(id, &body.name, &body.email, &body.phone)
        .await?
        .ok_or_else(|| HttpError::not_found(format!("driver {id} not found")))?;
    Ok(Json(record.into()))
}

async fn delete(State(state): State<Arc<AppState>>, Path(id): Path<i64>) -> Result<StatusCode, HttpError> {
    if !state.drivers.delete(id).await? {
        return Err(HttpError::not_found(format!("driver {id} not found")));
    }
    Ok(StatusCode::NO_CONTENT)
}

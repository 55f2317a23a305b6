//! `GET /ws/v1/driver` — the driver session upgrade handshake (§4.G).
//!
//! Token validation happens before the upgrade so a rejected handshake never costs a WebSocket
//! round trip; once upgraded, the whole session is handed off to `driver_session::run_session`.

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use driver_session::{run_session, DEFAULT_CALL_DEADLINE};
use futures::StreamExt as _;
use tracing::warn;

use crate::http::HttpError;
use crate::state::AppState;
use crate::ws_transport::{AxumFrameReader, AxumFrameWriter};

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/ws/v1/driver", get(upgrade))
}

async fn upgrade(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, HttpError> {
    let header_value = headers.get(AUTHORIZATION).and_then(|value| value.to_str().ok());
    let token = ride_auth::bearer_token(header_value).map_err(|err| HttpError::unauthorized(err.to_string()))?;
    let identity = state.auth.validate(token).map_err(|err| HttpError::unauthorized(err.to_string()))?;
    let driver_id = identity.driver_id;

    let geo = state.geo.clone();
    let shutdown_signal = state.shutdown_signal.clone();

    Ok(ws.on_upgrade(move |socket| async move {
        let (sink, stream) = socket.split();
        let reader = Box::new(AxumFrameReader::new(stream));
        let writer = Box::new(AxumFrameWriter::new(sink));

        if let Err(err) = run_session(driver_id, reader, writer, geo, shutdown_signal, DEFAULT_CALL_DEADLINE).await {
            warn!(driver_id, %err, "driver session ended with an error");
        }
    }))
}

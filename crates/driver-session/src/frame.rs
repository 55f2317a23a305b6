//! Wire frames exchanged over a driver's bidirectional connection.
//!
//! Frames are tagged JSON objects: `{"type": "...", ...}`. Unknown `type` values and malformed
//! JSON are both recoverable -- the caller logs and keeps reading -- so parsing distinguishes the
//! two instead of collapsing them into one generic error.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("malformed frame")]
    Malformed(#[source] serde_json::Error),
    #[error("unrecognized frame type `{0}`")]
    Unknown(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    DriverHello,
    DriverLocation { lat: f64, lon: f64 },
    DriverGoodbye,
    DriverRequest {
        pickup_lat: f64,
        pickup_lng: f64,
        drop_lat: f64,
        drop_lng: f64,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    DriverHello,
    DriverError {
        original_message_type: String,
        code: u16,
        reason: String,
    },
}

pub fn parse_client_frame(text: &str) -> Result<ClientFrame, FrameError> {
    let value: serde_json::Value = serde_json::from_str(text).map_err(FrameError::Malformed)?;

    serde_json::from_value(value.clone()).map_err(|_| {
        let ty = value.get("type").and_then(|t| t.as_str()).unwrap_or("<missing>");
        FrameError::Unknown(ty.to_owned())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_driver_location() {
        let frame = parse_client_frame(r#"{"type":"driver_location","lat":40.7,"lon":-74.0}"#).unwrap();
        assert!(matches!(frame, ClientFrame::DriverLocation { lat, lon } if lat == 40.7 && lon == -74.0));
    }

    #[test]
    fn malformed_json_is_distinguished_from_unknown_type() {
        assert!(matches!(parse_client_frame("{not json"), Err(FrameError::Malformed(_))));
        assert!(matches!(
            parse_client_frame(r#"{"type":"driver_teleport"}"#),
            Err(FrameError::Unknown(ty)) if ty == "driver_teleport"
        ));
    }

    #[test]
    fn driver_error_serializes_with_tagged_type() {
        let frame = ServerFrame::DriverError {
            original_message_type: "driver_location".to_owned(),
            code: 500,
            reason: "index unreachable".to_owned(),
        };
        let text = serde_json::to_string(&frame).unwrap();
        assert!(text.contains(r#""type":"driver_error""#));
    }
}

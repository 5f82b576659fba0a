use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use serde_json::{json, Value};

/// Success envelope `{ "success": true, "data": ... }` emitted by `send_data`
#[derive(Debug)]
pub struct ApiResponse {
    pub data: Value,
    pub status_code: StatusCode,
}

impl ApiResponse {
    /// Serialize `data` into a 200 envelope
    pub fn success<T: Serialize>(data: T) -> Result<Self, serde_json::Error> {
        Self::with_status(data, StatusCode::OK)
    }

    pub fn with_status<T: Serialize>(data: T, status_code: StatusCode) -> Result<Self, serde_json::Error> {
        Ok(Self {
            data: serde_json::to_value(data)?,
            status_code,
        })
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        let envelope = json!({
            "success": true,
            "data": self.data
        });

        (self.status_code, Json(envelope)).into_response()
    }
}

//! API error responses

use crate::cache::FallbackError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub code: u16,
    pub message: String,
    pub details: Option<serde_json::Value>,
    pub timestamp: u64,
}

impl ApiError {
    pub fn new(code: u16, message: String) -> Self {
        Self {
            code,
            message,
            details: None,
            timestamp: chrono::Utc::now().timestamp() as u64,
        }
    }

    pub fn with_details(code: u16, message: String, details: serde_json::Value) -> Self {
        Self {
            details: Some(details),
            ..Self::new(code, message)
        }
    }

    pub fn bad_request(message: &str) -> Self {
        Self::new(400, message.to_string())
    }

    pub fn not_found(message: &str) -> Self {
        Self::new(404, message.to_string())
    }

    pub fn internal_server_error(message: &str) -> Self {
        Self::new(500, message.to_string())
    }

    pub fn invalid_parameter(field: &str, reason: &str) -> Self {
        Self::with_details(
            400,
            "Invalid query parameter".to_string(),
            serde_json::json!({
                "field": field,
                "reason": reason
            }),
        )
    }

    /// Nothing fresh, nothing cached
    pub fn no_data(key: &str, reason: &str) -> Self {
        Self::with_details(
            500,
            "No data available".to_string(),
            serde_json::json!({
                "cacheKey": key,
                "reason": reason
            }),
        )
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "API Error {}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

impl From<FallbackError> for ApiError {
    fn from(err: FallbackError) -> Self {
        match err {
            FallbackError::Unavailable { key, source } => Self::no_data(&key, &source.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::UpstreamError;
    use std::time::Duration;

    #[test]
    fn test_fallback_error_maps_to_500() {
        let err: ApiError = FallbackError::Unavailable {
            key: "revenues-v1.0.0".to_string(),
            source: UpstreamError::Timeout(Duration::from_secs(6)),
        }
        .into();

        assert_eq!(err.code, 500);
        assert_eq!(err.details.as_ref().unwrap()["cacheKey"], "revenues-v1.0.0");
    }

    #[test]
    fn test_status_code_of_response() {
        let response = ApiError::invalid_parameter("limit", "not a number").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = ApiError::new(42, "odd".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

//! Response envelope.
//!
//! Every API answer is HTTP 200 carrying `{code, data, message}`; the envelope
//! `code` tells success (200) from validation (400), lookup (404) and other
//! (500) failures.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::DisburseError;

pub const CODE_OK: u16 = 200;
pub const CODE_BAD_REQUEST: u16 = 400;
pub const CODE_NOT_FOUND: u16 = 404;
pub const CODE_INTERNAL: u16 = 500;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub code: u16,
    pub data: Option<T>,
    pub message: String,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            code: CODE_OK,
            data: Some(data),
            message: "ok".to_string(),
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// A failed API call, rendered as an envelope with no data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub code: u16,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            code: CODE_BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn internal() -> Self {
        Self {
            code: CODE_INTERNAL,
            message: "Internal Server Error".to_string(),
        }
    }
}

impl From<DisburseError> for ApiError {
    fn from(err: DisburseError) -> Self {
        let code = match &err {
            DisburseError::Validation(_) => CODE_BAD_REQUEST,
            DisburseError::NotFound(_) => CODE_NOT_FOUND,
            _ => CODE_INTERNAL,
        };
        if code == CODE_INTERNAL {
            tracing::error!(error = %err, "Request failed");
        }
        Self {
            code,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        ApiResponse::<()> {
            code: self.code,
            data: None,
            message: self.message,
        }
        .into_response()
    }
}

pub type ApiResult<T> = Result<ApiResponse<T>, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err: ApiError = DisburseError::Validation("bad".into()).into();
        assert_eq!(err.code, 400);
        let err: ApiError = DisburseError::NotFound("intent 9".into()).into();
        assert_eq!(err.code, 404);
        let err: ApiError = DisburseError::TransientNetwork("down".into()).into();
        assert_eq!(err.code, 500);
    }

    #[test]
    fn test_ok_envelope_shape() {
        let json = serde_json::to_value(ApiResponse::ok(5)).unwrap();
        assert_eq!(json["code"], 200);
        assert_eq!(json["data"], 5);
        assert_eq!(json["message"], "ok");
    }
}

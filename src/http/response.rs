//! Response envelope and error mapping.
//!
//! # Responsibilities
//! - Wrap successful results as `{"code": 0, "data": ...}`
//! - Map relay errors to `{"code", "message"}` with an HTTP status
//!
//! # Design Decisions
//! - Retryable errors are 503 so clients and proxies back off
//! - Request errors are 4xx; collaborator failures 502; the rest 500

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::error::RelayError;

/// Successful reply envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub code: u32,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Json<Self> {
        Json(Self { code: 0, data })
    }
}

/// Error reply envelope.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: u32,
    pub message: String,
    pub retryable: bool,
}

/// A relay error rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub RelayError);

impl From<RelayError> for ApiError {
    fn from(err: RelayError) -> Self {
        ApiError(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError(RelayError::InvalidRequest(rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError(RelayError::InvalidRequest(rejection.body_text()))
    }
}

/// HTTP status for an error class.
pub fn status_for(err: &RelayError) -> StatusCode {
    if err.is_retryable() {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    match err {
        RelayError::InvalidRequest(_)
        | RelayError::Key(_)
        | RelayError::InsufficientTokenBalance { .. }
        | RelayError::UnsupportedShape { .. } => StatusCode::BAD_REQUEST,
        RelayError::TokenNotFound(_) => StatusCode::NOT_FOUND,
        RelayError::IssuanceClosed(_) => StatusCode::CONFLICT,
        RelayError::ProtocolBuilder { .. } | RelayError::Gateway(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            tracing::error!(code = self.0.code(), error = %self.0, "Request failed");
        }
        let body = ErrorBody {
            code: self.0.code(),
            message: self.0.to_string(),
            retryable: self.0.is_retryable(),
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::types::GatewayError;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&RelayError::NoFundsAvailable { needed: 1 }),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(status_for(&RelayError::TokenNotFound("t".into())), StatusCode::NOT_FOUND);
        assert_eq!(status_for(&RelayError::IssuanceClosed("t".into())), StatusCode::CONFLICT);
        assert_eq!(
            status_for(&RelayError::Gateway(GatewayError::Rejected("x".into()))),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_for(&RelayError::UnsupportedShape { inputs: 4, outputs: 50 }),
            StatusCode::BAD_REQUEST
        );
    }
}

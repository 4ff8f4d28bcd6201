//! HTTP mapping of domain failures.
//!
//! Validation problems are returned field by field; upstream and storage
//! failures only ever surface a generic message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

use crate::geo_errors::GeoError;
use crate::validation::FieldError;

pub const UNAVAILABLE_MESSAGE: &str = "Geocoding service is temporarily unavailable";
pub const INTERNAL_MESSAGE: &str = "Internal server error";

#[derive(Debug)]
pub enum ApiError {
    /// 422 with per-field details
    Validation(Vec<FieldError>),
    /// 400 with a short message
    BadRequest(String),
    /// 404 with an empty body
    NotFound,
    /// 503, the client may retry
    Unavailable,
    /// 500, details stay in the logs
    Internal,
}

impl ApiError {
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        ApiError::Validation(vec![FieldError::new(field, message)])
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            ApiError::Validation(errors) => (status, Json(json!({ "detail": errors }))).into_response(),
            ApiError::BadRequest(message) => (status, Json(json!({ "detail": message }))).into_response(),
            ApiError::NotFound => status.into_response(),
            ApiError::Unavailable => {
                (status, Json(json!({ "detail": UNAVAILABLE_MESSAGE }))).into_response()
            }
            ApiError::Internal => (status, Json(json!({ "detail": INTERNAL_MESSAGE }))).into_response(),
        }
    }
}

impl From<Vec<FieldError>> for ApiError {
    fn from(errors: Vec<FieldError>) -> Self {
        ApiError::Validation(errors)
    }
}

// The gateway has already logged upstream faults with their detail
impl From<GeoError> for ApiError {
    fn from(err: GeoError) -> Self {
        match err {
            GeoError::InvalidArgument(message) => ApiError::BadRequest(message),
            GeoError::NotFound => ApiError::NotFound,
            GeoError::UpstreamUnavailable(_) => ApiError::Unavailable,
            GeoError::UpstreamConfigError(_) => ApiError::Internal,
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        error!("Directory store failure: {err:#}");
        ApiError::Internal
    }
}

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use murmur_types::SeedResponse;

use crate::db::StoreError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug)]
pub enum ApiError {
    /// A seed run failed or never finished; the cause is logged, never returned
    SeedFailed(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::SeedFailed(msg) => {
                tracing::error!("Seeding error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, Json(SeedResponse::failed())).into_response()
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::SeedFailed(err.to_string())
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError::SeedFailed(format!("seed task did not complete: {}", err))
    }
}

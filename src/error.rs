// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 Aleksandr Ptakhin

//! HTTP-facing errors. Response bodies carry a generic message only; details
//! go to the log.

use crate::models::query::ErrorResponse;
use crate::services::upstream::UpstreamError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("client rate limit exceeded")]
    RateLimited,

    #[error("daily request limit reached")]
    DailyLimitReached,

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("route not found")]
    NotFound,

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::RateLimited | ApiError::DailyLimitReached => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Upstream(UpstreamError::Status(_)) => StatusCode::BAD_GATEWAY,
            ApiError::Upstream(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to return to callers.
    pub fn public_message(&self) -> &'static str {
        match self {
            ApiError::InvalidInput(_) => "Invalid input",
            ApiError::RateLimited => "Rate limit exceeded",
            ApiError::DailyLimitReached => "Daily request limit reached",
            ApiError::Upstream(_) => "Failed to query upstream service",
            ApiError::NotFound => "Not found",
            ApiError::Internal(_) => "Internal server error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(msg) = &self {
            tracing::error!("Internal error: {}", msg);
        }

        let body = Json(ErrorResponse {
            error: self.public_message().to_string(),
        });
        (self.status_code(), body).into_response()
    }
}

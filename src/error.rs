// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// The request budget for a rate-limit realm is exhausted.
    #[error("Rate limit exceeded for realm '{realm}'")]
    RateLimited { realm: String },

    #[error("GitHub API error: {0}")]
    GitHubApi(String),

    #[error("Open Humans API error: {0}")]
    OpenHumansApi(String),

    /// Upstream or stored data that does not have the expected shape.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Create a rate limit error for the given realm.
    pub fn rate_limited(realm: impl Into<String>) -> Self {
        Self::RateLimited {
            realm: realm.into(),
        }
    }

    /// Check if this error is a rate limit error (recoverable by rescheduling).
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::RateLimited { realm } => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limited",
                Some(realm.clone()),
            ),
            AppError::GitHubApi(msg) => {
                (StatusCode::BAD_GATEWAY, "github_error", Some(msg.clone()))
            }
            AppError::OpenHumansApi(msg) => (
                StatusCode::BAD_GATEWAY,
                "open_humans_error",
                Some(msg.clone()),
            ),
            AppError::InvalidData(msg) => {
                tracing::error!(error = %msg, "Invalid data");
                (StatusCode::UNPROCESSABLE_ENTITY, "invalid_data", None)
            }
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers and services
pub type Result<T> = std::result::Result<T, AppError>;

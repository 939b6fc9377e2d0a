//! HTTP Error Handling
//!
//! 业务错误统一以 HTTP 200 + `errno` 返回

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::application::ApplicationError;

/// 统一错误响应格式
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub errno: i32,
    pub error: String,
    pub data: Option<()>,
}

impl ErrorResponse {
    pub fn new(errno: i32, error: impl Into<String>) -> Self {
        Self {
            errno,
            error: error.into(),
            data: None,
        }
    }
}

/// 错误码定义
pub mod errno {
    pub const BAD_REQUEST: i32 = 400;
    pub const NOT_FOUND: i32 = 404;
    /// 任务已取消
    pub const CANCELLED: i32 = 409;
    /// 队列已满
    pub const CAPACITY_EXCEEDED: i32 = 429;
    pub const INTERNAL_ERROR: i32 = 500;
    /// 外部服务失败
    pub const UPSTREAM_ERROR: i32 = 502;
    pub const TIMEOUT: i32 = 504;
}

/// API 错误
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Cancelled(String),
    CapacityExceeded(String),
    Internal(String),
    Upstream(String),
    Timeout(String),
}

impl ApiError {
    pub fn errno(&self) -> i32 {
        match self {
            ApiError::BadRequest(_) => errno::BAD_REQUEST,
            ApiError::NotFound(_) => errno::NOT_FOUND,
            ApiError::Cancelled(_) => errno::CANCELLED,
            ApiError::CapacityExceeded(_) => errno::CAPACITY_EXCEEDED,
            ApiError::Internal(_) => errno::INTERNAL_ERROR,
            ApiError::Upstream(_) => errno::UPSTREAM_ERROR,
            ApiError::Timeout(_) => errno::TIMEOUT,
        }
    }

    fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg)
            | ApiError::NotFound(msg)
            | ApiError::Cancelled(msg)
            | ApiError::CapacityExceeded(msg)
            | ApiError::Internal(msg)
            | ApiError::Upstream(msg)
            | ApiError::Timeout(msg) => msg,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let errno = self.errno();
        match &self {
            ApiError::Internal(msg) => {
                tracing::error!(errno, error = %msg, "Internal server error")
            }
            ApiError::Upstream(msg) => {
                tracing::error!(errno, error = %msg, "Upstream service error")
            }
            ApiError::Timeout(msg) => tracing::warn!(errno, error = %msg, "Job timed out"),
            ApiError::CapacityExceeded(msg) => {
                tracing::warn!(errno, error = %msg, "Submission rejected")
            }
            ApiError::BadRequest(msg) => tracing::warn!(errno, error = %msg, "Bad request"),
            ApiError::NotFound(msg) => tracing::warn!(errno, error = %msg, "Resource not found"),
            ApiError::Cancelled(msg) => tracing::info!(errno, error = %msg, "Job cancelled"),
        }

        let body = ErrorResponse::new(errno, self.message());
        (StatusCode::OK, Json(body)).into_response()
    }
}

impl From<ApplicationError> for ApiError {
    fn from(e: ApplicationError) -> Self {
        let message = e.to_string();
        match e {
            ApplicationError::InvalidParameters(_) => ApiError::BadRequest(message),
            ApplicationError::NotFound { .. } => ApiError::NotFound(message),
            ApplicationError::Cancelled => ApiError::Cancelled(message),
            ApplicationError::CapacityExceeded { .. } => ApiError::CapacityExceeded(message),
            ApplicationError::Upstream { .. } => ApiError::Upstream(message),
            ApplicationError::Timeout { .. } => ApiError::Timeout(message),
            ApplicationError::CacheCorruption(_) | ApplicationError::Internal(_) => {
                ApiError::Internal(message)
            }
        }
    }
}

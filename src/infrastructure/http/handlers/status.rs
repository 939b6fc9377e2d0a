//! Status Handler

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::application::{GetSystemStatus, SystemStatusResponse};
use crate::infrastructure::http::dto::ApiResponse;
use crate::infrastructure::http::error::ApiError;
use crate::infrastructure::http::state::AppState;

/// 队列、缓存与上游服务状态
pub async fn get_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<SystemStatusResponse>>, ApiError> {
    let status = state
        .get_system_status_handler
        .handle(GetSystemStatus)
        .await?;
    Ok(Json(ApiResponse::success(status)))
}

//! Cache Handlers

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::application::{ClearCache, ClearCacheResponse};
use crate::infrastructure::http::dto::ApiResponse;
use crate::infrastructure::http::error::ApiError;
use crate::infrastructure::http::state::AppState;

pub async fn clear_cache(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<ClearCacheResponse>>, ApiError> {
    let result = state.clear_cache_handler.handle(ClearCache).await?;
    Ok(Json(ApiResponse::success(result)))
}

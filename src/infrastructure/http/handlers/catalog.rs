//! Catalog Handlers

use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use crate::application::ports::VideoInfo;
use crate::application::{
    GetVideoInfo, ListPresets, ListSpeakers, PresetsResponse, SpeakersResponse,
};
use crate::infrastructure::http::dto::ApiResponse;
use crate::infrastructure::http::error::ApiError;
use crate::infrastructure::http::state::AppState;

pub async fn list_presets(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<PresetsResponse>>, ApiError> {
    let result = state.list_presets_handler.handle(ListPresets).await?;
    Ok(Json(ApiResponse::success(result)))
}

pub async fn list_speakers(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<SpeakersResponse>>, ApiError> {
    let result = state.list_speakers_handler.handle(ListSpeakers).await?;
    Ok(Json(ApiResponse::success(result)))
}

pub async fn bilibili_info(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<VideoInfo>>, ApiError> {
    let result = state
        .get_video_info_handler
        .handle(GetVideoInfo { query: id })
        .await?;
    Ok(Json(ApiResponse::success(result)))
}

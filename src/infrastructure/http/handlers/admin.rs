//! Admin Handlers

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::application::{SetDefaultSpeaker, SetDefaultSpeakerResponse};
use crate::infrastructure::http::dto::{ApiResponse, SetDefaultSpeakerRequest};
use crate::infrastructure::http::error::ApiError;
use crate::infrastructure::http::state::AppState;

pub async fn set_default_speaker(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SetDefaultSpeakerRequest>,
) -> Result<Json<ApiResponse<SetDefaultSpeakerResponse>>, ApiError> {
    let result = state
        .set_default_speaker_handler
        .handle(SetDefaultSpeaker {
            speaker: req.speaker,
        })
        .await?;
    Ok(Json(ApiResponse::success(result)))
}

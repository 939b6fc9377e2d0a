//! Convert Handlers

use axum::{
    body::Body,
    extract::{Multipart, Path, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

use crate::application::ports::JobSnapshot;
use crate::application::{
    CancelJob, CancelJobResponse, GetJobResult, GetJobStatus, SubmitConversion, SubmitResponse,
    SubmitUpload,
};
use crate::infrastructure::http::dto::{
    parse_job_id, ApiResponse, JobIdRequest, SubmitConversionRequest, UploadOptions,
};
use crate::infrastructure::http::error::ApiError;
use crate::infrastructure::http::state::AppState;

// ============================================================================
// Submit
// ============================================================================

pub async fn submit_conversion(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SubmitConversionRequest>,
) -> Result<Json<ApiResponse<SubmitResponse>>, ApiError> {
    let cmd = SubmitConversion {
        source: req.source,
        params: req.params,
        chorus: req.chorus,
        fast_seek: req.fast_seek,
    };

    let result = state.submit_conversion_handler.handle(cmd).await?;
    Ok(Json(ApiResponse::success(result)))
}

/// 上传音频提交
///
/// multipart 字段：
/// - `file`: 音频文件（必填）
/// - `params`: JSON，参数覆盖以及 `chorus` / `fast_seek`
pub async fn submit_upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<SubmitResponse>>, ApiError> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut options = UploadOptions::default();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        ApiError::BadRequest(format!("Failed to read multipart field: {}", e))
    })? {
        let field_name = field.name().unwrap_or_default().to_string();

        match field_name.as_str() {
            "file" => {
                let filename = field.file_name().unwrap_or("upload.wav").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Failed to read file: {}", e)))?;
                file = Some((filename, bytes.to_vec()));
            }
            "params" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Failed to read params: {}", e)))?;
                if !text.trim().is_empty() {
                    options = serde_json::from_str(&text)
                        .map_err(|e| ApiError::BadRequest(format!("Invalid params JSON: {}", e)))?;
                }
            }
            other => {
                tracing::debug!(field = %other, "Ignoring unknown multipart field");
            }
        }
    }

    let (filename, data) =
        file.ok_or_else(|| ApiError::BadRequest("Missing file field".to_string()))?;

    let cmd = SubmitUpload {
        data,
        filename,
        params: options.params,
        chorus: options.chorus,
        fast_seek: options.fast_seek,
    };

    let result = state.submit_upload_handler.handle(cmd).await?;
    Ok(Json(ApiResponse::success(result)))
}

// ============================================================================
// Status / Cancel
// ============================================================================

pub async fn job_status(
    State(state): State<Arc<AppState>>,
    Json(req): Json<JobIdRequest>,
) -> Result<Json<ApiResponse<JobSnapshot>>, ApiError> {
    let job_id = req.parse()?;
    let snapshot = state
        .get_job_status_handler
        .handle(GetJobStatus { job_id })
        .await?;
    Ok(Json(ApiResponse::success(snapshot)))
}

pub async fn cancel_job(
    State(state): State<Arc<AppState>>,
    Json(req): Json<JobIdRequest>,
) -> Result<Json<ApiResponse<CancelJobResponse>>, ApiError> {
    let job_id = req.parse()?;
    let result = state.cancel_job_handler.handle(CancelJob { job_id }).await?;
    Ok(Json(ApiResponse::success(result)))
}

// ============================================================================
// Result
// ============================================================================

/// 下载产物（`audio/wav`）
///
/// 未结束或失败的任务返回错误信封
pub async fn job_result(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<Response, ApiError> {
    let job_id = parse_job_id(&job_id)?;
    let result = state
        .get_job_result_handler
        .handle(GetJobResult { job_id })
        .await?;

    let audio = Arc::try_unwrap(result.audio).unwrap_or_else(|shared| shared.as_ref().clone());
    let headers = [
        (header::CONTENT_TYPE, result.content_type.to_string()),
        (header::CONTENT_LENGTH, audio.len().to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}.wav\"", result.job_id),
        ),
        (
            header::HeaderName::from_static("x-cache-hit"),
            result.cache_hit.to_string(),
        ),
        (
            header::HeaderName::from_static("x-cache-key"),
            result.cache_key,
        ),
    ];

    Ok((headers, Body::from(audio)).into_response())
}

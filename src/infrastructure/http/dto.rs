//! Data Transfer Objects

use serde::{Deserialize, Serialize};

use crate::domain::conversion::{ConversionParams, JobId, SourceDescriptor};
use crate::infrastructure::http::error::ApiError;

// ============================================================================
// 统一响应结构
// ============================================================================

/// 统一 API 响应格式
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub errno: i32,
    pub error: String,
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    /// 成功响应
    pub fn success(data: T) -> Self {
        Self {
            errno: 0,
            error: String::new(),
            data: Some(data),
        }
    }
}

// ============================================================================
// Convert DTOs
// ============================================================================

/// 平台音源提交
#[derive(Debug, Deserialize)]
pub struct SubmitConversionRequest {
    pub source: SourceDescriptor,
    #[serde(default)]
    pub params: ConversionParams,
    #[serde(default)]
    pub chorus: bool,
    #[serde(default)]
    pub fast_seek: Option<f64>,
}

/// 上传接口 `params` 字段的 JSON 内容
#[derive(Debug, Default, Deserialize)]
pub struct UploadOptions {
    #[serde(flatten)]
    pub params: ConversionParams,
    #[serde(default)]
    pub chorus: bool,
    #[serde(default)]
    pub fast_seek: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct JobIdRequest {
    pub job_id: String,
}

impl JobIdRequest {
    pub fn parse(&self) -> Result<JobId, ApiError> {
        parse_job_id(&self.job_id)
    }
}

pub fn parse_job_id(raw: &str) -> Result<JobId, ApiError> {
    JobId::parse(raw.trim())
        .ok_or_else(|| ApiError::BadRequest(format!("Invalid job id: {}", raw)))
}

// ============================================================================
// Admin DTOs
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SetDefaultSpeakerRequest {
    pub speaker: String,
}

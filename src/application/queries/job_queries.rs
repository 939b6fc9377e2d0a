//! Job Queries - 任务查询

use std::sync::Arc;

use crate::domain::conversion::JobId;

/// 查询任务状态
#[derive(Debug, Clone)]
pub struct GetJobStatus {
    pub job_id: JobId,
}

/// 获取任务产物
#[derive(Debug, Clone)]
pub struct GetJobResult {
    pub job_id: JobId,
}

/// 产物
#[derive(Debug, Clone)]
pub struct JobResultResponse {
    pub job_id: JobId,
    /// WAV 字节
    pub audio: Arc<Vec<u8>>,
    pub content_type: &'static str,
    pub cache_key: String,
    pub cache_hit: bool,
    pub title: Option<String>,
}

//! Conversion Commands - 转换任务相关命令

use serde::Serialize;

use crate::application::ports::QueueStatus;
use crate::domain::conversion::{ConversionParams, JobId, JobState, SourceDescriptor};

/// 提交平台音源转换
#[derive(Debug, Clone)]
pub struct SubmitConversion {
    pub source: SourceDescriptor,
    pub params: ConversionParams,
    /// 高潮截取
    pub chorus: bool,
    /// 快速定位起点（秒）
    pub fast_seek: Option<f64>,
}

/// 提交上传音频转换
#[derive(Debug, Clone)]
pub struct SubmitUpload {
    pub data: Vec<u8>,
    pub filename: String,
    pub params: ConversionParams,
    pub chorus: bool,
    pub fast_seek: Option<f64>,
}

/// 提交响应
#[derive(Debug, Clone, Serialize)]
pub struct SubmitResponse {
    pub job_id: JobId,
    pub state: JobState,
    /// 提交后的队列状态
    pub queue: QueueStatus,
}

/// 取消任务
#[derive(Debug, Clone)]
pub struct CancelJob {
    pub job_id: JobId,
}

/// 取消响应
#[derive(Debug, Clone, Serialize)]
pub struct CancelJobResponse {
    pub job_id: JobId,
    /// 已处于终态时为 false
    pub cancelled: bool,
    pub state: JobState,
}

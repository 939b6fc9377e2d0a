//! Chorus Detector Port - 高潮检测服务抽象

use async_trait::async_trait;

use super::chorus_cache::ChorusInterval;
use super::upstream::UpstreamError;

/// 检测请求
#[derive(Debug, Clone)]
pub struct DetectRequest {
    pub audio: Vec<u8>,
    pub filename: String,
    /// 平台音源 ID，上传文件为 None
    pub source_id: Option<String>,
}

/// Chorus Detector Port
#[async_trait]
pub trait ChorusDetectorPort: Send + Sync {
    async fn detect(&self, request: DetectRequest) -> Result<ChorusInterval, UpstreamError>;
}

//! Stem Separator Port - 人声分离服务抽象
//!
//! 具体实现为 MSST-WebUI HTTP API 客户端

use async_trait::async_trait;

use super::upstream::{ServiceHealth, UpstreamError};

/// 分离请求
#[derive(Debug, Clone)]
pub struct SeparationRequest {
    pub audio: Vec<u8>,
    pub filename: String,
    /// 首选预设，不可用时由实现回退
    pub preset: String,
}

/// 分离结果
#[derive(Debug, Clone)]
pub struct SeparatedStems {
    pub vocals: Vec<u8>,
    /// 预设未输出伴奏时为 None
    pub instrumental: Option<Vec<u8>>,
}

/// Stem Separator Port
#[async_trait]
pub trait StemSeparatorPort: Send + Sync {
    async fn separate(&self, request: SeparationRequest) -> Result<SeparatedStems, UpstreamError>;

    /// 可用预设列表
    async fn presets(&self) -> Result<Vec<String>, UpstreamError>;

    async fn health(&self) -> ServiceHealth;
}

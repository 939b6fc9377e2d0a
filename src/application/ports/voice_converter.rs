//! Voice Converter Port - 歌声转换服务抽象
//!
//! 具体实现为 so-vits-svc HTTP API 客户端

use async_trait::async_trait;

use super::upstream::{ServiceHealth, UpstreamError};
use crate::domain::conversion::EffectiveParams;

/// 转换请求
#[derive(Debug, Clone)]
pub struct ConvertRequest {
    /// 待转换的人声（WAV）
    pub audio: Vec<u8>,
    pub filename: String,
    pub params: EffectiveParams,
}

/// 转换响应
#[derive(Debug, Clone)]
pub struct ConvertResponse {
    /// 转换后的音频（WAV）
    pub audio: Vec<u8>,
    /// 服务端已经完成混音，流水线不再混音
    pub already_mixed: bool,
}

/// Voice Converter Port
#[async_trait]
pub trait VoiceConverterPort: Send + Sync {
    async fn convert(&self, request: ConvertRequest) -> Result<ConvertResponse, UpstreamError>;

    /// 可用说话人列表
    async fn speakers(&self) -> Result<Vec<String>, UpstreamError>;

    async fn health(&self) -> ServiceHealth;
}

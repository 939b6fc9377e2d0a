//! Source Fetcher Port - 平台音源获取
//!
//! 每个平台一个实现：按 ID/搜索词/URL 获取原始音频字节与元数据

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::domain::conversion::{Platform, SourceQuery};

/// 音源获取错误
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Source not found: {0}")]
    NotFound(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Platform not supported: {0}")]
    Unsupported(String),
}

/// 获取请求
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub query: SourceQuery,
    /// 期望音质，None 时按平台顺序尝试
    pub quality: Option<String>,
    /// 分 P 序号（> 1），None 为第 1 P
    pub part: Option<u32>,
}

impl FetchRequest {
    pub fn new(query: SourceQuery) -> Self {
        Self {
            query,
            quality: None,
            part: None,
        }
    }
}

/// 获取到的音源
#[derive(Debug, Clone)]
pub struct FetchedSource {
    pub bytes: Vec<u8>,
    /// 平台内规范 ID（搜索结果或短链解析后的 ID）
    pub canonical_id: String,
    /// 实际获取到的音质标签
    pub quality: String,
    pub title: Option<String>,
    /// 文件扩展名，用于解码格式提示
    pub file_ext: String,
}

/// 视频分 P
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoPart {
    /// 从 1 开始
    pub index: u32,
    pub title: String,
    /// 秒
    pub duration: f64,
}

/// 视频信息（标题、UP 主、分 P 列表）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub uploader: String,
    #[serde(default)]
    pub parts: Vec<VideoPart>,
}

/// Source Fetcher Port
#[async_trait]
pub trait SourceFetcherPort: Send + Sync {
    fn platform(&self) -> Platform;

    async fn fetch(&self, request: &FetchRequest) -> Result<FetchedSource, FetchError>;

    /// 查询视频信息，只有视频平台支持
    async fn video_info(&self, _query: &SourceQuery) -> Result<VideoInfo, FetchError> {
        Err(FetchError::Unsupported(format!(
            "{} has no video info",
            self.platform()
        )))
    }
}

/// 按平台索引的获取器集合
#[derive(Clone, Default)]
pub struct SourceFetchers {
    fetchers: HashMap<Platform, Arc<dyn SourceFetcherPort>>,
}

impl SourceFetchers {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册获取器，同平台后注册者覆盖
    pub fn register(mut self, fetcher: Arc<dyn SourceFetcherPort>) -> Self {
        self.fetchers.insert(fetcher.platform(), fetcher);
        self
    }

    pub fn get(&self, platform: Platform) -> Result<Arc<dyn SourceFetcherPort>, FetchError> {
        self.fetchers
            .get(&platform)
            .cloned()
            .ok_or_else(|| FetchError::Unsupported(platform.to_string()))
    }

    pub fn platforms(&self) -> Vec<Platform> {
        let mut platforms: Vec<Platform> = self.fetchers.keys().copied().collect();
        platforms.sort_by_key(|p| p.as_str());
        platforms
    }
}

//! Catalog Queries - 可用预设、说话人与视频信息

use serde::Serialize;

/// 分离预设列表
#[derive(Debug, Clone, Default)]
pub struct ListPresets;

#[derive(Debug, Clone, Serialize)]
pub struct PresetsResponse {
    pub presets: Vec<String>,
    /// 当前默认预设
    pub default: String,
}

/// 说话人列表
#[derive(Debug, Clone, Default)]
pub struct ListSpeakers;

#[derive(Debug, Clone, Serialize)]
pub struct SpeakersResponse {
    pub speakers: Vec<String>,
    /// 当前默认说话人
    pub default: String,
}

/// B 站视频信息（BV 号、av 号或链接）
#[derive(Debug, Clone)]
pub struct GetVideoInfo {
    pub query: String,
}

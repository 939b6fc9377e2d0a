//! Admin Commands - 运行时管理命令

use serde::Serialize;

/// 修改默认说话人
#[derive(Debug, Clone)]
pub struct SetDefaultSpeaker {
    pub speaker: String,
}

/// 修改响应
#[derive(Debug, Clone, Serialize)]
pub struct SetDefaultSpeakerResponse {
    pub previous: String,
    pub speaker: String,
}

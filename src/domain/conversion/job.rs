//! Conversion Context - 任务值对象
//!
//! 任务 ID、状态机、截取模式与流水线阶段

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::errors::ParamError;
use super::params::EffectiveParams;
use super::source::SourceDescriptor;

/// 任务唯一标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s.trim()).ok().map(Self)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 任务状态
///
/// `queued → running → {succeeded, failed, cancelled}`，终态不可变
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Running => "running",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Failed | JobState::Cancelled
        )
    }

    /// 状态迁移是否合法
    pub fn can_transition_to(&self, next: JobState) -> bool {
        match (self, next) {
            (JobState::Queued, JobState::Running) => true,
            (JobState::Queued, JobState::Cancelled) => true,
            (JobState::Running, s) => s.is_terminal(),
            _ => false,
        }
    }
}

/// 流水线阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Fetch,
    CacheLookup,
    ChorusDetection,
    Crop,
    Separation,
    Conversion,
    Mixing,
    CacheWrite,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Fetch => "fetch",
            PipelineStage::CacheLookup => "cache_lookup",
            PipelineStage::ChorusDetection => "chorus_detection",
            PipelineStage::Crop => "crop",
            PipelineStage::Separation => "separation",
            PipelineStage::Conversion => "conversion",
            PipelineStage::Mixing => "mixing",
            PipelineStage::CacheWrite => "cache_write",
        }
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 截取模式，高潮截取与快速定位互斥
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CropMode {
    /// 完整音频
    Full,
    /// 高潮截取
    Chorus,
    /// 从指定偏移截取固定时长窗口
    FastSeek { start_secs: f64 },
}

impl CropMode {
    /// 由调用方的两个开关构造
    pub fn from_flags(chorus: bool, fast_seek: Option<f64>) -> Result<Self, ParamError> {
        match (chorus, fast_seek) {
            (true, Some(_)) => Err(ParamError::ConflictingCropModes),
            (true, None) => Ok(CropMode::Chorus),
            (false, Some(start)) if start.is_finite() && start >= 0.0 => {
                Ok(CropMode::FastSeek { start_secs: start })
            }
            (false, Some(start)) => Err(ParamError::InvalidSeek(start)),
            (false, None) => Ok(CropMode::Full),
        }
    }
}

/// 任务输入
#[derive(Debug, Clone)]
pub enum JobInput {
    /// 上传的音频
    Upload {
        data: Arc<Vec<u8>>,
        filename: String,
    },
    /// 平台音源
    Source(SourceDescriptor),
}

impl JobInput {
    /// 日志与状态展示用的简短描述
    pub fn describe(&self) -> String {
        match self {
            JobInput::Upload { filename, data } => format!("upload:{} ({} bytes)", filename, data.len()),
            JobInput::Source(src) => format!("{}:{}", src.platform, src.query),
        }
    }
}

/// 转换请求（提交时已完成参数合并）
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub input: JobInput,
    pub params: EffectiveParams,
    pub crop: CropMode,
}

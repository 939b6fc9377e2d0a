//! Conversion Context - 转换限界上下文
//!
//! 职责:
//! - 转换参数（默认值快照、覆盖值、有效值）
//! - 音源描述与标识规范化
//! - 任务状态机

mod errors;
mod job;
mod params;
mod source;

pub use errors::ParamError;
pub use job::{ConversionRequest, CropMode, JobId, JobInput, JobState, PipelineStage};
pub use params::{ConversionDefaults, ConversionParams, EffectiveParams, F0_PREDICTORS};
pub use source::{
    chorus_key_for_source, chorus_key_for_upload, content_hash, extract_aweme_id, extract_bvid,
    source_id_with_part, Platform, SourceDescriptor, SourceQuery,
};

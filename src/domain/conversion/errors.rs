//! Conversion Context - Errors

use thiserror::Error;

/// 参数校验错误，对应 InvalidParameters
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParamError {
    #[error("音调必须在 -12 到 12 之间: {0}")]
    PitchOutOfRange(i32),

    #[error("说话人 ID 不能为空")]
    EmptySpeaker,

    #[error("未知的 F0 预测器: {0}")]
    UnknownF0Predictor(String),

    #[error("参数 {field} 超出范围: {value}")]
    OutOfRange { field: &'static str, value: String },

    #[error("高潮截取与快速定位不能同时使用")]
    ConflictingCropModes,

    #[error("无效的起始时间: {0}")]
    InvalidSeek(f64),

    #[error("无效的音源标识: {0}")]
    InvalidSource(String),

    #[error("预设名称不能为空")]
    EmptyPreset,
}

//! Mixing Context - 混音限界上下文
//!
//! 职责:
//! - 混音参数与阶段开关
//! - 对齐、增益、混响、EQ、淡入淡出、压缩、母带
//! - 伴奏速度估计与节拍同步的效果器时间

mod align;
mod config;
mod dynamics;
mod engine;
mod filters;
mod reverb;
mod tempo;

use thiserror::Error;

pub use config::{MixConfig, MixStages};
pub use engine::mix;
pub use tempo::{estimate_bpm, TempoTimes};

/// 混音错误
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MixError {
    #[error("采样率不一致: 期望 {expected}, 人声 {vocal}, 伴奏 {instrumental}")]
    SampleRateMismatch {
        expected: u32,
        vocal: u32,
        instrumental: u32,
    },

    #[error("输入音频为空")]
    EmptyInput,

    #[error("混音配置无效: {0}")]
    InvalidConfig(String),
}

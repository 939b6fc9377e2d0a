//! Domain Layer - 领域层
//!
//! 包含三个限界上下文:
//! - Audio: 平面 PCM 缓冲区
//! - Conversion Context: 转换参数、音源与任务状态
//! - Mixing Context: 人声与伴奏合成

pub mod audio;
pub mod conversion;
pub mod mixing;

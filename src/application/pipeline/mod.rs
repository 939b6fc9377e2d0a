//! 应用层 - 转换流水线
//!
//! 包含：
//! - context: 任务取消/超时守卫
//! - conversion_pipeline: 阶段编排

mod context;
mod conversion_pipeline;

pub use context::JobContext;
pub use conversion_pipeline::{ConversionPipeline, PipelinePorts, PipelineSettings};

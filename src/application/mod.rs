//! 应用层 - 用例编排
//!
//! 包含：
//! - ports: 六边形架构端口定义（队列、缓存、外部推理服务、音源等）
//! - pipeline: 转换流水线与任务守卫
//! - commands: CQRS 命令及处理器
//! - queries: CQRS 查询及处理器
//! - defaults: 默认参数快照
//! - error: 应用层错误定义

pub mod commands;
pub mod defaults;
pub mod error;
pub mod pipeline;
pub mod ports;
pub mod queries;

// Re-exports
pub use commands::{
    handlers::{
        CancelJobHandler, ClearCacheHandler, SetDefaultSpeakerHandler, SubmitConversionHandler,
        SubmitUploadHandler,
    },
    CancelJob, CancelJobResponse, ClearCache, ClearCacheResponse, SetDefaultSpeaker,
    SetDefaultSpeakerResponse, SubmitConversion, SubmitResponse, SubmitUpload,
};

pub use defaults::DefaultsStore;
pub use error::ApplicationError;
pub use pipeline::{ConversionPipeline, JobContext, PipelinePorts, PipelineSettings};

pub use queries::{
    handlers::{
        GetJobResultHandler, GetJobStatusHandler, GetSystemStatusHandler, GetVideoInfoHandler,
        ListPresetsHandler, ListSpeakersHandler,
    },
    GetJobResult, GetJobStatus, GetSystemStatus, GetVideoInfo, JobResultResponse, ListPresets,
    ListSpeakers, PresetsResponse, SpeakersResponse, SystemStatusResponse, UpstreamStatus,
};

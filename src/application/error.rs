//! 应用层错误定义
//!
//! 统一的命令/查询错误类型

use thiserror::Error;

use crate::application::ports::{CacheError, FetchError, JobError, QueueError};
use crate::domain::conversion::{ParamError, PipelineStage};

/// 应用层错误
#[derive(Debug, Error)]
pub enum ApplicationError {
    /// 队列已满，提交被拒绝
    #[error("Queue is full (capacity {capacity})")]
    CapacityExceeded { capacity: usize },

    /// 任务超时
    #[error("Job timed out after {secs}s")]
    Timeout { secs: u64 },

    /// 任务已取消
    #[error("Job cancelled")]
    Cancelled,

    /// 外部服务失败
    #[error("Upstream error at {stage}: {message}")]
    Upstream {
        stage: PipelineStage,
        message: String,
    },

    /// 缓存损坏（降级为未命中，不会返回给调用方）
    #[error("Cache corruption: {0}")]
    CacheCorruption(String),

    /// 参数错误
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    /// 资源未找到
    #[error("{resource_type} not found: {id}")]
    NotFound {
        resource_type: &'static str,
        id: String,
    },

    /// 内部错误
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApplicationError {
    /// 创建 NotFound 错误
    pub fn not_found(resource_type: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            resource_type,
            id: id.to_string(),
        }
    }

    /// 创建参数错误
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidParameters(message.into())
    }

    /// 创建外部服务错误
    pub fn upstream(stage: PipelineStage, message: impl ToString) -> Self {
        Self::Upstream {
            stage,
            message: message.to_string(),
        }
    }

    /// 创建内部错误
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

impl From<ParamError> for ApplicationError {
    fn from(err: ParamError) -> Self {
        Self::InvalidParameters(err.to_string())
    }
}

impl From<QueueError> for ApplicationError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::CapacityExceeded { capacity } => Self::CapacityExceeded { capacity },
            QueueError::NotFound(id) => Self::not_found("Job", id),
            QueueError::Closed => Self::Internal(err.to_string()),
        }
    }
}

impl From<CacheError> for ApplicationError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::Corruption { .. } => Self::CacheCorruption(err.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<FetchError> for ApplicationError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::InvalidIdentifier(msg) => Self::InvalidParameters(msg),
            FetchError::Unsupported(platform) => {
                Self::InvalidParameters(format!("platform not supported: {}", platform))
            }
            FetchError::NotFound(what) => Self::not_found("Source", what),
            FetchError::Upstream(msg) => Self::upstream(PipelineStage::Fetch, msg),
        }
    }
}

impl From<JobError> for ApplicationError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::Timeout { secs } => Self::Timeout { secs },
            JobError::Cancelled => Self::Cancelled,
            JobError::Upstream { stage, message } => Self::Upstream { stage, message },
            JobError::InvalidParameters { message } => Self::InvalidParameters(message),
            JobError::Internal { stage, message } => {
                Self::Internal(format!("{}: {}", stage, message))
            }
        }
    }
}

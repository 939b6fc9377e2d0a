//! Upstream Port - 外部推理服务的公共类型

use serde::Serialize;
use thiserror::Error;

/// 外部服务错误
#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timeout")]
    Timeout,

    /// 非成功状态码
    #[error("Service error (HTTP {status}): {message}")]
    ServiceError { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// 服务可达但暂不可用（模型未加载、队列已满等）
    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

/// 服务健康状态
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ServiceHealth {
    pub reachable: bool,
    pub model_loaded: bool,
    pub queue_size: usize,
    /// 不可达时的错误信息
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServiceHealth {
    pub fn unreachable(error: impl Into<String>) -> Self {
        Self {
            reachable: false,
            model_loaded: false,
            queue_size: 0,
            error: Some(error.into()),
        }
    }
}

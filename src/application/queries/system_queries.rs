//! System Queries - 服务状态查询

use serde::Serialize;

use crate::application::ports::{CacheStats, QueueStatus, ServiceHealth};
use crate::domain::conversion::ConversionDefaults;

/// 查询服务整体状态
#[derive(Debug, Clone, Default)]
pub struct GetSystemStatus;

#[derive(Debug, Clone, Serialize)]
pub struct UpstreamStatus {
    pub svc: ServiceHealth,
    pub msst: ServiceHealth,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemStatusResponse {
    pub queue: QueueStatus,
    pub cache: CacheStats,
    /// 高潮区间缓存条目数
    pub chorus_entries: usize,
    pub upstream: UpstreamStatus,
    pub defaults: ConversionDefaults,
}

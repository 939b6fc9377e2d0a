//! Cache Commands - 缓存管理命令

use serde::Serialize;

/// 清空产物缓存
#[derive(Debug, Clone, Default)]
pub struct ClearCache;

/// 清空响应
#[derive(Debug, Clone, Serialize)]
pub struct ClearCacheResponse {
    pub removed: usize,
}

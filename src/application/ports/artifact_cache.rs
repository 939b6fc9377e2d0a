//! Artifact Cache Port - 转换结果缓存
//!
//! 以内容哈希 + 有效参数为 key 的持久化缓存，具体实现使用 Sled 索引 + 文件

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

use crate::domain::conversion::{CropMode, EffectiveParams};
use crate::domain::mixing::MixConfig;

/// Artifact Cache 错误
#[derive(Debug, Error)]
pub enum CacheError {
    /// 索引与文件不一致（文件缺失或大小不符）
    #[error("Cache corruption for {key}: {reason}")]
    Corruption { key: String, reason: String },

    #[error("Artifact too large: {size} bytes exceeds cache limit {max} bytes")]
    EntryTooLarge { size: u64, max: u64 },

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// 缓存 key：32 位小写 md5 hex
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    /// 校验并构造，只接受 32 位十六进制
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_ascii_lowercase();
        if s.len() == 32 && s.chars().all(|c| c.is_ascii_hexdigit()) {
            Some(Self(s))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// 缓存条目（索引记录）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub path: PathBuf,
    pub size_bytes: u64,
    /// 毫秒时间戳
    pub created_at: i64,
    pub last_accessed: i64,
    /// 生成该产物的参数快照
    pub params: serde_json::Value,
}

/// 命中的缓存产物
#[derive(Debug, Clone)]
pub struct CachedArtifact {
    pub entry: CacheEntry,
    pub data: Vec<u8>,
}

/// 一次淘汰的结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EvictionReport {
    /// 因过期删除的条目数
    pub expired: usize,
    /// 因超出容量按 LRU 删除的条目数
    pub lru: usize,
    pub freed_bytes: u64,
}

impl EvictionReport {
    pub fn removed(&self) -> usize {
        self.expired + self.lru
    }
}

/// 缓存统计信息
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub total_bytes: u64,
    pub max_bytes: u64,
    pub max_age_secs: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Artifact Cache Port
///
/// - 写入先落临时文件再原子 rename
/// - 每次 put 之后执行一次淘汰（先过期，后 LRU）
/// - 变更操作互斥，查询可并发
#[async_trait]
pub trait ArtifactCachePort: Send + Sync {
    /// 查找产物，命中时刷新 last_accessed
    ///
    /// 索引与文件不一致时返回 `CacheError::Corruption`，调用方按未命中处理
    async fn lookup(&self, key: &CacheKey) -> Result<Option<CachedArtifact>, CacheError>;

    /// 写入产物，同 key 重复写入以最后一次为准
    async fn put(
        &self,
        key: &CacheKey,
        data: &[u8],
        params: serde_json::Value,
    ) -> Result<CacheEntry, CacheError>;

    /// 按年龄与容量淘汰
    async fn evict_if_needed(&self) -> Result<EvictionReport, CacheError>;

    /// 删除全部条目与文件，返回删除数量
    async fn clear_all(&self) -> Result<usize, CacheError>;

    async fn stats(&self) -> CacheStats;
}

/// key 的规范化输入
#[derive(Serialize)]
struct KeyMaterial<'a> {
    content: &'a str,
    params: &'a EffectiveParams,
    crop: &'a CropMode,
    /// 仅在快速定位模式下参与
    #[serde(skip_serializing_if = "Option::is_none")]
    fast_seek_window_secs: Option<f64>,
    /// 仅在启用混音时参与
    #[serde(skip_serializing_if = "Option::is_none")]
    mixing: Option<&'a MixConfig>,
}

/// 生成缓存 key
///
/// md5(规范化 JSON)：对象键排序、-0.0 归一为 0.0。
/// 未启用混音时混音参数不参与计算。
pub fn generate_cache_key(
    content_hash: &str,
    params: &EffectiveParams,
    crop: &CropMode,
    fast_seek_window_secs: f64,
    mixing: Option<&MixConfig>,
) -> Result<CacheKey, CacheError> {
    let material = KeyMaterial {
        content: content_hash,
        params,
        crop,
        fast_seek_window_secs: matches!(crop, CropMode::FastSeek { .. })
            .then_some(fast_seek_window_secs),
        mixing: if params.enable_mixing { mixing } else { None },
    };

    let value = serde_json::to_value(&material)
        .map_err(|e| CacheError::SerializationError(e.to_string()))?;
    let canonical = serde_json::to_string(&canonicalize(value))
        .map_err(|e| CacheError::SerializationError(e.to_string()))?;

    Ok(CacheKey(format!("{:x}", md5::compute(canonical.as_bytes()))))
}

/// 递归排序对象键并归一化数字
fn canonicalize(value: serde_json::Value) -> serde_json::Value {
    use serde_json::Value;

    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> = map
                .into_iter()
                .map(|(k, v)| (k, canonicalize(v)))
                .collect();
            Value::Object(sorted.into_iter().collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() && f == 0.0 => Value::from(0.0),
            _ => Value::Number(n),
        },
        other => other,
    }
}

//! Sled-indexed Artifact Cache Implementation
//!
//! 索引存 sled (`cache:<key>` → bincode 记录)，产物存 `<artifacts_dir>/<key>.wav`

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sled::Db;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::application::ports::{
    ArtifactCachePort, CacheEntry, CacheError, CacheKey, CacheStats, CachedArtifact,
    EvictionReport,
};

const KEY_PREFIX: &str = "cache:";
const TMP_PREFIX: &str = ".tmp-";
const ARTIFACT_EXT: &str = "wav";
/// 超过该时长未改动的临时文件视为被中断的写入
const STALE_TMP_AGE: Duration = Duration::from_secs(600);

/// 缓存配置
#[derive(Debug, Clone)]
pub struct SledCacheConfig {
    /// 产物目录
    pub artifacts_dir: PathBuf,
    /// sled 索引路径
    pub index_path: PathBuf,
    /// 最大缓存大小（字节）
    pub max_size_bytes: u64,
    /// 最大缓存年龄（秒）
    pub max_age_secs: u64,
}

impl SledCacheConfig {
    pub fn from_app_config(config: &crate::config::CacheConfig) -> Self {
        Self {
            artifacts_dir: config.artifacts_dir(),
            index_path: config.index_path(),
            max_size_bytes: config.max_size_bytes,
            max_age_secs: config.max_age_secs,
        }
    }
}

/// 索引记录
#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexRecord {
    file_name: String,
    size_bytes: u64,
    created_at: i64,
    last_accessed: i64,
    /// 单调递增的访问序号，LRU 以它为准
    access_seq: u64,
    /// 参数快照（JSON 文本）
    params_json: String,
}

/// Sled 产物缓存
///
/// 变更（put / 淘汰 / 清空 / 自愈删除）持有写锁，查找持有读锁。
/// 写入先在锁外落临时文件，锁内只做 rename 与索引更新。
pub struct SledArtifactCache {
    db: Db,
    artifacts_dir: PathBuf,
    max_size_bytes: u64,
    max_age_secs: u64,
    mutation: RwLock<()>,
    current_size: AtomicU64,
    access_seq: AtomicU64,
    hit_count: AtomicU64,
    miss_count: AtomicU64,
    eviction_count: AtomicU64,
}

fn db_err(e: sled::Error) -> CacheError {
    CacheError::DatabaseError(e.to_string())
}

fn io_err(e: std::io::Error) -> CacheError {
    CacheError::IoError(e.to_string())
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn index_key(key: &CacheKey) -> String {
    format!("{}{}", KEY_PREFIX, key)
}

fn decode_record(bytes: &[u8]) -> Result<IndexRecord, CacheError> {
    bincode::deserialize(bytes).map_err(|e| CacheError::SerializationError(e.to_string()))
}

fn encode_record(record: &IndexRecord) -> Result<Vec<u8>, CacheError> {
    bincode::serialize(record).map_err(|e| CacheError::SerializationError(e.to_string()))
}

fn is_tmp_file(name: &str) -> bool {
    name.starts_with(TMP_PREFIX)
}

/// 删除文件，不存在视为成功
fn remove_file_quiet(path: &Path) -> Result<(), CacheError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(io_err(e)),
    }
}

impl SledArtifactCache {
    /// 打开缓存并与磁盘对账
    pub fn new(config: &SledCacheConfig) -> Result<Self, CacheError> {
        std::fs::create_dir_all(&config.artifacts_dir).map_err(io_err)?;
        let db = sled::open(&config.index_path).map_err(db_err)?;

        let cache = Self {
            db,
            artifacts_dir: config.artifacts_dir.clone(),
            max_size_bytes: config.max_size_bytes,
            max_age_secs: config.max_age_secs,
            mutation: RwLock::new(()),
            current_size: AtomicU64::new(0),
            access_seq: AtomicU64::new(0),
            hit_count: AtomicU64::new(0),
            miss_count: AtomicU64::new(0),
            eviction_count: AtomicU64::new(0),
        };
        let (entries, dropped, orphans) = cache.reconcile()?;

        tracing::info!(
            artifacts_dir = %config.artifacts_dir.display(),
            index_path = %config.index_path.display(),
            max_size_bytes = config.max_size_bytes,
            max_age_secs = config.max_age_secs,
            entries = entries,
            current_size = cache.current_size.load(Ordering::Relaxed),
            dropped_records = dropped,
            orphan_files = orphans,
            "SledArtifactCache initialized"
        );

        Ok(cache)
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    fn artifact_path(&self, file_name: &str) -> PathBuf {
        self.artifacts_dir.join(file_name)
    }

    /// 对账：删除无文件的索引、删除未索引的文件与临时文件、重算总大小
    fn reconcile(&self) -> Result<(usize, usize, usize), CacheError> {
        let mut total = 0u64;
        let mut max_seq = 0u64;
        let mut indexed = std::collections::HashSet::new();
        let mut dropped = 0usize;

        for item in self.db.scan_prefix(KEY_PREFIX) {
            let (key, value) = item.map_err(db_err)?;
            let valid = decode_record(&value).ok().filter(|record| {
                std::fs::metadata(self.artifact_path(&record.file_name))
                    .map(|m| m.is_file() && m.len() == record.size_bytes)
                    .unwrap_or(false)
            });
            match valid {
                Some(record) => {
                    total += record.size_bytes;
                    max_seq = max_seq.max(record.access_seq);
                    indexed.insert(record.file_name);
                }
                None => {
                    self.db.remove(&key).map_err(db_err)?;
                    dropped += 1;
                }
            }
        }

        let mut orphans = 0usize;
        for dir_entry in std::fs::read_dir(&self.artifacts_dir).map_err(io_err)? {
            let dir_entry = dir_entry.map_err(io_err)?;
            let name = dir_entry.file_name().to_string_lossy().to_string();
            if !indexed.contains(&name) && dir_entry.path().is_file() {
                remove_file_quiet(&dir_entry.path())?;
                orphans += 1;
            }
        }

        self.current_size.store(total, Ordering::Relaxed);
        self.access_seq.store(max_seq + 1, Ordering::Relaxed);
        Ok((indexed.len(), dropped, orphans))
    }

    fn next_seq(&self) -> u64 {
        self.access_seq.fetch_add(1, Ordering::Relaxed)
    }

    fn to_entry(&self, key: &CacheKey, record: &IndexRecord) -> CacheEntry {
        CacheEntry {
            key: key.clone(),
            path: self.artifact_path(&record.file_name),
            size_bytes: record.size_bytes,
            created_at: record.created_at,
            last_accessed: record.last_accessed,
            params: serde_json::from_str(&record.params_json).unwrap_or(serde_json::Value::Null),
        }
    }

    /// 删除一条记录及其文件（调用方持有写锁）
    fn remove_locked(&self, raw_key: &[u8], record: &IndexRecord) -> Result<(), CacheError> {
        remove_file_quiet(&self.artifact_path(&record.file_name))?;
        if self.db.remove(raw_key).map_err(db_err)?.is_some() {
            self.release_size(record.size_bytes);
        }
        Ok(())
    }

    /// 扣减总大小（调用方持有写锁）
    fn release_size(&self, bytes: u64) {
        let current = self.current_size.load(Ordering::Relaxed);
        self.current_size
            .store(current.saturating_sub(bytes), Ordering::Relaxed);
    }

    /// 先按年龄、再按 LRU 淘汰（调用方持有写锁）
    fn evict_locked(&self, now: i64) -> Result<EvictionReport, CacheError> {
        let mut report = EvictionReport::default();
        let max_age_ms = (self.max_age_secs as i64).saturating_mul(1000);

        let mut live = Vec::new();
        for item in self.db.scan_prefix(KEY_PREFIX) {
            let (key, value) = item.map_err(db_err)?;
            match decode_record(&value) {
                Ok(record) => live.push((key, record)),
                Err(e) => {
                    tracing::warn!(error = %e, "Dropping undecodable cache record");
                    self.db.remove(&key).map_err(db_err)?;
                }
            }
        }

        // 1. 过期
        let mut remaining = Vec::with_capacity(live.len());
        for (key, record) in live {
            if now.saturating_sub(record.created_at) > max_age_ms {
                self.remove_locked(&key, &record)?;
                report.expired += 1;
                report.freed_bytes += record.size_bytes;
            } else {
                remaining.push((key, record));
            }
        }

        // 2. LRU：按访问序号从旧到新
        remaining.sort_by_key(|(_, record)| record.access_seq);
        for (key, record) in remaining {
            if self.current_size.load(Ordering::Relaxed) <= self.max_size_bytes {
                break;
            }
            self.remove_locked(&key, &record)?;
            report.lru += 1;
            report.freed_bytes += record.size_bytes;
        }

        // 3. 被中断的写入留下的临时文件
        let stale_tmp = self.sweep_stale_tmp(STALE_TMP_AGE)?;

        if report.removed() > 0 || stale_tmp > 0 {
            self.eviction_count
                .fetch_add(report.removed() as u64, Ordering::Relaxed);
            tracing::info!(
                expired = report.expired,
                lru = report.lru,
                freed_bytes = report.freed_bytes,
                stale_tmp_files = stale_tmp,
                current_size = self.current_size.load(Ordering::Relaxed),
                "Cache eviction finished"
            );
        }
        Ok(report)
    }

    /// 删除修改时间早于 `max_age` 的临时文件（调用方持有写锁）
    fn sweep_stale_tmp(&self, max_age: Duration) -> Result<usize, CacheError> {
        let cutoff = SystemTime::now().checked_sub(max_age).unwrap_or(SystemTime::UNIX_EPOCH);
        let mut swept = 0usize;
        for dir_entry in std::fs::read_dir(&self.artifacts_dir).map_err(io_err)? {
            let dir_entry = dir_entry.map_err(io_err)?;
            if !is_tmp_file(&dir_entry.file_name().to_string_lossy()) {
                continue;
            }
            let stale = dir_entry
                .metadata()
                .and_then(|m| m.modified())
                .map(|modified| modified < cutoff)
                .unwrap_or(false);
            if stale {
                remove_file_quiet(&dir_entry.path())?;
                swept += 1;
            }
        }
        Ok(swept)
    }

    /// 自愈：删除损坏条目
    ///
    /// 只有索引仍是发现损坏时读到的那条记录才删除；
    /// 期间被 put 覆盖的新条目保持不动
    async fn heal(&self, key: &CacheKey, corrupt: &[u8]) -> Result<bool, CacheError> {
        let _guard = self.mutation.write().await;
        let raw_key = index_key(key);
        let Some(value) = self.db.get(&raw_key).map_err(db_err)? else {
            return Ok(false);
        };
        if &*value != corrupt {
            tracing::debug!(cache_key = %key, "Corrupt entry already replaced, skipping heal");
            return Ok(false);
        }
        match decode_record(&value) {
            Ok(record) => self.remove_locked(raw_key.as_bytes(), &record)?,
            Err(_) => {
                self.db.remove(&raw_key).map_err(db_err)?;
            }
        }
        Ok(true)
    }

    /// 刷新数据库
    pub fn flush(&self) -> Result<(), CacheError> {
        self.db.flush().map_err(db_err)?;
        Ok(())
    }
}

#[async_trait]
impl ArtifactCachePort for SledArtifactCache {
    async fn lookup(&self, key: &CacheKey) -> Result<Option<CachedArtifact>, CacheError> {
        let raw_key = index_key(key);

        let corruption = {
            let _guard = self.mutation.read().await;

            let value = match self.db.get(&raw_key).map_err(db_err)? {
                Some(value) => value,
                None => {
                    self.miss_count.fetch_add(1, Ordering::Relaxed);
                    return Ok(None);
                }
            };

            let reason = match decode_record(&value) {
                Err(e) => format!("undecodable index record: {}", e),
                Ok(record) => match tokio::fs::read(self.artifact_path(&record.file_name)).await {
                    Ok(data) if data.len() as u64 == record.size_bytes => {
                        let seq = self.next_seq();
                        let touched_at = now_ms();
                        // 原子刷新访问时间
                        self.db
                            .fetch_and_update(&raw_key, |old| {
                                old.map(|bytes| match decode_record(bytes) {
                                    Ok(mut record) => {
                                        record.last_accessed = touched_at;
                                        record.access_seq = seq;
                                        encode_record(&record).unwrap_or_else(|_| bytes.to_vec())
                                    }
                                    Err(_) => bytes.to_vec(),
                                })
                            })
                            .map_err(db_err)?;

                        let mut record = record;
                        record.last_accessed = touched_at;
                        record.access_seq = seq;
                        self.hit_count.fetch_add(1, Ordering::Relaxed);
                        tracing::debug!(cache_key = %key, size_bytes = record.size_bytes, "Cache hit");
                        return Ok(Some(CachedArtifact {
                            entry: self.to_entry(key, &record),
                            data,
                        }));
                    }
                    Ok(data) => format!(
                        "size mismatch: indexed {} bytes, file has {} bytes",
                        record.size_bytes,
                        data.len()
                    ),
                    Err(e) => format!("artifact file unreadable: {}", e),
                },
            };
            (value, reason)
        };

        self.miss_count.fetch_add(1, Ordering::Relaxed);
        let (corrupt, reason) = corruption;
        tracing::warn!(cache_key = %key, reason = %reason, "Cache corruption detected, removing entry");
        self.heal(key, &corrupt).await?;
        Err(CacheError::Corruption {
            key: key.to_string(),
            reason,
        })
    }

    async fn put(
        &self,
        key: &CacheKey,
        data: &[u8],
        params: serde_json::Value,
    ) -> Result<CacheEntry, CacheError> {
        let size = data.len() as u64;
        if size > self.max_size_bytes {
            return Err(CacheError::EntryTooLarge {
                size,
                max: self.max_size_bytes,
            });
        }

        // 锁外写临时文件
        let tmp_path = self
            .artifacts_dir
            .join(format!("{}{}", TMP_PREFIX, Uuid::new_v4()));
        tokio::fs::write(&tmp_path, data).await.map_err(io_err)?;

        let file_name = format!("{}.{}", key, ARTIFACT_EXT);
        let now = now_ms();
        let record = IndexRecord {
            file_name: file_name.clone(),
            size_bytes: size,
            created_at: now,
            last_accessed: now,
            access_seq: self.next_seq(),
            params_json: params.to_string(),
        };
        let encoded = encode_record(&record)?;
        let raw_key = index_key(key);

        let _guard = self.mutation.write().await;

        if let Err(e) = std::fs::rename(&tmp_path, self.artifact_path(&file_name)) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(io_err(e));
        }
        let previous = self.db.insert(&raw_key, encoded).map_err(db_err)?;
        if let Some(old) = previous.as_deref().and_then(|v| decode_record(v).ok()) {
            self.release_size(old.size_bytes);
        }
        self.current_size.fetch_add(size, Ordering::Relaxed);

        tracing::debug!(cache_key = %key, size_bytes = size, "Artifact cached");

        self.evict_locked(now)?;
        Ok(self.to_entry(key, &record))
    }

    async fn evict_if_needed(&self) -> Result<EvictionReport, CacheError> {
        let _guard = self.mutation.write().await;
        self.evict_locked(now_ms())
    }

    async fn clear_all(&self) -> Result<usize, CacheError> {
        let _guard = self.mutation.write().await;

        let mut removed = 0usize;
        for item in self.db.scan_prefix(KEY_PREFIX) {
            let (key, _) = item.map_err(db_err)?;
            self.db.remove(&key).map_err(db_err)?;
            removed += 1;
        }
        // 进行中的 put 在锁外写临时文件，保留给它完成 rename
        for dir_entry in std::fs::read_dir(&self.artifacts_dir).map_err(io_err)? {
            let dir_entry = dir_entry.map_err(io_err)?;
            let path = dir_entry.path();
            if path.is_file() && !is_tmp_file(&dir_entry.file_name().to_string_lossy()) {
                remove_file_quiet(&path)?;
            }
        }
        self.current_size.store(0, Ordering::Relaxed);

        tracing::info!(removed = removed, "Artifact cache cleared");
        Ok(removed)
    }

    async fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.db.scan_prefix(KEY_PREFIX).count(),
            total_bytes: self.current_size.load(Ordering::Relaxed),
            max_bytes: self.max_size_bytes,
            max_age_secs: self.max_age_secs,
            hits: self.hit_count.load(Ordering::Relaxed),
            misses: self.miss_count.load(Ordering::Relaxed),
            evictions: self.eviction_count.load(Ordering::Relaxed),
        }
    }
}

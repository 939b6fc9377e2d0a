//! JSON-file Chorus Cache Implementation
//!
//! 文件格式: `{ "<key>": { "start": f64, "end": f64, "detected_at": i64 }, ... }`

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::application::ports::{ChorusCacheError, ChorusCachePort, ChorusEntry, ChorusInterval};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredChorus {
    start: f64,
    end: f64,
    #[serde(default)]
    detected_at: i64,
}

impl StoredChorus {
    fn interval(&self) -> ChorusInterval {
        ChorusInterval {
            start: self.start,
            end: self.end,
        }
    }
}

/// JSON 文件高潮缓存
///
/// 打开时加载全部合法记录，写入时整体重写（临时文件 + rename）
pub struct JsonChorusCache {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, StoredChorus>>,
}

impl JsonChorusCache {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, ChorusCacheError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ChorusCacheError::IoError(e.to_string()))?;
        }

        let entries = Self::load(&path).await;
        tracing::info!(path = %path.display(), entries = entries.len(), "JsonChorusCache initialized");

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// 读取文件；缺失或损坏时返回空表，非法记录逐条跳过
    async fn load(path: &Path) -> BTreeMap<String, StoredChorus> {
        let raw = match tokio::fs::read(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read chorus cache");
                return BTreeMap::new();
            }
        };

        let map: serde_json::Map<String, serde_json::Value> = match serde_json::from_slice(&raw) {
            Ok(map) => map,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Malformed chorus cache file ignored");
                return BTreeMap::new();
            }
        };

        map.into_iter()
            .filter_map(|(key, value)| {
                match serde_json::from_value::<StoredChorus>(value) {
                    Ok(stored) if stored.interval().is_valid() => Some((key, stored)),
                    _ => {
                        tracing::warn!(chorus_key = %key, "Skipping malformed chorus record");
                        None
                    }
                }
            })
            .collect()
    }

    /// 全部记录（按 key 排序）
    pub async fn entries(&self) -> Vec<ChorusEntry> {
        self.entries
            .lock()
            .await
            .iter()
            .map(|(key, stored)| ChorusEntry {
                key: key.clone(),
                interval: stored.interval(),
                detected_at: stored.detected_at,
            })
            .collect()
    }

    async fn persist(&self, entries: &BTreeMap<String, StoredChorus>) -> Result<(), ChorusCacheError> {
        let json = serde_json::to_vec_pretty(entries)
            .map_err(|e| ChorusCacheError::SerializationError(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| ChorusCacheError::IoError(e.to_string()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| ChorusCacheError::IoError(e.to_string()))
    }
}

#[async_trait]
impl ChorusCachePort for JsonChorusCache {
    async fn lookup(&self, key: &str) -> Option<ChorusInterval> {
        self.entries.lock().await.get(key).map(StoredChorus::interval)
    }

    async fn put(&self, key: &str, interval: ChorusInterval) -> Result<(), ChorusCacheError> {
        if !interval.is_valid() {
            return Err(ChorusCacheError::InvalidInterval(format!(
                "[{}, {}]",
                interval.start, interval.end
            )));
        }

        let mut entries = self.entries.lock().await;
        entries.insert(
            key.to_string(),
            StoredChorus {
                start: interval.start,
                end: interval.end,
                detected_at: Utc::now().timestamp_millis(),
            },
        );
        self.persist(&entries).await?;

        tracing::debug!(chorus_key = %key, start = interval.start, end = interval.end, "Chorus interval stored");
        Ok(())
    }

    async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

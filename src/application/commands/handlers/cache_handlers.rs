//! Cache Command Handlers

use std::sync::Arc;

use crate::application::commands::cache_commands::*;
use crate::application::error::ApplicationError;
use crate::application::ports::ArtifactCachePort;

/// 清空缓存 Handler
///
/// 只清理产物缓存；高潮区间缓存与内容无关，保留
pub struct ClearCacheHandler {
    cache: Arc<dyn ArtifactCachePort>,
}

impl ClearCacheHandler {
    pub fn new(cache: Arc<dyn ArtifactCachePort>) -> Self {
        Self { cache }
    }

    pub async fn handle(&self, _cmd: ClearCache) -> Result<ClearCacheResponse, ApplicationError> {
        let removed = self.cache.clear_all().await?;
        tracing::info!(removed, "Artifact cache cleared");
        Ok(ClearCacheResponse { removed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    use crate::application::ports::CacheKey;
    use crate::infrastructure::persistence::{SledArtifactCache, SledCacheConfig};

    #[tokio::test]
    async fn test_clear_removes_all_entries() {
        let dir = tempdir().unwrap();
        let cache = SledArtifactCache::new(&SledCacheConfig {
            artifacts_dir: dir.path().join("artifacts"),
            index_path: dir.path().join("index.sled"),
            max_size_bytes: 1 << 20,
            max_age_secs: 3600,
        })
        .unwrap()
        .arc();

        for n in 0..3u8 {
            let key = CacheKey::parse(&format!("{:032x}", n)).unwrap();
            cache.put(&key, b"RIFF", serde_json::json!({})).await.unwrap();
        }

        let handler = ClearCacheHandler::new(cache.clone());
        let response = handler.handle(ClearCache).await.unwrap();
        assert_eq!(response.removed, 3);
        assert_eq!(cache.stats().await.entries, 0);

        let again = handler.handle(ClearCache).await.unwrap();
        assert_eq!(again.removed, 0);
    }
}

//! System Query Handlers

use std::sync::Arc;

use crate::application::defaults::DefaultsStore;
use crate::application::error::ApplicationError;
use crate::application::ports::{
    ArtifactCachePort, ChorusCachePort, JobQueuePort, StemSeparatorPort, VoiceConverterPort,
};
use crate::application::queries::system_queries::*;

/// 服务状态 Handler
///
/// 上游健康检查失败不影响整体结果，只体现在对应字段里
pub struct GetSystemStatusHandler {
    queue: Arc<dyn JobQueuePort>,
    cache: Arc<dyn ArtifactCachePort>,
    chorus_cache: Arc<dyn ChorusCachePort>,
    converter: Arc<dyn VoiceConverterPort>,
    separator: Arc<dyn StemSeparatorPort>,
    defaults: Arc<DefaultsStore>,
}

impl GetSystemStatusHandler {
    pub fn new(
        queue: Arc<dyn JobQueuePort>,
        cache: Arc<dyn ArtifactCachePort>,
        chorus_cache: Arc<dyn ChorusCachePort>,
        converter: Arc<dyn VoiceConverterPort>,
        separator: Arc<dyn StemSeparatorPort>,
        defaults: Arc<DefaultsStore>,
    ) -> Self {
        Self {
            queue,
            cache,
            chorus_cache,
            converter,
            separator,
            defaults,
        }
    }

    pub async fn handle(
        &self,
        _query: GetSystemStatus,
    ) -> Result<SystemStatusResponse, ApplicationError> {
        let (cache, chorus_entries, svc, msst) = tokio::join!(
            self.cache.stats(),
            self.chorus_cache.len(),
            self.converter.health(),
            self.separator.health(),
        );

        Ok(SystemStatusResponse {
            queue: self.queue.status(),
            cache,
            chorus_entries,
            upstream: UpstreamStatus { svc, msst },
            defaults: self.defaults.snapshot().as_ref().clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tokio::sync::mpsc;

    use crate::application::ports::ServiceHealth;
    use crate::domain::conversion::ConversionDefaults;
    use crate::infrastructure::adapters::fake::{FakeStemSeparator, FakeVoiceConverter};
    use crate::infrastructure::memory::InMemoryJobQueue;
    use crate::infrastructure::persistence::{JsonChorusCache, SledArtifactCache, SledCacheConfig};

    #[tokio::test]
    async fn test_status_reports_queue_cache_and_upstreams() {
        let dir = tempdir().unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        let queue = InMemoryJobQueue::new(7, tx).arc();
        let cache = SledArtifactCache::new(&SledCacheConfig {
            artifacts_dir: dir.path().join("artifacts"),
            index_path: dir.path().join("index.sled"),
            max_size_bytes: 4096,
            max_age_secs: 60,
        })
        .unwrap()
        .arc();
        let chorus = JsonChorusCache::open(dir.path().join("chorus_cache.json"))
            .await
            .unwrap()
            .arc();
        let converter = Arc::new(FakeVoiceConverter::new());
        converter.set_health(ServiceHealth::unreachable("connection refused"));

        let handler = GetSystemStatusHandler::new(
            queue,
            cache,
            chorus,
            converter,
            Arc::new(FakeStemSeparator::new()),
            Arc::new(DefaultsStore::new(ConversionDefaults::default())),
        );
        let status = handler.handle(GetSystemStatus).await.unwrap();

        assert_eq!(status.queue.capacity, 7);
        assert_eq!(status.queue.size, 0);
        assert_eq!(status.cache.max_bytes, 4096);
        assert_eq!(status.chorus_entries, 0);
        assert!(!status.upstream.svc.reachable);
        assert!(status.upstream.msst.model_loaded);
        assert_eq!(status.defaults.speaker, "0");
    }
}

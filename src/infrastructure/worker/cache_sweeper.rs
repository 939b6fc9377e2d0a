//! Cache Sweeper - 周期清理
//!
//! 定期执行缓存淘汰并清理已结束的任务记录

use std::sync::Arc;
use std::time::Duration;

use crate::application::ports::{ArtifactCachePort, JobQueuePort};

/// 清理器配置
#[derive(Debug, Clone)]
pub struct CacheSweeperConfig {
    pub interval: Duration,
    /// 已结束任务的保留时间
    pub job_retention: Duration,
}

pub struct CacheSweeper {
    config: CacheSweeperConfig,
    cache: Arc<dyn ArtifactCachePort>,
    queue: Arc<dyn JobQueuePort>,
}

impl CacheSweeper {
    pub fn new(
        config: CacheSweeperConfig,
        cache: Arc<dyn ArtifactCachePort>,
        queue: Arc<dyn JobQueuePort>,
    ) -> Self {
        Self {
            config,
            cache,
            queue,
        }
    }

    /// 执行一轮清理
    pub async fn sweep(&self) {
        match self.cache.evict_if_needed().await {
            Ok(report) if report.removed() > 0 => {
                tracing::info!(
                    expired = report.expired,
                    lru = report.lru,
                    freed_bytes = report.freed_bytes,
                    "Cache sweep evicted entries"
                );
            }
            Ok(_) => tracing::debug!("Cache sweep found nothing to evict"),
            Err(e) => tracing::error!(error = %e, "Cache sweep failed"),
        }

        let pruned = self.queue.prune_finished(self.config.job_retention);
        if pruned > 0 {
            tracing::debug!(pruned = pruned, "Finished jobs pruned");
        }
    }

    /// 启动周期清理
    pub async fn run(self) {
        tracing::info!(interval_secs = self.config.interval.as_secs(), "CacheSweeper started");

        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // 第一次 tick 立即返回
        ticker.tick().await;

        loop {
            ticker.tick().await;
            self.sweep().await;
        }
    }
}

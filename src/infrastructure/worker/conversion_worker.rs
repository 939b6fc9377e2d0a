//! Conversion Worker - Background Job Processor

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};

use crate::application::pipeline::{ConversionPipeline, JobContext};
use crate::application::ports::{JobError, JobOutcome, JobQueuePort, RunningJob};
use crate::domain::conversion::{JobId, PipelineStage};

/// Worker 配置
#[derive(Debug, Clone)]
pub struct ConversionWorkerConfig {
    /// 最大并发任务数，1 表示单通道
    pub max_concurrent: usize,
    /// 单个任务的超时时间
    pub job_timeout: Duration,
}

impl Default for ConversionWorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 1,
            job_timeout: Duration::from_secs(300),
        }
    }
}

/// 转换 Worker
///
/// 按提交顺序从队列领取任务并驱动流水线执行
pub struct ConversionWorker {
    config: ConversionWorkerConfig,
    queue_receiver: mpsc::UnboundedReceiver<JobId>,
    queue: Arc<dyn JobQueuePort>,
    pipeline: Arc<ConversionPipeline>,
}

impl ConversionWorker {
    pub fn new(
        config: ConversionWorkerConfig,
        queue_receiver: mpsc::UnboundedReceiver<JobId>,
        queue: Arc<dyn JobQueuePort>,
        pipeline: Arc<ConversionPipeline>,
    ) -> Self {
        Self {
            config,
            queue_receiver,
            queue,
            pipeline,
        }
    }

    /// 启动 Worker，通道关闭后返回
    pub async fn run(mut self) {
        tracing::info!(
            max_concurrent = self.config.max_concurrent,
            job_timeout_secs = self.config.job_timeout.as_secs(),
            "ConversionWorker started"
        );

        // 使用 semaphore 控制并发
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent.max(1)));

        while let Some(job_id) = self.queue_receiver.recv().await {
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to acquire semaphore permit");
                    break;
                }
            };

            // 取消的排队任务在这里被跳过
            let Some(job) = self.queue.start(&job_id) else {
                continue;
            };

            let queue = self.queue.clone();
            let pipeline = self.pipeline.clone();
            let timeout = self.config.job_timeout;

            tokio::spawn(async move {
                let _permit = permit; // 持有 permit 直到任务完成
                let outcome = Self::process_job(job, queue.clone(), pipeline, timeout).await;
                queue.finish(&job_id, outcome);
            });
        }

        tracing::info!("ConversionWorker stopped");
    }

    /// 执行单个任务
    async fn process_job(
        job: RunningJob,
        queue: Arc<dyn JobQueuePort>,
        pipeline: Arc<ConversionPipeline>,
        timeout: Duration,
    ) -> JobOutcome {
        let job_id = job.id;
        let listener_queue = queue.clone();
        let ctx = JobContext::new(job_id, job.token, timeout)
            .with_stage_listener(move |stage| listener_queue.set_stage(&job_id, stage));

        tracing::info!(job_id = %job_id, input = %job.request.input.describe(), "Job started");

        // 流水线内部只在阶段边界检查，这里再加一道整体截止时间
        let run_ctx = ctx.clone();
        let request = job.request.clone();
        let handle = tokio::spawn(async move {
            run_ctx.guard(pipeline.run(&request, &run_ctx)).await
        });

        match handle.await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => Err(e),
            Err(e) => {
                let stage = queue
                    .get(&job_id)
                    .and_then(|s| s.stage)
                    .unwrap_or(PipelineStage::Fetch);
                tracing::error!(job_id = %job_id, stage = %stage, error = %e, "Pipeline task aborted");
                Err(JobError::Internal {
                    stage,
                    message: e.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{tempdir, TempDir};

    use crate::application::pipeline::{PipelinePorts, PipelineSettings};
    use crate::application::ports::{ChorusInterval, JobQueuePort, SourceFetchers};
    use crate::domain::conversion::{
        ConversionDefaults, ConversionParams, ConversionRequest, CropMode, JobInput, JobState,
        Platform, SourceDescriptor,
    };
    use crate::domain::mixing::MixConfig;
    use crate::infrastructure::adapters::fake::{
        FakeChorusDetector, FakeSourceFetcher, FakeStemSeparator, FakeVoiceConverter,
    };
    use crate::infrastructure::adapters::SymphoniaCodec;
    use crate::infrastructure::memory::InMemoryJobQueue;
    use crate::infrastructure::persistence::{JsonChorusCache, SledArtifactCache, SledCacheConfig};

    struct Rig {
        _dir: TempDir,
        queue: Arc<InMemoryJobQueue>,
        separator: Arc<FakeStemSeparator>,
    }

    async fn start(capacity: usize, timeout: Duration, separator: FakeStemSeparator, converter: FakeVoiceConverter) -> Rig {
        let dir = tempdir().unwrap();
        let cache = SledArtifactCache::new(&SledCacheConfig {
            artifacts_dir: dir.path().join("artifacts"),
            index_path: dir.path().join("index.sled"),
            max_size_bytes: 512 * 1024 * 1024,
            max_age_secs: 3600,
        })
        .unwrap()
        .arc();
        let chorus_cache = JsonChorusCache::open(dir.path().join("chorus.json"))
            .await
            .unwrap()
            .arc();
        let separator = Arc::new(separator);

        let ports = PipelinePorts {
            cache,
            chorus_cache,
            chorus_detector: Arc::new(FakeChorusDetector::new(ChorusInterval { start: 1.0, end: 3.0 })),
            separator: separator.clone(),
            converter: Arc::new(converter),
            codec: SymphoniaCodec::new().arc(),
            fetchers: SourceFetchers::new().register(FakeSourceFetcher::with_tone(Platform::Netease).arc()),
        };
        let pipeline = Arc::new(ConversionPipeline::new(
            ports,
            PipelineSettings {
                mix: MixConfig::default(),
                fast_seek_window_secs: 2.0,
                preflight: false,
                upstream_queue_limit: 4,
            },
        ));

        let (tx, rx) = mpsc::unbounded_channel();
        let queue = InMemoryJobQueue::new(capacity, tx).arc();
        let worker = ConversionWorker::new(
            ConversionWorkerConfig {
                max_concurrent: 1,
                job_timeout: timeout,
            },
            rx,
            queue.clone(),
            pipeline,
        );
        tokio::spawn(worker.run());

        Rig {
            _dir: dir,
            queue,
            separator,
        }
    }

    fn request(query: &str) -> ConversionRequest {
        ConversionRequest {
            input: JobInput::Source(SourceDescriptor {
                platform: Platform::Netease,
                query: query.to_string(),
                quality: None,
                part: None,
            }),
            params: ConversionParams::default()
                .resolve(&ConversionDefaults::default())
                .unwrap(),
            crop: CropMode::Full,
        }
    }

    #[tokio::test]
    async fn test_job_succeeds_and_frees_slot() {
        let rig = start(1, Duration::from_secs(30), FakeStemSeparator::new(), FakeVoiceConverter::new()).await;

        let handle = rig.queue.submit(request("12345")).unwrap();
        let id = handle.id();
        assert_eq!(handle.wait().await, JobState::Succeeded);

        assert_eq!(rig.queue.status().size, 0);
        let outcome = rig.queue.result(&id).unwrap().unwrap();
        assert!(!outcome.audio.is_empty());
        assert!(rig.queue.submit(request("12345")).is_ok());
    }

    #[tokio::test]
    async fn test_timeout_fails_job_and_frees_slot() {
        let rig = start(
            1,
            Duration::from_millis(200),
            FakeStemSeparator::new().with_delay(Duration::from_secs(30)),
            FakeVoiceConverter::new(),
        )
        .await;

        let handle = rig.queue.submit(request("12345")).unwrap();
        let id = handle.id();
        let state = tokio::time::timeout(Duration::from_secs(5), handle.wait())
            .await
            .unwrap();

        assert_eq!(state, JobState::Failed);
        assert!(matches!(
            rig.queue.get(&id).unwrap().error,
            Some(JobError::Timeout { .. })
        ));
        assert_eq!(rig.queue.status().size, 0);
    }

    #[tokio::test]
    async fn test_cancelled_queued_job_never_runs() {
        let rig = start(
            4,
            Duration::from_secs(30),
            FakeStemSeparator::new().with_delay(Duration::from_millis(300)),
            FakeVoiceConverter::new(),
        )
        .await;

        let first = rig.queue.submit(request("a")).unwrap();
        let second = rig.queue.submit(request("b")).unwrap();
        assert!(rig.queue.cancel(&second.id()));

        assert_eq!(first.wait().await, JobState::Succeeded);
        assert_eq!(second.wait().await, JobState::Cancelled);
        assert_eq!(rig.separator.calls(), 1);
    }

    #[tokio::test]
    async fn test_running_job_cancellation() {
        let rig = start(
            1,
            Duration::from_secs(30),
            FakeStemSeparator::new().with_delay(Duration::from_secs(30)),
            FakeVoiceConverter::new(),
        )
        .await;

        let handle = rig.queue.submit(request("a")).unwrap();
        let id = handle.id();
        while rig.queue.get(&id).map(|s| s.state) != Some(JobState::Running) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(rig.queue.cancel(&id));

        let state = tokio::time::timeout(Duration::from_secs(5), handle.wait())
            .await
            .unwrap();
        assert_eq!(state, JobState::Cancelled);
        assert_eq!(rig.queue.status().size, 0);
    }
}

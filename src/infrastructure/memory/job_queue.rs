//! In-Memory Job Queue Implementation

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::application::ports::{
    JobError, JobHandle, JobOutcome, JobQueuePort, JobSnapshot, QueueError, QueueStatus,
    RunningJob,
};
use crate::domain::conversion::{ConversionRequest, JobId, JobState, PipelineStage};

struct JobRecord {
    request: Arc<ConversionRequest>,
    input: String,
    state: JobState,
    stage: Option<PipelineStage>,
    token: CancellationToken,
    submitted_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    outcome: Option<JobOutcome>,
    notifier: watch::Sender<JobState>,
}

impl JobRecord {
    fn snapshot(&self, id: JobId) -> JobSnapshot {
        let output = self.outcome.as_ref().and_then(|o| o.as_ref().ok());
        JobSnapshot {
            id,
            state: self.state,
            stage: self.stage,
            input: self.input.clone(),
            submitted_at: self.submitted_at,
            started_at: self.started_at,
            finished_at: self.finished_at,
            error: self
                .outcome
                .as_ref()
                .and_then(|o| o.as_ref().err())
                .cloned(),
            cache_key: output.map(|o| o.cache_key.clone()),
            cache_hit: output.map(|o| o.cache_hit),
            title: output.and_then(|o| o.title.clone()),
        }
    }

    /// 迁移到终态，返回是否真正发生了迁移
    fn close(&mut self, outcome: JobOutcome) -> bool {
        let next = match &outcome {
            Ok(_) => JobState::Succeeded,
            Err(e) => e.terminal_state(),
        };
        if !self.state.can_transition_to(next) {
            return false;
        }
        self.state = next;
        self.stage = None;
        self.finished_at = Some(Utc::now());
        self.outcome = Some(outcome);
        self.notifier.send_replace(next);
        true
    }
}

/// 内存任务队列
///
/// 任务 ID 按提交顺序写入通道，由 worker 依次消费
pub struct InMemoryJobQueue {
    jobs: DashMap<JobId, JobRecord>,
    /// queued + running
    active: AtomicUsize,
    capacity: usize,
    queue_sender: mpsc::UnboundedSender<JobId>,
}

impl InMemoryJobQueue {
    pub fn new(capacity: usize, queue_sender: mpsc::UnboundedSender<JobId>) -> Self {
        Self {
            jobs: DashMap::new(),
            active: AtomicUsize::new(0),
            capacity,
            queue_sender,
        }
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    fn try_admit(&self) -> bool {
        self.active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.capacity).then_some(n + 1)
            })
            .is_ok()
    }

    fn release_slot(&self) {
        let _ = self
            .active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| Some(n.saturating_sub(1)));
    }
}

impl JobQueuePort for InMemoryJobQueue {
    fn submit(&self, request: ConversionRequest) -> Result<JobHandle, QueueError> {
        if !self.try_admit() {
            tracing::warn!(capacity = self.capacity, "Queue full, submission rejected");
            return Err(QueueError::CapacityExceeded {
                capacity: self.capacity,
            });
        }

        let id = JobId::new();
        let (notifier, receiver) = watch::channel(JobState::Queued);
        let input = request.input.describe();

        self.jobs.insert(
            id,
            JobRecord {
                request: Arc::new(request),
                input: input.clone(),
                state: JobState::Queued,
                stage: None,
                token: CancellationToken::new(),
                submitted_at: Utc::now(),
                started_at: None,
                finished_at: None,
                outcome: None,
                notifier,
            },
        );

        if let Err(e) = self.queue_sender.send(id) {
            tracing::error!(job_id = %id, error = %e, "Failed to enqueue job");
            self.jobs.remove(&id);
            self.release_slot();
            return Err(QueueError::Closed);
        }

        tracing::info!(job_id = %id, input = %input, "Job submitted");
        Ok(JobHandle::new(id, receiver))
    }

    fn cancel(&self, id: &JobId) -> bool {
        let Some(mut job) = self.jobs.get_mut(id) else {
            return false;
        };

        let state = job.state;
        match state {
            JobState::Queued => {
                job.token.cancel();
                if job.close(Err(JobError::Cancelled)) {
                    drop(job);
                    self.release_slot();
                }
                tracing::info!(job_id = %id, "Queued job cancelled");
                true
            }
            JobState::Running => {
                job.token.cancel();
                tracing::info!(job_id = %id, stage = ?job.stage, "Running job flagged for cancellation");
                true
            }
            _ => false,
        }
    }

    fn status(&self) -> QueueStatus {
        let (queued, running) = self.jobs.iter().fold((0, 0), |(q, r), job| match job.state {
            JobState::Queued => (q + 1, r),
            JobState::Running => (q, r + 1),
            _ => (q, r),
        });
        QueueStatus {
            size: queued + running,
            capacity: self.capacity,
            queued,
            running,
        }
    }

    fn get(&self, id: &JobId) -> Option<JobSnapshot> {
        self.jobs.get(id).map(|job| job.snapshot(*id))
    }

    fn result(&self, id: &JobId) -> Option<JobOutcome> {
        self.jobs.get(id).and_then(|job| job.outcome.clone())
    }

    fn start(&self, id: &JobId) -> Option<RunningJob> {
        let mut job = self.jobs.get_mut(id)?;
        if !job.state.can_transition_to(JobState::Running) {
            tracing::debug!(job_id = %id, state = ?job.state, "Job not startable, skipping");
            return None;
        }

        job.state = JobState::Running;
        job.started_at = Some(Utc::now());
        job.notifier.send_replace(JobState::Running);

        Some(RunningJob {
            id: *id,
            request: job.request.clone(),
            token: job.token.clone(),
        })
    }

    fn set_stage(&self, id: &JobId, stage: PipelineStage) {
        if let Some(mut job) = self.jobs.get_mut(id) {
            if job.state == JobState::Running {
                job.stage = Some(stage);
            }
        }
    }

    fn finish(&self, id: &JobId, outcome: JobOutcome) {
        let Some(mut job) = self.jobs.get_mut(id) else {
            tracing::warn!(job_id = %id, "Finishing unknown job");
            return;
        };

        let summary = match &outcome {
            Ok(output) => format!("succeeded (cache_hit={})", output.cache_hit),
            Err(e) => e.to_string(),
        };

        if job.close(outcome) {
            let state = job.state;
            drop(job);
            self.release_slot();
            tracing::info!(job_id = %id, state = state.as_str(), result = %summary, "Job finished");
        } else {
            tracing::warn!(job_id = %id, state = ?job.state, "Ignoring finish for job not running");
        }
    }

    fn prune_finished(&self, retention: Duration) -> usize {
        let retention = chrono::Duration::from_std(retention).unwrap_or_else(|_| chrono::Duration::days(36500));
        let cutoff = Utc::now() - retention;
        let before = self.jobs.len();
        self.jobs.retain(|_, job| match job.finished_at {
            Some(finished) if job.state.is_terminal() => finished > cutoff,
            _ => true,
        });
        let pruned = before.saturating_sub(self.jobs.len());
        if pruned > 0 {
            tracing::debug!(pruned = pruned, "Finished jobs pruned");
        }
        pruned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::JobOutput;
    use crate::domain::conversion::{
        ConversionDefaults, ConversionParams, CropMode, JobInput, Platform, SourceDescriptor,
    };

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

    fn output() -> JobOutput {
        JobOutput {
            audio: Arc::new(vec![1, 2, 3]),
            cache_key: "0".repeat(32),
            cache_hit: false,
            title: None,
        }
    }

    #[tokio::test]
    async fn test_capacity_rejects_then_readmits() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let queue = InMemoryJobQueue::new(2, tx);

        let first = queue.submit(request("a")).unwrap();
        let _second = queue.submit(request("b")).unwrap();
        assert!(matches!(
            queue.submit(request("c")),
            Err(QueueError::CapacityExceeded { capacity: 2 })
        ));
        assert_eq!(queue.status().size, 2);

        let id = rx.recv().await.unwrap();
        assert_eq!(id, first.id());
        let running = queue.start(&id).unwrap();
        assert_eq!(queue.status().running, 1);
        queue.finish(&running.id, Ok(output()));

        assert_eq!(first.wait().await, JobState::Succeeded);
        assert_eq!(queue.status().size, 1);
        assert!(queue.submit(request("c")).is_ok());
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let queue = InMemoryJobQueue::new(8, tx);

        let ids: Vec<JobId> = (0..5)
            .map(|i| queue.submit(request(&format!("song {}", i))).unwrap().id())
            .collect();
        for expected in ids {
            assert_eq!(rx.recv().await.unwrap(), expected);
        }
    }

    #[tokio::test]
    async fn test_cancel_queued_frees_slot_and_skips_start() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let queue = InMemoryJobQueue::new(1, tx);

        let handle = queue.submit(request("a")).unwrap();
        assert!(queue.cancel(&handle.id()));
        assert_eq!(handle.state(), JobState::Cancelled);
        assert_eq!(queue.status().size, 0);
        assert!(queue.start(&handle.id()).is_none());
        assert!(matches!(queue.result(&handle.id()), Some(Err(JobError::Cancelled))));

        // 终态不可再取消
        assert!(!queue.cancel(&handle.id()));
        assert!(queue.submit(request("b")).is_ok());
    }

    #[tokio::test]
    async fn test_cancel_running_fires_token() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let queue = InMemoryJobQueue::new(1, tx);

        let handle = queue.submit(request("a")).unwrap();
        let running = queue.start(&handle.id()).unwrap();
        assert!(queue.cancel(&handle.id()));
        assert!(running.token.is_cancelled());
        // 名额在 worker 收尾时释放
        assert_eq!(queue.status().size, 1);

        queue.finish(&running.id, Err(JobError::Cancelled));
        assert_eq!(queue.get(&handle.id()).unwrap().state, JobState::Cancelled);
        assert_eq!(queue.status().size, 0);
    }

    #[tokio::test]
    async fn test_terminal_state_is_immutable_and_slot_released_once() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let queue = InMemoryJobQueue::new(2, tx);

        let a = queue.submit(request("a")).unwrap();
        let _b = queue.submit(request("b")).unwrap();
        queue.start(&a.id()).unwrap();
        queue.finish(&a.id(), Err(JobError::Timeout { secs: 5 }));
        queue.finish(&a.id(), Ok(output()));

        let snapshot = queue.get(&a.id()).unwrap();
        assert_eq!(snapshot.state, JobState::Failed);
        assert_eq!(snapshot.error, Some(JobError::Timeout { secs: 5 }));
        assert_eq!(queue.status().size, 1);
    }

    #[tokio::test]
    async fn test_set_stage_and_snapshot() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let queue = InMemoryJobQueue::new(1, tx);

        let handle = queue.submit(request("起风了")).unwrap();
        queue.set_stage(&handle.id(), PipelineStage::Fetch);
        assert_eq!(queue.get(&handle.id()).unwrap().stage, None);

        queue.start(&handle.id()).unwrap();
        queue.set_stage(&handle.id(), PipelineStage::Separation);
        let snapshot = queue.get(&handle.id()).unwrap();
        assert_eq!(snapshot.stage, Some(PipelineStage::Separation));
        assert_eq!(snapshot.input, "netease:起风了");

        queue.finish(&handle.id(), Ok(output()));
        let snapshot = queue.get(&handle.id()).unwrap();
        assert_eq!(snapshot.stage, None);
        assert_eq!(snapshot.cache_hit, Some(false));
    }

    #[tokio::test]
    async fn test_prune_finished() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let queue = InMemoryJobQueue::new(4, tx);

        let done = queue.submit(request("a")).unwrap();
        let pending = queue.submit(request("b")).unwrap();
        queue.cancel(&done.id());

        assert_eq!(queue.prune_finished(Duration::from_secs(3600)), 0);
        assert_eq!(queue.prune_finished(Duration::ZERO), 1);
        assert!(queue.get(&done.id()).is_none());
        assert!(queue.get(&pending.id()).is_some());
    }

    #[tokio::test]
    async fn test_closed_channel_releases_slot() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let queue = InMemoryJobQueue::new(1, tx);

        assert!(matches!(queue.submit(request("a")), Err(QueueError::Closed)));
        assert_eq!(queue.status().size, 0);
    }
}

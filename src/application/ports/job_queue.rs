//! Job Queue Port - 转换任务队列
//!
//! 有界准入的 FIFO 队列，具体实现在 infrastructure/memory 层

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::domain::conversion::{ConversionRequest, JobId, JobState, PipelineStage};

/// Job Queue 错误
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue is full (capacity {capacity})")]
    CapacityExceeded { capacity: usize },

    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error("Queue is closed")]
    Closed,
}

/// 任务失败原因（任务的终态结果之一）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobError {
    Timeout { secs: u64 },
    Cancelled,
    Upstream { stage: PipelineStage, message: String },
    InvalidParameters { message: String },
    Internal { stage: PipelineStage, message: String },
}

impl JobError {
    pub fn stage(&self) -> Option<PipelineStage> {
        match self {
            JobError::Upstream { stage, .. } | JobError::Internal { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// 对应的终态
    pub fn terminal_state(&self) -> JobState {
        match self {
            JobError::Cancelled => JobState::Cancelled,
            _ => JobState::Failed,
        }
    }
}

impl std::fmt::Display for JobError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobError::Timeout { secs } => write!(f, "job timed out after {}s", secs),
            JobError::Cancelled => f.write_str("job cancelled"),
            JobError::Upstream { stage, message } => write!(f, "{} failed: {}", stage, message),
            JobError::InvalidParameters { message } => write!(f, "invalid parameters: {}", message),
            JobError::Internal { stage, message } => write!(f, "internal error at {}: {}", stage, message),
        }
    }
}

/// 成功产物
#[derive(Debug, Clone)]
pub struct JobOutput {
    /// WAV 字节
    pub audio: Arc<Vec<u8>>,
    pub cache_key: String,
    pub cache_hit: bool,
    pub title: Option<String>,
}

pub type JobOutcome = Result<JobOutput, JobError>;

/// 任务快照（对外展示）
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub id: JobId,
    pub state: JobState,
    /// 运行中的当前阶段
    pub stage: Option<PipelineStage>,
    pub input: String,
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<JobError>,
    pub cache_key: Option<String>,
    pub cache_hit: Option<bool>,
    pub title: Option<String>,
}

/// 队列状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    /// queued + running
    pub size: usize,
    pub capacity: usize,
    pub queued: usize,
    pub running: usize,
}

/// 提交成功后返回的句柄
#[derive(Debug, Clone)]
pub struct JobHandle {
    id: JobId,
    state: watch::Receiver<JobState>,
}

impl JobHandle {
    pub fn new(id: JobId, state: watch::Receiver<JobState>) -> Self {
        Self { id, state }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn state(&self) -> JobState {
        *self.state.borrow()
    }

    /// 等待任务进入终态
    pub async fn wait(mut self) -> JobState {
        loop {
            let current = *self.state.borrow_and_update();
            if current.is_terminal() {
                return current;
            }
            if self.state.changed().await.is_err() {
                return *self.state.borrow();
            }
        }
    }
}

/// worker 领取到的任务
#[derive(Debug, Clone)]
pub struct RunningJob {
    pub id: JobId,
    pub request: Arc<ConversionRequest>,
    pub token: CancellationToken,
}

/// Job Queue Port
///
/// - 提交时 queued + running >= capacity 立即拒绝
/// - 排队中的任务被取消时立即释放名额
/// - 进入终态时释放名额且只释放一次
pub trait JobQueuePort: Send + Sync {
    fn submit(&self, request: ConversionRequest) -> Result<JobHandle, QueueError>;

    /// 取消任务；未知任务或已处于终态时返回 false
    fn cancel(&self, id: &JobId) -> bool;

    fn status(&self) -> QueueStatus;

    fn get(&self, id: &JobId) -> Option<JobSnapshot>;

    /// 终态任务的结果，未结束或不存在时为 None
    fn result(&self, id: &JobId) -> Option<JobOutcome>;

    /// `queued → running`；任务已被取消或不存在时返回 None
    fn start(&self, id: &JobId) -> Option<RunningJob>;

    fn set_stage(&self, id: &JobId, stage: PipelineStage);

    /// `running → 终态`
    fn finish(&self, id: &JobId, outcome: JobOutcome);

    /// 清理结束超过 `retention` 的任务，返回清理数量
    fn prune_finished(&self, retention: Duration) -> usize;
}

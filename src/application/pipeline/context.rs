//! Job Context - 单个任务的取消/超时守卫

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::application::ports::JobError;
use crate::domain::conversion::{JobId, PipelineStage};

type StageListener = Arc<dyn Fn(PipelineStage) + Send + Sync>;

/// 任务运行上下文
///
/// 在每个阶段边界检查取消与超时；等待外部调用时与取消/截止时间竞争，
/// 先到者胜出，被放弃的调用结果直接丢弃
#[derive(Clone)]
pub struct JobContext {
    job_id: JobId,
    token: CancellationToken,
    deadline: Instant,
    timeout_secs: u64,
    on_stage: Option<StageListener>,
}

impl JobContext {
    pub fn new(job_id: JobId, token: CancellationToken, timeout: Duration) -> Self {
        Self {
            job_id,
            token,
            deadline: Instant::now() + timeout,
            timeout_secs: timeout.as_secs(),
            on_stage: None,
        }
    }

    /// 阶段切换回调（用于更新任务快照）
    pub fn with_stage_listener(
        mut self,
        listener: impl Fn(PipelineStage) + Send + Sync + 'static,
    ) -> Self {
        self.on_stage = Some(Arc::new(listener));
        self
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn timeout_error(&self) -> JobError {
        JobError::Timeout {
            secs: self.timeout_secs,
        }
    }

    /// 阶段边界检查
    pub fn checkpoint(&self) -> Result<(), JobError> {
        if self.token.is_cancelled() {
            return Err(JobError::Cancelled);
        }
        if Instant::now() >= self.deadline {
            return Err(self.timeout_error());
        }
        Ok(())
    }

    /// 进入新阶段：先检查，再通知监听者
    pub fn enter(&self, stage: PipelineStage) -> Result<(), JobError> {
        self.checkpoint()?;
        tracing::debug!(job_id = %self.job_id, stage = %stage, "Entering stage");
        if let Some(listener) = &self.on_stage {
            listener(stage);
        }
        Ok(())
    }

    /// 等待 future，同时响应取消与超时
    pub async fn guard<F>(&self, fut: F) -> Result<F::Output, JobError>
    where
        F: Future,
    {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(JobError::Cancelled),
            _ = tokio::time::sleep_until(self.deadline) => Err(self.timeout_error()),
            out = fut => Ok(out),
        }
    }
}

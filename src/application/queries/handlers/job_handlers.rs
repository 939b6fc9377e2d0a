//! Job Query Handlers

use std::sync::Arc;

use crate::application::error::ApplicationError;
use crate::application::ports::{JobQueuePort, JobSnapshot};
use crate::application::queries::job_queries::*;

/// 任务状态 Handler
pub struct GetJobStatusHandler {
    queue: Arc<dyn JobQueuePort>,
}

impl GetJobStatusHandler {
    pub fn new(queue: Arc<dyn JobQueuePort>) -> Self {
        Self { queue }
    }

    pub async fn handle(&self, query: GetJobStatus) -> Result<JobSnapshot, ApplicationError> {
        self.queue
            .get(&query.job_id)
            .ok_or_else(|| ApplicationError::not_found("Job", query.job_id))
    }
}

/// 任务产物 Handler
///
/// 失败的任务返回其终态错误；未结束的任务返回参数错误
pub struct GetJobResultHandler {
    queue: Arc<dyn JobQueuePort>,
}

impl GetJobResultHandler {
    pub fn new(queue: Arc<dyn JobQueuePort>) -> Self {
        Self { queue }
    }

    pub async fn handle(&self, query: GetJobResult) -> Result<JobResultResponse, ApplicationError> {
        let snapshot = self
            .queue
            .get(&query.job_id)
            .ok_or_else(|| ApplicationError::not_found("Job", query.job_id))?;

        let outcome = self.queue.result(&query.job_id).ok_or_else(|| {
            ApplicationError::invalid(format!("job is still {}", snapshot.state.as_str()))
        })?;

        let output = outcome?;
        Ok(JobResultResponse {
            job_id: query.job_id,
            audio: output.audio,
            content_type: "audio/wav",
            cache_key: output.cache_key,
            cache_hit: output.cache_hit,
            title: output.title,
        })
    }
}

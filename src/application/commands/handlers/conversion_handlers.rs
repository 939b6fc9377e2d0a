//! Conversion Command Handlers

use std::sync::Arc;

use crate::application::commands::conversion_commands::*;
use crate::application::defaults::DefaultsStore;
use crate::application::error::ApplicationError;
use crate::application::ports::JobQueuePort;
use crate::domain::conversion::{ConversionRequest, CropMode, JobInput, JobState};

/// 平台音源提交 Handler
///
/// 参数在提交时按当前默认快照解析，非法参数与队列已满都同步返回
pub struct SubmitConversionHandler {
    queue: Arc<dyn JobQueuePort>,
    defaults: Arc<DefaultsStore>,
}

impl SubmitConversionHandler {
    pub fn new(queue: Arc<dyn JobQueuePort>, defaults: Arc<DefaultsStore>) -> Self {
        Self { queue, defaults }
    }

    pub async fn handle(&self, cmd: SubmitConversion) -> Result<SubmitResponse, ApplicationError> {
        // 提前校验标识，避免非法请求占用队列名额
        cmd.source.normalize()?;

        let request = ConversionRequest {
            params: cmd.params.resolve(&self.defaults.snapshot())?,
            crop: CropMode::from_flags(cmd.chorus, cmd.fast_seek)?,
            input: JobInput::Source(cmd.source),
        };

        submit(self.queue.as_ref(), request)
    }
}

/// 上传音频提交 Handler
pub struct SubmitUploadHandler {
    queue: Arc<dyn JobQueuePort>,
    defaults: Arc<DefaultsStore>,
}

impl SubmitUploadHandler {
    pub fn new(queue: Arc<dyn JobQueuePort>, defaults: Arc<DefaultsStore>) -> Self {
        Self { queue, defaults }
    }

    pub async fn handle(&self, cmd: SubmitUpload) -> Result<SubmitResponse, ApplicationError> {
        if cmd.data.is_empty() {
            return Err(ApplicationError::invalid("uploaded file is empty"));
        }

        let filename = match cmd.filename.trim() {
            "" => "upload.wav".to_string(),
            name => name.to_string(),
        };

        let request = ConversionRequest {
            params: cmd.params.resolve(&self.defaults.snapshot())?,
            crop: CropMode::from_flags(cmd.chorus, cmd.fast_seek)?,
            input: JobInput::Upload {
                data: Arc::new(cmd.data),
                filename,
            },
        };

        submit(self.queue.as_ref(), request)
    }
}

fn submit(
    queue: &dyn JobQueuePort,
    request: ConversionRequest,
) -> Result<SubmitResponse, ApplicationError> {
    let speaker = request.params.speaker.clone();
    let handle = queue.submit(request)?;

    tracing::info!(job_id = %handle.id(), speaker = %speaker, "Conversion submitted");

    Ok(SubmitResponse {
        job_id: handle.id(),
        state: handle.state(),
        queue: queue.status(),
    })
}

/// 取消 Handler
pub struct CancelJobHandler {
    queue: Arc<dyn JobQueuePort>,
}

impl CancelJobHandler {
    pub fn new(queue: Arc<dyn JobQueuePort>) -> Self {
        Self { queue }
    }

    pub async fn handle(&self, cmd: CancelJob) -> Result<CancelJobResponse, ApplicationError> {
        let cancelled = self.queue.cancel(&cmd.job_id);
        let snapshot = self
            .queue
            .get(&cmd.job_id)
            .ok_or_else(|| ApplicationError::not_found("Job", cmd.job_id))?;

        // 运行中的任务只是打上取消标记，状态在下一个阶段边界改变
        let state = match (cancelled, snapshot.state) {
            (true, JobState::Running) => JobState::Running,
            (_, state) => state,
        };

        Ok(CancelJobResponse {
            job_id: cmd.job_id,
            cancelled,
            state,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    use crate::domain::conversion::{
        ConversionDefaults, ConversionParams, JobId, Platform, SourceDescriptor,
    };
    use crate::infrastructure::memory::InMemoryJobQueue;

    fn setup(capacity: usize) -> (Arc<InMemoryJobQueue>, SubmitConversionHandler, mpsc::UnboundedReceiver<JobId>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let queue = InMemoryJobQueue::new(capacity, tx).arc();
        let defaults = Arc::new(DefaultsStore::new(ConversionDefaults::default()));
        (queue.clone(), SubmitConversionHandler::new(queue, defaults), rx)
    }

    fn command(query: &str) -> SubmitConversion {
        SubmitConversion {
            source: SourceDescriptor {
                platform: Platform::Netease,
                query: query.to_string(),
                quality: None,
                part: None,
            },
            params: ConversionParams::default(),
            chorus: true,
            fast_seek: None,
        }
    }

    #[tokio::test]
    async fn test_submit_and_capacity_rejection_leaves_queue_unchanged() {
        let (queue, handler, _rx) = setup(1);

        let response = handler.handle(command("起风了")).await.unwrap();
        assert_eq!(response.state, JobState::Queued);
        assert_eq!(response.queue.size, 1);

        let err = handler.handle(command("起风了")).await.unwrap_err();
        assert!(matches!(err, ApplicationError::CapacityExceeded { capacity: 1 }));
        assert_eq!(queue.status().size, 1);
    }

    #[tokio::test]
    async fn test_conflicting_crop_modes_rejected_synchronously() {
        let (queue, handler, _rx) = setup(4);
        let mut cmd = command("12345");
        cmd.fast_seek = Some(10.0);

        let err = handler.handle(cmd).await.unwrap_err();
        assert!(matches!(err, ApplicationError::InvalidParameters(_)));
        assert_eq!(queue.status().size, 0);
    }

    #[tokio::test]
    async fn test_invalid_pitch_and_source_rejected() {
        let (_queue, handler, _rx) = setup(4);

        let mut cmd = command("12345");
        cmd.params.pitch = Some(40);
        assert!(matches!(
            handler.handle(cmd).await,
            Err(ApplicationError::InvalidParameters(_))
        ));

        let mut cmd = command("not a video");
        cmd.source.platform = Platform::Bilibili;
        assert!(matches!(
            handler.handle(cmd).await,
            Err(ApplicationError::InvalidParameters(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_upload_rejected() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let queue = InMemoryJobQueue::new(4, tx).arc();
        let handler = SubmitUploadHandler::new(
            queue,
            Arc::new(DefaultsStore::new(ConversionDefaults::default())),
        );
        let result = handler
            .handle(SubmitUpload {
                data: Vec::new(),
                filename: "a.wav".to_string(),
                params: ConversionParams::default(),
                chorus: false,
                fast_seek: None,
            })
            .await;
        assert!(matches!(result, Err(ApplicationError::InvalidParameters(_))));
    }

    #[tokio::test]
    async fn test_cancel_unknown_and_queued_job() {
        let (queue, handler, _rx) = setup(4);
        let cancel = CancelJobHandler::new(queue.clone());

        let missing = cancel.handle(CancelJob { job_id: JobId::new() }).await;
        assert!(matches!(missing, Err(ApplicationError::NotFound { .. })));

        let submitted = handler.handle(command("12345")).await.unwrap();
        let response = cancel
            .handle(CancelJob {
                job_id: submitted.job_id,
            })
            .await
            .unwrap();
        assert!(response.cancelled);
        assert_eq!(response.state, JobState::Cancelled);
        assert_eq!(queue.status().size, 0);
    }
}

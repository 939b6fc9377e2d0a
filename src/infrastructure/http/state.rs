//! Application State
//!
//! 包含所有 Command/Query Handlers 的应用状态

use std::sync::Arc;

use crate::application::ports::{
    ArtifactCachePort, ChorusCachePort, JobQueuePort, SourceFetchers, StemSeparatorPort,
    VoiceConverterPort,
};
use crate::application::{
    // Command handlers
    CancelJobHandler, ClearCacheHandler, SetDefaultSpeakerHandler, SubmitConversionHandler,
    SubmitUploadHandler,
    // Query handlers
    GetJobResultHandler, GetJobStatusHandler, GetSystemStatusHandler, GetVideoInfoHandler,
    ListPresetsHandler, ListSpeakersHandler,
    DefaultsStore,
};

/// Handler 依赖的端口集合
#[derive(Clone)]
pub struct StatePorts {
    pub queue: Arc<dyn JobQueuePort>,
    pub cache: Arc<dyn ArtifactCachePort>,
    pub chorus_cache: Arc<dyn ChorusCachePort>,
    pub converter: Arc<dyn VoiceConverterPort>,
    pub separator: Arc<dyn StemSeparatorPort>,
    pub fetchers: SourceFetchers,
    pub defaults: Arc<DefaultsStore>,
}

/// 应用状态
pub struct AppState {
    // ========== Command Handlers ==========
    pub submit_conversion_handler: SubmitConversionHandler,
    pub submit_upload_handler: SubmitUploadHandler,
    pub cancel_job_handler: CancelJobHandler,
    pub clear_cache_handler: ClearCacheHandler,
    pub set_default_speaker_handler: SetDefaultSpeakerHandler,

    // ========== Query Handlers ==========
    pub get_job_status_handler: GetJobStatusHandler,
    pub get_job_result_handler: GetJobResultHandler,
    pub get_system_status_handler: GetSystemStatusHandler,
    pub list_presets_handler: ListPresetsHandler,
    pub list_speakers_handler: ListSpeakersHandler,
    pub get_video_info_handler: GetVideoInfoHandler,
}

impl AppState {
    pub fn new(ports: StatePorts) -> Self {
        let StatePorts {
            queue,
            cache,
            chorus_cache,
            converter,
            separator,
            fetchers,
            defaults,
        } = ports;

        Self {
            // Command handlers
            submit_conversion_handler: SubmitConversionHandler::new(
                queue.clone(),
                defaults.clone(),
            ),
            submit_upload_handler: SubmitUploadHandler::new(queue.clone(), defaults.clone()),
            cancel_job_handler: CancelJobHandler::new(queue.clone()),
            clear_cache_handler: ClearCacheHandler::new(cache.clone()),
            set_default_speaker_handler: SetDefaultSpeakerHandler::new(
                converter.clone(),
                defaults.clone(),
            ),

            // Query handlers
            get_job_status_handler: GetJobStatusHandler::new(queue.clone()),
            get_job_result_handler: GetJobResultHandler::new(queue.clone()),
            get_system_status_handler: GetSystemStatusHandler::new(
                queue,
                cache,
                chorus_cache,
                converter.clone(),
                separator.clone(),
                defaults.clone(),
            ),
            list_presets_handler: ListPresetsHandler::new(separator, defaults.clone()),
            list_speakers_handler: ListSpeakersHandler::new(converter, defaults),
            get_video_info_handler: GetVideoInfoHandler::new(fetchers),
        }
    }
}

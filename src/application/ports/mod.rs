//! Application Ports - 出站端口定义
//!
//! 定义应用层与基础设施层的抽象接口

mod artifact_cache;
mod audio_codec;
mod chorus_cache;
mod chorus_detector;
mod job_queue;
mod source_fetcher;
mod stem_separator;
mod upstream;
mod voice_converter;

pub use artifact_cache::{
    generate_cache_key, ArtifactCachePort, CacheEntry, CacheError, CacheKey, CacheStats,
    CachedArtifact, EvictionReport,
};
pub use audio_codec::{AudioCodecPort, CodecError};
pub use chorus_cache::{ChorusCacheError, ChorusCachePort, ChorusEntry, ChorusInterval};
pub use chorus_detector::{ChorusDetectorPort, DetectRequest};
pub use job_queue::{
    JobError, JobHandle, JobOutcome, JobOutput, JobQueuePort, JobSnapshot, QueueError,
    QueueStatus, RunningJob,
};
pub use source_fetcher::{
    FetchError, FetchRequest, FetchedSource, SourceFetcherPort, SourceFetchers, VideoInfo, VideoPart,
};
pub use stem_separator::{SeparatedStems, SeparationRequest, StemSeparatorPort};
pub use upstream::{ServiceHealth, UpstreamError};
pub use voice_converter::{ConvertRequest, ConvertResponse, VoiceConverterPort};

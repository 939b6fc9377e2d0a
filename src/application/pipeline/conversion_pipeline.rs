//! Conversion Pipeline - 转换流水线
//!
//! 获取 → 缓存查找 → (高潮截取|快速定位|跳过) → 人声分离 → 歌声转换 → (混音|跳过) → 缓存写入

use std::sync::Arc;

use crate::application::ports::{
    generate_cache_key, ArtifactCachePort, AudioCodecPort, CacheError, CacheKey, ChorusCachePort,
    ChorusDetectorPort, ChorusInterval, CodecError, ConvertRequest, DetectRequest, FetchError,
    FetchRequest, JobError, JobOutput, SeparationRequest, SourceFetchers, StemSeparatorPort,
    UpstreamError, VoiceConverterPort,
};
use crate::domain::audio::AudioBuffer;
use crate::domain::conversion::{
    chorus_key_for_source, chorus_key_for_upload, content_hash, source_id_with_part,
    ConversionRequest, CropMode, JobInput, ParamError, PipelineStage,
};
use crate::domain::mixing::{mix, MixConfig};

use super::context::JobContext;

/// 流水线设置（来自配置快照）
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub mix: MixConfig,
    pub fast_seek_window_secs: f64,
    /// 转换前检查转换服务健康状态
    pub preflight: bool,
    /// 预检时允许的转换服务队列上限
    pub upstream_queue_limit: usize,
}

/// 流水线依赖的端口
#[derive(Clone)]
pub struct PipelinePorts {
    pub cache: Arc<dyn ArtifactCachePort>,
    pub chorus_cache: Arc<dyn ChorusCachePort>,
    pub chorus_detector: Arc<dyn ChorusDetectorPort>,
    pub separator: Arc<dyn StemSeparatorPort>,
    pub converter: Arc<dyn VoiceConverterPort>,
    pub codec: Arc<dyn AudioCodecPort>,
    pub fetchers: SourceFetchers,
}

/// 获取阶段的产物
struct AcquiredInput {
    bytes: Arc<Vec<u8>>,
    filename: String,
    /// 解码格式提示
    ext: Option<String>,
    title: Option<String>,
    /// 平台音源的规范 ID
    source_id: Option<String>,
    /// 已知的高潮缓存 key（平台音源）
    chorus_key: Option<String>,
}

pub struct ConversionPipeline {
    ports: PipelinePorts,
    settings: Arc<PipelineSettings>,
}

impl ConversionPipeline {
    pub fn new(ports: PipelinePorts, settings: PipelineSettings) -> Self {
        Self {
            ports,
            settings: Arc::new(settings),
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// 计算请求对应的缓存 key
    pub fn cache_key_for(
        &self,
        request: &ConversionRequest,
        content_hash: &str,
    ) -> Result<CacheKey, CacheError> {
        generate_cache_key(
            content_hash,
            &request.params,
            &request.crop,
            self.settings.fast_seek_window_secs,
            Some(&self.settings.mix),
        )
    }

    /// 执行一次完整转换
    ///
    /// 成功时产物总会尝试写入缓存；缓存写入失败只记录日志
    pub async fn run(
        &self,
        request: &ConversionRequest,
        ctx: &JobContext,
    ) -> Result<JobOutput, JobError> {
        let job_id = ctx.job_id();

        // 1. 获取输入
        ctx.enter(PipelineStage::Fetch)?;
        let input = self.acquire(&request.input, ctx).await?;
        let hash = content_hash(&input.bytes);

        // 2. 缓存查找
        ctx.enter(PipelineStage::CacheLookup)?;
        let key = self.cache_key_for(request, &hash).map_err(|e| JobError::Internal {
            stage: PipelineStage::CacheLookup,
            message: e.to_string(),
        })?;

        match self.ports.cache.lookup(&key).await {
            Ok(Some(hit)) => {
                tracing::info!(job_id = %job_id, cache_key = %key, "Cache hit");
                return Ok(JobOutput {
                    audio: Arc::new(hit.data),
                    cache_key: key.to_string(),
                    cache_hit: true,
                    title: input.title,
                });
            }
            Ok(None) => {
                tracing::debug!(job_id = %job_id, cache_key = %key, "Cache miss");
            }
            Err(e) => {
                tracing::warn!(job_id = %job_id, cache_key = %key, error = %e, "Cache lookup failed, treating as miss");
            }
        }

        // 3. 截取
        let (audio, audio_name) = match &request.crop {
            CropMode::Full => (input.bytes.clone(), input.filename.clone()),
            CropMode::Chorus => {
                ctx.enter(PipelineStage::ChorusDetection)?;
                let buffer = self.decode(&input).await?;
                let interval = self
                    .chorus_interval(&input, &hash, buffer.duration_secs(), ctx)
                    .await?;
                ctx.enter(PipelineStage::Crop)?;
                let cropped = self.crop(buffer, interval.start, interval.end).await?;
                (cropped, wav_name(&input.filename))
            }
            CropMode::FastSeek { start_secs } => {
                ctx.enter(PipelineStage::Crop)?;
                let buffer = self.decode(&input).await?;
                let end = start_secs + self.settings.fast_seek_window_secs;
                let cropped = self.crop(buffer, *start_secs, end).await?;
                (cropped, wav_name(&input.filename))
            }
        };

        // 4. 人声分离
        ctx.enter(PipelineStage::Separation)?;
        let stems = ctx
            .guard(self.ports.separator.separate(SeparationRequest {
                audio: audio.as_ref().clone(),
                filename: audio_name,
                preset: request.params.preset.clone(),
            }))
            .await?
            .map_err(|e| upstream(PipelineStage::Separation, e))?;
        tracing::info!(
            job_id = %job_id,
            vocals_bytes = stems.vocals.len(),
            has_instrumental = stems.instrumental.is_some(),
            "Separation finished"
        );

        // 5. 歌声转换
        ctx.enter(PipelineStage::Conversion)?;
        if self.settings.preflight {
            self.preflight(ctx).await?;
        }
        let converted = ctx
            .guard(self.ports.converter.convert(ConvertRequest {
                audio: stems.vocals,
                filename: "vocals.wav".to_string(),
                params: request.params.clone(),
            }))
            .await?
            .map_err(|e| upstream(PipelineStage::Conversion, e))?;

        // 6. 混音
        let output = match stems.instrumental {
            Some(instrumental) if request.params.enable_mixing && !converted.already_mixed => {
                ctx.enter(PipelineStage::Mixing)?;
                let mixed = self.mix(converted.audio, instrumental).await?;
                ctx.checkpoint()?;
                mixed
            }
            _ => {
                tracing::debug!(
                    job_id = %job_id,
                    enable_mixing = request.params.enable_mixing,
                    already_mixed = converted.already_mixed,
                    "Mixing skipped"
                );
                converted.audio
            }
        };

        // 7. 缓存写入
        ctx.enter(PipelineStage::CacheWrite)?;
        let snapshot = self.param_snapshot(request);
        match self.ports.cache.put(&key, &output, snapshot).await {
            Ok(entry) => {
                tracing::info!(job_id = %job_id, cache_key = %key, size = entry.size_bytes, "Artifact cached");
            }
            Err(e) => {
                tracing::warn!(job_id = %job_id, cache_key = %key, error = %e, "Failed to cache artifact");
            }
        }

        Ok(JobOutput {
            audio: Arc::new(output),
            cache_key: key.to_string(),
            cache_hit: false,
            title: input.title,
        })
    }

    async fn acquire(&self, input: &JobInput, ctx: &JobContext) -> Result<AcquiredInput, JobError> {
        match input {
            JobInput::Upload { data, filename } => Ok(AcquiredInput {
                bytes: data.clone(),
                filename: filename.clone(),
                ext: extension(filename),
                title: Some(filename.clone()),
                source_id: None,
                chorus_key: None,
            }),
            JobInput::Source(descriptor) => {
                let invalid = |e: ParamError| JobError::InvalidParameters {
                    message: e.to_string(),
                };
                let request = FetchRequest {
                    query: descriptor.normalize().map_err(invalid)?,
                    quality: descriptor.quality.clone(),
                    part: descriptor.part().map_err(invalid)?,
                };
                let fetcher = self
                    .ports
                    .fetchers
                    .get(descriptor.platform)
                    .map_err(fetch_error)?;
                let fetched = ctx
                    .guard(fetcher.fetch(&request))
                    .await?
                    .map_err(fetch_error)?;

                // 不同分 P 是不同音频，分别缓存高潮区间
                let source_id = source_id_with_part(&fetched.canonical_id, request.part);
                tracing::info!(
                    job_id = %ctx.job_id(),
                    platform = %descriptor.platform,
                    source_id = %source_id,
                    quality = %fetched.quality,
                    bytes = fetched.bytes.len(),
                    "Source fetched"
                );

                let chorus_key = chorus_key_for_source(descriptor.platform, &source_id, &fetched.quality);
                Ok(AcquiredInput {
                    filename: format!(
                        "{}_{}.{}",
                        descriptor.platform, source_id, fetched.file_ext
                    ),
                    ext: Some(fetched.file_ext),
                    title: fetched.title,
                    source_id: Some(source_id),
                    chorus_key: Some(chorus_key),
                    bytes: Arc::new(fetched.bytes),
                })
            }
        }
    }

    /// 高潮区间：先查缓存，未命中再调用检测服务并写回
    ///
    /// 写回和返回的区间都已按音频时长裁剪，保证 `end <= duration`
    async fn chorus_interval(
        &self,
        input: &AcquiredInput,
        hash: &str,
        duration: f64,
        ctx: &JobContext,
    ) -> Result<ChorusInterval, JobError> {
        let key = input
            .chorus_key
            .clone()
            .unwrap_or_else(|| chorus_key_for_upload(hash));

        if let Some(cached) = self.ports.chorus_cache.lookup(&key).await {
            match cached.clamp_to(duration) {
                Some(interval) => {
                    tracing::info!(job_id = %ctx.job_id(), chorus_key = %key, start = interval.start, end = interval.end, "Chorus cache hit");
                    return Ok(interval);
                }
                None => {
                    tracing::warn!(
                        job_id = %ctx.job_id(),
                        chorus_key = %key,
                        start = cached.start,
                        end = cached.end,
                        duration,
                        "Cached chorus interval lies outside audio, detecting again"
                    );
                }
            }
        }

        let detected = ctx
            .guard(self.ports.chorus_detector.detect(DetectRequest {
                audio: input.bytes.as_ref().clone(),
                filename: input.filename.clone(),
                source_id: input.source_id.clone(),
            }))
            .await?
            .map_err(|e| upstream(PipelineStage::ChorusDetection, e))?;

        let interval = detected.clamp_to(duration).ok_or_else(|| JobError::Upstream {
            stage: PipelineStage::ChorusDetection,
            message: format!(
                "detected chorus [{:.2}, {:.2}) lies outside audio duration {:.2}s",
                detected.start, detected.end, duration
            ),
        })?;

        tracing::info!(job_id = %ctx.job_id(), chorus_key = %key, start = interval.start, end = interval.end, "Chorus detected");
        if let Err(e) = self.ports.chorus_cache.put(&key, interval).await {
            tracing::warn!(chorus_key = %key, error = %e, "Failed to store chorus interval");
        }
        Ok(interval)
    }

    /// 在阻塞线程池上解码输入音频
    async fn decode(&self, input: &AcquiredInput) -> Result<AudioBuffer, JobError> {
        let codec = self.ports.codec.clone();
        let bytes = input.bytes.clone();
        let ext = input.ext.clone();

        tokio::task::spawn_blocking(move || codec.decode(&bytes, ext.as_deref()).map_err(invalid_audio))
            .await
            .map_err(|e| JobError::Internal {
                stage: PipelineStage::Crop,
                message: e.to_string(),
            })?
    }

    /// 截取 [start, end) 并重新编码为 WAV
    async fn crop(&self, buffer: AudioBuffer, start: f64, end: f64) -> Result<Arc<Vec<u8>>, JobError> {
        let codec = self.ports.codec.clone();

        let result = tokio::task::spawn_blocking(move || -> Result<Vec<u8>, JobError> {
            let duration = buffer.duration_secs();
            let window = ChorusInterval { start, end }
                .clamp_to(duration)
                .ok_or_else(|| JobError::InvalidParameters {
                    message: format!(
                        "crop window [{:.2}, {:.2}) is outside audio duration {:.2}s",
                        start, end, duration
                    ),
                })?;
            let cropped = buffer.slice_secs(window.start, window.end);
            codec.encode_wav(&cropped).map_err(|e| JobError::Internal {
                stage: PipelineStage::Crop,
                message: e.to_string(),
            })
        })
        .await
        .map_err(|e| JobError::Internal {
            stage: PipelineStage::Crop,
            message: e.to_string(),
        })??;

        Ok(Arc::new(result))
    }

    /// 转换服务预检：模型已加载且服务端队列未满
    async fn preflight(&self, ctx: &JobContext) -> Result<(), JobError> {
        let health = ctx.guard(self.ports.converter.health()).await?;
        let reason = if !health.reachable {
            Some(health.error.unwrap_or_else(|| "service unreachable".to_string()))
        } else if !health.model_loaded {
            Some("model not loaded".to_string())
        } else if health.queue_size >= self.settings.upstream_queue_limit {
            Some(format!("service queue is full ({})", health.queue_size))
        } else {
            None
        };

        match reason {
            Some(message) => {
                tracing::warn!(job_id = %ctx.job_id(), reason = %message, "Conversion service preflight failed");
                Err(JobError::Upstream {
                    stage: PipelineStage::Conversion,
                    message,
                })
            }
            None => Ok(()),
        }
    }

    /// 在阻塞线程池上混音
    async fn mix(&self, vocal: Vec<u8>, instrumental: Vec<u8>) -> Result<Vec<u8>, JobError> {
        let codec = self.ports.codec.clone();
        let settings = self.settings.clone();

        tokio::task::spawn_blocking(move || -> Result<Vec<u8>, JobError> {
            let config = &settings.mix;
            let internal = |message: String| JobError::Internal {
                stage: PipelineStage::Mixing,
                message,
            };
            let decode = |data: &[u8]| -> Result<_, JobError> {
                codec
                    .decode(data, Some("wav"))
                    .map(|buf| buf.resample(config.sample_rate))
                    .map_err(|e: CodecError| internal(e.to_string()))
            };

            let vocal = decode(&vocal)?;
            let instrumental = decode(&instrumental)?;
            let mixed = mix(&vocal, &instrumental, config).map_err(|e| internal(e.to_string()))?;
            codec.encode_wav(&mixed).map_err(|e| internal(e.to_string()))
        })
        .await
        .map_err(|e| JobError::Internal {
            stage: PipelineStage::Mixing,
            message: e.to_string(),
        })?
    }

    /// 写入缓存的参数快照
    fn param_snapshot(&self, request: &ConversionRequest) -> serde_json::Value {
        serde_json::json!({
            "params": request.params,
            "crop": request.crop,
            "mixing": request.params.enable_mixing.then_some(&self.settings.mix),
        })
    }
}

fn upstream(stage: PipelineStage, err: UpstreamError) -> JobError {
    JobError::Upstream {
        stage,
        message: err.to_string(),
    }
}

fn fetch_error(err: FetchError) -> JobError {
    match err {
        FetchError::InvalidIdentifier(_) | FetchError::Unsupported(_) => JobError::InvalidParameters {
            message: err.to_string(),
        },
        FetchError::NotFound(_) | FetchError::Upstream(_) => JobError::Upstream {
            stage: PipelineStage::Fetch,
            message: err.to_string(),
        },
    }
}

fn invalid_audio(err: CodecError) -> JobError {
    JobError::InvalidParameters {
        message: format!("cannot decode input audio: {}", err),
    }
}

fn extension(filename: &str) -> Option<String> {
    std::path::Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

fn wav_name(filename: &str) -> String {
    let stem = std::path::Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("input");
    format!("{}.wav", stem)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};
    use tokio_util::sync::CancellationToken;

    use crate::application::ports::{ServiceHealth, UpstreamError};
    use crate::domain::conversion::{
        ConversionDefaults, ConversionParams, JobId, Platform, SourceDescriptor,
    };
    use crate::infrastructure::adapters::fake::{
        tone_wav, FakeChorusDetector, FakeSourceFetcher, FakeStemSeparator, FakeVoiceConverter,
    };
    use crate::infrastructure::adapters::SymphoniaCodec;
    use crate::infrastructure::persistence::{JsonChorusCache, SledArtifactCache, SledCacheConfig};

    struct Harness {
        _dir: TempDir,
        pipeline: ConversionPipeline,
        cache: Arc<SledArtifactCache>,
        chorus_cache: Arc<JsonChorusCache>,
        detector: Arc<FakeChorusDetector>,
        separator: Arc<FakeStemSeparator>,
        converter: Arc<FakeVoiceConverter>,
        fetcher: Arc<FakeSourceFetcher>,
    }

    async fn harness(
        fetcher: FakeSourceFetcher,
        separator: FakeStemSeparator,
        converter: FakeVoiceConverter,
    ) -> Harness {
        let dir = tempdir().unwrap();
        let cache = SledArtifactCache::new(&SledCacheConfig {
            artifacts_dir: dir.path().join("artifacts"),
            index_path: dir.path().join("index.sled"),
            max_size_bytes: 512 * 1024 * 1024,
            max_age_secs: 3600,
        })
        .unwrap()
        .arc();
        let chorus_cache = JsonChorusCache::open(dir.path().join("chorus_cache.json"))
            .await
            .unwrap()
            .arc();
        let detector = Arc::new(FakeChorusDetector::new(ChorusInterval { start: 1.0, end: 3.0 }));
        let separator = Arc::new(separator);
        let converter = Arc::new(converter);
        let fetcher = fetcher.arc();

        let ports = PipelinePorts {
            cache: cache.clone(),
            chorus_cache: chorus_cache.clone(),
            chorus_detector: detector.clone(),
            separator: separator.clone(),
            converter: converter.clone(),
            codec: SymphoniaCodec::new().arc(),
            fetchers: SourceFetchers::new().register(fetcher.clone()),
        };
        let settings = PipelineSettings {
            mix: MixConfig::default(),
            fast_seek_window_secs: 2.0,
            preflight: true,
            upstream_queue_limit: 4,
        };

        Harness {
            _dir: dir,
            pipeline: ConversionPipeline::new(ports, settings),
            cache,
            chorus_cache,
            detector,
            separator,
            converter,
            fetcher,
        }
    }

    async fn default_harness() -> Harness {
        harness(
            FakeSourceFetcher::with_tone(Platform::Netease).with_identity("1330348068", "exhigh"),
            FakeStemSeparator::new(),
            FakeVoiceConverter::new(),
        )
        .await
    }

    fn request(query: &str, crop: CropMode, params: ConversionParams) -> ConversionRequest {
        ConversionRequest {
            input: JobInput::Source(SourceDescriptor {
                platform: Platform::Netease,
                query: query.to_string(),
                quality: None,
                part: None,
            }),
            params: params.resolve(&ConversionDefaults::default()).unwrap(),
            crop,
        }
    }

    fn ctx() -> JobContext {
        JobContext::new(JobId::new(), CancellationToken::new(), Duration::from_secs(30))
    }

    fn duration_of(wav: &[u8]) -> f64 {
        SymphoniaCodec::new()
            .decode(wav, Some("wav"))
            .unwrap()
            .duration_secs()
    }

    #[tokio::test]
    async fn test_netease_chorus_scenario() {
        let h = default_harness().await;
        let params = ConversionParams {
            speaker: Some("0".to_string()),
            pitch: Some(0),
            ..Default::default()
        };
        let req = request("起风了", CropMode::Chorus, params);

        let output = h.pipeline.run(&req, &ctx()).await.unwrap();

        assert!(!output.cache_hit);
        assert_eq!(h.fetcher.calls(), 1);
        assert_eq!(h.detector.calls(), 1);
        assert_eq!(h.separator.calls(), 1);
        assert_eq!(h.converter.calls(), 1);
        assert_eq!(
            h.chorus_cache.lookup("netease_1330348068_exhigh").await,
            Some(ChorusInterval { start: 1.0, end: 3.0 })
        );
        assert!((duration_of(&output.audio) - 2.0).abs() < 0.05);

        let key = CacheKey::parse(&output.cache_key).unwrap();
        let cached = h.cache.lookup(&key).await.unwrap().unwrap();
        assert_eq!(cached.data, *output.audio);
    }

    #[tokio::test]
    async fn test_resubmission_hits_cache_without_inference_calls() {
        let h = default_harness().await;
        let req = request("起风了", CropMode::Chorus, ConversionParams::default());

        let first = h.pipeline.run(&req, &ctx()).await.unwrap();
        let second = h.pipeline.run(&req, &ctx()).await.unwrap();

        assert!(second.cache_hit);
        assert_eq!(first.cache_key, second.cache_key);
        assert_eq!(first.audio, second.audio);
        assert_eq!(h.detector.calls(), 1);
        assert_eq!(h.separator.calls(), 1);
        assert_eq!(h.converter.calls(), 1);
    }

    #[tokio::test]
    async fn test_seeded_chorus_cache_suppresses_detection() {
        let h = harness(
            FakeSourceFetcher::with_tone(Platform::Netease).with_identity("12345", "320k"),
            FakeStemSeparator::new(),
            FakeVoiceConverter::new(),
        )
        .await;
        h.chorus_cache
            .put("netease_12345_320k", ChorusInterval { start: 2.0, end: 5.0 })
            .await
            .unwrap();

        let output = h
            .pipeline
            .run(&request("12345", CropMode::Chorus, ConversionParams::default()), &ctx())
            .await
            .unwrap();

        assert_eq!(h.detector.calls(), 0);
        assert!((duration_of(&output.audio) - 3.0).abs() < 0.05);
    }

    #[tokio::test]
    async fn test_upstream_failure_names_stage_and_skips_cache() {
        let h = harness(
            FakeSourceFetcher::with_tone(Platform::Netease),
            FakeStemSeparator::new().with_failure(UpstreamError::ServiceError {
                status: 500,
                message: "model crashed".to_string(),
            }),
            FakeVoiceConverter::new(),
        )
        .await;

        let result = h
            .pipeline
            .run(&request("12345", CropMode::Full, ConversionParams::default()), &ctx())
            .await;

        match result {
            Err(JobError::Upstream { stage, message }) => {
                assert_eq!(stage, PipelineStage::Separation);
                assert!(message.contains("model crashed"));
            }
            other => panic!("unexpected: {:?}", other.map(|o| o.cache_key)),
        }
        assert_eq!(h.converter.calls(), 0);
        assert_eq!(h.cache.stats().await.entries, 0);
    }

    #[tokio::test]
    async fn test_preflight_rejects_unloaded_model() {
        let h = default_harness().await;
        h.converter.set_health(ServiceHealth {
            reachable: true,
            model_loaded: false,
            queue_size: 0,
            error: None,
        });

        let result = h
            .pipeline
            .run(&request("12345", CropMode::Full, ConversionParams::default()), &ctx())
            .await;

        assert!(matches!(
            result,
            Err(JobError::Upstream {
                stage: PipelineStage::Conversion,
                ..
            })
        ));
        assert_eq!(h.converter.calls(), 0);
    }

    #[tokio::test]
    async fn test_cancellation_discards_in_flight_call() {
        let h = harness(
            FakeSourceFetcher::with_tone(Platform::Netease),
            FakeStemSeparator::new(),
            FakeVoiceConverter::new().with_delay(Duration::from_secs(30)),
        )
        .await;
        let token = CancellationToken::new();
        let ctx = JobContext::new(JobId::new(), token.clone(), Duration::from_secs(60));

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            canceller.cancel();
        });

        let result = h
            .pipeline
            .run(&request("12345", CropMode::Full, ConversionParams::default()), &ctx)
            .await;

        assert!(matches!(result, Err(JobError::Cancelled)));
        assert_eq!(h.cache.stats().await.entries, 0);
    }

    #[tokio::test]
    async fn test_timeout_while_awaiting_upstream() {
        let h = harness(
            FakeSourceFetcher::with_tone(Platform::Netease),
            FakeStemSeparator::new().with_delay(Duration::from_secs(30)),
            FakeVoiceConverter::new(),
        )
        .await;
        let ctx = JobContext::new(JobId::new(), CancellationToken::new(), Duration::from_millis(200));

        let started = std::time::Instant::now();
        let result = h
            .pipeline
            .run(&request("12345", CropMode::Full, ConversionParams::default()), &ctx)
            .await;

        assert!(matches!(result, Err(JobError::Timeout { .. })));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(h.cache.stats().await.entries, 0);
    }

    #[tokio::test]
    async fn test_mixing_disabled_returns_converted_vocals() {
        let h = default_harness().await;
        let params = ConversionParams {
            enable_mixing: Some(false),
            ..Default::default()
        };

        let output = h
            .pipeline
            .run(&request("12345", CropMode::Full, params), &ctx())
            .await
            .unwrap();

        // 假转换服务原样回传人声，假分离服务的人声即输入
        let input = tone_wav(44100, 1, 8.0, 440.0);
        assert_eq!(*output.audio, input);
    }

    #[tokio::test]
    async fn test_fast_seek_crops_window() {
        let h = default_harness().await;
        let output = h
            .pipeline
            .run(
                &request("12345", CropMode::FastSeek { start_secs: 4.0 }, ConversionParams::default()),
                &ctx(),
            )
            .await
            .unwrap();
        assert!((duration_of(&output.audio) - 2.0).abs() < 0.05);
        assert_eq!(h.detector.calls(), 0);
    }

    #[tokio::test]
    async fn test_fast_seek_past_end_is_invalid() {
        let h = default_harness().await;
        let result = h
            .pipeline
            .run(
                &request("12345", CropMode::FastSeek { start_secs: 100.0 }, ConversionParams::default()),
                &ctx(),
            )
            .await;
        assert!(matches!(result, Err(JobError::InvalidParameters { .. })));
        assert_eq!(h.separator.calls(), 0);
    }

    #[tokio::test]
    async fn test_upload_chorus_uses_content_hash_key() {
        let h = default_harness().await;
        let audio = Arc::new(tone_wav(44100, 2, 6.0, 330.0));
        let req = ConversionRequest {
            input: JobInput::Upload {
                data: audio.clone(),
                filename: "demo.wav".to_string(),
            },
            params: ConversionParams::default()
                .resolve(&ConversionDefaults::default())
                .unwrap(),
            crop: CropMode::Chorus,
        };

        let output = h.pipeline.run(&req, &ctx()).await.unwrap();

        assert_eq!(h.fetcher.calls(), 0);
        assert_eq!(output.title.as_deref(), Some("demo.wav"));
        let key = chorus_key_for_upload(&content_hash(&audio));
        assert!(h.chorus_cache.lookup(&key).await.is_some());
    }

    #[tokio::test]
    async fn test_bilibili_part_is_fetched_and_keyed_separately() {
        let h = harness(
            FakeSourceFetcher::with_tone(Platform::Bilibili)
                .with_identity("BV1xx411c7mD", "audio")
                .with_parts(&["P1", "P2"]),
            FakeStemSeparator::new(),
            FakeVoiceConverter::new(),
        )
        .await;
        let req = |part: Option<u32>| ConversionRequest {
            input: JobInput::Source(SourceDescriptor {
                platform: Platform::Bilibili,
                query: "https://www.bilibili.com/video/BV1xx411c7mD".to_string(),
                quality: None,
                part,
            }),
            params: ConversionParams::default()
                .resolve(&ConversionDefaults::default())
                .unwrap(),
            crop: CropMode::Chorus,
        };

        h.pipeline.run(&req(Some(2)), &ctx()).await.unwrap();
        assert_eq!(h.fetcher.last_request().unwrap().part, Some(2));
        assert!(h
            .chorus_cache
            .lookup("bilibili_BV1xx411c7mD_p2_audio")
            .await
            .is_some());
        assert_eq!(h.chorus_cache.lookup("bilibili_BV1xx411c7mD_audio").await, None);

        // 两个分 P 的假音频相同，清空产物缓存以走到高潮检测
        h.cache.clear_all().await.unwrap();
        h.pipeline.run(&req(None), &ctx()).await.unwrap();
        assert_eq!(h.fetcher.last_request().unwrap().part, None);
        assert!(h.chorus_cache.lookup("bilibili_BV1xx411c7mD_audio").await.is_some());
        assert_eq!(h.detector.calls(), 2);

        let missing = h.pipeline.run(&req(Some(5)), &ctx()).await;
        assert!(matches!(
            missing,
            Err(JobError::Upstream {
                stage: PipelineStage::Fetch,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_chorus_past_end_of_audio_is_not_cached() {
        let h = default_harness().await;
        h.detector.set_interval(ChorusInterval { start: 20.0, end: 30.0 });
        let req = request("起风了", CropMode::Chorus, ConversionParams::default());

        let first = h.pipeline.run(&req, &ctx()).await;
        assert!(matches!(
            first,
            Err(JobError::Upstream {
                stage: PipelineStage::ChorusDetection,
                ..
            })
        ));
        assert_eq!(h.chorus_cache.lookup("netease_1330348068_exhigh").await, None);
        assert_eq!(h.separator.calls(), 0);

        // 检测服务恢复后重新检测
        h.detector.set_interval(ChorusInterval { start: 1.0, end: 3.0 });
        h.pipeline.run(&req, &ctx()).await.unwrap();
        assert_eq!(h.detector.calls(), 2);
    }

    #[tokio::test]
    async fn test_chorus_overrunning_audio_is_clamped_before_caching() {
        let h = default_harness().await;
        h.detector.set_interval(ChorusInterval { start: 6.0, end: 100.0 });
        let req = request("起风了", CropMode::Chorus, ConversionParams::default());

        let output = h.pipeline.run(&req, &ctx()).await.unwrap();

        let stored = h
            .chorus_cache
            .lookup("netease_1330348068_exhigh")
            .await
            .unwrap();
        assert_eq!(stored.start, 6.0);
        assert!((stored.end - 8.0).abs() < 0.01);
        assert!((duration_of(&output.audio) - 2.0).abs() < 0.05);
    }

    #[tokio::test]
    async fn test_stale_cached_chorus_outside_audio_triggers_detection() {
        let h = default_harness().await;
        h.chorus_cache
            .put("netease_1330348068_exhigh", ChorusInterval { start: 50.0, end: 60.0 })
            .await
            .unwrap();

        let output = h
            .pipeline
            .run(&request("起风了", CropMode::Chorus, ConversionParams::default()), &ctx())
            .await
            .unwrap();

        assert_eq!(h.detector.calls(), 1);
        assert_eq!(
            h.chorus_cache.lookup("netease_1330348068_exhigh").await,
            Some(ChorusInterval { start: 1.0, end: 3.0 })
        );
        assert!((duration_of(&output.audio) - 2.0).abs() < 0.05);
    }
}

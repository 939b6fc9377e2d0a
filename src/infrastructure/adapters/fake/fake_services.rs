//! Fake Services - 不访问任何上游的假实现
//!
//! 用于测试以及 `svc.use_fake` 本地调试。每个实现都记录调用次数。

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::application::ports::{
    AudioCodecPort, ChorusDetectorPort, ChorusInterval, ConvertRequest, ConvertResponse,
    DetectRequest, FetchError, FetchRequest, FetchedSource, SeparatedStems, SeparationRequest,
    ServiceHealth, SourceFetcherPort, StemSeparatorPort, UpstreamError, VideoInfo, VideoPart,
    VoiceConverterPort,
};
use crate::domain::audio::AudioBuffer;
use crate::domain::conversion::{Platform, SourceQuery};

use crate::infrastructure::adapters::codec::SymphoniaCodec;

/// 调用计数与可注入的失败/延迟
#[derive(Debug, Default)]
struct Behavior {
    calls: AtomicUsize,
    delay: Mutex<Option<Duration>>,
    failure: Mutex<Option<UpstreamError>>,
}

impl Behavior {
    async fn enter(&self) -> Result<(), UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.failure.lock().unwrap_or_else(|e| e.into_inner()).clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap_or_else(|e| e.into_inner()) = Some(delay);
    }

    fn set_failure(&self, err: UpstreamError) {
        *self.failure.lock().unwrap_or_else(|e| e.into_inner()) = Some(err);
    }
}

/// 生成正弦测试音 WAV
pub fn tone_wav(sample_rate: u32, channels: usize, secs: f64, freq: f32) -> Vec<u8> {
    let frames = (sample_rate as f64 * secs) as usize;
    let data = (0..channels)
        .map(|_| {
            (0..frames)
                .map(|i| 0.3 * (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin())
                .collect()
        })
        .collect();
    SymphoniaCodec::new()
        .encode_wav(&AudioBuffer::new(sample_rate, data))
        .unwrap_or_default()
}

/// 假转换服务：原样返回人声
#[derive(Debug)]
pub struct FakeVoiceConverter {
    behavior: Behavior,
    speakers: Vec<String>,
    health: Mutex<ServiceHealth>,
    already_mixed: bool,
    last_request: Mutex<Option<ConvertRequest>>,
}

impl Default for FakeVoiceConverter {
    fn default() -> Self {
        Self {
            behavior: Behavior::default(),
            speakers: vec!["0".to_string(), "1".to_string()],
            health: Mutex::new(ServiceHealth {
                reachable: true,
                model_loaded: true,
                queue_size: 0,
                error: None,
            }),
            already_mixed: false,
            last_request: Mutex::new(None),
        }
    }
}

impl FakeVoiceConverter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_speakers(mut self, speakers: &[&str]) -> Self {
        self.speakers = speakers.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        self.behavior.set_delay(delay);
        self
    }

    pub fn with_failure(self, err: UpstreamError) -> Self {
        self.behavior.set_failure(err);
        self
    }

    /// 模拟服务端已混音
    pub fn already_mixed(mut self) -> Self {
        self.already_mixed = true;
        self
    }

    pub fn set_health(&self, health: ServiceHealth) {
        *self.health.lock().unwrap_or_else(|e| e.into_inner()) = health;
    }

    pub fn calls(&self) -> usize {
        self.behavior.calls()
    }

    pub fn last_request(&self) -> Option<ConvertRequest> {
        self.last_request.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl VoiceConverterPort for FakeVoiceConverter {
    async fn convert(&self, request: ConvertRequest) -> Result<ConvertResponse, UpstreamError> {
        *self.last_request.lock().unwrap_or_else(|e| e.into_inner()) = Some(request.clone());
        self.behavior.enter().await?;
        tracing::debug!(speaker = %request.params.speaker, "FakeVoiceConverter: echoing vocals");
        Ok(ConvertResponse {
            audio: request.audio,
            already_mixed: self.already_mixed,
        })
    }

    async fn speakers(&self) -> Result<Vec<String>, UpstreamError> {
        Ok(self.speakers.clone())
    }

    async fn health(&self) -> ServiceHealth {
        self.health.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// 假分离服务：人声与伴奏都返回输入音频
#[derive(Debug, Default)]
pub struct FakeStemSeparator {
    behavior: Behavior,
    without_instrumental: bool,
}

impl FakeStemSeparator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        self.behavior.set_delay(delay);
        self
    }

    pub fn with_failure(self, err: UpstreamError) -> Self {
        self.behavior.set_failure(err);
        self
    }

    /// 只输出人声
    pub fn vocals_only(mut self) -> Self {
        self.without_instrumental = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.behavior.calls()
    }
}

#[async_trait]
impl StemSeparatorPort for FakeStemSeparator {
    async fn separate(&self, request: SeparationRequest) -> Result<SeparatedStems, UpstreamError> {
        self.behavior.enter().await?;
        tracing::debug!(preset = %request.preset, "FakeStemSeparator: duplicating input");
        Ok(SeparatedStems {
            instrumental: (!self.without_instrumental).then(|| request.audio.clone()),
            vocals: request.audio,
        })
    }

    async fn presets(&self) -> Result<Vec<String>, UpstreamError> {
        Ok(vec!["wav.json".to_string(), "karaoke.json".to_string()])
    }

    async fn health(&self) -> ServiceHealth {
        ServiceHealth {
            reachable: true,
            model_loaded: true,
            queue_size: 0,
            error: None,
        }
    }
}

/// 假高潮检测：返回固定区间
#[derive(Debug)]
pub struct FakeChorusDetector {
    behavior: Behavior,
    interval: Mutex<ChorusInterval>,
}

impl FakeChorusDetector {
    pub fn new(interval: ChorusInterval) -> Self {
        Self {
            behavior: Behavior::default(),
            interval: Mutex::new(interval),
        }
    }

    /// 替换之后返回的区间
    pub fn set_interval(&self, interval: ChorusInterval) {
        *self.interval.lock().unwrap_or_else(|e| e.into_inner()) = interval;
    }

    pub fn with_failure(self, err: UpstreamError) -> Self {
        self.behavior.set_failure(err);
        self
    }

    pub fn calls(&self) -> usize {
        self.behavior.calls()
    }
}

impl Default for FakeChorusDetector {
    fn default() -> Self {
        Self::new(ChorusInterval { start: 1.0, end: 3.0 })
    }
}

#[async_trait]
impl ChorusDetectorPort for FakeChorusDetector {
    async fn detect(&self, request: DetectRequest) -> Result<ChorusInterval, UpstreamError> {
        self.behavior.enter().await?;
        tracing::debug!(filename = %request.filename, "FakeChorusDetector: returning fixed interval");
        Ok(*self.interval.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

/// 假音源：任何查询都返回同一段音频
#[derive(Debug)]
pub struct FakeSourceFetcher {
    platform: Platform,
    calls: AtomicUsize,
    audio: Vec<u8>,
    canonical_id: String,
    quality: String,
    title: Option<String>,
    parts: Vec<VideoPart>,
    last_request: Mutex<Option<FetchRequest>>,
}

impl FakeSourceFetcher {
    pub fn new(platform: Platform, audio: Vec<u8>) -> Self {
        Self {
            platform,
            calls: AtomicUsize::new(0),
            audio,
            canonical_id: "12345".to_string(),
            quality: platform
                .quality_ladder()
                .last()
                .copied()
                .unwrap_or("standard")
                .to_string(),
            title: None,
            parts: vec![VideoPart {
                index: 1,
                title: "P1".to_string(),
                duration: 8.0,
            }],
            last_request: Mutex::new(None),
        }
    }

    /// 8 秒单声道测试音
    pub fn with_tone(platform: Platform) -> Self {
        Self::new(platform, tone_wav(44100, 1, 8.0, 440.0))
    }

    pub fn with_identity(mut self, canonical_id: &str, quality: &str) -> Self {
        self.canonical_id = canonical_id.to_string();
        self.quality = quality.to_string();
        self
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    /// 视频分 P 标题
    pub fn with_parts(mut self, titles: &[&str]) -> Self {
        self.parts = titles
            .iter()
            .zip(1..)
            .map(|(title, index)| VideoPart {
                index,
                title: title.to_string(),
                duration: 8.0,
            })
            .collect();
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<FetchRequest> {
        self.last_request.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[async_trait]
impl SourceFetcherPort for FakeSourceFetcher {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<FetchedSource, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap_or_else(|e| e.into_inner()) = Some(request.clone());
        if let Some(part) = request.part {
            if part as usize > self.parts.len() {
                return Err(FetchError::NotFound(format!("part {}", part)));
            }
        }
        tracing::debug!(platform = %self.platform, query = %request.query.as_str(), "FakeSourceFetcher: returning fixed audio");
        Ok(FetchedSource {
            bytes: self.audio.clone(),
            canonical_id: self.canonical_id.clone(),
            quality: request.quality.clone().unwrap_or_else(|| self.quality.clone()),
            title: self
                .title
                .clone()
                .or_else(|| Some(request.query.as_str().to_string())),
            file_ext: "wav".to_string(),
        })
    }

    async fn video_info(&self, query: &SourceQuery) -> Result<VideoInfo, FetchError> {
        if self.platform != Platform::Bilibili {
            return Err(FetchError::Unsupported(format!(
                "{} has no video info",
                self.platform
            )));
        }
        Ok(VideoInfo {
            id: query.as_str().to_string(),
            title: self.title.clone().unwrap_or_else(|| query.as_str().to_string()),
            uploader: "fake".to_string(),
            parts: self.parts.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_converter_counts_calls_and_injects_failure() {
        let converter = FakeVoiceConverter::new().with_failure(UpstreamError::Timeout);
        let params = crate::domain::conversion::ConversionParams::default()
            .resolve(&Default::default())
            .unwrap();
        let result = converter
            .convert(ConvertRequest {
                audio: vec![1, 2],
                filename: "v.wav".to_string(),
                params,
            })
            .await;
        assert!(matches!(result, Err(UpstreamError::Timeout)));
        assert_eq!(converter.calls(), 1);
        assert!(converter.last_request().is_some());
    }

    #[tokio::test]
    async fn test_fetcher_returns_decodable_tone() {
        let fetcher = FakeSourceFetcher::with_tone(Platform::Netease).with_identity("1330348068", "exhigh");
        let fetched = fetcher
            .fetch(&FetchRequest::new(SourceQuery::Search("起风了".to_string())))
            .await
            .unwrap();
        assert_eq!(fetched.canonical_id, "1330348068");
        assert_eq!(fetched.quality, "exhigh");
        let decoded = SymphoniaCodec::new().decode(&fetched.bytes, Some("wav")).unwrap();
        assert!((decoded.duration_secs() - 8.0).abs() < 0.01);
        assert_eq!(fetcher.calls(), 1);
    }
}

//! Catalog Query Handlers
//!
//! 直接透传外部服务的列表与视频信息

use std::sync::Arc;

use crate::application::defaults::DefaultsStore;
use crate::application::error::ApplicationError;
use crate::application::ports::{SourceFetchers, StemSeparatorPort, VideoInfo, VoiceConverterPort};
use crate::application::queries::catalog_queries::*;
use crate::domain::conversion::{PipelineStage, Platform, SourceDescriptor};

pub struct ListPresetsHandler {
    separator: Arc<dyn StemSeparatorPort>,
    defaults: Arc<DefaultsStore>,
}

impl ListPresetsHandler {
    pub fn new(separator: Arc<dyn StemSeparatorPort>, defaults: Arc<DefaultsStore>) -> Self {
        Self {
            separator,
            defaults,
        }
    }

    pub async fn handle(&self, _query: ListPresets) -> Result<PresetsResponse, ApplicationError> {
        let presets = self
            .separator
            .presets()
            .await
            .map_err(|e| ApplicationError::upstream(PipelineStage::Separation, e))?;

        Ok(PresetsResponse {
            presets,
            default: self.defaults.snapshot().preset.clone(),
        })
    }
}

pub struct ListSpeakersHandler {
    converter: Arc<dyn VoiceConverterPort>,
    defaults: Arc<DefaultsStore>,
}

impl ListSpeakersHandler {
    pub fn new(converter: Arc<dyn VoiceConverterPort>, defaults: Arc<DefaultsStore>) -> Self {
        Self {
            converter,
            defaults,
        }
    }

    pub async fn handle(&self, _query: ListSpeakers) -> Result<SpeakersResponse, ApplicationError> {
        let speakers = self
            .converter
            .speakers()
            .await
            .map_err(|e| ApplicationError::upstream(PipelineStage::Conversion, e))?;

        Ok(SpeakersResponse {
            speakers,
            default: self.defaults.snapshot().speaker.clone(),
        })
    }
}

pub struct GetVideoInfoHandler {
    fetchers: SourceFetchers,
}

impl GetVideoInfoHandler {
    pub fn new(fetchers: SourceFetchers) -> Self {
        Self { fetchers }
    }

    pub async fn handle(&self, query: GetVideoInfo) -> Result<VideoInfo, ApplicationError> {
        let source = SourceDescriptor {
            platform: Platform::Bilibili,
            query: query.query,
            quality: None,
            part: None,
        };
        let normalized = source.normalize()?;
        let fetcher = self.fetchers.get(Platform::Bilibili)?;
        let info = fetcher.video_info(&normalized).await?;

        tracing::debug!(source_id = %info.id, parts = info.parts.len(), "Video info fetched");
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::conversion::ConversionDefaults;
    use crate::infrastructure::adapters::fake::{
        FakeSourceFetcher, FakeStemSeparator, FakeVoiceConverter,
    };

    #[tokio::test]
    async fn test_lists_pass_through_with_defaults() {
        let defaults = Arc::new(DefaultsStore::new(ConversionDefaults::default()));

        let presets = ListPresetsHandler::new(Arc::new(FakeStemSeparator::new()), defaults.clone())
            .handle(ListPresets)
            .await
            .unwrap();
        assert_eq!(presets.presets, vec!["wav.json", "karaoke.json"]);
        assert_eq!(presets.default, ConversionDefaults::default().preset);

        let speakers = ListSpeakersHandler::new(
            Arc::new(FakeVoiceConverter::new().with_speakers(&["a", "b"])),
            defaults,
        )
        .handle(ListSpeakers)
        .await
        .unwrap();
        assert_eq!(speakers.speakers, vec!["a", "b"]);
        assert_eq!(speakers.default, "0");
    }

    #[tokio::test]
    async fn test_video_info_lists_parts() {
        let fetchers = SourceFetchers::new().register(
            FakeSourceFetcher::with_tone(Platform::Bilibili)
                .with_title("合集")
                .with_parts(&["序章", "正片"])
                .arc(),
        );
        let handler = GetVideoInfoHandler::new(fetchers);

        let info = handler
            .handle(GetVideoInfo {
                query: "https://www.bilibili.com/video/BV1xx411c7mD?p=2".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(info.id, "BV1xx411c7mD");
        assert_eq!(info.title, "合集");
        assert_eq!(info.parts.len(), 2);
        assert_eq!(info.parts[1].title, "正片");

        let invalid = handler
            .handle(GetVideoInfo {
                query: "not a video".to_string(),
            })
            .await;
        assert!(matches!(invalid, Err(ApplicationError::InvalidParameters(_))));
    }

    #[tokio::test]
    async fn test_video_info_without_bilibili_fetcher() {
        let result = GetVideoInfoHandler::new(SourceFetchers::new())
            .handle(GetVideoInfo {
                query: "BV1xx411c7mD".to_string(),
            })
            .await;
        assert!(matches!(result, Err(ApplicationError::InvalidParameters(_))));
    }
}

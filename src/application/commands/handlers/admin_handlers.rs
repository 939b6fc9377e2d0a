//! Admin Command Handlers

use std::sync::Arc;

use crate::application::commands::admin_commands::*;
use crate::application::defaults::DefaultsStore;
use crate::application::error::ApplicationError;
use crate::application::ports::VoiceConverterPort;
use crate::domain::conversion::PipelineStage;

/// 修改默认说话人 Handler
///
/// 先向转换服务确认说话人存在，再发布新的默认快照；
/// 已提交的任务不受影响
pub struct SetDefaultSpeakerHandler {
    converter: Arc<dyn VoiceConverterPort>,
    defaults: Arc<DefaultsStore>,
}

impl SetDefaultSpeakerHandler {
    pub fn new(converter: Arc<dyn VoiceConverterPort>, defaults: Arc<DefaultsStore>) -> Self {
        Self {
            converter,
            defaults,
        }
    }

    pub async fn handle(
        &self,
        cmd: SetDefaultSpeaker,
    ) -> Result<SetDefaultSpeakerResponse, ApplicationError> {
        let speaker = cmd.speaker.trim();
        if speaker.is_empty() {
            return Err(ApplicationError::invalid("speaker must not be empty"));
        }

        let available = self
            .converter
            .speakers()
            .await
            .map_err(|e| ApplicationError::upstream(PipelineStage::Conversion, e))?;
        if !available.iter().any(|s| s == speaker) {
            return Err(ApplicationError::invalid(format!(
                "unknown speaker '{}', available: [{}]",
                speaker,
                available.join(", ")
            )));
        }

        let next = self.defaults.snapshot().with_speaker(speaker);
        let previous = self.defaults.publish(next)?;

        Ok(SetDefaultSpeakerResponse {
            previous: previous.speaker.clone(),
            speaker: speaker.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::conversion::ConversionDefaults;
    use crate::infrastructure::adapters::fake::FakeVoiceConverter;

    fn handler() -> (SetDefaultSpeakerHandler, Arc<DefaultsStore>) {
        let defaults = Arc::new(DefaultsStore::new(ConversionDefaults::default()));
        let converter = Arc::new(FakeVoiceConverter::new().with_speakers(&["0", "nahida"]));
        (
            SetDefaultSpeakerHandler::new(converter, defaults.clone()),
            defaults,
        )
    }

    #[tokio::test]
    async fn test_known_speaker_is_published() {
        let (handler, defaults) = handler();
        let before = defaults.snapshot();

        let response = handler
            .handle(SetDefaultSpeaker {
                speaker: " nahida ".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(response.previous, "0");
        assert_eq!(response.speaker, "nahida");
        assert_eq!(defaults.snapshot().speaker, "nahida");
        assert_eq!(before.speaker, "0");
    }

    #[tokio::test]
    async fn test_unknown_speaker_is_rejected() {
        let (handler, defaults) = handler();
        let result = handler
            .handle(SetDefaultSpeaker {
                speaker: "ghost".to_string(),
            })
            .await;

        assert!(matches!(result, Err(ApplicationError::InvalidParameters(_))));
        assert_eq!(defaults.snapshot().speaker, "0");
    }
}

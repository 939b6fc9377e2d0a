//! HTTP SVC Client - 调用 so-vits-svc HTTP API
//!
//! 外部 API:
//! - POST {base}/wav2wav      multipart，返回转换后的音频
//! - GET  {base}/health       {"model_loaded": bool, "queue_size": int}
//! - GET  {base}/speakers     ["0", "1", ...]

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use super::{error_body, map_reqwest_error};
use crate::application::ports::{
    ConvertRequest, ConvertResponse, ServiceHealth, UpstreamError, VoiceConverterPort,
};
use crate::domain::conversion::EffectiveParams;

/// 服务端已完成混音时返回的响应头
const MIXED_HEADER: &str = "X-Mixed";

#[derive(Debug, Deserialize)]
struct HealthBody {
    #[serde(default)]
    model_loaded: bool,
    #[serde(default)]
    queue_size: usize,
}

/// HTTP SVC 客户端配置
#[derive(Debug, Clone)]
pub struct HttpSvcClientConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for HttpSvcClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:1145".to_string(),
            timeout_secs: 300,
        }
    }
}

impl HttpSvcClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// so-vits-svc HTTP 客户端
pub struct HttpSvcClient {
    client: Client,
    config: HttpSvcClientConfig,
}

impl HttpSvcClient {
    pub fn new(config: HttpSvcClientConfig) -> Result<Self, UpstreamError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| UpstreamError::NetworkError(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }
}

/// 转换参数对应的表单字段（字段名沿用服务端约定）
fn form_fields(params: &EffectiveParams) -> Vec<(&'static str, String)> {
    let mut fields = vec![
        ("tran", params.pitch.to_string()),
        ("spk", params.speaker.clone()),
        ("wav_format", "wav".to_string()),
        ("k_step", params.k_step.to_string()),
        ("shallow_diffusion", params.shallow_diffusion.to_string()),
        ("only_diffusion", params.only_diffusion.to_string()),
        ("cluster_infer_ratio", params.cluster_infer_ratio.to_string()),
        ("auto_predict_f0", params.auto_predict_f0.to_string()),
        ("noice_scale", params.noise_scale.to_string()),
        ("f0_filter", params.f0_filter.to_string()),
        ("f0_predictor", params.f0_predictor.clone()),
        ("enhancer_adaptive_key", params.enhancer_adaptive_key.to_string()),
        ("cr_threshold", params.cr_threshold.to_string()),
    ];
    if let Some(model) = &params.model {
        fields.push(("model", model.clone()));
    }
    fields
}

#[async_trait]
impl VoiceConverterPort for HttpSvcClient {
    async fn convert(&self, request: ConvertRequest) -> Result<ConvertResponse, UpstreamError> {
        let audio_len = request.audio.len();
        let part = Part::bytes(request.audio)
            .file_name(request.filename)
            .mime_str("audio/wav")
            .map_err(|e| UpstreamError::InvalidResponse(e.to_string()))?;

        let form = form_fields(&request.params)
            .into_iter()
            .fold(Form::new().part("audio", part), |form, (name, value)| {
                form.text(name, value)
            });

        tracing::debug!(
            url = %self.url("wav2wav"),
            speaker = %request.params.speaker,
            pitch = request.params.pitch,
            audio_size = audio_len,
            "Sending conversion request"
        );

        let response = self
            .client
            .post(self.url("wav2wav"))
            .multipart(form)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::ServiceError {
                status: status.as_u16(),
                message: error_body(response).await,
            });
        }

        let already_mixed = response
            .headers()
            .get(MIXED_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(false);

        let audio = response
            .bytes()
            .await
            .map_err(|e| UpstreamError::InvalidResponse(format!("Failed to read audio: {}", e)))?
            .to_vec();
        if audio.is_empty() {
            return Err(UpstreamError::InvalidResponse("empty audio body".to_string()));
        }

        tracing::info!(
            audio_size = audio.len(),
            already_mixed = already_mixed,
            "Conversion completed"
        );

        Ok(ConvertResponse {
            audio,
            already_mixed,
        })
    }

    async fn speakers(&self) -> Result<Vec<String>, UpstreamError> {
        let response = self
            .client
            .get(self.url("speakers"))
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::ServiceError {
                status: status.as_u16(),
                message: error_body(response).await,
            });
        }

        let body: Vec<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| UpstreamError::InvalidResponse(e.to_string()))?;

        // 说话人既可能是字符串也可能是数字
        Ok(body
            .into_iter()
            .map(|v| match v {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            })
            .collect())
    }

    async fn health(&self) -> ServiceHealth {
        let response = match self.client.get(self.url("health")).send().await {
            Ok(response) => response,
            Err(e) => return ServiceHealth::unreachable(map_reqwest_error(e).to_string()),
        };

        if !response.status().is_success() {
            return ServiceHealth::unreachable(format!("HTTP {}", response.status()));
        }

        match response.json::<HealthBody>().await {
            Ok(body) => ServiceHealth {
                reachable: true,
                model_loaded: body.model_loaded,
                queue_size: body.queue_size,
                error: None,
            },
            Err(e) => ServiceHealth::unreachable(format!("invalid health response: {}", e)),
        }
    }
}

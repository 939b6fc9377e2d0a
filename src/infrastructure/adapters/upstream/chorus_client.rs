//! HTTP Chorus Client - 调用高潮检测服务
//!
//! POST {base}/detect  multipart {file, source_id?}，Bearer 鉴权
//!
//! 响应体既可以直接是检测结果，也可以包在 `payload` 字符串里:
//! `{"chorus_segments": [{"interval": [s, e], "chorus_prob": p}], "thumbnail": [{"interval": [s, e]}]}`

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use super::{error_body, map_reqwest_error};
use crate::application::ports::{ChorusDetectorPort, ChorusInterval, DetectRequest, UpstreamError};

#[derive(Debug, Default, Deserialize)]
struct Segment {
    #[serde(default)]
    interval: Vec<f64>,
    #[serde(default)]
    chorus_prob: f64,
}

#[derive(Debug, Default, Deserialize)]
struct Detection {
    #[serde(default)]
    chorus_segments: Vec<Segment>,
    #[serde(default)]
    thumbnail: Vec<Segment>,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    payload: Option<String>,
    #[serde(flatten)]
    detection: Detection,
}

/// HTTP 高潮检测客户端配置
#[derive(Debug, Clone)]
pub struct HttpChorusClientConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for HttpChorusClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9100".to_string(),
            token: None,
            timeout_secs: 60,
        }
    }
}

/// 高潮检测 HTTP 客户端
pub struct HttpChorusClient {
    client: Client,
    config: HttpChorusClientConfig,
}

impl HttpChorusClient {
    pub fn new(config: HttpChorusClientConfig) -> Result<Self, UpstreamError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| UpstreamError::NetworkError(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn detect_url(&self) -> String {
        format!("{}/detect", self.config.base_url.trim_end_matches('/'))
    }
}

fn to_interval(segment: &Segment) -> Result<ChorusInterval, UpstreamError> {
    match segment.interval.as_slice() {
        [start, end] => ChorusInterval::new(*start, *end)
            .map_err(|e| UpstreamError::InvalidResponse(e.to_string())),
        other => Err(UpstreamError::InvalidResponse(format!(
            "malformed interval: {:?}",
            other
        ))),
    }
}

/// 取概率最高的副歌片段，没有时退回第一个缩略区间
fn best_interval(detection: &Detection) -> Result<ChorusInterval, UpstreamError> {
    let best = detection
        .chorus_segments
        .iter()
        .max_by(|a, b| a.chorus_prob.total_cmp(&b.chorus_prob));

    match (best, detection.thumbnail.first()) {
        (Some(segment), _) => to_interval(segment),
        (None, Some(thumbnail)) => to_interval(thumbnail),
        (None, None) => Err(UpstreamError::InvalidResponse(
            "no chorus segment detected".to_string(),
        )),
    }
}

fn parse_detection(body: &[u8]) -> Result<ChorusInterval, UpstreamError> {
    let envelope: Envelope =
        serde_json::from_slice(body).map_err(|e| UpstreamError::InvalidResponse(e.to_string()))?;

    match envelope.payload {
        Some(payload) => {
            let detection: Detection = serde_json::from_str(&payload)
                .map_err(|e| UpstreamError::InvalidResponse(format!("invalid payload: {}", e)))?;
            best_interval(&detection)
        }
        None => best_interval(&envelope.detection),
    }
}

#[async_trait]
impl ChorusDetectorPort for HttpChorusClient {
    async fn detect(&self, request: DetectRequest) -> Result<ChorusInterval, UpstreamError> {
        let part = Part::bytes(request.audio).file_name(request.filename.clone());
        let mut form = Form::new().part("file", part);
        if let Some(source_id) = &request.source_id {
            form = form.text("source_id", source_id.clone());
        }

        let mut builder = self.client.post(self.detect_url()).multipart(form);
        if let Some(token) = &self.config.token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::ServiceError {
                status: status.as_u16(),
                message: error_body(response).await,
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| UpstreamError::InvalidResponse(e.to_string()))?;
        let interval = parse_detection(&body)?;

        tracing::info!(
            filename = %request.filename,
            start = interval.start,
            end = interval.end,
            "Chorus detection completed"
        );
        Ok(interval)
    }
}

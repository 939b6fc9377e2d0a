//! HTTP MSST Client - 调用 MSST-WebUI HTTP API 做人声分离
//!
//! 外部 API:
//! - GET  {base}/presets              {"status": "success", "presets": [...]}
//! - POST {base}/infer/local          multipart，{"status": "success"}
//! - GET  {base}/list_outputs         {"files": [{"name": ...}]}
//! - GET  {base}/download/{name}      音频字节

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use super::{error_body, map_reqwest_error};
use crate::application::ports::{
    SeparatedStems, SeparationRequest, ServiceHealth, StemSeparatorPort, UpstreamError,
};

const INSTRUMENTAL_MARKERS: &[&str] = &["instrumental", "accompaniment", "no_vocal", "inst", "other", "伴奏"];
const VOCAL_MARKERS: &[&str] = &["vocal", "voice", "人声"];

#[derive(Debug, Deserialize)]
struct StatusBody {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    presets: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct OutputFile {
    name: String,
}

#[derive(Debug, Deserialize)]
struct OutputList {
    #[serde(default)]
    files: Vec<OutputFile>,
}

/// HTTP MSST 客户端配置
#[derive(Debug, Clone)]
pub struct HttpMsstClientConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for HttpMsstClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9000".to_string(),
            timeout_secs: 300,
        }
    }
}

impl HttpMsstClientConfig {
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

/// MSST-WebUI HTTP 客户端
pub struct HttpMsstClient {
    client: Client,
    config: HttpMsstClientConfig,
}

impl HttpMsstClient {
    pub fn new(config: HttpMsstClientConfig) -> Result<Self, UpstreamError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| UpstreamError::NetworkError(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, UpstreamError> {
        let response = self
            .client
            .get(self.url(path))
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

        response
            .json()
            .await
            .map_err(|e| UpstreamError::InvalidResponse(e.to_string()))
    }

    async fn download(&self, name: &str) -> Result<Vec<u8>, UpstreamError> {
        let response = self
            .client
            .get(self.url(&format!("download/{}", name)))
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

        Ok(response
            .bytes()
            .await
            .map_err(|e| UpstreamError::InvalidResponse(e.to_string()))?
            .to_vec())
    }
}

/// 选择预设：首选可用时用首选，否则第一个 `.json`，都没有时仍用首选名
pub fn find_available_preset(available: &[String], preferred: &str) -> String {
    let name = if available.iter().any(|p| p == preferred) {
        preferred
    } else {
        available
            .iter()
            .find(|p| p.ends_with(".json"))
            .map(String::as_str)
            .unwrap_or(preferred)
    };
    format!("presets/{}", name)
}

#[derive(Debug, PartialEq)]
enum StemKind {
    Vocals,
    Instrumental,
    Unknown,
}

fn classify(name: &str) -> StemKind {
    let lower = name.to_lowercase();
    if INSTRUMENTAL_MARKERS.iter().any(|m| lower.contains(m)) {
        StemKind::Instrumental
    } else if VOCAL_MARKERS.iter().any(|m| lower.contains(m)) {
        StemKind::Vocals
    } else {
        StemKind::Unknown
    }
}

/// 从输出列表中挑出本次任务的人声与伴奏文件名
fn pick_outputs(names: &[String], input_stem: &str) -> Option<(String, Option<String>)> {
    let ours: Vec<&String> = names.iter().filter(|n| n.contains(input_stem)).collect();
    let candidates: Vec<&String> = if ours.is_empty() {
        names.iter().collect()
    } else {
        ours
    };

    let vocals = candidates
        .iter()
        .find(|n| classify(n) == StemKind::Vocals)
        .or_else(|| candidates.iter().find(|n| classify(n) == StemKind::Unknown))?;
    let instrumental = candidates
        .iter()
        .find(|n| classify(n) == StemKind::Instrumental)
        .map(|n| n.to_string());

    Some((vocals.to_string(), instrumental))
}

#[async_trait]
impl StemSeparatorPort for HttpMsstClient {
    async fn separate(&self, request: SeparationRequest) -> Result<SeparatedStems, UpstreamError> {
        let available = self.presets().await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to list presets, using preferred preset");
            Vec::new()
        });
        let preset_path = find_available_preset(&available, &request.preset);

        // 以唯一文件名上传，便于在输出列表中找回本次结果
        let input_stem = format!("svchub_{}", uuid::Uuid::new_v4().simple());
        let part = Part::bytes(request.audio)
            .file_name(format!("{}.wav", input_stem))
            .mime_str("audio/wav")
            .map_err(|e| UpstreamError::InvalidResponse(e.to_string()))?;
        let form = Form::new()
            .part("input_file", part)
            .text("preset_path", preset_path.clone())
            .text("output_format", "wav")
            .text("extra_output_dir", "false");

        tracing::debug!(
            preset = %preset_path,
            source = %request.filename,
            upload = %input_stem,
            "Sending separation request"
        );

        let response = self
            .client
            .post(self.url("infer/local"))
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

        let body: StatusBody = response
            .json()
            .await
            .map_err(|e| UpstreamError::InvalidResponse(e.to_string()))?;
        if body.status != "success" {
            return Err(UpstreamError::ServiceError {
                status: status.as_u16(),
                message: body.message.unwrap_or(body.status),
            });
        }

        let outputs: OutputList = self.get_json("list_outputs").await?;
        let names: Vec<String> = outputs.files.into_iter().map(|f| f.name).collect();
        let (vocal_name, instrumental_name) = pick_outputs(&names, &input_stem)
            .ok_or_else(|| UpstreamError::InvalidResponse("separation produced no output".to_string()))?;

        let vocals = self.download(&vocal_name).await?;
        let instrumental = match &instrumental_name {
            Some(name) => Some(self.download(name).await?),
            None => None,
        };

        tracing::info!(
            preset = %preset_path,
            vocals = %vocal_name,
            instrumental = ?instrumental_name,
            "Separation completed"
        );

        Ok(SeparatedStems {
            vocals,
            instrumental,
        })
    }

    async fn presets(&self) -> Result<Vec<String>, UpstreamError> {
        let body: StatusBody = self.get_json("presets").await?;
        if body.status != "success" {
            return Err(UpstreamError::InvalidResponse(
                body.message.unwrap_or_else(|| "preset listing failed".to_string()),
            ));
        }
        Ok(body.presets)
    }

    async fn health(&self) -> ServiceHealth {
        match self.presets().await {
            Ok(_) => ServiceHealth {
                reachable: true,
                model_loaded: true,
                queue_size: 0,
                error: None,
            },
            Err(e) => ServiceHealth::unreachable(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_find_available_preset() {
        let available = names(&["karaoke.json", "wav.json", "readme.txt"]);
        assert_eq!(find_available_preset(&available, "wav.json"), "presets/wav.json");
        assert_eq!(find_available_preset(&available, "missing.json"), "presets/karaoke.json");
        assert_eq!(find_available_preset(&[], "wav.json"), "presets/wav.json");
    }

    #[test]
    fn test_pick_outputs_prefers_own_files() {
        let list = names(&[
            "old_vocals.wav",
            "svchub_abc_vocals.wav",
            "svchub_abc_instrumental.wav",
        ]);
        let (vocals, instrumental) = pick_outputs(&list, "svchub_abc").unwrap();
        assert_eq!(vocals, "svchub_abc_vocals.wav");
        assert_eq!(instrumental.as_deref(), Some("svchub_abc_instrumental.wav"));
    }

    #[test]
    fn test_pick_outputs_without_instrumental() {
        let list = names(&["svchub_abc_vocals.wav"]);
        let (vocals, instrumental) = pick_outputs(&list, "svchub_abc").unwrap();
        assert_eq!(vocals, "svchub_abc_vocals.wav");
        assert!(instrumental.is_none());
    }

    #[test]
    fn test_pick_outputs_unmarked_file_is_vocals() {
        let list = names(&["svchub_abc.wav", "svchub_abc_other.wav"]);
        let (vocals, instrumental) = pick_outputs(&list, "svchub_abc").unwrap();
        assert_eq!(vocals, "svchub_abc.wav");
        assert_eq!(instrumental.as_deref(), Some("svchub_abc_other.wav"));
        assert!(pick_outputs(&[], "x").is_none());
    }
}

//! Gateway Source Fetcher - 通过平台网关获取音源
//!
//! 外部 API:
//! - GET {base}/song/resolve?kind=id|search|url&query=...&quality=...
//!   → {"id": "...", "quality": "...", "title": "...", "url": "...", "ext": "mp3"}
//!   未找到或该音质不可用时返回 404；多 P 视频附带 `part=N`
//! - GET {base}/video/info?query=...
//!   → {"id": "...", "title": "...", "uploader": "...", "parts": [{"index": 1, "title": "...", "duration": 212.0}]}
//! - GET {url}  音频字节

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

use crate::application::ports::{
    FetchError, FetchRequest, FetchedSource, SourceFetcherPort, VideoInfo,
};
use crate::domain::conversion::{Platform, SourceQuery};

#[derive(Debug, Deserialize)]
struct ResolvedSong {
    id: String,
    quality: String,
    #[serde(default)]
    title: Option<String>,
    url: String,
    #[serde(default = "default_ext")]
    ext: String,
}

fn default_ext() -> String {
    "mp3".to_string()
}

/// 网关获取器配置
#[derive(Debug, Clone)]
pub struct GatewayFetcherConfig {
    pub platform: Platform,
    pub base_url: String,
    /// 平台凭据，以 Cookie 头转发
    pub credentials: Option<String>,
    pub timeout_secs: u64,
}

/// 平台网关音源获取器
pub struct GatewaySourceFetcher {
    client: Client,
    config: GatewayFetcherConfig,
}

impl GatewaySourceFetcher {
    pub fn new(config: GatewayFetcherConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| FetchError::Upstream(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn with_credentials(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.credentials {
            Some(credentials) => builder.header(reqwest::header::COOKIE, credentials),
            None => builder,
        }
    }

    /// 解析指定音质；该音质不可用时返回 Ok(None)
    async fn resolve(
        &self,
        request: &FetchRequest,
        quality: &str,
    ) -> Result<Option<ResolvedSong>, FetchError> {
        let mut params = vec![
            ("kind", query_kind(&request.query).to_string()),
            ("query", request.query.as_str().to_string()),
            ("quality", quality.to_string()),
        ];
        if let Some(part) = request.part {
            params.push(("part", part.to_string()));
        }
        let builder = self.client.get(self.endpoint("/song/resolve")).query(&params);
        let response = self
            .with_credentials(builder)
            .send()
            .await
            .map_err(|e| FetchError::Upstream(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => response
                .json()
                .await
                .map(Some)
                .map_err(|e| FetchError::Upstream(format!("invalid resolve response: {}", e))),
            status => {
                let text = response.text().await.unwrap_or_default();
                Err(FetchError::Upstream(format!("HTTP {}: {}", status, text)))
            }
        }
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self
            .with_credentials(self.client.get(url))
            .send()
            .await
            .map_err(|e| FetchError::Upstream(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Upstream(format!("download failed: HTTP {}", status)));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::Upstream(e.to_string()))?;
        if bytes.is_empty() {
            return Err(FetchError::Upstream("downloaded audio is empty".to_string()));
        }
        Ok(bytes.to_vec())
    }
}

fn query_kind(query: &SourceQuery) -> &'static str {
    match query {
        SourceQuery::Id(_) => "id",
        SourceQuery::Search(_) => "search",
        SourceQuery::Url(_) => "url",
    }
}

/// 要尝试的音质：调用方指定时只试该音质，否则按平台顺序由高到低
fn quality_candidates(platform: Platform, requested: Option<&str>) -> Vec<String> {
    match requested.map(str::trim).filter(|q| !q.is_empty()) {
        Some(quality) => vec![quality.to_string()],
        None => platform
            .quality_ladder()
            .iter()
            .map(|q| q.to_string())
            .collect(),
    }
}

#[async_trait]
impl SourceFetcherPort for GatewaySourceFetcher {
    fn platform(&self) -> Platform {
        self.config.platform
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<FetchedSource, FetchError> {
        for candidate in quality_candidates(self.config.platform, request.quality.as_deref()) {
            let Some(song) = self.resolve(request, &candidate).await? else {
                tracing::debug!(
                    platform = %self.config.platform,
                    query = %request.query.as_str(),
                    quality = %candidate,
                    "Quality unavailable, trying next"
                );
                continue;
            };

            tracing::info!(
                platform = %self.config.platform,
                source_id = %song.id,
                quality = %song.quality,
                part = ?request.part,
                title = ?song.title,
                "Source resolved"
            );

            let bytes = self.download(&song.url).await?;
            return Ok(FetchedSource {
                bytes,
                canonical_id: song.id,
                quality: song.quality,
                title: song.title,
                file_ext: song.ext.trim_start_matches('.').to_lowercase(),
            });
        }

        Err(FetchError::NotFound(format!(
            "{}:{}",
            self.config.platform,
            request.query.as_str()
        )))
    }

    async fn video_info(&self, query: &SourceQuery) -> Result<VideoInfo, FetchError> {
        if self.config.platform != Platform::Bilibili {
            return Err(FetchError::Unsupported(format!(
                "{} has no video info",
                self.config.platform
            )));
        }

        let builder = self
            .client
            .get(self.endpoint("/video/info"))
            .query(&[("query", query.as_str())]);
        let response = self
            .with_credentials(builder)
            .send()
            .await
            .map_err(|e| FetchError::Upstream(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(FetchError::NotFound(query.as_str().to_string())),
            status if status.is_success() => {
                let info: VideoInfo = response
                    .json()
                    .await
                    .map_err(|e| FetchError::Upstream(format!("invalid video info: {}", e)))?;
                tracing::info!(
                    source_id = %info.id,
                    title = %info.title,
                    parts = info.parts.len(),
                    "Video info resolved"
                );
                Ok(info)
            }
            status => {
                let text = response.text().await.unwrap_or_default();
                Err(FetchError::Upstream(format!("HTTP {}: {}", status, text)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_candidates() {
        assert_eq!(
            quality_candidates(Platform::Netease, None),
            vec!["jymaster", "jyeffect", "sky", "hires", "lossless", "exhigh", "standard"]
        );
        assert_eq!(
            quality_candidates(Platform::Netease, Some("exhigh")),
            vec!["exhigh"]
        );
        assert_eq!(quality_candidates(Platform::Bilibili, Some("  ")), vec!["audio"]);
    }

    #[test]
    fn test_query_kind() {
        assert_eq!(query_kind(&SourceQuery::Id("1".to_string())), "id");
        assert_eq!(query_kind(&SourceQuery::Search("起风了".to_string())), "search");
        assert_eq!(
            query_kind(&SourceQuery::Url("https://v.douyin.com/abc/".to_string())),
            "url"
        );
    }

    #[test]
    fn test_video_info_parses_part_list() {
        let info: VideoInfo = serde_json::from_str(
            r#"{"id": "BV1xx411c7mD", "title": "合集", "uploader": "up",
                "parts": [{"index": 1, "title": "P1", "duration": 212.0},
                          {"index": 2, "title": "P2", "duration": 198.5}]}"#,
        )
        .unwrap();
        assert_eq!(info.parts.len(), 2);
        assert_eq!(info.parts[1].index, 2);
        assert_eq!(info.parts[1].duration, 198.5);
    }

    #[tokio::test]
    async fn test_video_info_unsupported_for_music_platforms() {
        let fetcher = GatewaySourceFetcher::new(GatewayFetcherConfig {
            platform: Platform::Netease,
            base_url: "http://127.0.0.1:1".to_string(),
            credentials: None,
            timeout_secs: 1,
        })
        .unwrap();
        let result = fetcher
            .video_info(&SourceQuery::Id("12345".to_string()))
            .await;
        assert!(matches!(result, Err(FetchError::Unsupported(_))));
    }

    #[test]
    fn test_resolved_song_defaults_ext() {
        let song: ResolvedSong = serde_json::from_str(
            r#"{"id": "1330348068", "quality": "exhigh", "url": "http://x/1.mp3"}"#,
        )
        .unwrap();
        assert_eq!(song.ext, "mp3");
        assert!(song.title.is_none());
    }
}

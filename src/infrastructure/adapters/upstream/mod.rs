//! Upstream Adapters - 外部推理服务的 HTTP 客户端

mod chorus_client;
mod msst_client;
mod svc_client;

pub use chorus_client::{HttpChorusClient, HttpChorusClientConfig};
pub use msst_client::{find_available_preset, HttpMsstClient, HttpMsstClientConfig};
pub use svc_client::{HttpSvcClient, HttpSvcClientConfig};

use crate::application::ports::UpstreamError;

pub(crate) fn map_reqwest_error(e: reqwest::Error) -> UpstreamError {
    if e.is_timeout() {
        UpstreamError::Timeout
    } else if e.is_connect() {
        UpstreamError::NetworkError(format!("Cannot connect to service: {}", e))
    } else {
        UpstreamError::NetworkError(e.to_string())
    }
}

/// 非成功响应的错误信息：优先取 JSON 里的 `error`/`message` 字段
pub(crate) async fn error_body(response: reqwest::Response) -> String {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    serde_json::from_str::<serde_json::Value>(&text)
        .ok()
        .and_then(|v| {
            v.get("error")
                .or_else(|| v.get("message"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| format!("HTTP {}: {}", status, text))
}

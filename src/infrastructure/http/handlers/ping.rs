//! Ping Handler

use axum::Json;
use serde::Serialize;

use crate::infrastructure::http::dto::ApiResponse;

/// Ping 响应
#[derive(Serialize)]
pub struct PingResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// 存活检查，不访问任何外部服务
pub async fn ping() -> Json<ApiResponse<PingResponse>> {
    Json(ApiResponse::success(PingResponse {
        status: "ok",
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
    }))
}

//! HTTP Server
//!
//! Axum HTTP 服务器启动和配置

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::Router;
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use super::middleware::error_logging_middleware;
use super::routes::create_routes;
use super::state::AppState;

/// 服务器配置
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// 请求体上限（字节），决定上传音频的最大尺寸
    pub max_upload_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5070,
            max_upload_size: 50 * 1024 * 1024,
        }
    }
}

impl ServerConfig {
    pub fn new(host: impl Into<String>, port: u16, max_upload_size: usize) -> Self {
        Self {
            host: host.into(),
            port,
            max_upload_size,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// 构建带全部中间件的 Router
pub fn build_router(state: Arc<AppState>, max_upload_size: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .expose_headers(Any)
        .max_age(std::time::Duration::from_secs(3600));

    create_routes()
        .layer(DefaultBodyLimit::max(max_upload_size))
        .layer(middleware::from_fn(error_logging_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// HTTP 服务器
pub struct HttpServer {
    config: ServerConfig,
    state: Arc<AppState>,
}

impl HttpServer {
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self {
            config,
            state: Arc::new(state),
        }
    }

    /// 启动服务器（带优雅关闭）
    pub async fn run_with_shutdown<F>(self, shutdown_signal: F) -> Result<(), std::io::Error>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let router = build_router(self.state.clone(), self.config.max_upload_size);
        let addr = self.config.addr();

        info!(addr = %addr, max_upload_size = self.config.max_upload_size, "Starting HTTP server");

        let listener = TcpListener::bind(&addr).await?;
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal)
            .await?;

        Ok(())
    }
}

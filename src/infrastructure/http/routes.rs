//! HTTP Routes
//!
//! API Endpoints:
//! - /api/ping                    GET   存活检查
//! - /api/status                  GET   队列、缓存与上游状态
//! - /api/convert/submit          POST  提交平台音源转换
//! - /api/convert/upload          POST  提交上传音频转换（multipart）
//! - /api/convert/status          POST  查询任务状态
//! - /api/convert/cancel          POST  取消任务
//! - /api/convert/result/:job_id  GET   下载产物
//! - /api/cache/clear             POST  清空产物缓存
//! - /api/catalog/presets         GET   分离预设列表
//! - /api/catalog/speakers        GET   说话人列表
//! - /api/catalog/bilibili/:id    GET   B 站视频信息（标题、UP 主、分 P）
//! - /api/admin/default_speaker   POST  修改默认说话人

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use super::handlers;
use super::state::AppState;

/// 创建所有路由
pub fn create_routes() -> Router<Arc<AppState>> {
    Router::new().nest("/api", api_routes())
}

/// API 路由
fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ping", get(handlers::ping))
        .route("/status", get(handlers::get_status))
        .nest("/convert", convert_routes())
        .nest("/cache", cache_routes())
        .nest("/catalog", catalog_routes())
        .nest("/admin", admin_routes())
}

/// Convert 路由
fn convert_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/submit", post(handlers::submit_conversion))
        .route("/upload", post(handlers::submit_upload))
        .route("/status", post(handlers::job_status))
        .route("/cancel", post(handlers::cancel_job))
        .route("/result/:job_id", get(handlers::job_result))
}

/// Cache 路由
fn cache_routes() -> Router<Arc<AppState>> {
    Router::new().route("/clear", post(handlers::clear_cache))
}

/// Catalog 路由
fn catalog_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/presets", get(handlers::list_presets))
        .route("/speakers", get(handlers::list_speakers))
        .route("/bilibili/:id", get(handlers::bilibili_info))
}

/// Admin 路由
fn admin_routes() -> Router<Arc<AppState>> {
    Router::new().route("/default_speaker", post(handlers::set_default_speaker))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tempfile::{tempdir, TempDir};
    use tokio::sync::mpsc;
    use tower::util::ServiceExt;

    use crate::application::ports::{JobOutput, JobQueuePort, SourceFetchers};
    use crate::application::DefaultsStore;
    use crate::domain::conversion::{ConversionDefaults, JobId, Platform};
    use crate::infrastructure::adapters::fake::{
        tone_wav, FakeSourceFetcher, FakeStemSeparator, FakeVoiceConverter,
    };
    use crate::infrastructure::http::server::build_router;
    use crate::infrastructure::http::state::StatePorts;
    use crate::infrastructure::memory::InMemoryJobQueue;
    use crate::infrastructure::persistence::{JsonChorusCache, SledArtifactCache, SledCacheConfig};

    struct TestApp {
        router: Router,
        queue: Arc<InMemoryJobQueue>,
        defaults: Arc<DefaultsStore>,
        _rx: mpsc::UnboundedReceiver<JobId>,
        _dir: TempDir,
    }

    async fn app(capacity: usize) -> TestApp {
        let dir = tempdir().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        let queue = InMemoryJobQueue::new(capacity, tx).arc();
        let defaults = Arc::new(DefaultsStore::new(ConversionDefaults::default()));
        let cache = SledArtifactCache::new(&SledCacheConfig {
            artifacts_dir: dir.path().join("artifacts"),
            index_path: dir.path().join("index.sled"),
            max_size_bytes: 1 << 20,
            max_age_secs: 3600,
        })
        .unwrap()
        .arc();
        let chorus_cache = JsonChorusCache::open(dir.path().join("chorus_cache.json"))
            .await
            .unwrap()
            .arc();

        let state = AppState::new(StatePorts {
            queue: queue.clone(),
            cache,
            chorus_cache,
            converter: Arc::new(FakeVoiceConverter::new().with_speakers(&["0", "nahida"])),
            separator: Arc::new(FakeStemSeparator::new()),
            fetchers: SourceFetchers::new().register(
                FakeSourceFetcher::with_tone(Platform::Bilibili)
                    .with_title("合集")
                    .with_parts(&["序章", "正片"])
                    .arc(),
            ),
            defaults: defaults.clone(),
        });

        TestApp {
            router: build_router(Arc::new(state), 1024 * 1024),
            queue,
            defaults,
            _rx: rx,
            _dir: dir,
        }
    }

    async fn call(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn submit_body() -> Value {
        json!({
            "source": {"platform": "netease", "query": "起风了"},
            "params": {"speaker": "0", "pitch": 0},
            "chorus": true
        })
    }

    #[tokio::test]
    async fn test_ping() {
        let app = app(2).await;
        let (status, body) = call(&app.router, get_req("/api/ping")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["errno"], 0);
        assert_eq!(body["data"]["status"], "ok");
    }

    #[tokio::test]
    async fn test_submit_status_and_capacity() {
        let app = app(1).await;

        let (_, body) = call(&app.router, post_json("/api/convert/submit", submit_body())).await;
        assert_eq!(body["errno"], 0);
        assert_eq!(body["data"]["state"], "queued");
        let job_id = body["data"]["job_id"].as_str().unwrap().to_string();

        let (_, body) = call(&app.router, post_json("/api/convert/submit", submit_body())).await;
        assert_eq!(body["errno"], 429);
        assert!(body["data"].is_null());

        let (_, body) = call(
            &app.router,
            post_json("/api/convert/status", json!({ "job_id": job_id })),
        )
        .await;
        assert_eq!(body["errno"], 0);
        assert_eq!(body["data"]["state"], "queued");

        let (_, body) = call(&app.router, get_req("/api/status")).await;
        assert_eq!(body["data"]["queue"]["size"], 1);
        assert_eq!(body["data"]["queue"]["capacity"], 1);
        assert_eq!(body["data"]["upstream"]["svc"]["reachable"], true);
    }

    #[tokio::test]
    async fn test_conflicting_crop_is_bad_request() {
        let app = app(2).await;
        let mut body = submit_body();
        body["fast_seek"] = json!(30.0);

        let (_, body) = call(&app.router, post_json("/api/convert/submit", body)).await;
        assert_eq!(body["errno"], 400);
        assert_eq!(app.queue.status().size, 0);
    }

    #[tokio::test]
    async fn test_cancel_and_unknown_job() {
        let app = app(2).await;
        let (_, body) = call(&app.router, post_json("/api/convert/submit", submit_body())).await;
        let job_id = body["data"]["job_id"].as_str().unwrap().to_string();

        let (_, body) = call(
            &app.router,
            post_json("/api/convert/cancel", json!({ "job_id": job_id })),
        )
        .await;
        assert_eq!(body["data"]["cancelled"], true);
        assert_eq!(body["data"]["state"], "cancelled");

        let (_, body) = call(&app.router, get_req(&format!("/api/convert/result/{}", job_id))).await;
        assert_eq!(body["errno"], 409);

        let (_, body) = call(
            &app.router,
            post_json("/api/convert/status", json!({ "job_id": JobId::new().to_string() })),
        )
        .await;
        assert_eq!(body["errno"], 404);

        let (_, body) = call(
            &app.router,
            post_json("/api/convert/status", json!({ "job_id": "garbage" })),
        )
        .await;
        assert_eq!(body["errno"], 400);
    }

    #[tokio::test]
    async fn test_result_download() {
        let app = app(2).await;
        let (_, body) = call(&app.router, post_json("/api/convert/submit", submit_body())).await;
        let job_id = JobId::parse(body["data"]["job_id"].as_str().unwrap()).unwrap();

        let wav = tone_wav(16_000, 1, 0.1, 440.0);
        app.queue.start(&job_id).unwrap();
        app.queue.finish(
            &job_id,
            Ok(JobOutput {
                audio: Arc::new(wav.clone()),
                cache_key: "0123456789abcdef0123456789abcdef".to_string(),
                cache_hit: true,
                title: None,
            }),
        );

        let response = app
            .router
            .clone()
            .oneshot(get_req(&format!("/api/convert/result/{}", job_id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/wav");
        assert_eq!(response.headers()["x-cache-hit"], "true");
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(bytes.as_ref(), wav.as_slice());
    }

    #[tokio::test]
    async fn test_upload_multipart() {
        let app = app(2).await;
        let wav = tone_wav(16_000, 1, 0.1, 440.0);

        let boundary = "svchubboundary";
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{b}\r\nContent-Disposition: form-data; name=\"params\"\r\n\r\n{{\"pitch\": 2, \"fast_seek\": 0.0}}\r\n\
                 --{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"song.wav\"\r\nContent-Type: audio/wav\r\n\r\n",
                b = boundary
            )
            .as_bytes(),
        );
        body.extend_from_slice(&wav);
        body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

        let request = Request::builder()
            .method("POST")
            .uri("/api/convert/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", boundary),
            )
            .body(Body::from(body))
            .unwrap();

        let (_, body) = call(&app.router, request).await;
        assert_eq!(body["errno"], 0, "{}", body);
        let job_id = JobId::parse(body["data"]["job_id"].as_str().unwrap()).unwrap();
        let snapshot = app.queue.get(&job_id).unwrap();
        assert!(snapshot.input.contains("song.wav"));
    }

    #[tokio::test]
    async fn test_catalog_and_admin() {
        let app = app(2).await;

        let (_, body) = call(&app.router, get_req("/api/catalog/speakers")).await;
        assert_eq!(body["data"]["speakers"], json!(["0", "nahida"]));

        let (_, body) = call(&app.router, get_req("/api/catalog/presets")).await;
        assert_eq!(body["data"]["presets"][0], "wav.json");

        let (_, body) = call(
            &app.router,
            post_json("/api/admin/default_speaker", json!({ "speaker": "ghost" })),
        )
        .await;
        assert_eq!(body["errno"], 400);

        let (_, body) = call(
            &app.router,
            post_json("/api/admin/default_speaker", json!({ "speaker": "nahida" })),
        )
        .await;
        assert_eq!(body["errno"], 0);
        assert_eq!(app.defaults.snapshot().speaker, "nahida");
    }

    #[tokio::test]
    async fn test_bilibili_info_and_part_validation() {
        let app = app(2).await;

        let (_, body) = call(&app.router, get_req("/api/catalog/bilibili/BV1xx411c7mD")).await;
        assert_eq!(body["errno"], 0, "{}", body);
        assert_eq!(body["data"]["id"], "BV1xx411c7mD");
        assert_eq!(body["data"]["title"], "合集");
        assert_eq!(body["data"]["parts"][1]["index"], 2);
        assert_eq!(body["data"]["parts"][1]["title"], "正片");

        let (_, body) = call(&app.router, get_req("/api/catalog/bilibili/nothing")).await;
        assert_eq!(body["errno"], 400);

        let (_, body) = call(
            &app.router,
            post_json(
                "/api/convert/submit",
                json!({
                    "source": { "platform": "bilibili", "query": "BV1xx411c7mD", "part": 0 },
                }),
            ),
        )
        .await;
        assert_eq!(body["errno"], 400);

        let (_, body) = call(
            &app.router,
            post_json(
                "/api/convert/submit",
                json!({
                    "source": { "platform": "bilibili", "query": "BV1xx411c7mD", "part": 2 },
                }),
            ),
        )
        .await;
        assert_eq!(body["errno"], 0, "{}", body);
    }

    #[tokio::test]
    async fn test_clear_cache() {
        let app = app(2).await;
        let (_, body) = call(
            &app.router,
            Request::builder()
                .method("POST")
                .uri("/api/cache/clear")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(body["errno"], 0);
        assert_eq!(body["data"]["removed"], 0);
    }
}

//! svc-hub - 歌声转换编排服务
//!
//! - Domain: conversion/, audio/, mixing/
//! - Application: commands, queries, ports, pipeline
//! - Infrastructure: http, memory, worker, persistence, adapters

use std::sync::Arc;
use std::time::Duration;

use svc_hub::application::ports::{
    ChorusDetectorPort, SourceFetchers, StemSeparatorPort, VoiceConverterPort,
};
use svc_hub::application::{ConversionPipeline, DefaultsStore, PipelinePorts, PipelineSettings};
use svc_hub::config::{load_config, print_config, AppConfig};
use svc_hub::domain::conversion::Platform;
use svc_hub::infrastructure::adapters::fake::{
    FakeChorusDetector, FakeSourceFetcher, FakeStemSeparator, FakeVoiceConverter,
};
use svc_hub::infrastructure::adapters::{
    GatewayFetcherConfig, GatewaySourceFetcher, HttpChorusClient, HttpChorusClientConfig,
    HttpMsstClient, HttpMsstClientConfig, HttpSvcClient, HttpSvcClientConfig, SymphoniaCodec,
};
use svc_hub::infrastructure::http::{AppState, HttpServer, ServerConfig, StatePorts};
use svc_hub::infrastructure::memory::InMemoryJobQueue;
use svc_hub::infrastructure::persistence::{JsonChorusCache, SledArtifactCache, SledCacheConfig};
use svc_hub::infrastructure::worker::{
    CacheSweeper, CacheSweeperConfig, ConversionWorker, ConversionWorkerConfig,
};
use tokio::sync::mpsc;

/// 外部服务适配器
struct Upstreams {
    converter: Arc<dyn VoiceConverterPort>,
    separator: Arc<dyn StemSeparatorPort>,
    chorus_detector: Arc<dyn ChorusDetectorPort>,
    fetchers: SourceFetchers,
}

fn init_tracing(config: &AppConfig) {
    let log_filter = format!(
        "{},svc_hub={},tower_http=debug",
        config.log.level, config.log.level
    );
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_filter));

    if config.log.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn build_upstreams(config: &AppConfig) -> anyhow::Result<Upstreams> {
    if config.svc.use_fake {
        tracing::warn!("Using fake upstream services, conversions echo their input");
        let fetchers = [Platform::Netease, Platform::Qq, Platform::Bilibili, Platform::Douyin]
            .into_iter()
            .fold(SourceFetchers::new(), |fetchers, platform| {
                fetchers.register(FakeSourceFetcher::with_tone(platform).arc())
            });
        return Ok(Upstreams {
            converter: Arc::new(FakeVoiceConverter::new()),
            separator: Arc::new(FakeStemSeparator::new()),
            chorus_detector: Arc::new(FakeChorusDetector::default()),
            fetchers,
        });
    }

    let converter = HttpSvcClient::new(
        HttpSvcClientConfig::new(&config.svc.url).with_timeout(config.svc.timeout_secs),
    )?;
    let separator = HttpMsstClient::new(
        HttpMsstClientConfig::new(&config.msst.url).with_timeout(config.msst.timeout_secs),
    )?;
    let chorus_detector = HttpChorusClient::new(HttpChorusClientConfig {
        base_url: config.chorus.url.clone(),
        token: config.chorus.token.clone(),
        timeout_secs: config.chorus.timeout_secs,
    })?;

    let sources = &config.sources;
    let mut fetchers = SourceFetchers::new();
    for (platform, platform_config) in [
        (Platform::Netease, &sources.netease),
        (Platform::Qq, &sources.qq),
        (Platform::Bilibili, &sources.bilibili),
        (Platform::Douyin, &sources.douyin),
    ] {
        let Some(url) = platform_config.url.as_deref().filter(|u| !u.is_empty()) else {
            tracing::info!(platform = %platform, "No gateway configured, platform disabled");
            continue;
        };
        let fetcher = GatewaySourceFetcher::new(GatewayFetcherConfig {
            platform,
            base_url: url.to_string(),
            credentials: platform_config.credentials.clone(),
            timeout_secs: sources.timeout_secs,
        })?;
        fetchers = fetchers.register(Arc::new(fetcher));
    }

    Ok(Upstreams {
        converter: Arc::new(converter),
        separator: Arc::new(separator),
        chorus_detector: Arc::new(chorus_detector),
        fetchers,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 加载配置（优先级：环境变量 > 配置文件 > 默认值）
    let config = load_config().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

    init_tracing(&config);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "svc-hub starting");
    print_config(&config);

    // 缓存
    let cache = SledArtifactCache::new(&SledCacheConfig {
        artifacts_dir: config.cache.artifacts_dir(),
        index_path: config.cache.index_path(),
        max_size_bytes: config.cache.max_size_bytes,
        max_age_secs: config.cache.max_age_secs,
    })?
    .arc();
    let chorus_cache = JsonChorusCache::open(config.cache.chorus_cache_path())
        .await?
        .arc();

    let upstreams = build_upstreams(&config)?;
    tracing::info!(platforms = ?upstreams.fetchers.platforms(), "Source fetchers registered");

    let defaults = Arc::new(DefaultsStore::new(config.conversion.defaults.clone()));

    // 流水线
    let pipeline = Arc::new(ConversionPipeline::new(
        PipelinePorts {
            cache: cache.clone(),
            chorus_cache: chorus_cache.clone(),
            chorus_detector: upstreams.chorus_detector,
            separator: upstreams.separator.clone(),
            converter: upstreams.converter.clone(),
            codec: SymphoniaCodec::new().arc(),
            fetchers: upstreams.fetchers.clone(),
        },
        PipelineSettings {
            mix: config.mixing.clone(),
            fast_seek_window_secs: config.conversion.fast_seek_window_secs,
            preflight: config.svc.preflight,
            upstream_queue_limit: config.conversion.max_queue_size,
        },
    ));

    // 任务队列与 Worker
    let (queue_tx, queue_rx) = mpsc::unbounded_channel();
    let queue = InMemoryJobQueue::new(config.conversion.max_queue_size, queue_tx).arc();

    let worker = ConversionWorker::new(
        ConversionWorkerConfig {
            max_concurrent: config.worker.max_concurrent,
            job_timeout: Duration::from_secs(config.conversion.timeout_secs),
        },
        queue_rx,
        queue.clone(),
        pipeline,
    );
    tokio::spawn(worker.run());

    if config.gc.enabled {
        let sweeper = CacheSweeper::new(
            CacheSweeperConfig {
                interval: Duration::from_secs(config.gc.interval_secs),
                job_retention: Duration::from_secs(config.conversion.job_retention_secs),
            },
            cache.clone(),
            queue.clone(),
        );
        tokio::spawn(sweeper.run());
    }

    // HTTP 服务器
    let server_config = ServerConfig::new(
        &config.server.host,
        config.server.port,
        config.server.max_upload_size,
    );
    let state = AppState::new(StatePorts {
        queue,
        cache,
        chorus_cache,
        converter: upstreams.converter,
        separator: upstreams.separator,
        fetchers: upstreams.fetchers,
        defaults,
    });

    let server = HttpServer::new(server_config, state);

    // 启动服务器（带优雅关闭）
    server
        .run_with_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            tracing::info!("Received shutdown signal");
        })
        .await?;

    tracing::info!("Server shutdown complete");

    Ok(())
}

//! Configuration Types
//!
//! 定义所有配置结构体

use serde::Deserialize;
use std::path::PathBuf;

use crate::domain::conversion::ConversionDefaults;
use crate::domain::mixing::MixConfig;

/// 应用主配置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// 服务器配置
    #[serde(default)]
    pub server: ServerConfig,

    /// 声音转换服务 (so-vits-svc API) 配置
    #[serde(default)]
    pub svc: SvcConfig,

    /// 人声分离服务 (MSST-WebUI API) 配置
    #[serde(default)]
    pub msst: MsstConfig,

    /// 高潮检测服务配置
    #[serde(default)]
    pub chorus: ChorusConfig,

    /// 各平台音源网关配置
    #[serde(default)]
    pub sources: SourcesConfig,

    /// 转换任务配置（队列容量、超时、默认参数）
    #[serde(default)]
    pub conversion: ConversionConfig,

    /// 混音配置
    #[serde(default)]
    pub mixing: MixConfig,

    /// 产物缓存配置
    #[serde(default)]
    pub cache: CacheConfig,

    /// Worker 配置
    #[serde(default)]
    pub worker: WorkerConfig,

    /// GC 配置
    #[serde(default)]
    pub gc: GcConfig,

    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// 监听地址
    #[serde(default = "default_host")]
    pub host: String,

    /// 监听端口
    #[serde(default = "default_port")]
    pub port: u16,

    /// 上传文件最大大小（字节），默认 50MB
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5070
}

fn default_max_upload_size() -> usize {
    50 * 1024 * 1024 // 50 MB
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_upload_size: default_max_upload_size(),
        }
    }
}

impl ServerConfig {
    /// 获取服务器地址
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// 声音转换服务配置
#[derive(Debug, Clone, Deserialize)]
pub struct SvcConfig {
    /// 服务基础 URL
    #[serde(default = "default_svc_url")]
    pub url: String,

    /// 请求超时时间（秒）
    #[serde(default = "default_upstream_timeout")]
    pub timeout_secs: u64,

    /// 转换前检查服务健康状态（模型是否加载、服务端队列是否已满）
    #[serde(default = "default_true")]
    pub preflight: bool,

    /// 使用内置 fake 服务（本地调试用，不访问任何上游）
    #[serde(default)]
    pub use_fake: bool,
}

fn default_svc_url() -> String {
    "http://localhost:1145".to_string()
}

fn default_upstream_timeout() -> u64 {
    300
}

fn default_true() -> bool {
    true
}

impl Default for SvcConfig {
    fn default() -> Self {
        Self {
            url: default_svc_url(),
            timeout_secs: default_upstream_timeout(),
            preflight: true,
            use_fake: false,
        }
    }
}

/// 人声分离服务配置
#[derive(Debug, Clone, Deserialize)]
pub struct MsstConfig {
    /// 服务基础 URL
    #[serde(default = "default_msst_url")]
    pub url: String,

    /// 请求超时时间（秒）
    #[serde(default = "default_upstream_timeout")]
    pub timeout_secs: u64,
}

fn default_msst_url() -> String {
    "http://localhost:9000".to_string()
}

impl Default for MsstConfig {
    fn default() -> Self {
        Self {
            url: default_msst_url(),
            timeout_secs: default_upstream_timeout(),
        }
    }
}

/// 高潮检测服务配置
#[derive(Debug, Clone, Deserialize)]
pub struct ChorusConfig {
    /// 服务基础 URL
    #[serde(default = "default_chorus_url")]
    pub url: String,

    /// 鉴权 token（Bearer）
    #[serde(default)]
    pub token: Option<String>,

    /// 请求超时时间（秒）
    #[serde(default = "default_chorus_timeout")]
    pub timeout_secs: u64,
}

fn default_chorus_url() -> String {
    "http://localhost:9100".to_string()
}

fn default_chorus_timeout() -> u64 {
    60
}

impl Default for ChorusConfig {
    fn default() -> Self {
        Self {
            url: default_chorus_url(),
            token: None,
            timeout_secs: default_chorus_timeout(),
        }
    }
}

/// 单个平台的音源网关配置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlatformConfig {
    /// 网关 URL，未配置时该平台不可用
    #[serde(default)]
    pub url: Option<String>,

    /// 平台凭据（cookie / token），原样转发给网关
    #[serde(default)]
    pub credentials: Option<String>,
}

/// 各平台音源网关配置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourcesConfig {
    #[serde(default)]
    pub netease: PlatformConfig,

    #[serde(default)]
    pub qq: PlatformConfig,

    #[serde(default)]
    pub bilibili: PlatformConfig,

    #[serde(default)]
    pub douyin: PlatformConfig,

    /// 下载超时时间（秒）
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,
}

fn default_fetch_timeout() -> u64 {
    120
}

/// 转换任务配置
#[derive(Debug, Clone, Deserialize)]
pub struct ConversionConfig {
    /// 队列容量（排队 + 运行中）
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,

    /// 单个任务超时时间（秒）
    #[serde(default = "default_upstream_timeout")]
    pub timeout_secs: u64,

    /// 快速定位模式截取的时长（秒）
    #[serde(default = "default_fast_seek_window")]
    pub fast_seek_window_secs: f64,

    /// 已结束任务在内存中保留的时间（秒）
    #[serde(default = "default_job_retention")]
    pub job_retention_secs: u64,

    /// 默认转换参数
    #[serde(default)]
    pub defaults: ConversionDefaults,
}

fn default_max_queue_size() -> usize {
    100
}

fn default_fast_seek_window() -> f64 {
    30.0
}

fn default_job_retention() -> u64 {
    3600 // 1 小时
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            max_queue_size: default_max_queue_size(),
            timeout_secs: default_upstream_timeout(),
            fast_seek_window_secs: default_fast_seek_window(),
            job_retention_secs: default_job_retention(),
            defaults: ConversionDefaults::default(),
        }
    }
}

/// 产物缓存配置
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// 缓存目录
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,

    /// 最大缓存大小（字节）
    #[serde(default = "default_max_cache_size")]
    pub max_size_bytes: u64,

    /// 最大缓存时间（秒）
    #[serde(default = "default_max_cache_age")]
    pub max_age_secs: u64,
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("data/cache")
}

fn default_max_cache_size() -> u64 {
    1024 * 1024 * 1024 // 1 GB
}

fn default_max_cache_age() -> u64 {
    7 * 24 * 3600 // 7 天
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            max_size_bytes: default_max_cache_size(),
            max_age_secs: default_max_cache_age(),
        }
    }
}

impl CacheConfig {
    /// 产物文件目录
    pub fn artifacts_dir(&self) -> PathBuf {
        self.dir.join("artifacts")
    }

    /// sled 索引路径
    pub fn index_path(&self) -> PathBuf {
        self.dir.join("index.sled")
    }

    /// 高潮区间缓存文件路径
    pub fn chorus_cache_path(&self) -> PathBuf {
        self.dir.join("chorus_cache.json")
    }
}

/// Worker 配置
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// 并发执行的任务数（默认单通道 FIFO）
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

fn default_max_concurrent() -> usize {
    1
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
        }
    }
}

/// GC（缓存清理）配置
#[derive(Debug, Clone, Deserialize)]
pub struct GcConfig {
    /// 是否启用周期清理
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// 清理间隔时间（秒）
    #[serde(default = "default_gc_interval")]
    pub interval_secs: u64,
}

fn default_gc_interval() -> u64 {
    3600 // 1 小时
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_gc_interval(),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: String,

    /// 是否启用 JSON 格式
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

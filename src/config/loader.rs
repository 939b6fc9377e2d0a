//! Configuration Loader
//!
//! 实现多源配置加载与合并逻辑
//!
//! 优先级（从高到低）：
//! 1. 环境变量
//! 2. 配置文件（config.toml）
//! 3. 默认值

use config::{Config, ConfigError as ConfigCrateError, Environment, File};
use std::path::Path;
use thiserror::Error;

use super::types::AppConfig;

/// 配置加载错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigCrateError> for ConfigError {
    fn from(err: ConfigCrateError) -> Self {
        ConfigError::LoadError(err.to_string())
    }
}

/// 配置文件搜索路径
const CONFIG_FILE_NAMES: &[&str] = &["config", "config.local"];

/// 加载应用配置
///
/// 按优先级从高到低合并配置：
/// 1. 环境变量（前缀 `SVCHUB_`，层级分隔符 `__`）
/// 2. 配置文件（config.toml 或 config.local.toml）
/// 3. 默认值
///
/// # 环境变量示例
/// - `SVCHUB_SERVER__PORT=8080`
/// - `SVCHUB_SVC__URL=http://svc-server:1145`
/// - `SVCHUB_CONVERSION__MAX_QUEUE_SIZE=20`
/// - `SVCHUB_CONVERSION__DEFAULTS__SPEAKER=1`
/// - `SVCHUB_CACHE__DIR=/data/cache`
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from_path(None)
}

/// 从指定路径加载配置
///
/// # 参数
/// - `config_path` - 可选的配置文件路径，如果为 None 则使用默认搜索路径
pub fn load_config_from_path(config_path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder();

    // 1. 首先设置默认值（最低优先级）
    builder = builder
        .set_default("server.host", "0.0.0.0")?
        .set_default("server.port", 5070)?
        .set_default("svc.url", "http://localhost:1145")?
        .set_default("svc.timeout_secs", 300)?
        .set_default("msst.url", "http://localhost:9000")?
        .set_default("msst.timeout_secs", 300)?
        .set_default("chorus.url", "http://localhost:9100")?
        .set_default("chorus.timeout_secs", 60)?
        .set_default("conversion.max_queue_size", 100)?
        .set_default("conversion.timeout_secs", 300)?
        .set_default("cache.dir", "data/cache")?
        .set_default("cache.max_size_bytes", 1024_u64 * 1024 * 1024)?
        .set_default("cache.max_age_secs", 7_u64 * 24 * 3600)?
        .set_default("worker.max_concurrent", 1)?
        .set_default("gc.enabled", true)?
        .set_default("gc.interval_secs", 3600)?
        .set_default("log.level", "info")?
        .set_default("log.json", false)?;

    // 2. 添加配置文件（如果存在）
    if let Some(path) = config_path {
        builder = builder.add_source(File::from(path).required(true));
    } else {
        for name in CONFIG_FILE_NAMES {
            builder = builder.add_source(File::with_name(name).required(false));
        }
    }

    // 3. 添加环境变量（最高优先级）
    // 注意: 环境变量名会被转换为小写
    builder = builder.add_source(
        Environment::with_prefix("SVCHUB")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;

    let app_config: AppConfig = config.try_deserialize().map_err(|e| {
        ConfigError::ParseError(format!("Failed to deserialize config: {}", e))
    })?;

    validate_config(&app_config)?;

    Ok(app_config)
}

/// 验证配置有效性
fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "Server port cannot be 0".to_string(),
        ));
    }

    if !config.svc.use_fake {
        if config.svc.url.is_empty() {
            return Err(ConfigError::ValidationError(
                "SVC URL cannot be empty".to_string(),
            ));
        }
        if config.msst.url.is_empty() {
            return Err(ConfigError::ValidationError(
                "MSST URL cannot be empty".to_string(),
            ));
        }
    }

    if config.conversion.max_queue_size == 0 {
        return Err(ConfigError::ValidationError(
            "max_queue_size must be at least 1".to_string(),
        ));
    }

    if config.conversion.timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "Conversion timeout cannot be 0".to_string(),
        ));
    }

    if config.conversion.fast_seek_window_secs <= 0.0 {
        return Err(ConfigError::ValidationError(
            "fast_seek_window_secs must be positive".to_string(),
        ));
    }

    config
        .conversion
        .defaults
        .validate()
        .map_err(|e| ConfigError::ValidationError(format!("Invalid conversion defaults: {}", e)))?;

    config
        .mixing
        .validate()
        .map_err(|e| ConfigError::ValidationError(format!("Invalid mixing config: {}", e)))?;

    if config.cache.max_size_bytes == 0 {
        return Err(ConfigError::ValidationError(
            "Cache max size cannot be 0".to_string(),
        ));
    }

    if config.worker.max_concurrent == 0 {
        return Err(ConfigError::ValidationError(
            "Worker max_concurrent must be at least 1".to_string(),
        ));
    }

    if config.gc.enabled && config.gc.interval_secs == 0 {
        return Err(ConfigError::ValidationError(
            "GC interval cannot be 0 when GC is enabled".to_string(),
        ));
    }

    Ok(())
}

/// 打印配置信息（用于启动时日志）
pub fn print_config(config: &AppConfig) {
    tracing::info!("=== Application Configuration ===");
    tracing::info!("Server: {}:{}", config.server.host, config.server.port);
    if config.svc.use_fake {
        tracing::info!("Upstream: fake services (no network calls)");
    } else {
        tracing::info!("SVC URL: {}", config.svc.url);
        tracing::info!("MSST URL: {}", config.msst.url);
        tracing::info!("Chorus URL: {}", config.chorus.url);
    }
    tracing::info!("Upstream Timeout: {}s", config.svc.timeout_secs);
    tracing::info!("Max Queue Size: {}", config.conversion.max_queue_size);
    tracing::info!("Job Timeout: {}s", config.conversion.timeout_secs);
    tracing::info!("Default Speaker: {}", config.conversion.defaults.speaker);
    tracing::info!("Default Pitch: {}", config.conversion.defaults.pitch);
    tracing::info!("Default Preset: {}", config.conversion.defaults.preset);
    tracing::info!("Mixing Enabled: {}", config.conversion.defaults.enable_mixing);
    tracing::info!("Mix Sample Rate: {}", config.mixing.sample_rate);
    tracing::info!("Mix Tempo Sync: {}", config.mixing.tempo_sync);
    tracing::info!("Cache Directory: {:?}", config.cache.dir);
    tracing::info!("Cache Max Size: {} bytes", config.cache.max_size_bytes);
    tracing::info!("Cache Max Age: {}s", config.cache.max_age_secs);
    tracing::info!("Worker Concurrency: {}", config.worker.max_concurrent);
    tracing::info!("GC Enabled: {}", config.gc.enabled);
    if config.gc.enabled {
        tracing::info!("GC Interval: {}s", config.gc.interval_secs);
    }
    tracing::info!("Log Level: {}", config.log.level);
    tracing::info!("=================================");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_validation_passes_for_valid_config() {
        let config = AppConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validation_error_for_zero_port() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validation_error_for_empty_svc_url() {
        let mut config = AppConfig::default();
        config.svc.url = String::new();
        assert!(validate_config(&config).is_err());

        config.svc.use_fake = true;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validation_error_for_zero_queue_size() {
        let mut config = AppConfig::default();
        config.conversion.max_queue_size = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validation_error_for_out_of_range_default_pitch() {
        let mut config = AppConfig::default();
        config.conversion.defaults.pitch = 13;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("svc-hub.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[server]
port = 9999

[conversion]
max_queue_size = 3

[conversion.defaults]
speaker = "alice"
pitch = -3

[mixing]
headroom_db = -6.0
"#
        )
        .unwrap();

        let config = load_config_from_path(Some(&path)).unwrap();
        assert_eq!(config.server.port, 9999);
        assert_eq!(config.conversion.max_queue_size, 3);
        assert_eq!(config.conversion.defaults.speaker, "alice");
        assert_eq!(config.conversion.defaults.pitch, -3);
        assert_eq!(config.conversion.defaults.k_step, 100);
        assert_eq!(config.mixing.headroom_db, -6.0);
        assert_eq!(config.mixing.voc_input_db, -4.0);
    }
}

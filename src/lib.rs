//! svc-hub - 歌声转换编排服务
//!
//! 架构设计: DDD + CQRS + Hexagonal Architecture
//!
//! 领域层 (domain/):
//! - Conversion Context: 参数、音源、任务状态机
//! - Audio: PCM 缓冲区与重采样
//! - Mixing: 人声/伴奏混音
//!
//! 应用层 (application/):
//! - Ports: 端口定义（JobQueue, ArtifactCache, ChorusCache, 上游服务, 音源）
//! - Pipeline: 转换流水线
//! - Commands / Queries: CQRS 处理器
//!
//! 基础设施层 (infrastructure/):
//! - HTTP: RESTful API
//! - Memory: 内存任务队列
//! - Worker: 转换 Worker 与缓存清理
//! - Persistence: Sled 产物缓存 + JSON 高潮缓存
//! - Adapters: 上游 HTTP 客户端、音源网关、解码器、假服务

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::{load_config, AppConfig};

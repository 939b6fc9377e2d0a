//! Persistence Layer - 数据持久化
//!
//! Sled 索引的产物缓存与 JSON 文件的高潮缓存

pub mod json;
pub mod sled;

pub use self::json::JsonChorusCache;
pub use self::sled::{SledArtifactCache, SledCacheConfig};

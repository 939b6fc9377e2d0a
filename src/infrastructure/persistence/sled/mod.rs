//! Sled 存储实现

mod artifact_cache;

pub use artifact_cache::{SledArtifactCache, SledCacheConfig};

//! JSON 文件存储实现

mod chorus_cache;

pub use chorus_cache::JsonChorusCache;

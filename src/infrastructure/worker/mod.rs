//! Worker Layer - Background Task Processing
//!
//! 实现 ConversionWorker（消费任务队列）与 CacheSweeper（周期淘汰）

mod cache_sweeper;
mod conversion_worker;

pub use cache_sweeper::{CacheSweeper, CacheSweeperConfig};
pub use conversion_worker::{ConversionWorker, ConversionWorkerConfig};

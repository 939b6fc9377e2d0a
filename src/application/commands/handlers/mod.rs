//! 命令处理器

mod admin_handlers;
mod cache_handlers;
mod conversion_handlers;

pub use admin_handlers::*;
pub use cache_handlers::*;
pub use conversion_handlers::*;

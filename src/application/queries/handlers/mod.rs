//! Query Handlers 实现

mod catalog_handlers;
mod job_handlers;
mod system_handlers;

pub use catalog_handlers::*;
pub use job_handlers::*;
pub use system_handlers::*;

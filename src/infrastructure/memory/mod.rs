//! Memory Layer - In-Memory State Management
//!
//! 实现 JobQueue，管理转换任务的内存状态

mod job_queue;

pub use job_queue::InMemoryJobQueue;

//! Infrastructure Adapters
//!
//! 六边形架构的适配器实现

pub mod codec;
pub mod fake;
pub mod source;
pub mod upstream;

pub use codec::*;
pub use source::*;
pub use upstream::*;

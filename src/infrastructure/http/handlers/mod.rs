//! HTTP Handlers

mod admin;
mod cache;
mod catalog;
mod convert;
mod ping;
mod status;

pub use admin::*;
pub use cache::*;
pub use catalog::*;
pub use convert::*;
pub use ping::*;
pub use status::*;

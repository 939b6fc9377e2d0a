//! Audio - 音频缓冲区与增益换算

mod buffer;

pub use buffer::{db_to_gain, gain_to_db, AudioBuffer};

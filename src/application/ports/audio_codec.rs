//! Audio Codec Port - 音频编解码抽象
//!
//! 解码 WAV/MP3/FLAC 为平面 f32 缓冲区，编码 16-bit PCM WAV。
//! CPU 密集，调用方负责放到阻塞线程池执行。

use thiserror::Error;

use crate::domain::audio::AudioBuffer;

/// 编解码错误
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Decoding error: {0}")]
    DecodingError(String),

    #[error("Encoding error: {0}")]
    EncodingError(String),
}

/// Audio Codec Port
pub trait AudioCodecPort: Send + Sync {
    /// 解码音频
    ///
    /// `hint` 为文件扩展名（如 "mp3"），用于辅助格式探测
    fn decode(&self, data: &[u8], hint: Option<&str>) -> Result<AudioBuffer, CodecError>;

    /// 编码为 16-bit PCM WAV
    fn encode_wav(&self, buffer: &AudioBuffer) -> Result<Vec<u8>, CodecError>;
}

//! Codec Adapter - 音频编解码实现

mod symphonia_codec;

pub use symphonia_codec::SymphoniaCodec;

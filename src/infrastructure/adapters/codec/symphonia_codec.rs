//! Symphonia Codec - 基于 symphonia 的音频编解码器
//!
//! 支持：
//! - WAV / MP3 / FLAC 解码为平面 f32 缓冲区
//! - 16-bit PCM WAV 编码

use std::io::Cursor;
use std::sync::Arc;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::application::ports::{AudioCodecPort, CodecError};
use crate::domain::audio::AudioBuffer;

const BITS_PER_SAMPLE: u16 = 16;

/// Symphonia 编解码器
#[derive(Debug, Clone, Copy, Default)]
pub struct SymphoniaCodec;

impl SymphoniaCodec {
    pub fn new() -> Self {
        Self
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }
}

impl AudioCodecPort for SymphoniaCodec {
    fn decode(&self, data: &[u8], hint: Option<&str>) -> Result<AudioBuffer, CodecError> {
        if data.is_empty() {
            return Err(CodecError::InvalidInput("empty audio data".to_string()));
        }

        let cursor = Cursor::new(data.to_vec());
        let mss = MediaSourceStream::new(Box::new(cursor), Default::default());

        let mut probe_hint = Hint::new();
        if let Some(ext) = hint {
            probe_hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &probe_hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| match e {
                SymphoniaError::Unsupported(what) => CodecError::UnsupportedFormat(what.to_string()),
                other => CodecError::DecodingError(format!("Probe failed: {}", other)),
            })?;

        let mut format = probed.format;

        let track = format
            .default_track()
            .ok_or_else(|| CodecError::DecodingError("No audio track found".to_string()))?;

        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| CodecError::DecodingError("Unknown sample rate".to_string()))?;

        let mut channel_count = track.codec_params.channels.map(|c| c.count()).unwrap_or(0);

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| CodecError::DecodingError(format!("Decoder creation failed: {}", e)))?;

        let track_id = track.id;
        let mut samples: Vec<f32> = Vec::new();

        loop {
            let packet = match format.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    break;
                }
                Err(e) => {
                    return Err(CodecError::DecodingError(format!("Packet read error: {}", e)));
                }
            };

            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(d) => d,
                Err(SymphoniaError::DecodeError(e)) => {
                    tracing::warn!(error = %e, "Decode error (skipping packet)");
                    continue;
                }
                Err(e) => return Err(CodecError::DecodingError(e.to_string())),
            };

            let spec = *decoded.spec();
            let num_frames = decoded.frames();
            channel_count = spec.channels.count();
            let mut sample_buf = SampleBuffer::<f32>::new(num_frames as u64, spec);
            sample_buf.copy_interleaved_ref(decoded);
            let actual_samples = num_frames * channel_count;
            samples.extend(&sample_buf.samples()[..actual_samples]);
        }

        if channel_count == 0 {
            return Err(CodecError::DecodingError("Unknown channel count".to_string()));
        }
        if samples.is_empty() {
            return Err(CodecError::DecodingError("No audio frames decoded".to_string()));
        }

        Ok(AudioBuffer::from_interleaved(&samples, channel_count, sample_rate))
    }

    fn encode_wav(&self, buffer: &AudioBuffer) -> Result<Vec<u8>, CodecError> {
        let num_channels = u16::try_from(buffer.channel_count())
            .ok()
            .filter(|&c| c > 0)
            .ok_or_else(|| {
                CodecError::EncodingError(format!(
                    "unsupported channel count: {}",
                    buffer.channel_count()
                ))
            })?;
        let sample_rate = buffer.sample_rate();
        let bytes_per_sample = (BITS_PER_SAMPLE / 8) as u32;
        let byte_rate = sample_rate * num_channels as u32 * bytes_per_sample;
        let block_align = num_channels * (BITS_PER_SAMPLE / 8);

        let data_size = buffer.frames() as u64 * num_channels as u64 * bytes_per_sample as u64;
        let file_size = u32::try_from(36 + data_size)
            .map_err(|_| CodecError::EncodingError("audio too long for WAV".to_string()))?;

        let mut wav = Vec::with_capacity(44 + data_size as usize);

        // RIFF header
        wav.extend_from_slice(b"RIFF");
        wav.extend_from_slice(&file_size.to_le_bytes());
        wav.extend_from_slice(b"WAVE");

        // fmt chunk
        wav.extend_from_slice(b"fmt ");
        wav.extend_from_slice(&16u32.to_le_bytes()); // chunk size
        wav.extend_from_slice(&1u16.to_le_bytes()); // PCM format
        wav.extend_from_slice(&num_channels.to_le_bytes());
        wav.extend_from_slice(&sample_rate.to_le_bytes());
        wav.extend_from_slice(&byte_rate.to_le_bytes());
        wav.extend_from_slice(&block_align.to_le_bytes());
        wav.extend_from_slice(&BITS_PER_SAMPLE.to_le_bytes());

        // data chunk
        wav.extend_from_slice(b"data");
        wav.extend_from_slice(&(data_size as u32).to_le_bytes());
        for sample in buffer.to_interleaved() {
            let pcm = (sample.clamp(-1.0, 1.0) * 32767.0) as i16;
            wav.extend_from_slice(&pcm.to_le_bytes());
        }

        Ok(wav)
    }
}

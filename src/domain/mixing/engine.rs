//! Mixing Engine - 人声与伴奏合成
//!
//! 固定顺序：对齐 → 增益 → 混响 → EQ → 淡入淡出 → 压缩 → 母带。
//! 纯函数，同样的输入与配置总是得到逐样本相同的输出。
//! 启用速度同步时，混响预延迟取板式混响档、压缩释放取慢速档。

use crate::domain::audio::{db_to_gain, AudioBuffer};

use super::align::{estimate_lag, shift_channels};
use super::config::MixConfig;
use super::dynamics::{apply_fades, compress, hard_clip, master, CompressorParams};
use super::filters::{apply_chain, instrumental_chain, reverb_return_chain, vocal_chain};
use super::reverb::{render_wet, ReverbParams};
use super::tempo::{estimate_bpm, TempoTimes};
use super::MixError;

/// 合成人声与伴奏
///
/// 两条音轨必须与 `config.sample_rate` 一致；单声道人声会被复制到伴奏的声道数，
/// 输出最多两个声道。
pub fn mix(
    vocal: &AudioBuffer,
    instrumental: &AudioBuffer,
    config: &MixConfig,
) -> Result<AudioBuffer, MixError> {
    let sample_rate = config.sample_rate;
    if vocal.sample_rate() != sample_rate || instrumental.sample_rate() != sample_rate {
        return Err(MixError::SampleRateMismatch {
            expected: sample_rate,
            vocal: vocal.sample_rate(),
            instrumental: instrumental.sample_rate(),
        });
    }
    if vocal.is_empty() || instrumental.is_empty() {
        return Err(MixError::EmptyInput);
    }

    let stages = &config.stages;
    let timing = resolve_timing(instrumental, config);
    let channel_count = vocal
        .channel_count()
        .max(instrumental.channel_count())
        .clamp(1, 2);
    let mut voc = vocal.to_channel_count(channel_count).into_channels();
    let mut inst = instrumental.to_channel_count(channel_count).into_channels();

    // 1. 对齐
    if stages.align {
        let window = (config.align_window_secs * sample_rate as f32) as usize;
        let max_lag = config.ms_to_frames(config.max_align_lag_ms as f32);
        let lag = estimate_lag(&mono(&voc), &mono(&inst), window, max_lag);
        shift_channels(&mut voc, lag);
    }
    let frames = voc[0].len().min(inst[0].len());
    for ch in voc.iter_mut().chain(inst.iter_mut()) {
        ch.truncate(frames);
    }
    if frames == 0 {
        return Ok(AudioBuffer::silence(sample_rate, channel_count, 0));
    }

    // 2. 增益
    if stages.gain {
        scale(&mut voc, db_to_gain(config.voc_input_db));
        scale(&mut inst, db_to_gain(config.headroom_db));
        let peak = summed_peak(&voc, &inst);
        if peak > 1.0 {
            let common = 1.0 / peak;
            scale(&mut voc, common);
            scale(&mut inst, common);
        }
    }

    // 3. 混响（湿信号经返回 EQ 后叠加到干声）
    if stages.reverb {
        let params = ReverbParams {
            room_size: config.reverb_room_size,
            damping: config.reverb_damping,
            pre_delay_frames: config.ms_to_frames(timing.pre_delay_ms),
        };
        let mut wet = render_wet(&voc, sample_rate, params);
        let return_eq = reverb_return_chain(sample_rate);
        let level = db_to_gain(config.reverb_wet_db + config.revb_gain_db);
        for (dry, wet) in voc.iter_mut().zip(wet.iter_mut()) {
            apply_chain(wet, &return_eq);
            for (d, w) in dry.iter_mut().zip(wet.iter()) {
                *d += w * level;
            }
        }
    }

    // 4. EQ
    if stages.eq {
        let vocal_eq = vocal_chain(sample_rate);
        let inst_eq = instrumental_chain(sample_rate);
        for ch in voc.iter_mut() {
            apply_chain(ch, &vocal_eq);
        }
        for ch in inst.iter_mut() {
            apply_chain(ch, &inst_eq);
        }
    }

    let mut out: Vec<Vec<f32>> = voc
        .iter()
        .zip(inst.iter())
        .map(|(v, i)| v.iter().zip(i.iter()).map(|(a, b)| a + b).collect())
        .collect();

    // 5. 淡入淡出
    if stages.fades {
        apply_fades(
            &mut out,
            config.ms_to_frames(config.fade_in_ms as f32),
            config.ms_to_frames(config.fade_out_ms as f32),
        );
    }

    // 6. 压缩
    if stages.compression {
        compress(
            &mut out,
            CompressorParams {
                threshold_db: config.comp_threshold_db,
                ratio: config.comp_ratio,
                attack_ms: config.comp_attack_ms,
                release_ms: timing.release_ms,
                sample_rate,
            },
        );
    }

    // 7. 母带
    if stages.mastering {
        master(&mut out, config.target_peak_db);
    } else {
        hard_clip(&mut out);
    }

    Ok(AudioBuffer::new(sample_rate, out))
}

/// 本次混音实际使用的时间参数 (ms)
#[derive(Debug, Clone, Copy, PartialEq)]
struct MixTiming {
    pre_delay_ms: f32,
    release_ms: f32,
}

fn resolve_timing(instrumental: &AudioBuffer, config: &MixConfig) -> MixTiming {
    let configured = MixTiming {
        pre_delay_ms: config.reverb_pre_delay_ms,
        release_ms: config.comp_release_ms,
    };
    let stages = &config.stages;
    if !config.tempo_sync || !(stages.reverb || stages.compression) {
        return configured;
    }

    match estimate_bpm(&instrumental.mono_mix(), instrumental.sample_rate()) {
        Some(bpm) => {
            let times = TempoTimes::from_bpm(bpm);
            MixTiming {
                pre_delay_ms: times.pre_delay_plate.clamp(0.0, 500.0) as f32,
                release_ms: times.release_slow.max(1.0) as f32,
            }
        }
        None => configured,
    }
}

fn mono(channels: &[Vec<f32>]) -> Vec<f32> {
    match channels {
        [only] => only.clone(),
        _ => {
            let frames = channels.first().map(Vec::len).unwrap_or(0);
            let n = channels.len() as f32;
            (0..frames)
                .map(|i| channels.iter().map(|c| c[i]).sum::<f32>() / n)
                .collect()
        }
    }
}

fn scale(channels: &mut [Vec<f32>], gain: f32) {
    for ch in channels.iter_mut() {
        for s in ch.iter_mut() {
            *s *= gain;
        }
    }
}

fn summed_peak(a: &[Vec<f32>], b: &[Vec<f32>]) -> f32 {
    a.iter()
        .zip(b.iter())
        .flat_map(|(x, y)| x.iter().zip(y.iter()).map(|(p, q)| (p + q).abs()))
        .fold(0.0f32, f32::max)
}

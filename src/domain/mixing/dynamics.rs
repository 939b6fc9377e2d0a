//! 动态处理：淡入淡出、压缩、母带

use crate::domain::audio::{db_to_gain, gain_to_db};

/// 升余弦淡入淡出，长度各自不超过总帧数的一半
pub fn apply_fades(channels: &mut [Vec<f32>], fade_in: usize, fade_out: usize) {
    let frames = channels.first().map(|c| c.len()).unwrap_or(0);
    if frames == 0 {
        return;
    }
    let fade_in = fade_in.min(frames / 2);
    let fade_out = fade_out.min(frames / 2);

    let curve = |i: usize, len: usize| -> f32 {
        let x = i as f32 / len as f32;
        0.5 - 0.5 * (std::f32::consts::PI * x).cos()
    };

    for ch in channels.iter_mut() {
        for i in 0..fade_in {
            ch[i] *= curve(i, fade_in);
        }
        for i in 0..fade_out {
            // 最后一帧增益为 0
            ch[frames - 1 - i] *= curve(i, fade_out);
        }
    }
}

/// 压缩器参数
#[derive(Debug, Clone, Copy)]
pub struct CompressorParams {
    pub threshold_db: f32,
    pub ratio: f32,
    pub attack_ms: f32,
    pub release_ms: f32,
    pub sample_rate: u32,
}

/// 立体声联动的前馈压缩器
///
/// 检测各声道峰值的最大值，在 dB 域计算增益衰减并以 attack/release 平滑
pub fn compress(channels: &mut [Vec<f32>], params: CompressorParams) {
    let frames = channels.first().map(|c| c.len()).unwrap_or(0);
    if frames == 0 || params.ratio <= 1.0 {
        return;
    }

    let sr = params.sample_rate as f32;
    // coeff = exp(-1 / (τ × fs))
    let attack_coeff = (-1.0 / (params.attack_ms / 1000.0 * sr)).exp();
    let release_coeff = (-1.0 / (params.release_ms / 1000.0 * sr)).exp();
    let slope = 1.0 - 1.0 / params.ratio;

    let mut reduction_db = 0.0f32;
    for i in 0..frames {
        let peak = channels
            .iter()
            .map(|c| c[i].abs())
            .fold(0.0f32, f32::max);
        let level_db = gain_to_db(peak);
        let over = level_db - params.threshold_db;
        let target = if over > 0.0 { over * slope } else { 0.0 };

        let coeff = if target > reduction_db {
            attack_coeff
        } else {
            release_coeff
        };
        reduction_db = target + coeff * (reduction_db - target);

        if reduction_db > 0.0 {
            let gain = db_to_gain(-reduction_db);
            for ch in channels.iter_mut() {
                ch[i] *= gain;
            }
        }
    }
}

/// 母带：峰值归一化到目标电平，再硬限幅到 ±1
pub fn master(channels: &mut [Vec<f32>], target_peak_db: f32) {
    let peak = channels
        .iter()
        .flat_map(|c| c.iter())
        .fold(0.0f32, |acc, s| acc.max(s.abs()));
    if peak > 0.0 {
        let gain = db_to_gain(target_peak_db) / peak;
        for ch in channels.iter_mut() {
            for s in ch.iter_mut() {
                *s = (*s * gain).clamp(-1.0, 1.0);
            }
        }
    }
}

/// 旁路母带时的安全限幅
pub fn hard_clip(channels: &mut [Vec<f32>]) {
    for ch in channels.iter_mut() {
        for s in ch.iter_mut() {
            *s = s.clamp(-1.0, 1.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_fades_shape() {
        let mut channels = vec![vec![1.0f32; 1000]];
        apply_fades(&mut channels, 100, 200);
        assert_abs_diff_eq!(channels[0][0], 0.0);
        assert_abs_diff_eq!(channels[0][999], 0.0);
        assert_abs_diff_eq!(channels[0][500], 1.0);
        assert!(channels[0][50] > 0.0 && channels[0][50] < 1.0);
    }

    #[test]
    fn test_fades_clamped_to_half_length() {
        let mut channels = vec![vec![1.0f32; 10]];
        apply_fades(&mut channels, 1000, 1000);
        assert!(channels[0].iter().all(|s| s.is_finite() && *s <= 1.0));
    }

    #[test]
    fn test_compressor_reduces_loud_signal() {
        let mut loud = vec![vec![0.9f32; 44100]];
        compress(
            &mut loud,
            CompressorParams {
                threshold_db: -10.0,
                ratio: 4.0,
                attack_ms: 1.0,
                release_ms: 100.0,
                sample_rate: 44100,
            },
        );
        let tail = loud[0][40000];
        // 0.9 ≈ -0.92 dB，超出 9.08 dB，衰减 6.8 dB
        assert_abs_diff_eq!(gain_to_db(tail), -0.92 - 9.08 * 0.75, epsilon = 0.1);
    }

    #[test]
    fn test_compressor_leaves_quiet_signal() {
        let mut quiet = vec![vec![0.1f32; 1000]];
        compress(
            &mut quiet,
            CompressorParams {
                threshold_db: -10.0,
                ratio: 4.0,
                attack_ms: 1.0,
                release_ms: 100.0,
                sample_rate: 44100,
            },
        );
        assert!(quiet[0].iter().all(|&s| s == 0.1));
    }

    #[test]
    fn test_master_normalizes_peak() {
        let mut channels = vec![vec![0.25f32, -0.5, 0.1]];
        master(&mut channels, -6.0);
        let peak = channels[0].iter().fold(0.0f32, |a, s| a.max(s.abs()));
        assert_abs_diff_eq!(peak, db_to_gain(-6.0), epsilon = 1e-6);
    }
}

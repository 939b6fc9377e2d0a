//! 人声/伴奏时间对齐（FFT 互相关）

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

/// 能量低于该值视为静音，不做对齐
const SILENCE_ENERGY: f64 = 1e-12;

/// 估计人声相对伴奏的偏移（采样数）
///
/// 正值表示人声滞后，应丢弃人声开头的对应帧；负值表示人声超前。
/// 只分析前 `window` 帧，偏移绝对值不超过 `max_lag`。
/// 相关峰相等时取绝对值最小的偏移，静音输入返回 0。
pub fn estimate_lag(vocal: &[f32], instrumental: &[f32], window: usize, max_lag: usize) -> i64 {
    let v = &vocal[..vocal.len().min(window)];
    let i = &instrumental[..instrumental.len().min(window)];
    if v.is_empty() || i.is_empty() || max_lag == 0 {
        return 0;
    }

    let energy = |s: &[f32]| s.iter().map(|&x| (x as f64) * (x as f64)).sum::<f64>();
    if energy(v) < SILENCE_ENERGY || energy(i) < SILENCE_ENERGY {
        return 0;
    }

    let n = (v.len() + i.len()).next_power_of_two();
    let mut planner = FftPlanner::<f32>::new();
    let forward = planner.plan_fft_forward(n);
    let inverse = planner.plan_fft_inverse(n);

    let mut vs = to_complex(v, n);
    let mut is = to_complex(i, n);
    forward.process(&mut vs);
    forward.process(&mut is);

    let mut corr: Vec<Complex<f32>> = vs
        .iter()
        .zip(is.iter())
        .map(|(a, b)| a * b.conj())
        .collect();
    inverse.process(&mut corr);

    // corr[k] = Σ v[t + k] · i[t]，负偏移位于尾部
    let max_lag = max_lag.min(n / 2 - 1);
    let mut best_lag = 0i64;
    let mut best = corr[0].re;
    for k in 1..=max_lag {
        for (lag, value) in [(k as i64, corr[k].re), (-(k as i64), corr[n - k].re)] {
            if value > best {
                best = value;
                best_lag = lag;
            }
        }
    }

    if best <= 0.0 {
        0
    } else {
        best_lag
    }
}

fn to_complex(samples: &[f32], n: usize) -> Vec<Complex<f32>> {
    let mut buf = vec![Complex::new(0.0, 0.0); n];
    for (slot, &s) in buf.iter_mut().zip(samples) {
        slot.re = s;
    }
    buf
}

/// 按偏移平移人声：正值丢弃开头，负值在开头补零
pub fn shift_channels(channels: &mut [Vec<f32>], lag: i64) {
    if lag == 0 {
        return;
    }
    for ch in channels.iter_mut() {
        if lag > 0 {
            let drop = (lag as usize).min(ch.len());
            ch.drain(..drop);
        } else {
            let pad = lag.unsigned_abs() as usize;
            ch.splice(0..0, std::iter::repeat(0.0).take(pad));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 确定性伪随机信号
    fn noise(len: usize, seed: u32) -> Vec<f32> {
        let mut state = seed;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                (state >> 8) as f32 / (1u32 << 24) as f32 - 0.5
            })
            .collect()
    }

    #[test]
    fn test_recovers_known_delay() {
        let base = noise(20_000, 7);
        let mut delayed = vec![0.0f32; 300];
        delayed.extend_from_slice(&base);

        assert_eq!(estimate_lag(&delayed, &base, 16_000, 1_000), 300);
        assert_eq!(estimate_lag(&base, &delayed, 16_000, 1_000), -300);
    }

    #[test]
    fn test_lag_is_bounded() {
        let base = noise(20_000, 3);
        let mut delayed = vec![0.0f32; 3_000];
        delayed.extend_from_slice(&base);
        assert!(estimate_lag(&delayed, &base, 16_000, 1_000).abs() <= 1_000);
    }

    #[test]
    fn test_silence_and_identical_inputs_give_zero() {
        let silence = vec![0.0f32; 4096];
        let base = noise(4096, 11);
        assert_eq!(estimate_lag(&silence, &base, 4096, 500), 0);
        assert_eq!(estimate_lag(&base, &base, 4096, 500), 0);
    }

    #[test]
    fn test_shift_channels() {
        let mut channels = vec![vec![1.0, 2.0, 3.0, 4.0]];
        shift_channels(&mut channels, 2);
        assert_eq!(channels[0], vec![3.0, 4.0]);

        let mut channels = vec![vec![1.0, 2.0]];
        shift_channels(&mut channels, -2);
        assert_eq!(channels[0], vec![0.0, 0.0, 1.0, 2.0]);
    }
}

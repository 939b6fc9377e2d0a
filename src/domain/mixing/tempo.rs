//! 速度估计与节拍同步时间（混响预延迟、压缩释放）
//!
//! BPM 由起音包络的自相关峰得到；时间取值按音符、附点、三连音及其逐级减半
//! 生成候选，再吸附到各效果器的常用范围。

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

const FRAME: usize = 1024;
const HOP: usize = 512;
const MIN_BPM: f64 = 60.0;
const MAX_BPM: f64 = 200.0;
/// 只分析开头这段音频
const ANALYSIS_SECS: f64 = 30.0;
/// 候选时间的逐级减半次数
const HALVINGS: i32 = 5;

/// 估计速度 (BPM)，范围 60..=200
///
/// 音频短于两个最长节拍周期或没有起音变化时返回 None
pub fn estimate_bpm(samples: &[f32], sample_rate: u32) -> Option<f64> {
    let limit = (ANALYSIS_SECS * sample_rate as f64) as usize;
    let envelope = onset_envelope(&samples[..samples.len().min(limit)]);

    let frame_rate = sample_rate as f64 / HOP as f64;
    let min_lag = ((60.0 * frame_rate / MAX_BPM).floor() as usize).max(2);
    let max_lag = (60.0 * frame_rate / MIN_BPM).ceil() as usize;
    if envelope.len() < max_lag * 2 {
        return None;
    }

    let corr = autocorrelate(&envelope);
    if corr[0] <= f64::EPSILON {
        return None;
    }

    let (lag, peak) = (min_lag..=max_lag)
        .map(|k| (k, corr[k]))
        .fold((0, f64::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });
    if peak <= 0.0 {
        return None;
    }

    // 抛物线插值得到亚帧精度的周期
    let (y0, y1, y2) = (corr[lag - 1], corr[lag], corr[lag + 1]);
    let denom = y0 - 2.0 * y1 + y2;
    let offset = if denom.abs() > f64::EPSILON {
        (0.5 * (y0 - y2) / denom).clamp(-0.5, 0.5)
    } else {
        0.0
    };

    let bpm = 60.0 * frame_rate / (lag as f64 + offset);
    Some(bpm.clamp(MIN_BPM, MAX_BPM))
}

/// 对数帧能量的半波整流差分，去均值
fn onset_envelope(samples: &[f32]) -> Vec<f64> {
    if samples.len() < FRAME {
        return Vec::new();
    }
    let log_energy: Vec<f64> = (0..=(samples.len() - FRAME) / HOP)
        .map(|i| {
            let frame = &samples[i * HOP..i * HOP + FRAME];
            let energy = frame.iter().map(|&s| (s as f64) * (s as f64)).sum::<f64>() / FRAME as f64;
            (1.0 + 1000.0 * energy).ln()
        })
        .collect();

    let flux: Vec<f64> = log_energy
        .windows(2)
        .map(|w| (w[1] - w[0]).max(0.0))
        .collect();
    let mean = flux.iter().sum::<f64>() / flux.len().max(1) as f64;
    flux.into_iter().map(|v| v - mean).collect()
}

/// 有偏自相关 r[k] = Σ x[t]·x[t + k]
fn autocorrelate(x: &[f64]) -> Vec<f64> {
    let n = (x.len() * 2).next_power_of_two();
    let mut planner = FftPlanner::<f64>::new();
    let forward = planner.plan_fft_forward(n);
    let inverse = planner.plan_fft_inverse(n);

    let mut spectrum: Vec<Complex<f64>> = x
        .iter()
        .map(|&v| Complex::new(v, 0.0))
        .chain(std::iter::repeat(Complex::new(0.0, 0.0)))
        .take(n)
        .collect();
    forward.process(&mut spectrum);
    for bin in spectrum.iter_mut() {
        *bin = Complex::new(bin.norm_sqr(), 0.0);
    }
    inverse.process(&mut spectrum);

    spectrum[..x.len()].iter().map(|c| c.re / n as f64).collect()
}

/// 与速度同步的效果器时间 (ms)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempoTimes {
    /// 参与计算的 BPM（≥ 100 时已减半）
    pub bpm: f64,
    pub pre_delay_room_early: f64,
    pub pre_delay_room_late: f64,
    pub pre_delay_plate: f64,
    pub pre_delay_hall: f64,
    pub release_fast: f64,
    pub release_medium: f64,
    pub release_slow: f64,
    pub release_limiter: f64,
}

impl TempoTimes {
    pub fn from_bpm(bpm: f64) -> Self {
        let mut bpm = bpm.round().max(1.0);
        if bpm >= 100.0 {
            bpm /= 2.0;
        }
        // 一拍（四分音符）时长
        let beat_ms = 60_000.0 / bpm;

        let pre_delays = candidates(beat_ms / 8.0, 2);
        let releases = candidates(beat_ms * 2.0, 1);

        Self {
            bpm,
            pre_delay_room_early: 2.0 * snap(&pre_delays, 0.6, 1.0),
            pre_delay_room_late: 2.0 * snap(&pre_delays, 2.0, 4.0),
            pre_delay_plate: 2.0 * snap(&pre_delays, 10.0, 20.0),
            pre_delay_hall: 2.0 * snap(&pre_delays, 20.0, 40.0),
            release_fast: snap(&releases, 100.0, 200.0),
            release_medium: snap(&releases, 350.0, 500.0),
            release_slow: snap(&releases, 500.0, 1000.0),
            release_limiter: snap(&releases, 450.0, 800.0),
        }
    }
}

/// 音符、附点、三连音及其 1..=5 次减半，按 `decimals` 位小数取整后升序
fn candidates(note_ms: f64, decimals: i32) -> Vec<f64> {
    let scale = 10f64.powi(decimals);
    let mut times: Vec<f64> = [note_ms, note_ms * 1.5, note_ms * 2.0 / 3.0]
        .into_iter()
        .flat_map(|base| (0..=HALVINGS).map(move |h| base / 2f64.powi(h)))
        .map(|t| (t * scale).round() / scale)
        .collect();
    times.sort_by(|a, b| a.total_cmp(b));
    times
}

/// 所有候选都不短于 `range` 时取 `standard`，否则取最接近 `standard` 的候选
fn snap(times: &[f64], standard: f64, range: f64) -> f64 {
    let shortest = times.first().copied().unwrap_or(standard);
    if shortest >= range {
        return standard;
    }
    times
        .iter()
        .copied()
        .fold((standard, f64::INFINITY), |(best, best_diff), t| {
            let diff = (t - standard).abs();
            if diff < best_diff {
                (t, diff)
            } else {
                (best, best_diff)
            }
        })
        .0
}

//! Biquad filters (RBJ cookbook) and the fixed EQ curves used by the mix

/// Biquad 系数（已按 a0 归一化）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadCoeffs {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

/// 频率上限，避免接近 Nyquist 时系数失稳
fn clamp_freq(freq: f64, sample_rate: f64) -> f64 {
    freq.clamp(10.0, sample_rate * 0.45)
}

impl BiquadCoeffs {
    fn normalize(b0: f64, b1: f64, b2: f64, a0: f64, a1: f64, a2: f64) -> Self {
        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    /// 二阶高通
    pub fn high_pass(freq: f64, q: f64, sample_rate: f64) -> Self {
        let w0 = 2.0 * std::f64::consts::PI * clamp_freq(freq, sample_rate) / sample_rate;
        let (sin_w0, cos_w0) = w0.sin_cos();
        let alpha = sin_w0 / (2.0 * q);
        Self::normalize(
            (1.0 + cos_w0) / 2.0,
            -(1.0 + cos_w0),
            (1.0 + cos_w0) / 2.0,
            1.0 + alpha,
            -2.0 * cos_w0,
            1.0 - alpha,
        )
    }

    /// 峰值 EQ
    pub fn peaking(freq: f64, gain_db: f64, q: f64, sample_rate: f64) -> Self {
        let a = 10.0_f64.powf(gain_db / 40.0);
        let w0 = 2.0 * std::f64::consts::PI * clamp_freq(freq, sample_rate) / sample_rate;
        let (sin_w0, cos_w0) = w0.sin_cos();
        let alpha = sin_w0 / (2.0 * q);
        Self::normalize(
            1.0 + alpha * a,
            -2.0 * cos_w0,
            1.0 - alpha * a,
            1.0 + alpha / a,
            -2.0 * cos_w0,
            1.0 - alpha / a,
        )
    }

    /// 高架 (high shelf)，q 为斜率参数
    pub fn high_shelf(freq: f64, gain_db: f64, q: f64, sample_rate: f64) -> Self {
        let a = 10.0_f64.powf(gain_db / 40.0);
        let w0 = 2.0 * std::f64::consts::PI * clamp_freq(freq, sample_rate) / sample_rate;
        let (sin_w0, cos_w0) = w0.sin_cos();
        let alpha = sin_w0 / (2.0 * q);
        let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;
        Self::normalize(
            a * ((a + 1.0) + (a - 1.0) * cos_w0 + two_sqrt_a_alpha),
            -2.0 * a * ((a - 1.0) + (a + 1.0) * cos_w0),
            a * ((a + 1.0) + (a - 1.0) * cos_w0 - two_sqrt_a_alpha),
            (a + 1.0) - (a - 1.0) * cos_w0 + two_sqrt_a_alpha,
            2.0 * ((a - 1.0) - (a + 1.0) * cos_w0),
            (a + 1.0) - (a - 1.0) * cos_w0 - two_sqrt_a_alpha,
        )
    }
}

/// 单声道 Direct Form I 状态
#[derive(Debug, Clone, Default)]
struct BiquadState {
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl BiquadState {
    #[inline]
    fn process(&mut self, input: f64, c: &BiquadCoeffs) -> f64 {
        let out = c.b0 * input + c.b1 * self.x1 + c.b2 * self.x2 - c.a1 * self.y1 - c.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = out;
        out
    }
}

/// 串联滤波器链，对一条声道原地处理
pub fn apply_chain(samples: &mut [f32], chain: &[BiquadCoeffs]) {
    for coeffs in chain {
        let mut state = BiquadState::default();
        for s in samples.iter_mut() {
            *s = state.process(*s as f64, coeffs) as f32;
        }
    }
}

/// 人声 EQ：高通去低频浑浊、削弱 2.7k 刺耳、提升 1.4k 存在感与 8.5k 空气感
pub fn vocal_chain(sample_rate: u32) -> Vec<BiquadCoeffs> {
    let sr = sample_rate as f64;
    vec![
        BiquadCoeffs::high_pass(230.0, std::f64::consts::FRAC_1_SQRT_2, sr),
        BiquadCoeffs::peaking(2700.0, -2.0, 1.0, sr),
        BiquadCoeffs::high_shelf(20000.0, -2.0, 1.8, sr),
        BiquadCoeffs::peaking(1400.0, 3.0, 1.15, sr),
        BiquadCoeffs::peaking(8500.0, 2.5, 1.0, sr),
    ]
}

/// 伴奏 EQ：在人声主频段轻微下挖，减少掩蔽
pub fn instrumental_chain(sample_rate: u32) -> Vec<BiquadCoeffs> {
    let sr = sample_rate as f64;
    vec![
        BiquadCoeffs::peaking(1400.0, -1.5, 1.0, sr),
        BiquadCoeffs::peaking(3000.0, -1.5, 1.0, sr),
    ]
}

/// 混响返回 EQ
pub fn reverb_return_chain(sample_rate: u32) -> Vec<BiquadCoeffs> {
    let sr = sample_rate as f64;
    vec![
        BiquadCoeffs::peaking(1450.0, -4.0, 1.83, sr),
        BiquadCoeffs::peaking(2300.0, 5.0, 0.51, sr),
    ]
}

//! Freeverb 风格混响（8 路梳状 + 4 路全通，右声道错开 23 个采样）

const COMB_LENGTHS: [usize; 8] = [1557, 1617, 1491, 1422, 1277, 1356, 1188, 1116];
const ALLPASS_LENGTHS: [usize; 4] = [225, 556, 441, 341];
const STEREO_SPREAD: usize = 23;
const COMB_GAIN: f32 = 0.2;
const ALLPASS_FEEDBACK: f32 = 0.5;
/// 延迟长度按 44.1kHz 设计
const REFERENCE_RATE: f32 = 44100.0;

fn scaled_len(len: usize, sample_rate: u32) -> usize {
    ((len as f32 * sample_rate as f32 / REFERENCE_RATE).round() as usize).max(1)
}

/// 带一阶低通阻尼的梳状滤波器
struct Comb {
    buffer: Vec<f32>,
    pos: usize,
    filter_store: f32,
}

impl Comb {
    fn new(len: usize) -> Self {
        Self {
            buffer: vec![0.0; len],
            pos: 0,
            filter_store: 0.0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32, feedback: f32, damp: f32) -> f32 {
        let output = self.buffer[self.pos];
        self.filter_store = output * (1.0 - damp) + self.filter_store * damp;
        self.buffer[self.pos] = input + self.filter_store * feedback;
        self.pos = (self.pos + 1) % self.buffer.len();
        output
    }
}

struct AllPass {
    buffer: Vec<f32>,
    pos: usize,
}

impl AllPass {
    fn new(len: usize) -> Self {
        Self {
            buffer: vec![0.0; len],
            pos: 0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let buffered = self.buffer[self.pos];
        let output = buffered - input;
        self.buffer[self.pos] = input + buffered * ALLPASS_FEEDBACK;
        self.pos = (self.pos + 1) % self.buffer.len();
        output
    }
}

/// 单声道混响通道
struct ReverbChannel {
    combs: Vec<Comb>,
    allpasses: Vec<AllPass>,
}

impl ReverbChannel {
    fn new(sample_rate: u32, spread: usize) -> Self {
        Self {
            combs: COMB_LENGTHS
                .iter()
                .map(|&l| Comb::new(scaled_len(l + spread, sample_rate)))
                .collect(),
            allpasses: ALLPASS_LENGTHS
                .iter()
                .map(|&l| AllPass::new(scaled_len(l + spread, sample_rate)))
                .collect(),
        }
    }

    fn process(&mut self, input: f32, feedback: f32, damp: f32) -> f32 {
        let scaled = input * COMB_GAIN;
        let mut out = 0.0;
        for comb in &mut self.combs {
            out += comb.process(scaled, feedback, damp);
        }
        for allpass in &mut self.allpasses {
            out = allpass.process(out);
        }
        out
    }
}

/// 混响参数
#[derive(Debug, Clone, Copy)]
pub struct ReverbParams {
    pub room_size: f32,
    pub damping: f32,
    pub pre_delay_frames: usize,
}

/// 生成湿信号（100% wet），每条输入声道对应一条输出声道
///
/// 奇数声道使用错开的延迟长度以获得立体声宽度
pub fn render_wet(channels: &[Vec<f32>], sample_rate: u32, params: ReverbParams) -> Vec<Vec<f32>> {
    let feedback = 0.7 + params.room_size.clamp(0.0, 1.0) * 0.28;
    let damp = params.damping.clamp(0.0, 1.0) * 0.4;

    channels
        .iter()
        .enumerate()
        .map(|(idx, input)| {
            let spread = if idx % 2 == 1 { STEREO_SPREAD } else { 0 };
            let mut channel = ReverbChannel::new(sample_rate, spread);
            let frames = input.len();
            let mut out = vec![0.0f32; frames];
            for (i, slot) in out.iter_mut().enumerate().skip(params.pre_delay_frames) {
                *slot = channel.process(input[i - params.pre_delay_frames], feedback, damp);
            }
            out
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ReverbParams {
        ReverbParams {
            room_size: 0.5,
            damping: 0.5,
            pre_delay_frames: 100,
        }
    }

    #[test]
    fn test_silence_in_silence_out() {
        let wet = render_wet(&[vec![0.0; 4096], vec![0.0; 4096]], 44100, params());
        assert_eq!(wet.len(), 2);
        assert!(wet.iter().flatten().all(|&s| s == 0.0));
    }

    #[test]
    fn test_impulse_produces_tail_after_pre_delay() {
        let mut impulse = vec![0.0f32; 44100];
        impulse[0] = 1.0;
        let wet = render_wet(&[impulse], 44100, params());
        assert!(wet[0][..100].iter().all(|&s| s == 0.0));
        let tail_energy: f32 = wet[0][2000..].iter().map(|s| s * s).sum();
        assert!(tail_energy > 0.0);
        assert!(wet[0].iter().all(|s| s.is_finite()));
    }

    #[test]
    fn test_stereo_channels_decorrelate() {
        let mut impulse = vec![0.0f32; 8192];
        impulse[0] = 1.0;
        let wet = render_wet(&[impulse.clone(), impulse], 44100, params());
        assert_ne!(wet[0], wet[1]);
    }
}

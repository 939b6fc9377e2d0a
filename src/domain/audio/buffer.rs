//! Audio Buffer - 平面 (planar) f32 PCM 缓冲区

/// 平面 PCM 缓冲区
///
/// 不变量:
/// - 所有声道长度一致
/// - 样本值为 f32，满刻度为 ±1.0
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl AudioBuffer {
    /// 从平面声道数据创建，长度不一致时按最短声道截断
    pub fn new(sample_rate: u32, mut channels: Vec<Vec<f32>>) -> Self {
        let frames = channels.iter().map(Vec::len).min().unwrap_or(0);
        for ch in channels.iter_mut() {
            ch.truncate(frames);
        }
        Self {
            sample_rate,
            channels,
        }
    }

    /// 创建静音缓冲区
    pub fn silence(sample_rate: u32, channel_count: usize, frames: usize) -> Self {
        Self {
            sample_rate,
            channels: vec![vec![0.0; frames]; channel_count],
        }
    }

    /// 从交错 (interleaved) 样本创建
    pub fn from_interleaved(samples: &[f32], channel_count: usize, sample_rate: u32) -> Self {
        let channel_count = channel_count.max(1);
        let frames = samples.len() / channel_count;
        let mut channels = vec![Vec::with_capacity(frames); channel_count];
        for frame in samples.chunks_exact(channel_count) {
            for (ch, &s) in frame.iter().enumerate() {
                channels[ch].push(s);
            }
        }
        Self {
            sample_rate,
            channels,
        }
    }

    /// 转为交错样本
    pub fn to_interleaved(&self) -> Vec<f32> {
        let frames = self.frames();
        let mut out = Vec::with_capacity(frames * self.channels.len());
        for i in 0..frames {
            for ch in &self.channels {
                out.push(ch[i]);
            }
        }
        out
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn frames(&self) -> usize {
        self.channels.first().map(Vec::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    pub fn channels_mut(&mut self) -> &mut [Vec<f32>] {
        &mut self.channels
    }

    pub fn into_channels(self) -> Vec<Vec<f32>> {
        self.channels
    }

    /// 截取 [start_secs, end_secs) 区间，越界部分被裁掉
    pub fn slice_secs(&self, start_secs: f64, end_secs: f64) -> AudioBuffer {
        let frames = self.frames();
        let to_frame = |secs: f64| -> usize {
            let pos = (secs.max(0.0) * self.sample_rate as f64).round() as usize;
            pos.min(frames)
        };
        let start = to_frame(start_secs);
        let end = to_frame(end_secs).max(start);
        self.slice_frames(start, end)
    }

    /// 截取 [start, end) 帧
    pub fn slice_frames(&self, start: usize, end: usize) -> AudioBuffer {
        let end = end.min(self.frames());
        let start = start.min(end);
        Self {
            sample_rate: self.sample_rate,
            channels: self
                .channels
                .iter()
                .map(|ch| ch[start..end].to_vec())
                .collect(),
        }
    }

    /// 截断到指定帧数
    pub fn truncate(&mut self, frames: usize) {
        for ch in self.channels.iter_mut() {
            ch.truncate(frames);
        }
    }

    /// 丢弃开头若干帧
    pub fn skip_frames(&mut self, frames: usize) {
        for ch in self.channels.iter_mut() {
            let n = frames.min(ch.len());
            ch.drain(..n);
        }
    }

    /// 转换声道数：单声道复制到各声道，多声道下混为平均值后再分配
    pub fn to_channel_count(&self, target: usize) -> AudioBuffer {
        let target = target.max(1);
        if target == self.channel_count() {
            return self.clone();
        }
        let source = if self.channel_count() == 1 {
            self.channels[0].clone()
        } else {
            self.mono_mix()
        };
        Self {
            sample_rate: self.sample_rate,
            channels: vec![source; target],
        }
    }

    /// 各声道平均的单声道信号
    pub fn mono_mix(&self) -> Vec<f32> {
        let frames = self.frames();
        let count = self.channel_count();
        if count == 0 {
            return Vec::new();
        }
        let scale = 1.0 / count as f32;
        (0..frames)
            .map(|i| self.channels.iter().map(|ch| ch[i]).sum::<f32>() * scale)
            .collect()
    }

    /// 线性插值重采样
    pub fn resample(&self, to_rate: u32) -> AudioBuffer {
        if to_rate == self.sample_rate || self.sample_rate == 0 || self.is_empty() {
            let mut out = self.clone();
            out.sample_rate = to_rate;
            return out;
        }

        let ratio = to_rate as f64 / self.sample_rate as f64;
        let frame_count = self.frames();
        let new_frame_count = (frame_count as f64 * ratio) as usize;

        let channels = self
            .channels
            .iter()
            .map(|ch| {
                let mut out = Vec::with_capacity(new_frame_count);
                for i in 0..new_frame_count {
                    let src_pos = i as f64 / ratio;
                    let idx0 = (src_pos as usize).min(frame_count - 1);
                    let idx1 = (idx0 + 1).min(frame_count - 1);
                    let frac = (src_pos - idx0 as f64) as f32;
                    out.push(ch[idx0] + (ch[idx1] - ch[idx0]) * frac);
                }
                out
            })
            .collect();

        Self {
            sample_rate: to_rate,
            channels,
        }
    }

    /// 绝对峰值
    pub fn peak(&self) -> f32 {
        self.channels
            .iter()
            .flat_map(|ch| ch.iter())
            .fold(0.0f32, |acc, &s| acc.max(s.abs()))
    }

    /// 所有样本乘以线性增益
    pub fn apply_gain(&mut self, gain: f32) {
        for ch in self.channels.iter_mut() {
            for s in ch.iter_mut() {
                *s *= gain;
            }
        }
    }
}

/// dB 转线性增益: `10^(dB/20)`
pub fn db_to_gain(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// 线性增益转 dB，静音返回 -inf 的近似值
pub fn gain_to_db(gain: f32) -> f32 {
    20.0 * gain.max(1e-9).log10()
}

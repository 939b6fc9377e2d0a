//! Mixing Config - 混音参数
//!
//! 一次混音开始后参数不可变，引擎只接收 `&MixConfig`

use serde::{Deserialize, Serialize};

use super::MixError;

/// 各阶段开关，false 表示旁路
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixStages {
    #[serde(default = "enabled")]
    pub align: bool,
    #[serde(default = "enabled")]
    pub gain: bool,
    #[serde(default = "enabled")]
    pub reverb: bool,
    #[serde(default = "enabled")]
    pub eq: bool,
    #[serde(default = "enabled")]
    pub fades: bool,
    #[serde(default = "enabled")]
    pub compression: bool,
    #[serde(default = "enabled")]
    pub mastering: bool,
}

fn enabled() -> bool {
    true
}

impl Default for MixStages {
    fn default() -> Self {
        Self {
            align: true,
            gain: true,
            reverb: true,
            eq: true,
            fades: true,
            compression: true,
            mastering: true,
        }
    }
}

impl MixStages {
    /// 全部旁路（只做声道对齐与求和）
    pub fn bypass_all() -> Self {
        Self {
            align: false,
            gain: false,
            reverb: false,
            eq: false,
            fades: false,
            compression: false,
            mastering: false,
        }
    }
}

/// 混音配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixConfig {
    /// 混音采样率，两条音轨在进入引擎前被重采样到此采样率
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// 伴奏增益 (dB)
    #[serde(default = "default_headroom")]
    pub headroom_db: f32,

    /// 人声输入增益 (dB)
    #[serde(default = "default_voc_input")]
    pub voc_input_db: f32,

    /// 混响返回增益 (dB)，叠加在 `reverb_wet_db` 之上
    #[serde(default)]
    pub revb_gain_db: f32,

    /// 混响湿信号基准电平 (dB)
    #[serde(default = "default_reverb_wet")]
    pub reverb_wet_db: f32,

    /// 混响房间大小 0..1
    #[serde(default = "default_room_size")]
    pub reverb_room_size: f32,

    /// 混响高频阻尼 0..1
    #[serde(default = "default_damping")]
    pub reverb_damping: f32,

    /// 混响预延迟 (ms)，启用速度同步且能估计出速度时被覆盖
    #[serde(default = "default_pre_delay")]
    pub reverb_pre_delay_ms: f32,

    /// 按伴奏速度设定混响预延迟与压缩释放时间
    #[serde(default = "enabled")]
    pub tempo_sync: bool,

    /// 对齐搜索的最大偏移 (ms)
    #[serde(default = "default_max_lag")]
    pub max_align_lag_ms: u32,

    /// 对齐分析窗口 (秒)
    #[serde(default = "default_align_window")]
    pub align_window_secs: f32,

    #[serde(default = "default_fade_in")]
    pub fade_in_ms: u32,

    #[serde(default = "default_fade_out")]
    pub fade_out_ms: u32,

    #[serde(default = "default_comp_threshold")]
    pub comp_threshold_db: f32,

    #[serde(default = "default_comp_ratio")]
    pub comp_ratio: f32,

    #[serde(default = "default_comp_attack")]
    pub comp_attack_ms: f32,

    /// 压缩释放 (ms)，启用速度同步且能估计出速度时被覆盖
    #[serde(default = "default_comp_release")]
    pub comp_release_ms: f32,

    /// 母带目标峰值 (dBFS)
    #[serde(default = "default_target_peak")]
    pub target_peak_db: f32,

    #[serde(default)]
    pub stages: MixStages,
}

fn default_sample_rate() -> u32 {
    44100
}

fn default_headroom() -> f32 {
    -8.0
}

fn default_voc_input() -> f32 {
    -4.0
}

fn default_reverb_wet() -> f32 {
    -14.0
}

fn default_room_size() -> f32 {
    0.5
}

fn default_damping() -> f32 {
    0.5
}

fn default_pre_delay() -> f32 {
    20.0
}

fn default_max_lag() -> u32 {
    500
}

fn default_align_window() -> f32 {
    10.0
}

fn default_fade_in() -> u32 {
    20
}

fn default_fade_out() -> u32 {
    500
}

fn default_comp_threshold() -> f32 {
    -10.0
}

fn default_comp_ratio() -> f32 {
    1.6
}

fn default_comp_attack() -> f32 {
    10.0
}

fn default_comp_release() -> f32 {
    500.0
}

fn default_target_peak() -> f32 {
    -1.0
}

impl Default for MixConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            headroom_db: default_headroom(),
            voc_input_db: default_voc_input(),
            revb_gain_db: 0.0,
            reverb_wet_db: default_reverb_wet(),
            reverb_room_size: default_room_size(),
            reverb_damping: default_damping(),
            reverb_pre_delay_ms: default_pre_delay(),
            tempo_sync: true,
            max_align_lag_ms: default_max_lag(),
            align_window_secs: default_align_window(),
            fade_in_ms: default_fade_in(),
            fade_out_ms: default_fade_out(),
            comp_threshold_db: default_comp_threshold(),
            comp_ratio: default_comp_ratio(),
            comp_attack_ms: default_comp_attack(),
            comp_release_ms: default_comp_release(),
            target_peak_db: default_target_peak(),
            stages: MixStages::default(),
        }
    }
}

impl MixConfig {
    pub fn validate(&self) -> Result<(), MixError> {
        let invalid = |msg: &str| Err(MixError::InvalidConfig(msg.to_string()));

        if !(8000..=192_000).contains(&self.sample_rate) {
            return invalid("sample_rate must be within 8000..=192000");
        }
        let gains = [
            self.headroom_db,
            self.voc_input_db,
            self.revb_gain_db,
            self.reverb_wet_db,
            self.comp_threshold_db,
            self.target_peak_db,
        ];
        if gains.iter().any(|g| !g.is_finite()) {
            return invalid("gain values must be finite");
        }
        if !(0.0..=1.0).contains(&self.reverb_room_size) || !(0.0..=1.0).contains(&self.reverb_damping) {
            return invalid("reverb room size and damping must be within 0..=1");
        }
        if !(0.0..=500.0).contains(&self.reverb_pre_delay_ms) {
            return invalid("reverb pre-delay must be within 0..=500 ms");
        }
        if self.comp_ratio < 1.0 || !self.comp_ratio.is_finite() {
            return invalid("compression ratio must be >= 1");
        }
        if self.comp_attack_ms <= 0.0 || self.comp_release_ms <= 0.0 {
            return invalid("compressor attack and release must be positive");
        }
        if self.target_peak_db > 0.0 {
            return invalid("target peak must not exceed 0 dBFS");
        }
        if self.align_window_secs <= 0.0 {
            return invalid("alignment window must be positive");
        }
        Ok(())
    }

    pub fn ms_to_frames(&self, ms: f32) -> usize {
        (ms.max(0.0) * self.sample_rate as f32 / 1000.0).round() as usize
    }
}

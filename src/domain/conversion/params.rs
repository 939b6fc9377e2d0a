//! Conversion Context - 转换参数
//!
//! 三层参数:
//! - `ConversionDefaults`: 不可变的默认参数快照（来自配置，管理命令会发布新快照）
//! - `ConversionParams`: 调用方显式提供的覆盖值，未提供的字段为 None
//! - `EffectiveParams`: 合并后的有效参数，缓存 key 只基于它计算

use serde::{Deserialize, Serialize};

use super::errors::ParamError;

/// 支持的 F0 预测器
pub const F0_PREDICTORS: &[&str] = &["pm", "crepe", "dio", "harvest", "rmvpe", "fcpe"];

/// 音调调整范围（半音）
pub const PITCH_RANGE: std::ops::RangeInclusive<i32> = -12..=12;

/// 默认转换参数快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionDefaults {
    #[serde(default = "default_speaker")]
    pub speaker: String,
    #[serde(default)]
    pub pitch: i32,
    #[serde(default = "default_k_step")]
    pub k_step: u32,
    #[serde(default = "default_true")]
    pub shallow_diffusion: bool,
    #[serde(default)]
    pub only_diffusion: bool,
    #[serde(default)]
    pub cluster_infer_ratio: f64,
    #[serde(default)]
    pub auto_predict_f0: bool,
    #[serde(default = "default_noise_scale")]
    pub noise_scale: f64,
    #[serde(default)]
    pub f0_filter: bool,
    #[serde(default = "default_f0_predictor")]
    pub f0_predictor: String,
    #[serde(default)]
    pub enhancer_adaptive_key: i32,
    #[serde(default = "default_cr_threshold")]
    pub cr_threshold: f64,
    /// 人声分离预设
    #[serde(default = "default_preset")]
    pub preset: String,
    #[serde(default = "default_true")]
    pub enable_mixing: bool,
}

fn default_speaker() -> String {
    "0".to_string()
}

fn default_k_step() -> u32 {
    100
}

fn default_true() -> bool {
    true
}

fn default_noise_scale() -> f64 {
    0.4
}

fn default_f0_predictor() -> String {
    "fcpe".to_string()
}

fn default_cr_threshold() -> f64 {
    0.05
}

fn default_preset() -> String {
    "wav.json".to_string()
}

impl Default for ConversionDefaults {
    fn default() -> Self {
        Self {
            speaker: default_speaker(),
            pitch: 0,
            k_step: default_k_step(),
            shallow_diffusion: true,
            only_diffusion: false,
            cluster_infer_ratio: 0.0,
            auto_predict_f0: false,
            noise_scale: default_noise_scale(),
            f0_filter: false,
            f0_predictor: default_f0_predictor(),
            enhancer_adaptive_key: 0,
            cr_threshold: default_cr_threshold(),
            preset: default_preset(),
            enable_mixing: true,
        }
    }
}

impl ConversionDefaults {
    /// 校验默认值本身是否合法
    pub fn validate(&self) -> Result<(), ParamError> {
        ConversionParams::default().resolve(self).map(|_| ())
    }

    /// 生成替换了默认说话人的新快照
    pub fn with_speaker(&self, speaker: impl Into<String>) -> Self {
        Self {
            speaker: speaker.into(),
            ..self.clone()
        }
    }
}

/// 调用方提供的参数覆盖
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversionParams {
    #[serde(default)]
    pub speaker: Option<String>,
    #[serde(default)]
    pub pitch: Option<i32>,
    #[serde(default)]
    pub k_step: Option<u32>,
    #[serde(default)]
    pub shallow_diffusion: Option<bool>,
    #[serde(default)]
    pub only_diffusion: Option<bool>,
    #[serde(default)]
    pub cluster_infer_ratio: Option<f64>,
    #[serde(default)]
    pub auto_predict_f0: Option<bool>,
    #[serde(default)]
    pub noise_scale: Option<f64>,
    #[serde(default)]
    pub f0_filter: Option<bool>,
    #[serde(default)]
    pub f0_predictor: Option<String>,
    #[serde(default)]
    pub enhancer_adaptive_key: Option<i32>,
    #[serde(default)]
    pub cr_threshold: Option<f64>,
    /// 模型覆盖，原样透传给转换服务
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub preset: Option<String>,
    #[serde(default)]
    pub enable_mixing: Option<bool>,
}

/// 合并后的有效参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectiveParams {
    pub speaker: String,
    pub pitch: i32,
    pub k_step: u32,
    pub shallow_diffusion: bool,
    pub only_diffusion: bool,
    pub cluster_infer_ratio: f64,
    pub auto_predict_f0: bool,
    pub noise_scale: f64,
    pub f0_filter: bool,
    pub f0_predictor: String,
    pub enhancer_adaptive_key: i32,
    pub cr_threshold: f64,
    pub model: Option<String>,
    pub preset: String,
    pub enable_mixing: bool,
}

impl ConversionParams {
    /// 用默认快照补全未提供的字段并校验
    pub fn resolve(&self, defaults: &ConversionDefaults) -> Result<EffectiveParams, ParamError> {
        let effective = EffectiveParams {
            speaker: self
                .speaker
                .as_deref()
                .map(str::trim)
                .unwrap_or(&defaults.speaker)
                .to_string(),
            pitch: self.pitch.unwrap_or(defaults.pitch),
            k_step: self.k_step.unwrap_or(defaults.k_step),
            shallow_diffusion: self.shallow_diffusion.unwrap_or(defaults.shallow_diffusion),
            only_diffusion: self.only_diffusion.unwrap_or(defaults.only_diffusion),
            cluster_infer_ratio: self
                .cluster_infer_ratio
                .unwrap_or(defaults.cluster_infer_ratio),
            auto_predict_f0: self.auto_predict_f0.unwrap_or(defaults.auto_predict_f0),
            noise_scale: self.noise_scale.unwrap_or(defaults.noise_scale),
            f0_filter: self.f0_filter.unwrap_or(defaults.f0_filter),
            f0_predictor: self
                .f0_predictor
                .as_deref()
                .unwrap_or(&defaults.f0_predictor)
                .to_lowercase(),
            enhancer_adaptive_key: self
                .enhancer_adaptive_key
                .unwrap_or(defaults.enhancer_adaptive_key),
            cr_threshold: self.cr_threshold.unwrap_or(defaults.cr_threshold),
            model: self
                .model
                .as_deref()
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_string),
            preset: self
                .preset
                .as_deref()
                .map(str::trim)
                .unwrap_or(&defaults.preset)
                .to_string(),
            enable_mixing: self.enable_mixing.unwrap_or(defaults.enable_mixing),
        };
        effective.validate()?;
        Ok(effective)
    }
}

impl EffectiveParams {
    pub fn validate(&self) -> Result<(), ParamError> {
        if !PITCH_RANGE.contains(&self.pitch) {
            return Err(ParamError::PitchOutOfRange(self.pitch));
        }
        if self.speaker.is_empty() {
            return Err(ParamError::EmptySpeaker);
        }
        if !F0_PREDICTORS.contains(&self.f0_predictor.as_str()) {
            return Err(ParamError::UnknownF0Predictor(self.f0_predictor.clone()));
        }
        if self.preset.is_empty() {
            return Err(ParamError::EmptyPreset);
        }
        if !(1..=1000).contains(&self.k_step) {
            return Err(out_of_range("k_step", self.k_step));
        }
        check_unit("cluster_infer_ratio", self.cluster_infer_ratio)?;
        check_unit("noise_scale", self.noise_scale)?;
        check_unit("cr_threshold", self.cr_threshold)?;
        if !(-12..=12).contains(&self.enhancer_adaptive_key) {
            return Err(out_of_range(
                "enhancer_adaptive_key",
                self.enhancer_adaptive_key,
            ));
        }
        Ok(())
    }
}

fn out_of_range(field: &'static str, value: impl ToString) -> ParamError {
    ParamError::OutOfRange {
        field,
        value: value.to_string(),
    }
}

fn check_unit(field: &'static str, value: f64) -> Result<(), ParamError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(out_of_range(field, value))
    }
}

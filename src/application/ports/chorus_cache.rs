//! Chorus Cache Port - 高潮区间缓存
//!
//! 音源标识 → 高潮区间，单个 JSON 文件持久化，无淘汰

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Chorus Cache 错误
#[derive(Debug, Error)]
pub enum ChorusCacheError {
    #[error("Invalid chorus interval: {0}")]
    InvalidInterval(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// 高潮区间（秒）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChorusInterval {
    pub start: f64,
    pub end: f64,
}

impl ChorusInterval {
    /// 构造并校验 `0 <= start < end`
    pub fn new(start: f64, end: f64) -> Result<Self, ChorusCacheError> {
        let interval = Self { start, end };
        if interval.is_valid() {
            Ok(interval)
        } else {
            Err(ChorusCacheError::InvalidInterval(format!("[{}, {}]", start, end)))
        }
    }

    pub fn is_valid(&self) -> bool {
        self.start.is_finite() && self.end.is_finite() && self.start >= 0.0 && self.start < self.end
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// 按音频时长裁剪区间，裁剪后为空时返回 None
    pub fn clamp_to(&self, duration_secs: f64) -> Option<Self> {
        let end = self.end.min(duration_secs);
        let clamped = Self {
            start: self.start,
            end,
        };
        clamped.is_valid().then_some(clamped)
    }
}

/// 高潮缓存记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChorusEntry {
    pub key: String,
    #[serde(flatten)]
    pub interval: ChorusInterval,
    /// 毫秒时间戳
    pub detected_at: i64,
}

/// Chorus Cache Port
#[async_trait]
pub trait ChorusCachePort: Send + Sync {
    /// 查找区间；文件缺失、损坏或记录非法都视为未命中
    async fn lookup(&self, key: &str) -> Option<ChorusInterval>;

    /// 写入区间（覆盖同 key 记录）
    async fn put(&self, key: &str, interval: ChorusInterval) -> Result<(), ChorusCacheError>;

    /// 有效记录数
    async fn len(&self) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_validation() {
        assert!(ChorusInterval::new(10.0, 40.0).is_ok());
        assert!(ChorusInterval::new(40.0, 10.0).is_err());
        assert!(ChorusInterval::new(-1.0, 10.0).is_err());
        assert!(ChorusInterval::new(5.0, 5.0).is_err());
        assert!(ChorusInterval::new(f64::NAN, 5.0).is_err());
    }

    #[test]
    fn test_clamp_to_duration() {
        let interval = ChorusInterval::new(60.0, 90.0).unwrap();
        assert_eq!(interval.clamp_to(80.0), Some(ChorusInterval { start: 60.0, end: 80.0 }));
        assert_eq!(interval.clamp_to(50.0), None);
    }
}

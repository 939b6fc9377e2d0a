//! Defaults Store - 默认转换参数快照
//!
//! 快照不可变，管理命令通过发布新快照生效；任务在提交时解析有效参数

use std::sync::Arc;
use tokio::sync::watch;

use crate::domain::conversion::{ConversionDefaults, ParamError};

pub struct DefaultsStore {
    current: watch::Sender<Arc<ConversionDefaults>>,
}

impl DefaultsStore {
    pub fn new(initial: ConversionDefaults) -> Self {
        let (current, _) = watch::channel(Arc::new(initial));
        Self { current }
    }

    /// 当前快照
    pub fn snapshot(&self) -> Arc<ConversionDefaults> {
        self.current.borrow().clone()
    }

    /// 校验并发布新快照，返回旧快照
    pub fn publish(&self, next: ConversionDefaults) -> Result<Arc<ConversionDefaults>, ParamError> {
        next.validate()?;
        let previous = self.current.send_replace(Arc::new(next));
        tracing::info!(
            old_speaker = %previous.speaker,
            new_speaker = %self.current.borrow().speaker,
            "Conversion defaults updated"
        );
        Ok(previous)
    }
}

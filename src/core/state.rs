//! 状态定义：流水线阶段与对外广播的状态事件
//!
//! 编排器内部推进状态机，并把轻量的 StatusEvent 投影到 watch 通道，供 HTTP / 日志消费。

use chrono::{DateTime, Utc};
use serde::Serialize;

/// 流水线阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineStatus {
    Idle,
    Researching,
    Writing,
    Synthesizing,
    Complete,
    Error,
}

impl PipelineStatus {
    /// 活跃阶段（可转入 Error）
    pub fn is_active(self) -> bool {
        matches!(
            self,
            PipelineStatus::Researching | PipelineStatus::Writing | PipelineStatus::Synthesizing
        )
    }
}

/// 对外可见的状态快照：阶段 + 一句简短的阶段提示
#[derive(Clone, Debug, Serialize)]
pub struct StatusEvent {
    pub status: PipelineStatus,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl StatusEvent {
    pub fn new(status: PipelineStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            at: Utc::now(),
        }
    }
}

impl Default for StatusEvent {
    fn default() -> Self {
        Self::new(PipelineStatus::Idle, "")
    }
}

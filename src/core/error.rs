//! 流水线错误类型
//!
//! 与编排器配合：阶段级错误（Research / Compose / Synthesis）使状态机进入 Error 并自动回到 Idle；
//! Configuration 在构建时立即暴露；ImageGeneration 只在 Provider 内部出现，永远被降级吞掉。

use thiserror::Error;

/// 流水线各阶段可能出现的错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// 构建时缺少必需凭据等配置问题（致命，不重试）
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Research failed: {0}")]
    Research(String),

    #[error("Compose failed: {0}")]
    Compose(String),

    #[error("Synthesis failed: {0}")]
    Synthesis(String),

    /// 仅在图像 Provider 链内部使用，调用方看到的永远是降级后的图片引用
    #[error("Image generation failed: {0}")]
    ImageGeneration(String),

    #[error("Persistence failed: {0}")]
    Persistence(String),

    #[error("{capability} timed out after {secs}s")]
    Timeout { capability: String, secs: u64 },

    /// 手动注入的 Story 缺少 topic 或 context
    #[error("Invalid story: {0}")]
    InvalidStory(String),

    /// 已有一轮在执行（非 Idle）
    #[error("Pipeline busy")]
    Busy,
}

impl From<sqlx::Error> for PipelineError {
    fn from(e: sqlx::Error) -> Self {
        PipelineError::Persistence(e.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(e: serde_json::Error) -> Self {
        PipelineError::Persistence(format!("serialization: {e}"))
    }
}

/// 定时触发入口的鉴权错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TriggerError {
    #[error("Unauthorized")]
    Unauthorized,
}

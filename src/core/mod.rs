//! 核心编排层：错误、状态机、重入保护、综述触发、自动更新与优雅关闭

pub mod audit;
pub mod builder;
pub mod error;
pub mod pipeline;
pub mod scheduler;
pub mod shutdown;
pub mod state;
pub mod status;
pub mod synthesis;

pub use builder::PipelineBuilder;
pub use error::{PipelineError, TriggerError};
pub use pipeline::{CycleOutcome, CycleReport, Pipeline, PipelineSettings, RunOptions};
pub use scheduler::AutoUpdater;
pub use shutdown::{PipelineDrain, ShutdownCoordinator, ShutdownManager, ShutdownReason};
pub use state::{PipelineStatus, StatusEvent};
pub use status::StatusBoard;
pub use synthesis::SynthesisTrigger;

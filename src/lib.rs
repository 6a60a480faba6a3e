//! Zeitgeist - 自主内容流水线
//!
//! 定时器触发一串生成式 Agent（研究 → 撰写 → 标签/SEO → 配图 → 哲学综述），结果持久化后经 HTTP 提供给前端。
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 编排器状态机、重入保护、综述触发、自动更新、优雅关闭
//! - **llm**: LLM 客户端抽象与实现（Gemini / OpenAI 兼容 / Ollama / Mock）
//! - **model**: Story / Article / PhilosophicalSummary
//! - **providers**: 各能力的 Provider 与工厂
//! - **store**: 持久化网关（SQLite / 内存）
//! - **trigger**: 定时触发入口（共享密钥）

pub mod config;
pub mod core;
pub mod llm;
pub mod model;
pub mod observability;
pub mod providers;
pub mod store;
pub mod trigger;

pub use crate::core::{Pipeline, PipelineBuilder, PipelineError};
pub use crate::model::{Article, PhilosophicalSummary, Story};

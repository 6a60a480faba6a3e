//! 能力 Provider：研究、撰写、配图、综述、轻量文本生成
//!
//! 每种能力是一个独立 trait，后端变体（云端 LLM + 搜索 / 本地模型 / 确定性 Mock / 图库）各自实现；
//! 具体选哪个由 `factory` 在启动时根据配置决定，编排器只持有 `Arc<dyn ...>`。

pub mod factory;
pub mod image;
pub mod journalist;
pub mod mock;
pub mod parsing;
pub mod philosopher;
pub mod researcher;
pub mod schema;
pub mod text;

use async_trait::async_trait;

use crate::core::PipelineError;
use crate::model::{Article, PhilosophicalSummary, Story};

pub use factory::{
    create_compose_provider, create_image_chain, create_research_provider,
    create_synthesis_provider, create_text_generator, ProviderKind, Providers,
};
pub use image::{placeholder_image, ImageChain, StockPhotoProvider};
pub use journalist::{LlmJournalist, LlmTextGenerator};
pub use mock::{MockJournalist, MockPhilosopher, MockResearcher, MockTextGenerator};
pub use philosopher::LlmPhilosopher;
pub use researcher::LlmResearcher;

/// 研究后返回的故事上限
pub const MAX_STORIES: usize = 3;

/// 研究能力：返回当前最具影响力的至多 3 条宏观新闻线索
#[async_trait]
pub trait ResearchProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn research(&self) -> Result<Vec<Story>, PipelineError>;

    /// 是否无需限流（true 时编排器可跳过定时路径上的篇间等待）
    fn rate_limit_free(&self) -> bool {
        false
    }
}

/// 撰写能力：把一条（已丰富的）Story 写成完整文章，分配新 id 与当前时间戳
#[async_trait]
pub trait ComposeProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn compose(&self, story: &Story) -> Result<Article, PipelineError>;

    fn rate_limit_free(&self) -> bool {
        false
    }
}

/// 配图能力：可以失败，由 ImageChain 负责降级
#[async_trait]
pub trait ImageProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn generate_image(&self, prompt: &str) -> Result<String, PipelineError>;

    fn rate_limit_free(&self) -> bool {
        false
    }
}

/// 综述能力：把一批文章作为整体做哲学综合
#[async_trait]
pub trait SynthesisProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn synthesize(&self, articles: &[Article]) -> Result<PhilosophicalSummary, PipelineError>;
}

/// 可选的轻量文本能力（标签 / SEO）
#[async_trait]
pub trait TextGenerator: Send + Sync {
    fn name(&self) -> &str;

    async fn generate_text(&self, prompt: &str) -> Result<String, PipelineError>;

    fn rate_limit_free(&self) -> bool {
        false
    }
}

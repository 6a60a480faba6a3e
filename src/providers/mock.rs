//! Mock Provider（确定性、无网络）
//!
//! 让流水线在没有任何后端的情况下跑通：研究返回固定的三条新闻，撰写 / 综述由输入直接拼出内容。
//! 同样的输入得到同样的输出，只有 id 与时间戳不同。

use async_trait::async_trait;

use crate::core::PipelineError;
use crate::model::{
    monotonic_now, new_article_id, new_summary_id, Article, ArticleSection, DateRange,
    PhilosophicalSummary, Story, Synthesis,
};
use crate::providers::image::placeholder_image;
use crate::providers::text::{normalize_tags, pad_tags, truncate_chars, DEFAULT_TAGS};
use crate::providers::{
    ComposeProvider, ResearchProvider, SynthesisProvider, TextGenerator, MAX_STORIES,
};

#[derive(Debug, Default, Clone)]
pub struct MockResearcher;

#[async_trait]
impl ResearchProvider for MockResearcher {
    fn name(&self) -> &str {
        "mock"
    }

    async fn research(&self) -> Result<Vec<Story>, PipelineError> {
        tracing::info!("Mock researcher: returning canned stories");
        Ok(vec![
            Story::new(
                "Global Climate Summit Reaches Historic Agreement",
                "World leaders at the International Climate Summit have agreed to accelerate renewable energy adoption, with commitments to reduce carbon emissions by 50% by 2030. The agreement includes unprecedented funding for developing nations.",
            ),
            Story::new(
                "Breakthrough in Quantum Computing Technology",
                "Scientists have achieved a major milestone in quantum computing, demonstrating a stable 1000-qubit processor that maintains coherence for extended periods. This advancement could revolutionize fields from cryptography to drug discovery.",
            ),
            Story::new(
                "Economic Tensions Rise in Global Trade Relations",
                "Major economic powers are navigating complex trade negotiations as tariffs and supply chain disruptions continue to impact global markets. New frameworks for digital commerce and technology transfers are being debated.",
            ),
        ]
        .into_iter()
        .take(MAX_STORIES)
        .collect())
    }

    fn rate_limit_free(&self) -> bool {
        true
    }
}

#[derive(Debug, Default, Clone)]
pub struct MockJournalist;

#[async_trait]
impl ComposeProvider for MockJournalist {
    fn name(&self) -> &str {
        "mock"
    }

    async fn compose(&self, story: &Story) -> Result<Article, PipelineError> {
        if !story.is_valid() {
            return Err(PipelineError::Compose("story has empty topic or context".into()));
        }
        tracing::info!(topic = %story.topic, "Mock journalist: writing article");

        let topic_lower = story.topic.to_lowercase();
        let sections = vec![
            ArticleSection {
                heading: "The Moral Ledger".into(),
                content: format!(
                    "The recent developments regarding {} force a question of responsibility: who bears the cost, and who is owed the benefit? {}",
                    topic_lower, story.context
                ),
            },
            ArticleSection {
                heading: "Follow the Money".into(),
                content: "Capital moves faster than consensus. The economic consequences will arrive in markets long before they arrive in policy, rewarding those positioned early and penalizing those who wait for certainty.".into(),
            },
            ArticleSection {
                heading: "What It Means for Human Progress".into(),
                content: "Viewed across decades rather than news cycles, this moment belongs to a larger arc in which societies renegotiate what they can build, what they can afford, and what they are willing to risk.".into(),
            },
            ArticleSection {
                heading: "The Road Ahead".into(),
                content: "Stakeholders will need to adapt to an evolving landscape. The long-term effects depend on how institutions respond to the opportunities and tensions now in view.".into(),
            },
        ];

        let tags = pad_tags(normalize_tags(story.tags.as_deref().unwrap_or_default()), DEFAULT_TAGS);

        Ok(Article {
            id: new_article_id(),
            title: story.topic.clone(),
            summary: format!(
                "An analysis of {}. {}",
                topic_lower,
                truncate_chars(&story.context, 150)
            ),
            sections,
            tags,
            timestamp: monotonic_now(),
            source_topic: story.topic.clone(),
            image_url: story
                .image_url
                .clone()
                .or_else(|| Some(placeholder_image(&story.topic))),
            seo: story.seo.clone(),
        })
    }

    fn rate_limit_free(&self) -> bool {
        true
    }
}

#[derive(Debug, Default, Clone)]
pub struct MockPhilosopher;

#[async_trait]
impl SynthesisProvider for MockPhilosopher {
    fn name(&self) -> &str {
        "mock"
    }

    async fn synthesize(&self, articles: &[Article]) -> Result<PhilosophicalSummary, PipelineError> {
        let date_range = DateRange::of(articles)
            .ok_or_else(|| PipelineError::Synthesis("no articles to synthesize".into()))?;
        let titles: Vec<&str> = articles.iter().map(|a| a.title.as_str()).collect();

        let content = format!(
            "Taken together, {} stories describe a single movement rather than separate events: {}. Each one is a variation on how power, capital and conscience negotiate a future none of them fully controls.",
            articles.len(),
            titles.join("; ")
        );

        let tags = normalize_tags(
            articles
                .iter()
                .flat_map(|a| a.tags.iter().map(String::as_str))
                .chain(DEFAULT_TAGS),
        );

        Ok(PhilosophicalSummary {
            id: new_summary_id(),
            title: "The Shape of the Moment".into(),
            content,
            article_ids: articles.iter().map(|a| a.id.clone()).collect(),
            timestamp: monotonic_now(),
            date_range,
            tags,
            synthesis: Synthesis {
                themes: vec![
                    "Acceleration outpacing governance".into(),
                    "The redistribution of risk".into(),
                    "Technology as a moral amplifier".into(),
                ],
                paradoxes: vec![
                    "Global coordination demanded by problems that reward local defection".into(),
                    "Progress that deepens the inequalities it promises to ease".into(),
                ],
                future_implications: vec![
                    "Institutions will be judged by adaptation speed".into(),
                    "Economic power will follow technical capability".into(),
                    "Ethical frameworks will be rewritten under pressure".into(),
                ],
            },
        })
    }
}

/// 标签能力的 Mock：总是返回默认标签
#[derive(Debug, Default, Clone)]
pub struct MockTextGenerator;

#[async_trait]
impl TextGenerator for MockTextGenerator {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate_text(&self, _prompt: &str) -> Result<String, PipelineError> {
        Ok(DEFAULT_TAGS.join(", "))
    }

    fn rate_limit_free(&self) -> bool {
        true
    }
}

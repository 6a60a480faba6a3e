//! 基于 LLM 的撰写 Provider 与轻量文本 Provider
//!
//! 撰写输出必须满足 `ArticleDraft` 结构；不满足（缺标题、无小节、小节正文为空）视为 Compose 失败。
//! 通过校验后再做清洗：去掉自我陈述、摘要截到两句、小节至多 4 个、标签去重并至多 5 个。

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::PipelineError;
use crate::llm::{LlmClient, Message};
use crate::model::{monotonic_now, new_article_id, Article, ArticleSection, Story};
use crate::providers::parsing::parse_json_object;
use crate::providers::schema::{article_schema_json, ArticleDraft};
use crate::providers::text::{first_sentences, normalize_tags, pad_tags, scrub_meta, DEFAULT_TAGS};
use crate::providers::{ComposeProvider, TextGenerator};

pub const MIN_SECTIONS: usize = 3;
pub const MAX_SECTIONS: usize = 4;

const JOURNALIST_SYSTEM: &str = "You are a world-class investigative journalist and philosopher. \
You write sharp, original analysis for an intelligent global audience.";

pub fn compose_prompt(story: &Story) -> String {
    let mut prompt = format!(
        "Write a deep-dive article about this story.\n\nTopic: {}\nContext: {}\n\n\
         RULES:\n\
         - NO INTRODUCTIONS OF YOURSELF. Do not say \"As an AI\" or \"Here is the article\". Start directly with the content.\n\
         - Analyze through these angles: Moral implications, Economic impact, Human Progress/Evolution.\n\
         - Write 3-4 distinct sections with clear headings.\n\
         - The summary is at most two sentences.\n",
        story.topic, story.context
    );
    if let Some(tags) = story.tags.as_ref().filter(|t| !t.is_empty()) {
        prompt.push_str(&format!("- Use these tags: {}\n", tags.join(", ")));
    }
    if let Some(seo) = &story.seo {
        prompt.push_str(&format!("- Target SEO title: {}\n", seo.title));
    }
    prompt.push_str(&format!(
        "\nRespond with JSON only, matching this schema:\n```json\n{}\n```",
        article_schema_json()
    ));
    prompt
}

/// 校验并清洗撰写结果，组装为 Article
pub fn article_from_draft(draft: ArticleDraft, story: &Story) -> Result<Article, PipelineError> {
    let title = scrub_meta(&draft.title).trim().trim_matches('"').to_string();
    if title.is_empty() {
        return Err(PipelineError::Compose("article has no title".into()));
    }

    let sections: Vec<ArticleSection> = draft
        .sections
        .into_iter()
        .map(|s| ArticleSection {
            heading: s.heading.trim().to_string(),
            content: scrub_meta(&s.content),
        })
        .collect();
    if sections.len() < MIN_SECTIONS {
        return Err(PipelineError::Compose(format!(
            "article has {} sections, expected at least {}",
            sections.len(),
            MIN_SECTIONS
        )));
    }
    if let Some(blank) = sections.iter().position(|s| s.content.trim().is_empty()) {
        return Err(PipelineError::Compose(format!("section {} has no content", blank + 1)));
    }
    let sections: Vec<ArticleSection> = sections.into_iter().take(MAX_SECTIONS).collect();

    let mut summary = first_sentences(&scrub_meta(&draft.summary), 2);
    if summary.is_empty() {
        summary = first_sentences(&sections[0].content, 2);
    }

    let story_tags = story.tags.as_deref().unwrap_or_default();
    let tags = pad_tags(
        normalize_tags(&draft.tags),
        story_tags.iter().map(String::as_str).chain(DEFAULT_TAGS),
    );

    Ok(Article {
        id: new_article_id(),
        title,
        summary,
        sections,
        tags,
        timestamp: monotonic_now(),
        source_topic: story.topic.clone(),
        image_url: story.image_url.clone(),
        seo: story.seo.clone(),
    })
}

pub struct LlmJournalist {
    llm: Arc<dyn LlmClient>,
    label: String,
}

impl LlmJournalist {
    pub fn new(llm: Arc<dyn LlmClient>, label: impl Into<String>) -> Self {
        Self {
            llm,
            label: label.into(),
        }
    }
}

#[async_trait]
impl ComposeProvider for LlmJournalist {
    fn name(&self) -> &str {
        &self.label
    }

    async fn compose(&self, story: &Story) -> Result<Article, PipelineError> {
        if !story.is_valid() {
            return Err(PipelineError::Compose("story has empty topic or context".into()));
        }
        let messages = [Message::system(JOURNALIST_SYSTEM), Message::user(compose_prompt(story))];
        let raw = self
            .llm
            .complete(&messages)
            .await
            .map_err(|e| PipelineError::Compose(format!("{} backend: {}", self.llm.name(), e)))?;

        let draft: ArticleDraft = parse_json_object(&raw)
            .ok_or_else(|| PipelineError::Compose("output does not match article schema".into()))?;
        let article = article_from_draft(draft, story)?;
        tracing::info!(provider = %self.label, id = %article.id, title = %article.title, "Article composed");
        Ok(article)
    }
}

/// TextGenerator 的 LLM 实现：原样返回模型输出
pub struct LlmTextGenerator {
    llm: Arc<dyn LlmClient>,
}

impl LlmTextGenerator {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl TextGenerator for LlmTextGenerator {
    fn name(&self) -> &str {
        self.llm.name()
    }

    async fn generate_text(&self, prompt: &str) -> Result<String, PipelineError> {
        self.llm
            .complete(&[Message::user(prompt)])
            .await
            .map_err(|e| PipelineError::Compose(format!("text generation: {}", e)))
    }
}

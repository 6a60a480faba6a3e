//! 基于 LLM 的综述 Provider
//!
//! 把整批文章当作一个整体交给模型；articleIds 与 dateRange 由输入文章推导，不采信模型输出。

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::PipelineError;
use crate::llm::{LlmClient, Message};
use crate::model::{
    monotonic_now, new_summary_id, Article, DateRange, PhilosophicalSummary, Synthesis,
};
use crate::providers::parsing::parse_json_object;
use crate::providers::schema::{synthesis_schema_json, SynthesisDraft};
use crate::providers::text::{normalize_tags, scrub_meta, DEFAULT_TAGS};
use crate::providers::SynthesisProvider;

const PHILOSOPHER_SYSTEM: &str = "You are a philosopher-historian. You read a batch of recent \
news analyses as a single body of evidence and describe what they reveal together about where \
humanity is heading.";

pub fn synthesis_prompt(articles: &[Article]) -> String {
    let digest = articles
        .iter()
        .enumerate()
        .map(|(i, a)| format!("{}. {} ({})\n{}", i + 1, a.title, a.tags.join(", "), a.summary))
        .collect::<Vec<_>>()
        .join("\n\n");
    format!(
        "Synthesize these {} articles into one philosophical essay. Do not summarize them one by one.\n\n{}\n\n\
         Provide 3-5 themes, 2-4 paradoxes and 3-5 future implications. No meta-commentary.\n\
         Respond with JSON only, matching this schema:\n```json\n{}\n```",
        articles.len(),
        digest,
        synthesis_schema_json()
    )
}

/// 去空白、截到 max；少于 min 视为不合格
fn bounded_list(field: &str, items: Vec<String>, min: usize, max: usize) -> Result<Vec<String>, PipelineError> {
    let items: Vec<String> = items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .take(max)
        .collect();
    if items.len() < min {
        return Err(PipelineError::Synthesis(format!(
            "{} has {} entries, expected at least {}",
            field,
            items.len(),
            min
        )));
    }
    Ok(items)
}

pub struct LlmPhilosopher {
    llm: Arc<dyn LlmClient>,
    label: String,
}

impl LlmPhilosopher {
    pub fn new(llm: Arc<dyn LlmClient>, label: impl Into<String>) -> Self {
        Self {
            llm,
            label: label.into(),
        }
    }
}

#[async_trait]
impl SynthesisProvider for LlmPhilosopher {
    fn name(&self) -> &str {
        &self.label
    }

    async fn synthesize(&self, articles: &[Article]) -> Result<PhilosophicalSummary, PipelineError> {
        let date_range = DateRange::of(articles)
            .ok_or_else(|| PipelineError::Synthesis("no articles to synthesize".into()))?;

        let messages = [
            Message::system(PHILOSOPHER_SYSTEM),
            Message::user(synthesis_prompt(articles)),
        ];
        let raw = self
            .llm
            .complete(&messages)
            .await
            .map_err(|e| PipelineError::Synthesis(format!("{} backend: {}", self.llm.name(), e)))?;
        let draft: SynthesisDraft = parse_json_object(&raw)
            .ok_or_else(|| PipelineError::Synthesis("output does not match synthesis schema".into()))?;

        let content = scrub_meta(&draft.content);
        if draft.title.trim().is_empty() || content.is_empty() {
            return Err(PipelineError::Synthesis("summary has no title or content".into()));
        }

        let synthesis = Synthesis {
            themes: bounded_list("themes", draft.themes, 3, 5)?,
            paradoxes: bounded_list("paradoxes", draft.paradoxes, 2, 4)?,
            future_implications: bounded_list("futureImplications", draft.future_implications, 3, 5)?,
        };

        let tags = if draft.tags.is_empty() {
            normalize_tags(articles.iter().flat_map(|a| a.tags.iter().map(String::as_str)).chain(DEFAULT_TAGS))
        } else {
            normalize_tags(&draft.tags)
        };

        Ok(PhilosophicalSummary {
            id: new_summary_id(),
            title: draft.title.trim().to_string(),
            content,
            article_ids: articles.iter().map(|a| a.id.clone()).collect(),
            timestamp: monotonic_now(),
            date_range,
            tags,
            synthesis,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use crate::model::{from_millis, new_article_id};

    fn article(ms: i64) -> Article {
        Article {
            id: new_article_id(),
            title: format!("A{ms}"),
            summary: "S.".into(),
            sections: vec![],
            tags: vec!["Energy".into()],
            timestamp: from_millis(ms),
            source_topic: "t".into(),
            image_url: None,
            seo: None,
        }
    }

    #[tokio::test]
    async fn test_synthesis_derives_ids_and_range() {
        let raw = r#"{"title":"Era","content":"All one story.","tags":[],
            "themes":["a","b","c","d","e","f"],"paradoxes":["p","q"],
            "futureImplications":["x","y","z"]}"#;
        let llm = Arc::new(MockLlmClient::with_responses([raw]));
        let articles = vec![article(300), article(100), article(200)];
        let s = LlmPhilosopher::new(llm, "cloud").synthesize(&articles).await.unwrap();

        assert_eq!(s.article_ids, articles.iter().map(|a| a.id.clone()).collect::<Vec<_>>());
        assert_eq!(s.date_range.start.timestamp_millis(), 100);
        assert_eq!(s.date_range.end.timestamp_millis(), 300);
        assert_eq!(s.synthesis.themes.len(), 5);
        assert_eq!(s.tags[0], "Energy");
    }

    #[tokio::test]
    async fn test_synthesis_failures() {
        let llm = Arc::new(MockLlmClient::failing("quota"));
        let r = LlmPhilosopher::new(llm, "cloud").synthesize(&[article(1)]).await;
        assert!(matches!(r, Err(PipelineError::Synthesis(_))));

        let llm = Arc::new(MockLlmClient::with_responses(["prose only"]));
        let r = LlmPhilosopher::new(llm, "cloud").synthesize(&[article(1)]).await;
        assert!(matches!(r, Err(PipelineError::Synthesis(_))));
    }

    #[tokio::test]
    async fn test_synthesis_rejects_short_lists() {
        for raw in [
            r#"{"title":"Era","content":"c","themes":[],"paradoxes":["p","q"],"futureImplications":["x","y","z"]}"#,
            r#"{"title":"Era","content":"c","themes":["a","b","c"],"paradoxes":["p"],"futureImplications":["x","y","z"]}"#,
            r#"{"title":"Era","content":"c","themes":["a","b","c"],"paradoxes":["p","q"],"futureImplications":["x"," "]}"#,
        ] {
            let llm = Arc::new(MockLlmClient::with_responses([raw]));
            let r = LlmPhilosopher::new(llm, "cloud").synthesize(&[article(1)]).await;
            assert!(matches!(r, Err(PipelineError::Synthesis(_))), "accepted {raw}");
        }
    }
}

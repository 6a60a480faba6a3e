//! 基于 LLM 的研究 Provider
//!
//! 云端后端开启搜索工具，本地后端只能依赖模型自身知识；两者输出都走 `parsing` 的多策略解析。

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::PipelineError;
use crate::llm::{LlmClient, Message};
use crate::model::Story;
use crate::providers::parsing::{parse_research_output, ResearchParse};
use crate::providers::schema::research_schema_json;
use crate::providers::ResearchProvider;

const RESEARCHER_SYSTEM: &str = "You are an elite Research AI. Your job is to scan global news \
and identify the most impactful stories of the moment. Ignore celebrity gossip. Focus on \
macro-level events: geopolitics, economics, science, technology, and society. Return exactly 3 stories.";

const RESEARCH_PROMPT: &str = "Find the top 3 biggest global news stories happening right now. \
For each, give a concise topic and a factual context paragraph based on current reporting.";

/// 研究 prompt（包含输出 Schema）
pub fn research_prompt() -> String {
    format!(
        "{}\n\nRespond with JSON matching this schema. If there is genuinely nothing to report, \
         return {{\"stories\": [], \"none_found\": true}}.\n```json\n{}\n```",
        RESEARCH_PROMPT,
        research_schema_json()
    )
}

pub struct LlmResearcher {
    llm: Arc<dyn LlmClient>,
    label: String,
}

impl LlmResearcher {
    pub fn new(llm: Arc<dyn LlmClient>, label: impl Into<String>) -> Self {
        Self {
            llm,
            label: label.into(),
        }
    }
}

#[async_trait]
impl ResearchProvider for LlmResearcher {
    fn name(&self) -> &str {
        &self.label
    }

    async fn research(&self) -> Result<Vec<Story>, PipelineError> {
        let messages = [Message::system(RESEARCHER_SYSTEM), Message::user(research_prompt())];
        let raw = self
            .llm
            .complete(&messages)
            .await
            .map_err(|e| PipelineError::Research(format!("{} backend: {}", self.llm.name(), e)))?;

        match parse_research_output(&raw) {
            ResearchParse::Stories(stories) => {
                tracing::info!(provider = %self.label, count = stories.len(), "Research complete");
                Ok(stories)
            }
            ResearchParse::NoneFound => {
                tracing::info!(provider = %self.label, "Research backend reported no stories");
                Ok(Vec::new())
            }
            ResearchParse::Unparseable => {
                tracing::warn!(provider = %self.label, len = raw.len(), "Research output unparseable");
                Err(PipelineError::Research(
                    "could not extract any story from backend output".into(),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;

    #[tokio::test]
    async fn test_research_parses_json() {
        let llm = Arc::new(MockLlmClient::with_responses([
            r#"{"stories":[{"topic":"A","context":"a"},{"topic":"B","context":"b"}]}"#,
        ]));
        let r = LlmResearcher::new(llm.clone(), "cloud");
        let stories = r.research().await.unwrap();
        assert_eq!(stories.len(), 2);
        assert!(llm.last_prompt().unwrap().contains("top 3"));
    }

    #[tokio::test]
    async fn test_research_none_found_is_ok_empty() {
        let llm = Arc::new(MockLlmClient::with_responses([r#"{"stories":[],"none_found":true}"#]));
        let stories = LlmResearcher::new(llm, "cloud").research().await.unwrap();
        assert!(stories.is_empty());
    }

    #[tokio::test]
    async fn test_research_errors() {
        let garbage = Arc::new(MockLlmClient::with_responses(["sorry, no idea"]));
        assert!(matches!(
            LlmResearcher::new(garbage, "local").research().await,
            Err(PipelineError::Research(_))
        ));

        let down = Arc::new(MockLlmClient::failing("connection refused"));
        match LlmResearcher::new(down, "local").research().await {
            Err(PipelineError::Research(msg)) => assert!(msg.contains("connection refused")),
            other => panic!("unexpected {:?}", other),
        }
    }
}

//! LLM 客户端抽象
//!
//! 所有后端（Gemini / OpenAI 兼容 / Ollama / Mock）实现 LlmClient::complete（非流式）。
//! 研究、撰写、综述三个能力都只依赖这个 trait，具体后端在启动时由工厂注入。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    User,
    Assistant,
    System,
}

/// 单条消息
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// LLM 客户端 trait：非流式完成
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 后端名（日志用）
    fn name(&self) -> &str;

    /// 非流式完成，返回模型的原始文本
    async fn complete(&self, messages: &[Message]) -> Result<String, String>;
}

/// 取所有 System 消息拼成一段 system instruction，其余按顺序返回
pub(crate) fn split_system(messages: &[Message]) -> (Option<String>, Vec<&Message>) {
    let system: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect();
    let rest = messages.iter().filter(|m| m.role != Role::System).collect();
    let system = if system.is_empty() {
        None
    } else {
        Some(system.join("\n\n"))
    };
    (system, rest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_system() {
        let msgs = vec![
            Message::system("a"),
            Message::user("q"),
            Message::system("b"),
        ];
        let (system, rest) = split_system(&msgs);
        assert_eq!(system.as_deref(), Some("a\n\nb"));
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].content, "q");

        let (none, _) = split_system(&[Message::user("q")]);
        assert!(none.is_none());
    }
}

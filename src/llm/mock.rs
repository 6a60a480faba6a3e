//! Mock LLM 客户端（用于测试，无需 API）
//!
//! 按顺序返回预置的回复，用尽后重复最后一条；可记录收到的最后一条 User 消息，便于断言 prompt 内容。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, Message, Role};

/// 脚本化 Mock：complete 依次返回 responses；`Err` 项模拟后端失败
#[derive(Debug, Default)]
pub struct MockLlmClient {
    responses: Vec<Result<String, String>>,
    calls: AtomicUsize,
    last_prompt: Mutex<Option<String>>,
}

impl MockLlmClient {
    pub fn with_responses<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: responses.into_iter().map(|s| Ok(s.into())).collect(),
            ..Self::default()
        }
    }

    /// 每次调用都失败
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            responses: vec![Err(message.into())],
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().ok().and_then(|g| g.clone())
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(user) = messages.iter().rev().find(|m| m.role == Role::User) {
            if let Ok(mut slot) = self.last_prompt.lock() {
                *slot = Some(user.content.clone());
            }
        }
        match self.responses.get(n).or_else(|| self.responses.last()) {
            Some(r) => r.clone(),
            None => Ok(String::new()),
        }
    }
}

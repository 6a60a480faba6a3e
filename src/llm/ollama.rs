//! Ollama 本地模型客户端（/api/generate，非流式）

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::llm::traits::split_system;
use crate::llm::{LlmClient, Message, Role};

pub const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";

pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
    json_format: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Deserialize)]
struct ModelTag {
    name: String,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            json_format: false,
        }
    }

    /// 要求 `format: "json"` 输出
    pub fn with_json_format(mut self, enabled: bool) -> Self {
        self.json_format = enabled;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// 已拉取的模型名（GET /api/tags）
    pub async fn list_models(&self) -> Result<Vec<String>, String> {
        let resp = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(|e| format!("Ollama not reachable at {}: {}", self.base_url, e))?;
        if !resp.status().is_success() {
            return Err(format!("HTTP {}", resp.status()));
        }
        let tags: TagsResponse = resp.json().await.map_err(|e| e.to_string())?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    fn request_body(&self, messages: &[Message]) -> Value {
        let (system, rest) = split_system(messages);
        let prompt = rest
            .iter()
            .map(|m| match m.role {
                Role::Assistant => format!("Assistant: {}", m.content),
                _ => m.content.clone(),
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        let mut body = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
        });
        if let Some(system) = system {
            body["system"] = json!(system);
        }
        if self.json_format {
            body["format"] = json!("json");
        }
        body
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        let resp = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&self.request_body(messages))
            .send()
            .await
            .map_err(|e| format!("Request failed: {}", e))?;
        if !resp.status().is_success() {
            return Err(format!("Ollama API error: HTTP {}", resp.status()));
        }
        let data: GenerateResponse = resp.json().await.map_err(|e| e.to_string())?;
        Ok(data.response)
    }
}

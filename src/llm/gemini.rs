//! Gemini 客户端（generateContent REST）
//!
//! 研究阶段开启 Google Search grounding（`with_search(true)`）；开启后不能同时要求 JSON MIME 输出，
//! 因此研究结果由上层的多策略解析兜底。请求/响应格式只在本文件内出现，对外只暴露 LlmClient。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::llm::traits::split_system;
use crate::llm::{LlmClient, Message, Role};

pub const GEMINI_DEFAULT_MODEL: &str = "gemini-2.0-flash";

pub struct GeminiClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
    search: bool,
    json_output: bool,
}

impl GeminiClient {
    pub fn new(base_url: &str, model: &str, api_key: &str, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
            search: false,
            json_output: false,
        }
    }

    /// 启用 Google Search 工具（与 json_output 互斥，启用搜索时忽略 json_output）
    pub fn with_search(mut self, enabled: bool) -> Self {
        self.search = enabled;
        self
    }

    /// 要求 application/json 输出
    pub fn with_json_output(mut self, enabled: bool) -> Self {
        self.json_output = enabled;
        self
    }

    fn request_body(&self, messages: &[Message]) -> Value {
        let (system, rest) = split_system(messages);
        let contents: Vec<Value> = rest
            .iter()
            .map(|m| {
                let role = if m.role == Role::Assistant { "model" } else { "user" };
                json!({ "role": role, "parts": [{ "text": m.content }] })
            })
            .collect();

        let mut body = json!({ "contents": contents });
        if let Some(system) = system {
            body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
        }
        if self.search {
            body["tools"] = json!([{ "google_search": {} }]);
        } else if self.json_output {
            body["generationConfig"] = json!({ "responseMimeType": "application/json" });
        }
        body
    }
}

/// 拼接首个候选的全部文本 part
fn extract_text(response: &Value) -> Option<String> {
    let parts = response
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .as_array()?;
    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .collect();
    Some(text)
}

#[async_trait]
impl LlmClient for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let resp = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&self.request_body(messages))
            .send()
            .await
            .map_err(|e| format!("Request failed: {}", e))?;

        let status = resp.status();
        let body: Value = resp
            .json()
            .await
            .map_err(|e| format!("Invalid response body: {}", e))?;
        if !status.is_success() {
            return Err(format!("HTTP {}: {}", status, body));
        }

        extract_text(&body).ok_or_else(|| "No text candidate in response".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> GeminiClient {
        GeminiClient::new("https://example.test/v1beta/", "m", "k", Duration::from_secs(1))
    }

    #[test]
    fn test_request_body_with_search_skips_json_mime() {
        let c = client().with_search(true).with_json_output(true);
        let body = c.request_body(&[Message::system("sys"), Message::user("find news")]);
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "sys");
        assert_eq!(body["contents"][0]["role"], "user");
        assert!(body["tools"].is_array());
        assert!(body.get("generationConfig").is_none());
    }

    #[test]
    fn test_request_body_json_mode() {
        let c = client().with_json_output(true);
        let body = c.request_body(&[Message::user("x"), Message::assistant("y")]);
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(body["contents"][1]["role"], "model");
        assert_eq!(c.base_url, "https://example.test/v1beta");
    }

    #[test]
    fn test_extract_text_joins_parts() {
        let resp = json!({
            "candidates": [{ "content": { "parts": [{ "text": "a" }, { "text": "b" }] } }]
        });
        assert_eq!(extract_text(&resp).as_deref(), Some("ab"));
        assert!(extract_text(&json!({ "candidates": [] })).is_none());
    }
}

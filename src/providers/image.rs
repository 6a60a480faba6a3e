//! 配图 Provider 与降级链
//!
//! 调用方只看到 `ImageChain::generate`，永远返回一个图片引用：
//! 主 Provider（Imagen / Pixazo / Ollama / 图库）→ 次级图库 → 由 prompt 哈希得到的确定性占位图。

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::core::PipelineError;
use crate::llm::{LlmClient, Message, OllamaClient};
use crate::providers::text::truncate_chars;
use crate::providers::ImageProvider;

/// 传给后端的 prompt 上限（字符）
pub const MAX_PROMPT_CHARS: usize = 500;

const PICSUM: &str = "https://picsum.photos/seed";

/// FNV-1a 64 位
pub fn fnv1a(text: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in text.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

/// (类别, 种子偏移, 关键词)
const CATEGORIES: &[(&str, u64, &[&str])] = &[
    ("tech", 1000, &["technology", "ai", "computer", "digital", "software", "tech", "innovation", "quantum"]),
    ("nature", 1100, &["environment", "climate", "nature", "green", "earth", "planet", "forest"]),
    ("business", 1200, &["business", "economy", "finance", "market", "corporate", "money", "trade"]),
    ("politics", 1300, &["politics", "government", "policy", "election", "democracy", "legislation"]),
    ("science", 1400, &["science", "research", "study", "discovery", "experiment", "medical", "health"]),
    ("social", 1500, &["social", "society", "community", "people", "culture", "human", "rights"]),
];

/// 关键词命中最多的类别；都不命中为 "general"
pub fn categorize(prompt: &str) -> &'static str {
    let words: Vec<String> = prompt
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect();
    let mut best = ("general", 0usize);
    for (name, _, keywords) in CATEGORIES {
        let hits = keywords
            .iter()
            .filter(|k| words.iter().any(|w| w.as_str() == **k))
            .count();
        if hits > best.1 {
            best = (*name, hits);
        }
    }
    best.0
}

/// 确定性占位图：同一 prompt 永远得到同一 URL
pub fn placeholder_image(prompt: &str) -> String {
    let hash = fnv1a(prompt);
    let category = categorize(prompt);
    let seed = CATEGORIES
        .iter()
        .find(|(name, _, _)| *name == category)
        .map(|(_, offset, _)| hash % 100 + offset)
        .unwrap_or(hash % 1000 + 1);
    format!("{PICSUM}/{seed}/800/600?grayscale")
}

const CONTEXT_CATEGORIES: &[(&str, u64, &[&str])] = &[
    ("portrait", 2000, &["person", "people", "human", "face", "portrait", "individual"]),
    ("architecture", 2100, &["building", "structure", "architecture", "construction", "urban"]),
    ("nature", 2200, &["natural", "landscape", "outdoor", "environment", "sky", "trees", "mountains"]),
    ("tech", 2300, &["technology", "digital", "screen", "computer", "modern", "futuristic"]),
    ("business", 2400, &["professional", "office", "corporate", "meeting", "workspace"]),
    ("abstract", 2500, &["abstract", "conceptual", "symbolic", "artistic", "creative"]),
];

/// 依据视觉模型给出的画面描述选择占位图；正式题材保留彩色
pub fn contextual_placeholder(prompt: &str, description: &str) -> String {
    let description = description.to_lowercase();
    let mut best = (2600u64, 0usize);
    for (_, offset, keywords) in CONTEXT_CATEGORIES {
        let hits = keywords.iter().filter(|k| description.contains(*k)).count();
        if hits > best.1 {
            best = (*offset, hits);
        }
    }
    let seed = best.0 + fnv1a(&format!("{prompt}{description}")) % 100;
    let serious = ["serious", "formal", "professional"]
        .iter()
        .any(|w| description.contains(w));
    let style = if serious { "" } else { "?grayscale" };
    format!("{PICSUM}/{seed}/800/600{style}")
}

/// 图库：不调用网络，按 prompt 哈希选图；永不失败
#[derive(Debug, Default, Clone)]
pub struct StockPhotoProvider;

#[async_trait]
impl ImageProvider for StockPhotoProvider {
    fn name(&self) -> &str {
        "stock"
    }

    async fn generate_image(&self, prompt: &str) -> Result<String, PipelineError> {
        Ok(format!("{PICSUM}/{}/800/600", fnv1a(prompt) % 10_000))
    }

    fn rate_limit_free(&self) -> bool {
        true
    }
}

/// Imagen（`models/{model}:predict`），返回 data URL
pub struct GeminiImageProvider {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl GeminiImageProvider {
    pub fn new(base_url: &str, model: &str, api_key: &str, timeout: Duration) -> Self {
        Self {
            client: Client::builder().timeout(timeout).build().unwrap_or_default(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
        }
    }
}

fn data_url_from_prediction(body: &Value) -> Option<String> {
    let b64 = body
        .get("predictions")?
        .get(0)?
        .get("bytesBase64Encoded")?
        .as_str()?;
    Some(format!("data:image/png;base64,{b64}"))
}

#[async_trait]
impl ImageProvider for GeminiImageProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate_image(&self, prompt: &str) -> Result<String, PipelineError> {
        let url = format!("{}/models/{}:predict", self.base_url, self.model);
        let body = json!({
            "instances": [{ "prompt": prompt }],
            "parameters": { "sampleCount": 1, "aspectRatio": "4:3", "safetyFilterLevel": "BLOCK_SOME" }
        });
        let resp = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::ImageGeneration(e.to_string()))?;
        let status = resp.status();
        let data: Value = resp
            .json()
            .await
            .map_err(|e| PipelineError::ImageGeneration(e.to_string()))?;
        if !status.is_success() {
            return Err(PipelineError::ImageGeneration(format!("Imagen HTTP {status}: {data}")));
        }
        data_url_from_prediction(&data)
            .ok_or_else(|| PipelineError::ImageGeneration("no image data in Imagen response".into()))
    }
}

/// Pixazo（FLUX / Stable Diffusion），免费档可不带密钥；返回图片 URL
pub struct PixazoImageProvider {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl PixazoImageProvider {
    pub fn new(base_url: &str, model: &str, api_key: Option<&str>, timeout: Duration) -> Self {
        Self {
            client: Client::builder().timeout(timeout).build().unwrap_or_default(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.map(str::trim).filter(|k| !k.is_empty()).map(str::to_string),
        }
    }

    fn request_body(&self, prompt: &str) -> Value {
        let steps = if self.model == "flux-schnell" { 4 } else { 20 };
        json!({
            "prompt": prompt,
            "model": self.model,
            "width": 800,
            "height": 600,
            "num_inference_steps": steps,
            "guidance_scale": 7.5,
            "seed": fnv1a(prompt) % 1_000_000,
        })
    }
}

/// 兼容几种返回形态：image_url / url / images[0] / data[0]（元素可为字符串或带 url 的对象）
fn image_url_from_response(body: &Value) -> Option<String> {
    let direct = ["image_url", "url"]
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_str));
    let listed = || {
        ["images", "data"].iter().find_map(|key| {
            let first = body.get(*key)?.get(0)?;
            first.get("url").and_then(Value::as_str).or_else(|| first.as_str())
        })
    };
    direct
        .or_else(listed)
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl ImageProvider for PixazoImageProvider {
    fn name(&self) -> &str {
        "pixazo"
    }

    async fn generate_image(&self, prompt: &str) -> Result<String, PipelineError> {
        let mut request = self
            .client
            .post(format!("{}/generate", self.base_url))
            .header("Accept", "application/json")
            .json(&self.request_body(prompt));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let resp = request
            .send()
            .await
            .map_err(|e| PipelineError::ImageGeneration(e.to_string()))?;
        let status = resp.status();
        let data: Value = resp.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            let detail = data.get("error").and_then(Value::as_str).unwrap_or("unknown error");
            return Err(PipelineError::ImageGeneration(format!("Pixazo HTTP {status}: {detail}")));
        }
        image_url_from_response(&data)
            .ok_or_else(|| PipelineError::ImageGeneration("no image URL in Pixazo response".into()))
    }
}

/// Ollama 模型的能力类型（按模型名判断）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OllamaModelKind {
    ImageGeneration,
    Vision,
    Text,
}

pub fn detect_model_kind(model: &str) -> OllamaModelKind {
    const IMAGE_GEN: &[&str] = &[
        "stable-diffusion", "sd", "flux", "dalle", "midjourney", "imagen", "diffusion",
        "generate-image", "txt2img",
    ];
    const VISION: &[&str] = &["llava", "minicpm-v", "bakllava", "vision", "clip", "blip"];

    let name = model.to_lowercase();
    let family = name.split(':').next().unwrap_or_default();
    let matches = |patterns: &[&str]| {
        patterns.iter().any(|p| {
            if p.len() <= 2 {
                family.split(['-', '_', '.']).any(|part| part == *p)
            } else {
                name.contains(p)
            }
        })
    };
    if matches(IMAGE_GEN) {
        OllamaModelKind::ImageGeneration
    } else if matches(VISION) {
        OllamaModelKind::Vision
    } else {
        OllamaModelKind::Text
    }
}

/// 本地 Ollama：Ollama 还不能直接输出图片，视觉模型用来生成画面描述以挑选占位图
pub struct OllamaImageProvider {
    client: OllamaClient,
    kind: OllamaModelKind,
}

impl OllamaImageProvider {
    pub fn new(client: OllamaClient) -> Self {
        let kind = detect_model_kind(client.model());
        tracing::info!(model = client.model(), ?kind, "Ollama image model detected");
        Self { client, kind }
    }
}

#[async_trait]
impl ImageProvider for OllamaImageProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn generate_image(&self, prompt: &str) -> Result<String, PipelineError> {
        let models = self
            .client
            .list_models()
            .await
            .map_err(PipelineError::ImageGeneration)?;
        let model = self.client.model();
        if !models.iter().any(|m| m == model || m.starts_with(model)) {
            tracing::warn!(model, available = ?models, "Model not pulled; run `ollama pull {}`", model);
        }

        match self.kind {
            OllamaModelKind::Vision => {
                let ask = format!(
                    "Describe in detail what a high-quality, professional image for this topic would look like: \"{prompt}\". \
                     Focus on visual elements, composition, colors, lighting, and mood."
                );
                let description = self
                    .client
                    .complete(&[Message::user(ask)])
                    .await
                    .map_err(PipelineError::ImageGeneration)?;
                Ok(contextual_placeholder(prompt, &description))
            }
            OllamaModelKind::ImageGeneration => {
                self.client
                    .complete(&[Message::user(prompt)])
                    .await
                    .map_err(PipelineError::ImageGeneration)?;
                tracing::info!("Image model responded without image output; using placeholder");
                Ok(placeholder_image(prompt))
            }
            OllamaModelKind::Text => Ok(placeholder_image(prompt)),
        }
    }
}

/// 配图降级链
pub struct ImageChain {
    primary: Arc<dyn ImageProvider>,
    secondary: Arc<dyn ImageProvider>,
    timeout: Duration,
}

impl ImageChain {
    pub fn new(primary: Arc<dyn ImageProvider>, timeout: Duration) -> Self {
        Self {
            primary,
            secondary: Arc::new(StockPhotoProvider),
            timeout,
        }
    }

    pub fn with_secondary(mut self, secondary: Arc<dyn ImageProvider>) -> Self {
        self.secondary = secondary;
        self
    }

    pub fn primary_name(&self) -> &str {
        self.primary.name()
    }

    /// 链上每一级都无需限流
    pub fn rate_limit_free(&self) -> bool {
        self.primary.rate_limit_free() && self.secondary.rate_limit_free()
    }

    /// 永不失败
    pub async fn generate(&self, prompt: &str) -> String {
        let prompt = truncate_chars(prompt.trim(), MAX_PROMPT_CHARS);
        for provider in [&self.primary, &self.secondary] {
            let start = Instant::now();
            let result = tokio::time::timeout(self.timeout, provider.generate_image(&prompt)).await;
            let duration_ms = start.elapsed().as_millis() as u64;
            match result {
                Ok(Ok(url)) if !url.trim().is_empty() => {
                    tracing::debug!(provider = provider.name(), duration_ms, "Image ready");
                    return url;
                }
                Ok(Ok(_)) => {
                    tracing::warn!(provider = provider.name(), "Image provider returned empty reference")
                }
                Ok(Err(e)) => tracing::warn!(provider = provider.name(), error = %e, "Image provider failed"),
                Err(_) => tracing::warn!(
                    provider = provider.name(),
                    secs = self.timeout.as_secs(),
                    "Image provider timed out"
                ),
            }
        }
        tracing::warn!("All image providers failed; using placeholder");
        placeholder_image(&prompt)
    }
}

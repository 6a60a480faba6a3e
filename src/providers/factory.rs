//! Provider 工厂：启动时按配置为每个能力轴选定后端，之后不再切换
//!
//! - 未知 / 未指定的 kind 回退到 mock（warn 日志）
//! - 配图缺凭据降级为图库（warn 日志）
//! - 研究 / 撰写 / 综述缺凭据立即返回 Configuration 错误

use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::core::PipelineError;
use crate::llm::{GeminiClient, LlmClient, OllamaClient, OpenAiClient};
use crate::providers::image::{GeminiImageProvider, OllamaImageProvider, PixazoImageProvider};
use crate::providers::{
    ComposeProvider, ImageChain, ImageProvider, LlmJournalist, LlmPhilosopher, LlmResearcher,
    LlmTextGenerator, MockJournalist, MockPhilosopher, MockResearcher, MockTextGenerator,
    ResearchProvider, StockPhotoProvider, SynthesisProvider, TextGenerator,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// Gemini（研究阶段带搜索）
    Cloud,
    OpenAi,
    /// Ollama
    Local,
    Mock,
    /// 仅配图
    Stock,
    /// 仅配图
    Pixazo,
}

impl ProviderKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "cloud" | "gemini" => Some(Self::Cloud),
            "openai" => Some(Self::OpenAi),
            "local" | "ollama" => Some(Self::Local),
            "mock" => Some(Self::Mock),
            "stock" => Some(Self::Stock),
            "pixazo" => Some(Self::Pixazo),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cloud => "cloud",
            Self::OpenAi => "openai",
            Self::Local => "local",
            Self::Mock => "mock",
            Self::Stock => "stock",
            Self::Pixazo => "pixazo",
        }
    }
}

/// 解析某个能力轴的 kind；无法识别时回退 mock
fn resolve(axis: &str, raw: &str, image_axis: bool) -> ProviderKind {
    match ProviderKind::parse(raw) {
        Some(ProviderKind::Stock | ProviderKind::Pixazo) if !image_axis => {
            tracing::warn!(axis, kind = raw, "Provider kind not valid for this capability; using mock");
            ProviderKind::Mock
        }
        Some(kind) => kind,
        None => {
            tracing::warn!(axis, kind = raw, "Unknown provider kind; using mock");
            ProviderKind::Mock
        }
    }
}

fn require_key<'a>(key: &'a Option<String>, axis: &str, backend: &str) -> Result<&'a str, PipelineError> {
    key.as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or_else(|| {
            PipelineError::Configuration(format!("{axis} provider '{backend}' requires an API key"))
        })
}

/// 按 kind 构造 LLM 客户端；search 为 true 时 Gemini 开启搜索，否则要求 JSON 输出
fn llm_client(
    kind: ProviderKind,
    axis: &str,
    config: &AppConfig,
    search: bool,
) -> Result<Arc<dyn LlmClient>, PipelineError> {
    let timeout = config.pipeline.capability_timeout();
    match kind {
        ProviderKind::Cloud => {
            let key = require_key(&config.gemini.api_key, axis, "gemini")?;
            Ok(Arc::new(
                GeminiClient::new(&config.gemini.base_url, &config.gemini.model, key, timeout)
                    .with_search(search)
                    .with_json_output(!search),
            ))
        }
        ProviderKind::OpenAi => {
            let key = require_key(&config.openai.api_key, axis, "openai")?;
            Ok(Arc::new(OpenAiClient::new(
                config.openai.base_url.as_deref(),
                &config.openai.model,
                key,
            )))
        }
        ProviderKind::Local => Ok(Arc::new(
            OllamaClient::new(&config.ollama.base_url, &config.ollama.model, timeout)
                .with_json_format(true),
        )),
        ProviderKind::Mock | ProviderKind::Stock | ProviderKind::Pixazo => {
            Err(PipelineError::Configuration(format!(
                "{axis}: no LLM backend for kind '{}'",
                kind.as_str()
            )))
        }
    }
}

pub fn create_research_provider(
    kind: &str,
    config: &AppConfig,
) -> Result<Arc<dyn ResearchProvider>, PipelineError> {
    let kind = resolve("research", kind, false);
    if kind == ProviderKind::Mock {
        return Ok(Arc::new(MockResearcher));
    }
    let llm = llm_client(kind, "research", config, true)?;
    Ok(Arc::new(LlmResearcher::new(llm, kind.as_str())))
}

pub fn create_compose_provider(
    kind: &str,
    config: &AppConfig,
) -> Result<Arc<dyn ComposeProvider>, PipelineError> {
    let kind = resolve("compose", kind, false);
    if kind == ProviderKind::Mock {
        return Ok(Arc::new(MockJournalist));
    }
    let llm = llm_client(kind, "compose", config, false)?;
    Ok(Arc::new(LlmJournalist::new(llm, kind.as_str())))
}

pub fn create_synthesis_provider(
    kind: &str,
    config: &AppConfig,
) -> Result<Arc<dyn SynthesisProvider>, PipelineError> {
    let kind = resolve("synthesis", kind, false);
    if kind == ProviderKind::Mock {
        return Ok(Arc::new(MockPhilosopher));
    }
    let llm = llm_client(kind, "synthesis", config, false)?;
    Ok(Arc::new(LlmPhilosopher::new(llm, kind.as_str())))
}

/// 可选能力：`none` 关闭；缺凭据时关闭并 warn（调用方回退到默认标签 / SEO）
pub fn create_text_generator(
    kind: &str,
    config: &AppConfig,
) -> Option<Arc<dyn TextGenerator>> {
    if kind.trim().eq_ignore_ascii_case("none") {
        return None;
    }
    let kind = resolve("text", kind, false);
    if kind == ProviderKind::Mock {
        return Some(Arc::new(MockTextGenerator));
    }
    let timeout = config.pipeline.capability_timeout();
    let llm: Arc<dyn LlmClient> = match kind {
        // 标签 / SEO 是纯文本输出，不要求 JSON
        ProviderKind::Cloud => match require_key(&config.gemini.api_key, "text", "gemini") {
            Ok(key) => Arc::new(GeminiClient::new(
                &config.gemini.base_url,
                &config.gemini.model,
                key,
                timeout,
            )),
            Err(e) => {
                tracing::warn!(error = %e, "Text generation disabled");
                return None;
            }
        },
        ProviderKind::Local => Arc::new(OllamaClient::new(
            &config.ollama.base_url,
            &config.ollama.model,
            timeout,
        )),
        _ => match llm_client(kind, "text", config, false) {
            Ok(llm) => llm,
            Err(e) => {
                tracing::warn!(error = %e, "Text generation disabled");
                return None;
            }
        },
    };
    Some(Arc::new(LlmTextGenerator::new(llm)))
}

/// 配图永远可用：缺凭据或后端不支持时降级为图库
pub fn create_image_chain(kind: &str, config: &AppConfig) -> ImageChain {
    let timeout = config.pipeline.capability_timeout();
    let primary: Arc<dyn ImageProvider> = match resolve("image", kind, true) {
        ProviderKind::Cloud => match config.gemini.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
            Some(key) => Arc::new(GeminiImageProvider::new(
                &config.gemini.base_url,
                &config.gemini.image_model,
                key,
                timeout,
            )),
            None => {
                tracing::warn!("Gemini image provider has no API key; degrading to stock photos");
                Arc::new(StockPhotoProvider)
            }
        },
        ProviderKind::Local => Arc::new(OllamaImageProvider::new(OllamaClient::new(
            &config.ollama.base_url,
            &config.ollama.image_model,
            timeout,
        ))),
        ProviderKind::Pixazo => Arc::new(PixazoImageProvider::new(
            &config.pixazo.base_url,
            &config.pixazo.model,
            config.pixazo.api_key.as_deref(),
            timeout,
        )),
        ProviderKind::OpenAi => {
            tracing::warn!("No OpenAI image provider; degrading to stock photos");
            Arc::new(StockPhotoProvider)
        }
        ProviderKind::Mock | ProviderKind::Stock => Arc::new(StockPhotoProvider),
    };
    tracing::info!(provider = primary.name(), "Image provider selected");
    ImageChain::new(primary, timeout)
}

/// 启动时一次性选定的全部能力
#[derive(Clone)]
pub struct Providers {
    pub research: Arc<dyn ResearchProvider>,
    pub compose: Arc<dyn ComposeProvider>,
    pub synthesis: Arc<dyn SynthesisProvider>,
    pub text: Option<Arc<dyn TextGenerator>>,
    pub images: Arc<ImageChain>,
}

impl Providers {
    pub fn from_config(config: &AppConfig) -> Result<Self, PipelineError> {
        let p = &config.providers;
        let research = create_research_provider(&p.research, config)?;
        let compose = create_compose_provider(&p.compose, config)?;
        let synthesis = create_synthesis_provider(&p.synthesis, config)?;
        // 未单独配置时跟随撰写后端
        let text = create_text_generator(p.text.as_deref().unwrap_or(&p.compose), config);
        let images = Arc::new(create_image_chain(&p.image, config));

        tracing::info!(
            research = research.name(),
            compose = compose.name(),
            synthesis = synthesis.name(),
            text = text.as_ref().map(|t| t.name()).unwrap_or("none"),
            image = images.primary_name(),
            "Providers resolved"
        );
        Ok(Self {
            research,
            compose,
            synthesis,
            text,
            images,
        })
    }

    /// 全部使用确定性 Mock
    pub fn mock() -> Self {
        Self {
            research: Arc::new(MockResearcher),
            compose: Arc::new(MockJournalist),
            synthesis: Arc::new(MockPhilosopher),
            text: Some(Arc::new(MockTextGenerator)),
            images: Arc::new(ImageChain::new(Arc::new(StockPhotoProvider), Duration::from_secs(5))),
        }
    }

    /// 一轮里会被调用的每个后端都无需限流时，定时路径可以跳过篇间等待
    pub fn rate_limit_free(&self) -> bool {
        self.research.rate_limit_free()
            && self.compose.rate_limit_free()
            && self.images.rate_limit_free()
            && self.text.as_ref().map_or(true, |t| t.rate_limit_free())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_kinds() {
        assert_eq!(ProviderKind::parse("Gemini"), Some(ProviderKind::Cloud));
        assert_eq!(ProviderKind::parse(" local "), Some(ProviderKind::Local));
        assert_eq!(ProviderKind::parse("Pixazo"), Some(ProviderKind::Pixazo));
        assert_eq!(ProviderKind::parse("huggingface"), None);
    }

    #[test]
    fn test_unknown_kind_falls_back_to_mock() {
        let config = AppConfig::default();
        assert_eq!(create_research_provider("bogus", &config).unwrap().name(), "mock");
        assert_eq!(create_compose_provider("", &config).unwrap().name(), "mock");
        assert_eq!(create_synthesis_provider("stock", &config).unwrap().name(), "mock");
        assert_eq!(create_compose_provider("pixazo", &config).unwrap().name(), "mock");
    }

    #[test]
    fn test_missing_credentials_are_configuration_errors() {
        let config = AppConfig::default();
        for result in [
            create_research_provider("cloud", &config).map(|_| ()),
            create_compose_provider("openai", &config).map(|_| ()),
            create_synthesis_provider("gemini", &config).map(|_| ()),
        ] {
            assert!(matches!(result, Err(PipelineError::Configuration(_))));
        }
    }

    #[test]
    fn test_image_without_key_degrades_to_stock() {
        let config = AppConfig::default();
        assert_eq!(create_image_chain("cloud", &config).primary_name(), "stock");
        assert_eq!(create_image_chain("mock", &config).primary_name(), "stock");
        assert_eq!(create_image_chain("local", &config).primary_name(), "ollama");
        assert_eq!(create_image_chain("pixazo", &config).primary_name(), "pixazo");
    }

    #[test]
    fn test_keyed_backends_build() {
        let mut config = AppConfig::default();
        config.gemini.api_key = Some("k".into());
        assert_eq!(create_research_provider("cloud", &config).unwrap().name(), "cloud");
        assert_eq!(create_image_chain("gemini", &config).primary_name(), "gemini");
        assert_eq!(create_compose_provider("local", &config).unwrap().name(), "local");
    }

    #[test]
    fn test_text_generator_optional() {
        let config = AppConfig::default();
        assert!(create_text_generator("none", &config).is_none());
        assert!(create_text_generator("cloud", &config).is_none());
        assert_eq!(create_text_generator("mock", &config).unwrap().name(), "mock");
    }

    #[test]
    fn test_default_config_is_all_mock() {
        let providers = Providers::from_config(&AppConfig::default()).unwrap();
        assert_eq!(providers.research.name(), "mock");
        assert_eq!(providers.images.primary_name(), "stock");
        assert!(providers.text.is_some());
        assert!(providers.rate_limit_free());
    }

    #[test]
    fn test_rate_limit_free_covers_text_and_images() {
        let mut config = AppConfig::default();
        config.gemini.api_key = Some("k".into());

        let mut providers = Providers::mock();
        providers.text = create_text_generator("cloud", &config);
        assert!(providers.text.is_some());
        assert!(!providers.rate_limit_free());

        let mut providers = Providers::mock();
        providers.images = Arc::new(create_image_chain("gemini", &config));
        assert!(!providers.rate_limit_free());

        let mut providers = Providers::mock();
        providers.text = None;
        assert!(providers.rate_limit_free());
    }
}

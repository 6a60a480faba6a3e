//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `ZEITGEIST__*` 覆盖（双下划线表示嵌套，如 `ZEITGEIST__PROVIDERS__RESEARCH=gemini`）。
//! 凭据缺省时再从约定俗成的环境变量（GEMINI_API_KEY、OPENAI_API_KEY、CRON_SECRET）补齐。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub providers: ProvidersSection,
    pub gemini: GeminiSection,
    pub openai: OpenAiSection,
    pub ollama: OllamaSection,
    pub pixazo: PixazoSection,
    pub pipeline: PipelineSection,
    pub storage: StorageSection,
    pub web: WebSection,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "zeitgeist".to_string(),
        }
    }
}

/// [providers] 段：四条能力轴各自独立选择后端（cloud / gemini / openai / local / ollama / mock；配图另有 stock / pixazo）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProvidersSection {
    pub research: String,
    pub compose: String,
    pub image: String,
    pub synthesis: String,
    /// 生成标签 / SEO 的轻量文本能力；为空时跟随 compose
    pub text: Option<String>,
}

impl Default for ProvidersSection {
    fn default() -> Self {
        Self {
            research: "mock".to_string(),
            compose: "mock".to_string(),
            image: "stock".to_string(),
            synthesis: "mock".to_string(),
            text: None,
        }
    }
}

/// [gemini] 段：云端 LLM（带搜索工具）与 Imagen
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeminiSection {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub image_model: String,
}

impl Default for GeminiSection {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-2.0-flash".to_string(),
            image_model: "imagen-4.0-fast-generate-001".to_string(),
        }
    }
}

/// [openai] 段：任意 OpenAI 兼容端点
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OpenAiSection {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: String,
}

impl Default for OpenAiSection {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            model: "gpt-4o-mini".to_string(),
        }
    }
}

/// [ollama] 段：本地模型服务
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OllamaSection {
    pub base_url: String,
    pub model: String,
    /// 图像能力使用的模型（视觉模型或图像生成模型）
    pub image_model: String,
}

impl Default for OllamaSection {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "llama3.2".to_string(),
            image_model: "llava:latest".to_string(),
        }
    }
}

/// [pixazo] 段：免费图像生成；api_key 可选，带上后配额更高
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PixazoSection {
    pub api_key: Option<String>,
    pub base_url: String,
    /// flux-schnell | stable-diffusion
    pub model: String,
}

impl Default for PixazoSection {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.pixazo.ai/v1".to_string(),
            model: "flux-schnell".to_string(),
        }
    }
}

/// [pipeline] 段：阈值、超时、节奏与失败策略
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    /// 触发哲学综述的文章累计数，同时也是综述取材的文章数
    pub synthesis_threshold: u64,
    /// 单次能力调用超时（秒）
    pub capability_timeout_secs: u64,
    /// 定时触发路径上两篇之间的间隔（秒），用于遵守外部限流
    pub story_delay_secs: u64,
    /// Error 状态停留时长（秒），之后自动回到 Idle
    pub error_cooldown_secs: u64,
    /// Complete 状态停留时长（秒）
    pub complete_display_secs: u64,
    /// 交互触发时单篇失败是否继续
    pub interactive_continue_on_story_failure: bool,
    /// 定时触发时单篇失败是否继续
    pub scheduled_continue_on_story_failure: bool,
    /// 自动更新：距上次更新超过该小时数即触发一轮
    pub update_interval_hours: u64,
    /// 自动更新：检查间隔（秒）
    pub check_interval_secs: u64,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            synthesis_threshold: 6,
            capability_timeout_secs: 60,
            story_delay_secs: 10,
            error_cooldown_secs: 5,
            complete_display_secs: 3,
            interactive_continue_on_story_failure: false,
            scheduled_continue_on_story_failure: true,
            update_interval_hours: 12,
            check_interval_secs: 60,
        }
    }
}

impl PipelineSection {
    pub fn capability_timeout(&self) -> Duration {
        Duration::from_secs(self.capability_timeout_secs)
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_hours * 3600)
    }
}

/// [storage] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// SQLite 文件路径；为 ":memory:" 时使用进程内存储
    pub database_path: PathBuf,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("zeitgeist.sqlite"),
        }
    }
}

/// [web] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebSection {
    pub port: u16,
    /// 定时触发共享密钥；未设置时定时入口拒绝所有请求
    pub cron_secret: Option<String>,
    /// 手动注入口令；未设置时不校验
    pub admin_token: Option<String>,
}

impl Default for WebSection {
    fn default() -> Self {
        Self {
            port: 8080,
            cron_secret: None,
            admin_token: None,
        }
    }
}

impl AppConfig {
    /// 用约定的环境变量补齐缺省凭据（配置文件 / ZEITGEIST__* 优先）
    pub fn with_env_credentials(mut self) -> Self {
        fill_from_env(&mut self.gemini.api_key, &["GEMINI_API_KEY", "API_KEY"]);
        fill_from_env(&mut self.openai.api_key, &["OPENAI_API_KEY"]);
        fill_from_env(&mut self.pixazo.api_key, &["PIXAZO_API_KEY"]);
        fill_from_env(&mut self.web.cron_secret, &["CRON_SECRET"]);
        fill_from_env(&mut self.web.admin_token, &["ADMIN_TOKEN"]);
        self
    }
}

fn fill_from_env(slot: &mut Option<String>, vars: &[&str]) {
    if slot.as_deref().is_some_and(|s| !s.trim().is_empty()) {
        return;
    }
    *slot = vars
        .iter()
        .find_map(|v| std::env::var(v).ok())
        .filter(|s| !s.trim().is_empty());
}

/// 从 config 目录加载配置，环境变量 ZEITGEIST__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 叠加环境变量 ZEITGEIST__*（双下划线表示嵌套键）
/// 4. 用 GEMINI_API_KEY 等补齐缺省凭据
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("ZEITGEIST")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    let cfg: AppConfig = c.try_deserialize()?;
    Ok(cfg.with_env_credentials())
}

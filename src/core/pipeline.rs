//! 流水线编排器
//!
//! 状态机：`Idle → Researching → Writing → (Synthesizing) → Complete → Idle`，任一活跃阶段可转入 `Error`，
//! 终态保持一段时间后自动回到 Idle。入口由 [`StatusBoard`] 的 CAS 保护，重复触发是 no-op。
//!
//! 每篇文章依次执行：配图 → 标签 → SEO → 撰写。单篇失败时按 `continue_on_story_failure` 决定
//! 跳过（定时路径）还是中止整轮（交互路径）。整批写库后更新 lastUpdated、计数器，再检查综述触发。

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

use crate::config::PipelineSection;
use crate::core::audit::audited;
use crate::core::state::{PipelineStatus, StatusEvent};
use crate::core::status::{RunGuard, StatusBoard};
use crate::core::synthesis::SynthesisTrigger;
use crate::core::PipelineError;
use crate::model::{Article, Story};
use crate::providers::text::{default_seo, default_tags, parse_seo, parse_tags};
use crate::providers::Providers;
use crate::store::Store;

/// 编排参数（来自 `[pipeline]`）
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub synthesis_threshold: u64,
    pub capability_timeout: Duration,
    pub story_delay: Duration,
    pub error_cooldown: Duration,
    pub complete_display: Duration,
    pub interactive_continue_on_story_failure: bool,
    pub scheduled_continue_on_story_failure: bool,
}

impl From<&PipelineSection> for PipelineSettings {
    fn from(p: &PipelineSection) -> Self {
        Self {
            synthesis_threshold: p.synthesis_threshold,
            capability_timeout: p.capability_timeout(),
            story_delay: Duration::from_secs(p.story_delay_secs),
            error_cooldown: Duration::from_secs(p.error_cooldown_secs),
            complete_display: Duration::from_secs(p.complete_display_secs),
            interactive_continue_on_story_failure: p.interactive_continue_on_story_failure,
            scheduled_continue_on_story_failure: p.scheduled_continue_on_story_failure,
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from(&PipelineSection::default())
    }
}

impl PipelineSettings {
    /// 测试用：无等待、无展示延迟
    pub fn immediate() -> Self {
        Self {
            story_delay: Duration::ZERO,
            error_cooldown: Duration::ZERO,
            complete_display: Duration::ZERO,
            ..Self::default()
        }
    }
}

/// 单轮运行选项
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    pub continue_on_story_failure: bool,
    /// 篇间等待（限流）；后端声明无需限流时跳过
    pub story_delay: Duration,
}

/// 一轮成功运行的报告
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    pub articles_added: usize,
    pub philosophical_summary: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary_id: Option<String>,
    pub failed_topics: Vec<String>,
    #[serde(with = "crate::model::millis")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum CycleOutcome {
    Completed(CycleReport),
    /// 已有一轮在运行，本次未执行任何阶段
    Skipped,
}

pub struct Pipeline {
    providers: Providers,
    store: Arc<dyn Store>,
    board: Arc<StatusBoard>,
    trigger: SynthesisTrigger,
    settings: PipelineSettings,
}

/// Timeout 归入所在阶段的失败类型
fn stage_error(e: PipelineError, wrap: fn(String) -> PipelineError) -> PipelineError {
    match e {
        PipelineError::Timeout { .. } => wrap(e.to_string()),
        other => other,
    }
}

impl Pipeline {
    pub fn new(providers: Providers, store: Arc<dyn Store>, settings: PipelineSettings) -> Self {
        Self {
            providers,
            store,
            board: StatusBoard::new(),
            trigger: SynthesisTrigger::new(settings.synthesis_threshold),
            settings,
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn status(&self) -> StatusEvent {
        self.board.current()
    }

    pub fn subscribe(&self) -> watch::Receiver<StatusEvent> {
        self.board.subscribe()
    }

    pub fn is_busy(&self) -> bool {
        self.board.is_busy()
    }

    /// 交互路径：失败中止，无篇间等待
    pub fn interactive_options(&self) -> RunOptions {
        RunOptions {
            continue_on_story_failure: self.settings.interactive_continue_on_story_failure,
            story_delay: Duration::ZERO,
        }
    }

    /// 定时路径：单篇失败继续，篇间等待
    pub fn scheduled_options(&self) -> RunOptions {
        RunOptions {
            continue_on_story_failure: self.settings.scheduled_continue_on_story_failure,
            story_delay: self.settings.story_delay,
        }
    }

    /// 完整一轮：研究 → 逐篇撰写 → 写库 → 综述检查
    pub async fn run_cycle(&self, options: RunOptions) -> Result<CycleOutcome, PipelineError> {
        let Some(guard) = self.board.try_acquire() else {
            tracing::info!("Pipeline already running; trigger ignored");
            return Ok(CycleOutcome::Skipped);
        };

        guard.set(PipelineStatus::Researching, "Researcher Agent: scanning global news...");
        let research = &self.providers.research;
        let stories = match audited(
            "research",
            research.name(),
            self.settings.capability_timeout,
            research.research(),
        )
        .await
        {
            Ok(stories) => stories,
            Err(e) => return Err(self.fail(guard, stage_error(e, PipelineError::Research))),
        };
        tracing::info!(count = stories.len(), "Research complete");

        if stories.is_empty() {
            if let Err(e) = self.store.set_last_updated(Utc::now()).await {
                return Err(self.fail(guard, e));
            }
            guard.finish(
                PipelineStatus::Complete,
                "No new stories found.",
                self.settings.complete_display,
            );
            return Ok(CycleOutcome::Completed(CycleReport {
                articles_added: 0,
                philosophical_summary: false,
                summary_id: None,
                failed_topics: Vec::new(),
                timestamp: Utc::now(),
            }));
        }

        let total = stories.len();
        let skip_delay = self.providers.rate_limit_free();
        let mut articles = Vec::with_capacity(total);
        let mut failed_topics = Vec::new();
        for (i, story) in stories.into_iter().enumerate() {
            if i > 0 && !options.story_delay.is_zero() && !skip_delay {
                tracing::debug!(secs = options.story_delay.as_secs(), "Waiting before next story");
                tokio::time::sleep(options.story_delay).await;
            }
            guard.set(
                PipelineStatus::Writing,
                format!("Journalist Agent: writing {}/{}: {}", i + 1, total, story.topic),
            );
            match self.write_story(story.clone()).await {
                Ok(article) => articles.push(article),
                Err(e) if options.continue_on_story_failure => {
                    tracing::error!(topic = %story.topic, error = %e, "Story failed; continuing");
                    failed_topics.push(story.topic);
                }
                Err(e) => {
                    tracing::error!(topic = %story.topic, error = %e, "Story failed; aborting run");
                    return Err(self.fail(guard, e));
                }
            }
        }

        if articles.is_empty() {
            return Err(self.fail(
                guard,
                PipelineError::Compose("failed to generate any articles".into()),
            ));
        }

        let summary = match self.commit(&guard, &articles).await {
            Ok(summary) => summary,
            Err(e) => return Err(self.fail(guard, e)),
        };

        let report = CycleReport {
            articles_added: articles.len(),
            philosophical_summary: summary.is_some(),
            summary_id: summary,
            failed_topics,
            timestamp: Utc::now(),
        };
        guard.finish(
            PipelineStatus::Complete,
            format!("Published {} articles", report.articles_added),
            self.settings.complete_display,
        );
        Ok(CycleOutcome::Completed(report))
    }

    /// 手动注入：对一条 Story 只执行撰写 → 写库（同样受重入保护，同样计入综述计数）
    pub async fn inject_story(&self, story: Story) -> Result<Article, PipelineError> {
        if !story.is_valid() {
            return Err(PipelineError::InvalidStory(
                "topic and context must be non-empty".into(),
            ));
        }
        let Some(guard) = self.board.try_acquire() else {
            return Err(PipelineError::Busy);
        };

        guard.set(
            PipelineStatus::Writing,
            format!("Journalist Agent: writing injected story: {}", story.topic),
        );
        let article = match self.write_story(story).await {
            Ok(article) => article,
            Err(e) => return Err(self.fail(guard, e)),
        };
        if let Err(e) = self.commit(&guard, std::slice::from_ref(&article)).await {
            return Err(self.fail(guard, e));
        }
        guard.finish(
            PipelineStatus::Complete,
            format!("Published: {}", article.title),
            self.settings.complete_display,
        );
        Ok(article)
    }

    /// 配图 → 标签 → SEO → 撰写；Story 上已有的丰富字段保留
    async fn write_story(&self, mut story: Story) -> Result<Article, PipelineError> {
        let limit = self.settings.capability_timeout;

        if story.image_url.is_none() {
            story.image_url = Some(self.providers.images.generate(&story.topic).await);
        }
        if story.tags.as_ref().map_or(true, Vec::is_empty) {
            story.tags = Some(self.generate_tags(&story).await);
        }
        if story.seo.is_none() {
            story.seo = Some(self.generate_seo(&story).await);
        }

        let compose = &self.providers.compose;
        audited("compose", compose.name(), limit, compose.compose(&story))
            .await
            .map_err(|e| stage_error(e, PipelineError::Compose))
    }

    async fn generate_tags(&self, story: &Story) -> Vec<String> {
        let Some(text) = &self.providers.text else {
            return default_tags();
        };
        let prompt = format!(
            "Generate 3-5 short SEO tags for a news article with this context. \
             Return only a comma-separated list.\n\n{}",
            story.context
        );
        match audited("generate_text", text.name(), self.settings.capability_timeout, text.generate_text(&prompt)).await {
            Ok(raw) => parse_tags(&raw),
            Err(e) => {
                tracing::warn!(topic = %story.topic, error = %e, "Tag generation failed; using defaults");
                default_tags()
            }
        }
    }

    async fn generate_seo(&self, story: &Story) -> crate::model::SeoMetadata {
        let fallback = || default_seo(&story.topic, &story.context);
        let Some(text) = &self.providers.text else {
            return fallback();
        };
        let prompt = format!(
            "Write SEO metadata for a news article with this context. Respond as JSON \
             {{\"title\": \"...\", \"description\": \"...\"}}; the description is at most 155 characters.\n\n{}",
            story.context
        );
        match audited("generate_text", text.name(), self.settings.capability_timeout, text.generate_text(&prompt)).await {
            Ok(raw) => parse_seo(&raw).unwrap_or_else(fallback),
            Err(e) => {
                tracing::warn!(topic = %story.topic, error = %e, "SEO generation failed; using defaults");
                fallback()
            }
        }
    }

    /// 文章与计数器一起提交，再记 lastUpdated，最后检查综述；返回本次生成的综述 id
    async fn commit(&self, guard: &RunGuard, articles: &[Article]) -> Result<Option<String>, PipelineError> {
        let counter = self.store.commit_articles(articles).await?;
        tracing::info!(saved = articles.len(), counter, "Articles persisted");
        if let Err(e) = self.store.set_last_updated(Utc::now()).await {
            tracing::warn!(error = %e, "Failed to record last update time; articles already committed");
        }

        if !self.trigger.should_fire(counter) {
            return Ok(None);
        }
        guard.set(
            PipelineStatus::Synthesizing,
            "Philosopher Agent: synthesizing the latest articles...",
        );
        match self
            .trigger
            .fire(
                self.store.as_ref(),
                self.providers.synthesis.as_ref(),
                self.settings.capability_timeout,
            )
            .await
        {
            Ok(summary) => Ok(Some(summary.id)),
            Err(e) => {
                // 文章已提交；计数器保持，下一轮再试
                tracing::error!(error = %e, counter, "Synthesis failed");
                Ok(None)
            }
        }
    }

    fn fail(&self, guard: RunGuard, e: PipelineError) -> PipelineError {
        tracing::error!(error = %e, "Pipeline run failed");
        guard.finish(PipelineStatus::Error, e.to_string(), self.settings.error_cooldown);
        e
    }
}

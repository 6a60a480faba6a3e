//! 数据模型：Story（研究产物）、Article（持久化文章）、PhilosophicalSummary（哲学综述）
//!
//! JSON 字段名保持 camelCase，与前端消费的记录格式一致；时间戳在内存中为 `DateTime<Utc>`，
//! 落库时为毫秒时间戳。

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// SEO 元数据（标题 + 描述）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeoMetadata {
    pub title: String,
    pub description: String,
}

/// 研究阶段产出的新闻线索，尚未持久化；丰富阶段会补上配图、标签与 SEO
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Story {
    pub topic: String,
    pub context: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seo: Option<SeoMetadata>,
}

impl Story {
    pub fn new(topic: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            context: context.into(),
            image_url: None,
            tags: None,
            seo: None,
        }
    }

    /// topic 与 context 均非空（去除空白后）
    pub fn is_valid(&self) -> bool {
        !self.topic.trim().is_empty() && !self.context.trim().is_empty()
    }
}

/// 文章小节
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleSection {
    pub heading: String,
    pub content: String,
}

/// 持久化文章：创建后不可变
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub sections: Vec<ArticleSection>,
    pub tags: Vec<String>,
    #[serde(with = "millis")]
    pub timestamp: DateTime<Utc>,
    pub source_topic: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seo: Option<SeoMetadata>,
}

/// 综述覆盖的时间区间：源文章时间戳的 (min, max)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    #[serde(with = "millis")]
    pub start: DateTime<Utc>,
    #[serde(with = "millis")]
    pub end: DateTime<Utc>,
}

impl DateRange {
    /// 由一批文章推导区间；空批次返回 None
    pub fn of(articles: &[Article]) -> Option<Self> {
        let start = articles.iter().map(|a| a.timestamp).min()?;
        let end = articles.iter().map(|a| a.timestamp).max()?;
        Some(Self { start, end })
    }
}

/// 跨文章的哲学综合：主题、悖论、未来影响
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Synthesis {
    pub themes: Vec<String>,
    pub paradoxes: Vec<String>,
    pub future_implications: Vec<String>,
}

/// 哲学综述：只通过 id 弱引用源文章，不内嵌副本
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhilosophicalSummary {
    pub id: String,
    pub title: String,
    pub content: String,
    pub article_ids: Vec<String>,
    #[serde(with = "millis")]
    pub timestamp: DateTime<Utc>,
    pub date_range: DateRange,
    pub tags: Vec<String>,
    pub synthesis: Synthesis,
}

pub fn new_article_id() -> String {
    format!("article-{}", Uuid::new_v4())
}

pub fn new_summary_id() -> String {
    format!("summary-{}", Uuid::new_v4())
}

static LAST_STAMP_MS: AtomicI64 = AtomicI64::new(0);

/// 进程内严格递增的毫秒时钟：同一批次内的文章也有确定的先后顺序
pub fn monotonic_now() -> DateTime<Utc> {
    let now = Utc::now().timestamp_millis();
    let mut prev = LAST_STAMP_MS.load(Ordering::Relaxed);
    loop {
        let next = now.max(prev + 1);
        match LAST_STAMP_MS.compare_exchange_weak(prev, next, Ordering::SeqCst, Ordering::Relaxed) {
            Ok(_) => return from_millis(next),
            Err(actual) => prev = actual,
        }
    }
}

/// 毫秒时间戳 → DateTime；越界值钳到 UNIX 纪元
pub fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

/// serde 适配：DateTime <-> 毫秒整数
pub mod millis {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_i64(dt.timestamp_millis())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let ms = i64::deserialize(d)?;
        Ok(super::from_millis(ms))
    }
}

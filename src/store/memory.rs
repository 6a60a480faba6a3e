//! 进程内存储（测试与 mock 运行）

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::core::PipelineError;
use crate::model::{Article, PhilosophicalSummary};
use crate::store::{clamp_limit, Store};

#[derive(Default)]
struct Inner {
    articles: HashMap<String, Article>,
    summaries: HashMap<String, PhilosophicalSummary>,
    last_updated: Option<DateTime<Utc>>,
    articles_since_last_summary: u64,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn article_count(&self) -> usize {
        self.inner.read().await.articles.len()
    }
}

fn newest_first<T>(items: &mut [T], key: impl Fn(&T) -> (DateTime<Utc>, &str)) {
    items.sort_by(|a, b| key(b).cmp(&key(a)));
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_all_articles(&self, limit: usize) -> Result<Vec<Article>, PipelineError> {
        let inner = self.inner.read().await;
        let mut all: Vec<Article> = inner.articles.values().cloned().collect();
        newest_first(&mut all, |a| (a.timestamp, a.id.as_str()));
        all.truncate(clamp_limit(limit));
        Ok(all)
    }

    async fn save_articles(&self, batch: &[Article]) -> Result<(), PipelineError> {
        let mut inner = self.inner.write().await;
        for article in batch {
            inner.articles.insert(article.id.clone(), article.clone());
        }
        Ok(())
    }

    async fn commit_articles(&self, batch: &[Article]) -> Result<u64, PipelineError> {
        let mut inner = self.inner.write().await;
        for article in batch {
            inner.articles.insert(article.id.clone(), article.clone());
        }
        inner.articles_since_last_summary += batch.len() as u64;
        Ok(inner.articles_since_last_summary)
    }

    async fn get_last_updated(&self) -> Result<Option<DateTime<Utc>>, PipelineError> {
        Ok(self.inner.read().await.last_updated)
    }

    async fn set_last_updated(&self, at: DateTime<Utc>) -> Result<(), PipelineError> {
        self.inner.write().await.last_updated = Some(at);
        Ok(())
    }

    async fn get_all_summaries(&self, limit: usize) -> Result<Vec<PhilosophicalSummary>, PipelineError> {
        let inner = self.inner.read().await;
        let mut all: Vec<PhilosophicalSummary> = inner.summaries.values().cloned().collect();
        newest_first(&mut all, |s| (s.timestamp, s.id.as_str()));
        all.truncate(clamp_limit(limit));
        Ok(all)
    }

    async fn save_summary(&self, summary: &PhilosophicalSummary) -> Result<(), PipelineError> {
        self.inner
            .write()
            .await
            .summaries
            .insert(summary.id.clone(), summary.clone());
        Ok(())
    }

    async fn save_summary_and_reset_counter(&self, summary: &PhilosophicalSummary) -> Result<(), PipelineError> {
        let mut inner = self.inner.write().await;
        inner.summaries.insert(summary.id.clone(), summary.clone());
        inner.articles_since_last_summary = 0;
        Ok(())
    }

    async fn get_summary_by_id(&self, id: &str) -> Result<Option<PhilosophicalSummary>, PipelineError> {
        Ok(self.inner.read().await.summaries.get(id).cloned())
    }

    async fn get_articles_since_last_summary(&self) -> Result<u64, PipelineError> {
        Ok(self.inner.read().await.articles_since_last_summary)
    }

    async fn set_articles_since_last_summary(&self, value: u64) -> Result<(), PipelineError> {
        self.inner.write().await.articles_since_last_summary = value;
        Ok(())
    }

    async fn increment_articles_since_last_summary(&self, by: u64) -> Result<u64, PipelineError> {
        let mut inner = self.inner.write().await;
        inner.articles_since_last_summary += by;
        Ok(inner.articles_since_last_summary)
    }

    async fn get_articles_by_ids(&self, ids: &[String]) -> Result<Vec<Article>, PipelineError> {
        let inner = self.inner.read().await;
        Ok(ids.iter().filter_map(|id| inner.articles.get(id).cloned()).collect())
    }
}

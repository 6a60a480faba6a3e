//! 持久化网关：文章、哲学综述与两个标量状态（lastUpdated、articlesSinceLastSummary）
//!
//! 唯一事实来源。两种实现：
//! - [`SqliteStore`]：sqlx 连接池 + 事务
//! - [`MemoryStore`]：tokio RwLock，供测试与 mock 运行

mod memory;
mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::StorageSection;
use crate::core::PipelineError;
use crate::model::{Article, PhilosophicalSummary};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// 读路径返回条数上限
pub const MAX_READ_LIMIT: usize = 50;

/// 持久化接口；读列表均按时间戳倒序
#[async_trait]
pub trait Store: Send + Sync {
    async fn get_all_articles(&self, limit: usize) -> Result<Vec<Article>, PipelineError>;

    /// 按 id 幂等 upsert；整批成功或整批不生效
    async fn save_articles(&self, batch: &[Article]) -> Result<(), PipelineError>;

    /// 保存一批文章并把计数器加上批大小，二者同进同退；返回计数器新值
    async fn commit_articles(&self, batch: &[Article]) -> Result<u64, PipelineError>;

    async fn get_last_updated(&self) -> Result<Option<DateTime<Utc>>, PipelineError>;

    async fn set_last_updated(&self, at: DateTime<Utc>) -> Result<(), PipelineError>;

    async fn get_all_summaries(&self, limit: usize) -> Result<Vec<PhilosophicalSummary>, PipelineError>;

    async fn save_summary(&self, summary: &PhilosophicalSummary) -> Result<(), PipelineError>;

    /// 保存综述并把计数器归零，二者同进同退
    async fn save_summary_and_reset_counter(&self, summary: &PhilosophicalSummary) -> Result<(), PipelineError>;

    async fn get_summary_by_id(&self, id: &str) -> Result<Option<PhilosophicalSummary>, PipelineError>;

    async fn get_articles_since_last_summary(&self) -> Result<u64, PipelineError>;

    async fn set_articles_since_last_summary(&self, value: u64) -> Result<(), PipelineError>;

    /// 原子地读-加-写，返回新值
    async fn increment_articles_since_last_summary(&self, by: u64) -> Result<u64, PipelineError>;

    /// 解引用综述中的文章 id；不存在的 id 跳过，结果保持入参顺序
    async fn get_articles_by_ids(&self, ids: &[String]) -> Result<Vec<Article>, PipelineError>;
}

pub(crate) fn clamp_limit(limit: usize) -> usize {
    limit.clamp(1, MAX_READ_LIMIT)
}

/// 按配置打开存储：`:memory:` 为进程内存储，其余为 SQLite 文件
pub async fn open_store(storage: &StorageSection) -> Result<Arc<dyn Store>, PipelineError> {
    if storage.database_path.as_os_str() == ":memory:" {
        tracing::info!("Using in-memory store");
        return Ok(Arc::new(MemoryStore::new()));
    }
    let store = SqliteStore::open(&storage.database_path).await?;
    tracing::info!(path = %storage.database_path.display(), "SQLite store opened");
    Ok(Arc::new(store))
}

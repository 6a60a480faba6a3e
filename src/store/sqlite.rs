//! SQLite 存储（sqlx，完全异步）
//!
//! 内容表为扁平行 + JSON 列；时间戳存毫秒整数。计数器的加法在单个事务里完成。

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::query::Query;
use sqlx::sqlite::{
    Sqlite, SqliteArguments, SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePool,
    SqlitePoolOptions, SqliteRow,
};
use sqlx::Row;

use crate::core::PipelineError;
use crate::model::{from_millis, Article, DateRange, PhilosophicalSummary};
use crate::store::{clamp_limit, Store};

const KEY_LAST_UPDATED: &str = "last_updated";
const KEY_SINCE_SUMMARY: &str = "articles_since_last_summary";

const UPSERT_STATE: &str = "INSERT INTO system_state (key, value) VALUES (?, ?)
     ON CONFLICT(key) DO UPDATE SET value = excluded.value";

const UPSERT_ARTICLE: &str =
    "INSERT INTO articles (id, title, summary, sections, tags, timestamp, source_topic, image_url, seo)
     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
     ON CONFLICT(id) DO UPDATE SET
        title = excluded.title,
        summary = excluded.summary,
        sections = excluded.sections,
        tags = excluded.tags,
        timestamp = excluded.timestamp,
        source_topic = excluded.source_topic,
        image_url = excluded.image_url,
        seo = excluded.seo";

const UPSERT_SUMMARY: &str =
    "INSERT INTO summaries (id, title, content, article_ids, timestamp, range_start, range_end, tags, synthesis)
     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
     ON CONFLICT(id) DO UPDATE SET
        title = excluded.title,
        content = excluded.content,
        article_ids = excluded.article_ids,
        timestamp = excluded.timestamp,
        range_start = excluded.range_start,
        range_end = excluded.range_end,
        tags = excluded.tags,
        synthesis = excluded.synthesis";

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// 打开（必要时创建）数据库文件并建表
    pub async fn open(db_path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let url = format!("sqlite:{}", db_path.as_ref().display());
        let options = SqliteConnectOptions::from_str(&url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_tables().await?;
        Ok(store)
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn init_tables(&self) -> Result<(), PipelineError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS articles (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                summary TEXT NOT NULL,
                sections TEXT NOT NULL,
                tags TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                source_topic TEXT NOT NULL,
                image_url TEXT,
                seo TEXT
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS summaries (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                article_ids TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                range_start INTEGER NOT NULL,
                range_end INTEGER NOT NULL,
                tags TEXT NOT NULL,
                synthesis TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS system_state (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_articles_timestamp ON articles(timestamp)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_summaries_timestamp ON summaries(timestamp)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn get_state(&self, key: &str) -> Result<Option<String>, PipelineError> {
        let row = sqlx::query("SELECT value FROM system_state WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get("value")))
    }

    async fn set_state(&self, key: &str, value: &str) -> Result<(), PipelineError> {
        sqlx::query(UPSERT_STATE)
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// 在调用方的事务内逐条 upsert
async fn insert_articles(conn: &mut SqliteConnection, batch: &[Article]) -> Result<(), PipelineError> {
    for article in batch {
        let seo = article.seo.as_ref().map(serde_json::to_string).transpose()?;
        sqlx::query(UPSERT_ARTICLE)
            .bind(&article.id)
            .bind(&article.title)
            .bind(&article.summary)
            .bind(serde_json::to_string(&article.sections)?)
            .bind(serde_json::to_string(&article.tags)?)
            .bind(article.timestamp.timestamp_millis())
            .bind(&article.source_topic)
            .bind(&article.image_url)
            .bind(seo)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

/// 计数器加法：单条 upsert 完成读-加-写，返回新值
async fn bump_counter(conn: &mut SqliteConnection, by: u64) -> Result<u64, PipelineError> {
    sqlx::query(
        "INSERT INTO system_state (key, value) VALUES (?, ?)
         ON CONFLICT(key) DO UPDATE SET
            value = CAST(CAST(system_state.value AS INTEGER) + CAST(excluded.value AS INTEGER) AS TEXT)",
    )
    .bind(KEY_SINCE_SUMMARY)
    .bind(by.to_string())
    .execute(&mut *conn)
    .await?;
    let row = sqlx::query("SELECT value FROM system_state WHERE key = ?")
        .bind(KEY_SINCE_SUMMARY)
        .fetch_one(&mut *conn)
        .await?;
    let raw: String = row.try_get("value")?;
    parse_counter(&raw)
}

fn summary_query(summary: &PhilosophicalSummary) -> Result<Query<'_, Sqlite, SqliteArguments<'_>>, PipelineError> {
    Ok(sqlx::query(UPSERT_SUMMARY)
        .bind(&summary.id)
        .bind(&summary.title)
        .bind(&summary.content)
        .bind(serde_json::to_string(&summary.article_ids)?)
        .bind(summary.timestamp.timestamp_millis())
        .bind(summary.date_range.start.timestamp_millis())
        .bind(summary.date_range.end.timestamp_millis())
        .bind(serde_json::to_string(&summary.tags)?)
        .bind(serde_json::to_string(&summary.synthesis)?))
}

fn parse_counter(raw: &str) -> Result<u64, PipelineError> {
    raw.trim()
        .parse()
        .map_err(|_| PipelineError::Persistence(format!("corrupt counter value '{raw}'")))
}

fn article_from_row(row: &SqliteRow) -> Result<Article, PipelineError> {
    let sections: String = row.try_get("sections")?;
    let tags: String = row.try_get("tags")?;
    let seo: Option<String> = row.try_get("seo")?;
    Ok(Article {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        summary: row.try_get("summary")?,
        sections: serde_json::from_str(&sections)?,
        tags: serde_json::from_str(&tags)?,
        timestamp: from_millis(row.try_get("timestamp")?),
        source_topic: row.try_get("source_topic")?,
        image_url: row.try_get("image_url")?,
        seo: seo.map(|s| serde_json::from_str(&s)).transpose()?,
    })
}

fn summary_from_row(row: &SqliteRow) -> Result<PhilosophicalSummary, PipelineError> {
    let article_ids: String = row.try_get("article_ids")?;
    let tags: String = row.try_get("tags")?;
    let synthesis: String = row.try_get("synthesis")?;
    Ok(PhilosophicalSummary {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        article_ids: serde_json::from_str(&article_ids)?,
        timestamp: from_millis(row.try_get("timestamp")?),
        date_range: DateRange {
            start: from_millis(row.try_get("range_start")?),
            end: from_millis(row.try_get("range_end")?),
        },
        tags: serde_json::from_str(&tags)?,
        synthesis: serde_json::from_str(&synthesis)?,
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn get_all_articles(&self, limit: usize) -> Result<Vec<Article>, PipelineError> {
        let rows = sqlx::query("SELECT * FROM articles ORDER BY timestamp DESC, id DESC LIMIT ?")
            .bind(clamp_limit(limit) as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(article_from_row).collect()
    }

    async fn save_articles(&self, batch: &[Article]) -> Result<(), PipelineError> {
        let mut tx = self.pool.begin().await?;
        insert_articles(&mut tx, batch).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn commit_articles(&self, batch: &[Article]) -> Result<u64, PipelineError> {
        let mut tx = self.pool.begin().await?;
        insert_articles(&mut tx, batch).await?;
        let counter = bump_counter(&mut tx, batch.len() as u64).await?;
        tx.commit().await?;
        Ok(counter)
    }

    async fn get_last_updated(&self) -> Result<Option<DateTime<Utc>>, PipelineError> {
        match self.get_state(KEY_LAST_UPDATED).await? {
            Some(raw) => raw
                .trim()
                .parse::<i64>()
                .map(|ms| Some(from_millis(ms)))
                .map_err(|_| PipelineError::Persistence(format!("corrupt last_updated '{raw}'"))),
            None => Ok(None),
        }
    }

    async fn set_last_updated(&self, at: DateTime<Utc>) -> Result<(), PipelineError> {
        self.set_state(KEY_LAST_UPDATED, &at.timestamp_millis().to_string())
            .await
    }

    async fn get_all_summaries(&self, limit: usize) -> Result<Vec<PhilosophicalSummary>, PipelineError> {
        let rows = sqlx::query("SELECT * FROM summaries ORDER BY timestamp DESC, id DESC LIMIT ?")
            .bind(clamp_limit(limit) as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(summary_from_row).collect()
    }

    async fn save_summary(&self, summary: &PhilosophicalSummary) -> Result<(), PipelineError> {
        summary_query(summary)?.execute(&self.pool).await?;
        Ok(())
    }

    async fn save_summary_and_reset_counter(&self, summary: &PhilosophicalSummary) -> Result<(), PipelineError> {
        let mut tx = self.pool.begin().await?;
        summary_query(summary)?.execute(&mut *tx).await?;
        sqlx::query(UPSERT_STATE)
            .bind(KEY_SINCE_SUMMARY)
            .bind("0")
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_summary_by_id(&self, id: &str) -> Result<Option<PhilosophicalSummary>, PipelineError> {
        let row = sqlx::query("SELECT * FROM summaries WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(summary_from_row).transpose()
    }

    async fn get_articles_since_last_summary(&self) -> Result<u64, PipelineError> {
        match self.get_state(KEY_SINCE_SUMMARY).await? {
            Some(raw) => parse_counter(&raw),
            None => Ok(0),
        }
    }

    async fn set_articles_since_last_summary(&self, value: u64) -> Result<(), PipelineError> {
        self.set_state(KEY_SINCE_SUMMARY, &value.to_string()).await
    }

    async fn increment_articles_since_last_summary(&self, by: u64) -> Result<u64, PipelineError> {
        let mut tx = self.pool.begin().await?;
        let counter = bump_counter(&mut tx, by).await?;
        tx.commit().await?;
        Ok(counter)
    }

    async fn get_articles_by_ids(&self, ids: &[String]) -> Result<Vec<Article>, PipelineError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!("SELECT * FROM articles WHERE id IN ({placeholders})");
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id);
        }
        let rows = query.fetch_all(&self.pool).await?;
        let mut found = rows
            .iter()
            .map(article_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        found.sort_by_key(|a| ids.iter().position(|id| *id == a.id));
        Ok(found)
    }
}

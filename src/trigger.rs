//! 定时触发入口（cron）
//!
//! 以 `Authorization: Bearer <secret>` 鉴权；未配置 secret 时拒绝所有请求。鉴权失败时不执行任何阶段。
//! 通过鉴权后走定时路径：单篇失败继续、篇间等待。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::{CycleOutcome, Pipeline, TriggerError};

/// cron 响应体
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CronResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub articles_added: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub philosophical_summary: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none", with = "opt_millis")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// 建议的 HTTP 状态码
    #[serde(skip)]
    pub status_code: u16,
}

impl CronResponse {
    fn failure(status_code: u16, error: impl Into<String>) -> Self {
        Self {
            success: false,
            articles_added: None,
            philosophical_summary: None,
            timestamp: None,
            message: None,
            error: Some(error.into()),
            status_code,
        }
    }
}

mod opt_millis {
    use chrono::{DateTime, Utc};
    use serde::Serializer;

    pub fn serialize<S: Serializer>(dt: &Option<DateTime<Utc>>, s: S) -> Result<S::Ok, S::Error> {
        match dt {
            Some(dt) => s.serialize_i64(dt.timestamp_millis()),
            None => s.serialize_none(),
        }
    }
}

/// 常数时间比较
fn secure_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

pub struct CronTrigger {
    pipeline: Arc<Pipeline>,
    secret: Option<String>,
}

impl CronTrigger {
    pub fn new(pipeline: Arc<Pipeline>, secret: Option<String>) -> Self {
        let secret = secret.filter(|s| !s.trim().is_empty());
        if secret.is_none() {
            tracing::warn!("No cron secret configured; scheduled trigger will reject every request");
        }
        Self { pipeline, secret }
    }

    /// 校验 Authorization 头
    pub fn authorize(&self, authorization: Option<&str>) -> Result<(), TriggerError> {
        let Some(secret) = self.secret.as_deref() else {
            return Err(TriggerError::Unauthorized);
        };
        let presented = authorization
            .and_then(|h| h.trim().strip_prefix("Bearer "))
            .map(str::trim)
            .ok_or(TriggerError::Unauthorized)?;
        if secure_eq(presented.as_bytes(), secret.as_bytes()) {
            Ok(())
        } else {
            Err(TriggerError::Unauthorized)
        }
    }

    /// 鉴权并执行一轮定时路径
    pub async fn handle(&self, authorization: Option<&str>) -> Result<CronResponse, TriggerError> {
        if let Err(e) = self.authorize(authorization) {
            tracing::warn!("Unauthorized attempt to trigger agent cron");
            return Err(e);
        }
        tracing::info!("Starting autonomous agent cycle via cron");

        let response = match self.pipeline.run_cycle(self.pipeline.scheduled_options()).await {
            Ok(CycleOutcome::Completed(report)) => CronResponse {
                success: true,
                articles_added: Some(report.articles_added),
                philosophical_summary: Some(report.philosophical_summary),
                timestamp: Some(report.timestamp),
                message: (report.articles_added == 0).then(|| "No new stories found.".to_string()),
                error: None,
                status_code: 200,
            },
            Ok(CycleOutcome::Skipped) => CronResponse::failure(409, "pipeline busy"),
            Err(e) => CronResponse::failure(500, e.to_string()),
        };
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PipelineSettings;
    use crate::providers::Providers;
    use crate::store::{MemoryStore, Store};

    fn trigger(secret: Option<&str>) -> (CronTrigger, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let pipeline = Arc::new(Pipeline::new(
            Providers::mock(),
            store.clone(),
            PipelineSettings::immediate(),
        ));
        (CronTrigger::new(pipeline, secret.map(String::from)), store)
    }

    #[test]
    fn test_authorize() {
        let (t, _) = trigger(Some("s3cret"));
        assert!(t.authorize(Some("Bearer s3cret")).is_ok());
        assert_eq!(t.authorize(Some("Bearer wrong")), Err(TriggerError::Unauthorized));
        assert_eq!(t.authorize(Some("s3cret")), Err(TriggerError::Unauthorized));
        assert_eq!(t.authorize(None), Err(TriggerError::Unauthorized));

        let (open, _) = trigger(None);
        assert_eq!(open.authorize(Some("Bearer ")), Err(TriggerError::Unauthorized));
    }

    #[tokio::test]
    async fn test_handle_runs_scheduled_cycle() {
        let (t, store) = trigger(Some("s3cret"));
        let resp = t.handle(Some("Bearer s3cret")).await.unwrap();
        assert!(resp.success);
        assert_eq!(resp.articles_added, Some(3));
        assert_eq!(resp.status_code, 200);
        assert_eq!(store.article_count().await, 3);

        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["articlesAdded"], 3);
        assert_eq!(json["philosophicalSummary"], false);
        assert!(json["timestamp"].is_i64());
        assert!(json.get("statusCode").is_none());
    }

    #[tokio::test]
    async fn test_unauthorized_runs_nothing() {
        let (t, store) = trigger(Some("s3cret"));
        assert!(t.handle(Some("Bearer nope")).await.is_err());
        assert_eq!(store.article_count().await, 0);
        assert!(store.get_last_updated().await.unwrap().is_none());
    }
}

//! 自动更新循环：每隔 check_interval 检查 lastUpdated，超过 update_interval（或从未更新）时跑一轮交互路径

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::config::PipelineSection;
use crate::core::pipeline::{CycleOutcome, Pipeline};

/// 是否到期：从未更新，或距上次更新已超过 interval
pub fn is_due(last_updated: Option<DateTime<Utc>>, now: DateTime<Utc>, interval: Duration) -> bool {
    match last_updated {
        None => true,
        Some(last) => (now - last).to_std().map_or(false, |elapsed| elapsed >= interval),
    }
}

pub struct AutoUpdater {
    pipeline: Arc<Pipeline>,
    update_interval: Duration,
    check_interval: Duration,
}

impl AutoUpdater {
    pub fn new(pipeline: Arc<Pipeline>, update_interval: Duration, check_interval: Duration) -> Self {
        Self {
            pipeline,
            update_interval,
            check_interval: check_interval.max(Duration::from_millis(10)),
        }
    }

    pub fn from_settings(pipeline: Arc<Pipeline>, section: &PipelineSection) -> Self {
        Self::new(
            pipeline,
            section.update_interval(),
            Duration::from_secs(section.check_interval_secs),
        )
    }

    /// 检查一次，必要时运行；返回是否真正跑完了一轮
    pub async fn tick(&self) -> bool {
        let last = match self.pipeline.store().get_last_updated().await {
            Ok(last) => last,
            Err(e) => {
                tracing::warn!(error = %e, "Could not read last update time");
                return false;
            }
        };
        if !is_due(last, Utc::now(), self.update_interval) || self.pipeline.is_busy() {
            return false;
        }
        tracing::info!(last_updated = ?last, "Content is stale; starting update cycle");
        match self.pipeline.run_cycle(self.pipeline.interactive_options()).await {
            Ok(CycleOutcome::Completed(report)) => {
                tracing::info!(added = report.articles_added, "Auto update finished");
                true
            }
            Ok(CycleOutcome::Skipped) => false,
            Err(e) => {
                tracing::warn!(error = %e, "Auto update failed; will retry on a later check");
                false
            }
        }
    }

    /// 运行直到 token 被取消；启动时立即检查一次
    pub async fn run(&self, token: CancellationToken) {
        tracing::info!(
            update_interval_secs = self.update_interval.as_secs(),
            check_interval_secs = self.check_interval.as_secs(),
            "Auto updater started"
        );
        let mut ticker = tokio::time::interval(self.check_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                // 已开始的一轮不被中断，关闭时由 PipelineDrain 等待其结束
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
        tracing::info!("Auto updater stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pipeline::PipelineSettings;
    use crate::providers::Providers;
    use crate::store::{MemoryStore, Store};

    #[test]
    fn test_is_due() {
        let now = Utc::now();
        let twelve_h = Duration::from_secs(12 * 3600);
        assert!(is_due(None, now, twelve_h));
        assert!(!is_due(Some(now - chrono::Duration::hours(1)), now, twelve_h));
        assert!(is_due(Some(now - chrono::Duration::hours(13)), now, twelve_h));
        // 时钟回拨不触发
        assert!(!is_due(Some(now + chrono::Duration::hours(1)), now, twelve_h));
    }

    #[tokio::test]
    async fn test_tick_runs_only_when_stale() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = Arc::new(Pipeline::new(Providers::mock(), store.clone(), PipelineSettings::immediate()));
        let updater = AutoUpdater::new(pipeline, Duration::from_secs(3600), Duration::from_secs(60));

        assert!(updater.tick().await);
        assert_eq!(store.article_count().await, 3);
        assert!(!updater.tick().await);
        assert_eq!(store.article_count().await, 3);
        assert!(store.get_last_updated().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = Arc::new(Pipeline::new(Providers::mock(), store, PipelineSettings::immediate()));
        let updater = AutoUpdater::new(pipeline, Duration::from_secs(3600), Duration::from_millis(20));
        let token = CancellationToken::new();
        let handle = {
            let token = token.clone();
            tokio::spawn(async move { updater.run(token).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
    }
}

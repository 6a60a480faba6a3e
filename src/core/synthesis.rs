//! 综述触发器：计数器达到阈值时，对全库最新的 N 篇文章做哲学综合
//!
//! 判定是纯函数；触发阶段只有在 synthesize 与 save_summary 都成功后才把计数器清零。
//! 失败时计数器保持原值，已提交的文章不回滚。

use std::time::Duration;

use crate::core::audit::audited;
use crate::core::PipelineError;
use crate::model::{DateRange, PhilosophicalSummary};
use crate::providers::SynthesisProvider;
use crate::store::{Store, MAX_READ_LIMIT};

pub const DEFAULT_SYNTHESIS_THRESHOLD: u64 = 6;

#[derive(Debug, Clone, Copy)]
pub struct SynthesisTrigger {
    threshold: u64,
}

impl Default for SynthesisTrigger {
    fn default() -> Self {
        Self::new(DEFAULT_SYNTHESIS_THRESHOLD)
    }
}

impl SynthesisTrigger {
    /// 阈值同时是综述的批量大小；限制在 [1, 50]
    pub fn new(threshold: u64) -> Self {
        Self {
            threshold: threshold.clamp(1, MAX_READ_LIMIT as u64),
        }
    }

    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    pub fn should_fire(&self, articles_since_last_summary: u64) -> bool {
        articles_since_last_summary >= self.threshold
    }

    /// 选取最新的 N 篇文章并综述、保存、清零计数器
    pub async fn fire(
        &self,
        store: &dyn Store,
        synthesizer: &dyn SynthesisProvider,
        limit: Duration,
    ) -> Result<PhilosophicalSummary, PipelineError> {
        let mut selected = store.get_all_articles(self.threshold as usize).await?;
        if selected.is_empty() {
            return Err(PipelineError::Synthesis("no articles in store".into()));
        }
        // 按时间正序交给综述
        selected.reverse();
        tracing::info!(count = selected.len(), "Synthesizing most recent articles");

        let mut summary = audited("synthesize", synthesizer.name(), limit, synthesizer.synthesize(&selected))
            .await
            .map_err(|e| match e {
                PipelineError::Timeout { .. } => PipelineError::Synthesis(e.to_string()),
                other => other,
            })?;

        summary.article_ids = selected.iter().map(|a| a.id.clone()).collect();
        if let Some(range) = DateRange::of(&selected) {
            summary.date_range = range;
        }

        store.save_summary_and_reset_counter(&summary).await?;
        tracing::info!(id = %summary.id, title = %summary.title, "Philosophical summary saved");
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_fire() {
        let t = SynthesisTrigger::default();
        assert!(!t.should_fire(0));
        assert!(!t.should_fire(5));
        assert!(t.should_fire(6));
        assert!(t.should_fire(7));
    }

    #[test]
    fn test_threshold_is_clamped() {
        assert_eq!(SynthesisTrigger::new(0).threshold(), 1);
        assert_eq!(SynthesisTrigger::new(500).threshold(), 50);
    }
}

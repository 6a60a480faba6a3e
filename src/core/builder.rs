//! 流水线构建器：两个入口（无头守护进程 / HTTP 服务）共用同一套初始化逻辑

use std::sync::Arc;

use crate::config::AppConfig;
use crate::core::pipeline::{Pipeline, PipelineSettings};
use crate::core::PipelineError;
use crate::providers::Providers;
use crate::store::{open_store, Store};

pub struct PipelineBuilder {
    config: AppConfig,
    providers: Option<Providers>,
    store: Option<Arc<dyn Store>>,
}

impl PipelineBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            providers: None,
            store: None,
        }
    }

    /// 覆盖按配置选择的 Provider（测试注入）
    pub fn with_providers(mut self, providers: Providers) -> Self {
        self.providers = Some(providers);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// 解析 Provider（缺凭据时立即失败）、打开存储、组装编排器
    pub async fn build(self) -> Result<Arc<Pipeline>, PipelineError> {
        let providers = match self.providers {
            Some(p) => p,
            None => Providers::from_config(&self.config)?,
        };
        let store = match self.store {
            Some(s) => s,
            None => open_store(&self.config.storage).await?,
        };
        let settings = PipelineSettings::from(&self.config.pipeline);
        tracing::info!(
            threshold = settings.synthesis_threshold,
            timeout_secs = settings.capability_timeout.as_secs(),
            "Pipeline ready"
        );
        Ok(Arc::new(Pipeline::new(providers, store, settings)))
    }
}

//! 优雅关闭
//!
//! 统一监听 Ctrl+C / SIGTERM，通过 CancellationToken 通知自动更新循环与 HTTP 服务退出；
//! 退出前等待正在执行的一轮流水线到达终态，避免文章批次写到一半。

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::core::pipeline::Pipeline;

/// 关闭信号管理器
#[derive(Clone, Default)]
pub struct ShutdownManager {
    shutdown_token: CancellationToken,
}

/// 关闭原因
#[derive(Debug, Clone)]
pub enum ShutdownReason {
    /// Ctrl+C
    UserInitiated,
    /// SIGTERM
    Signal,
}

impl ShutdownManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取关闭 token（用于取消后台循环）
    pub fn token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub fn shutdown(&self, reason: ShutdownReason) {
        if !self.shutdown_token.is_cancelled() {
            tracing::info!(?reason, "Shutdown requested");
        }
        self.shutdown_token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    pub async fn wait_for_shutdown(&self) {
        self.shutdown_token.cancelled().await;
    }

    /// 安装系统信号处理器 (Ctrl+C, SIGTERM)
    pub fn install_signal_handlers(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
                manager.shutdown(ShutdownReason::UserInitiated);
            }
        });

        #[cfg(unix)]
        {
            let manager = Arc::clone(self);
            tokio::spawn(async move {
                use tokio::signal::unix::{signal, SignalKind};
                if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                    sigterm.recv().await;
                    tracing::info!("Received SIGTERM, initiating graceful shutdown...");
                    manager.shutdown(ShutdownReason::Signal);
                }
            });
        }
    }
}

/// 关闭时执行的清理任务
#[async_trait::async_trait]
pub trait ShutdownCleanup: Send + Sync {
    async fn cleanup(&self) -> anyhow::Result<()>;

    /// 清理任务名称（用于日志）
    fn name(&self) -> &'static str;
}

/// 关闭协调器：依次执行清理任务，每个任务有独立超时
pub struct ShutdownCoordinator {
    manager: Arc<ShutdownManager>,
    cleanup_tasks: Vec<Arc<dyn ShutdownCleanup>>,
    timeout_secs: u64,
}

impl ShutdownCoordinator {
    pub fn new(manager: Arc<ShutdownManager>) -> Self {
        Self {
            manager,
            cleanup_tasks: Vec::new(),
            timeout_secs: 30,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn register<T: ShutdownCleanup + 'static>(&mut self, task: T) {
        self.cleanup_tasks.push(Arc::new(task));
    }

    /// 先取消 token，使仍在运行的后台循环退出，再依次清理
    pub async fn run_cleanup(&self) {
        self.manager.token().cancel();
        tracing::info!("Running {} cleanup tasks...", self.cleanup_tasks.len());

        let timeout = Duration::from_secs(self.timeout_secs);
        for task in &self.cleanup_tasks {
            let name = task.name();
            match tokio::time::timeout(timeout, task.cleanup()).await {
                Ok(Ok(())) => tracing::info!("Cleanup task '{}' completed successfully", name),
                Ok(Err(e)) => tracing::warn!("Cleanup task '{}' failed: {}", name, e),
                Err(_) => {
                    tracing::warn!("Cleanup task '{}' timed out after {}s", name, self.timeout_secs)
                }
            }
        }

        tracing::info!("All cleanup tasks finished");
    }
}

/// 等待进行中的流水线回到 Idle
pub struct PipelineDrain {
    pipeline: Arc<Pipeline>,
    poll: Duration,
}

impl PipelineDrain {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self {
            pipeline,
            poll: Duration::from_millis(200),
        }
    }
}

#[async_trait::async_trait]
impl ShutdownCleanup for PipelineDrain {
    async fn cleanup(&self) -> anyhow::Result<()> {
        if self.pipeline.is_busy() {
            tracing::info!(status = ?self.pipeline.status().status, "Waiting for in-flight pipeline run");
        }
        while self.pipeline.is_busy() {
            tokio::time::sleep(self.poll).await;
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "Pipeline"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pipeline::PipelineSettings;
    use crate::providers::Providers;
    use crate::store::MemoryStore;

    #[test]
    fn test_shutdown_manager_token() {
        let manager = ShutdownManager::new();
        let token = manager.token();
        assert!(!manager.is_shutdown());
        manager.shutdown(ShutdownReason::UserInitiated);
        assert!(token.is_cancelled());
        assert!(manager.is_shutdown());
    }

    struct MockCleanup {
        called: Arc<std::sync::atomic::AtomicBool>,
    }

    #[async_trait::async_trait]
    impl ShutdownCleanup for MockCleanup {
        async fn cleanup(&self) -> anyhow::Result<()> {
            self.called.store(true, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }

        fn name(&self) -> &'static str {
            "MockCleanup"
        }
    }

    #[tokio::test]
    async fn test_shutdown_coordinator() {
        let manager = Arc::new(ShutdownManager::new());
        let mut coordinator = ShutdownCoordinator::new(manager).with_timeout(1);

        let called = Arc::new(std::sync::atomic::AtomicBool::new(false));
        coordinator.register(MockCleanup { called: called.clone() });
        let pipeline = Pipeline::new(
            Providers::mock(),
            Arc::new(MemoryStore::new()),
            PipelineSettings::immediate(),
        );
        coordinator.register(PipelineDrain::new(Arc::new(pipeline)));

        coordinator.run_cleanup().await;
        assert!(called.load(std::sync::atomic::Ordering::SeqCst));
    }
}

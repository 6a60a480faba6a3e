//! Zeitgeist 无头守护进程
//!
//! 入口：初始化日志、加载配置、构建流水线，运行自动更新循环直到 Ctrl+C / SIGTERM。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use zeitgeist::config::load_config;
use zeitgeist::core::{AutoUpdater, PipelineBuilder, PipelineDrain, ShutdownCoordinator, ShutdownManager};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    zeitgeist::observability::init();

    // 可选：第一个参数为额外的配置文件
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = load_config(config_path).context("Failed to load configuration")?;

    let pipeline = PipelineBuilder::new(config.clone())
        .build()
        .await
        .context("Failed to build pipeline")?;

    let shutdown = Arc::new(ShutdownManager::new());
    shutdown.install_signal_handlers();

    let updater = AutoUpdater::from_settings(Arc::clone(&pipeline), &config.pipeline);
    let token = shutdown.token();
    let updater_task = tokio::spawn(async move { updater.run(token).await });

    shutdown.wait_for_shutdown().await;

    let mut coordinator = ShutdownCoordinator::new(Arc::clone(&shutdown));
    coordinator.register(PipelineDrain::new(Arc::clone(&pipeline)));
    coordinator.run_cleanup().await;

    updater_task.await.context("Auto updater task panicked")?;
    tracing::info!("Zeitgeist stopped");
    Ok(())
}

//! Zeitgeist HTTP 服务
//!
//! 启动: cargo run --bin zeitgeist-web --features web
//! 同进程内运行自动更新循环；定时触发走 /api/agent-cron（Bearer 共享密钥）。

#![cfg(feature = "web")]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use zeitgeist::config::load_config;
use zeitgeist::core::{
    AutoUpdater, CycleOutcome, Pipeline, PipelineBuilder, PipelineDrain, PipelineError, ShutdownCoordinator,
    ShutdownManager,
};
use zeitgeist::store::MAX_READ_LIMIT;
use zeitgeist::trigger::CronTrigger;
use zeitgeist::Story;

struct AppState {
    pipeline: Arc<Pipeline>,
    trigger: CronTrigger,
    /// 手动注入口令；None 时不校验
    admin_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ListQuery {
    limit: Option<usize>,
}

impl ListQuery {
    fn limit(&self) -> usize {
        self.limit.unwrap_or(MAX_READ_LIMIT).clamp(1, MAX_READ_LIMIT)
    }
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

fn internal(e: PipelineError) -> Response {
    tracing::error!(error = %e, "Request failed");
    error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(|| async { "OK" }))
        .route("/api/status", get(api_status))
        .route("/api/articles", get(api_articles))
        .route("/api/summaries", get(api_summaries))
        .route("/api/summaries/:id", get(api_summary_get))
        .route("/api/refresh", post(api_refresh))
        .route("/api/inject", post(api_inject))
        .route("/api/agent-cron", get(api_agent_cron).post(api_agent_cron))
        .with_state(state)
}

async fn api_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.pipeline.status())
}

async fn api_articles(State(state): State<Arc<AppState>>, Query(q): Query<ListQuery>) -> Response {
    match state.pipeline.store().get_all_articles(q.limit()).await {
        Ok(articles) => Json(articles).into_response(),
        Err(e) => internal(e),
    }
}

async fn api_summaries(State(state): State<Arc<AppState>>, Query(q): Query<ListQuery>) -> Response {
    match state.pipeline.store().get_all_summaries(q.limit()).await {
        Ok(summaries) => Json(summaries).into_response(),
        Err(e) => internal(e),
    }
}

/// 综述详情：附带仍存在的源文章
async fn api_summary_get(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    let store = state.pipeline.store();
    let summary = match store.get_summary_by_id(&id).await {
        Ok(Some(summary)) => summary,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, format!("summary {} not found", id)),
        Err(e) => return internal(e),
    };
    match store.get_articles_by_ids(&summary.article_ids).await {
        Ok(articles) => Json(json!({ "summary": summary, "articles": articles })).into_response(),
        Err(e) => internal(e),
    }
}

/// 交互路径：后台跑一轮，立即返回 202
async fn api_refresh(State(state): State<Arc<AppState>>) -> Response {
    if state.pipeline.is_busy() {
        return error_response(StatusCode::CONFLICT, "pipeline busy");
    }
    let pipeline = Arc::clone(&state.pipeline);
    tokio::spawn(async move {
        match pipeline.run_cycle(pipeline.interactive_options()).await {
            Ok(CycleOutcome::Completed(report)) => {
                tracing::info!(added = report.articles_added, "Manual refresh finished")
            }
            Ok(CycleOutcome::Skipped) => tracing::info!("Manual refresh skipped; another run is active"),
            Err(e) => tracing::warn!(error = %e, "Manual refresh failed"),
        }
    });
    (StatusCode::ACCEPTED, Json(json!({ "accepted": true }))).into_response()
}

async fn api_inject(State(state): State<Arc<AppState>>, headers: HeaderMap, Json(story): Json<Story>) -> Response {
    if let Some(expected) = state.admin_token.as_deref() {
        let presented = headers.get("x-admin-token").and_then(|v| v.to_str().ok());
        if presented != Some(expected) {
            return error_response(StatusCode::UNAUTHORIZED, "Unauthorized");
        }
    }
    match state.pipeline.inject_story(story).await {
        Ok(article) => Json(article).into_response(),
        Err(PipelineError::Busy) => error_response(StatusCode::CONFLICT, "pipeline busy"),
        Err(e @ PipelineError::InvalidStory(_)) => error_response(StatusCode::BAD_REQUEST, e.to_string()),
        Err(e) => internal(e),
    }
}

async fn api_agent_cron(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let authorization = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok());
    match state.trigger.handle(authorization).await {
        Ok(response) => {
            let status = StatusCode::from_u16(response.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, Json(response)).into_response()
        }
        Err(_) => error_response(StatusCode::UNAUTHORIZED, "Unauthorized"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    zeitgeist::observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load configuration")?;

    let pipeline = PipelineBuilder::new(cfg.clone())
        .build()
        .await
        .context("Failed to build pipeline")?;

    let state = Arc::new(AppState {
        pipeline: Arc::clone(&pipeline),
        trigger: CronTrigger::new(Arc::clone(&pipeline), cfg.web.cron_secret.clone()),
        admin_token: cfg.web.admin_token.clone().filter(|t| !t.trim().is_empty()),
    });
    let app = router(state);

    let shutdown = Arc::new(ShutdownManager::new());
    shutdown.install_signal_handlers();

    let updater = AutoUpdater::from_settings(Arc::clone(&pipeline), &cfg.pipeline);
    let updater_token = shutdown.token();
    let updater_task = tokio::spawn(async move { updater.run(updater_token).await });

    let port = std::env::var("ZEITGEIST_WEB_PORT")
        .ok()
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(cfg.web.port);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Zeitgeist web: http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let serve_token = shutdown.token();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { serve_token.cancelled().await })
        .await?;

    let mut coordinator = ShutdownCoordinator::new(Arc::clone(&shutdown));
    coordinator.register(PipelineDrain::new(Arc::clone(&pipeline)));
    coordinator.run_cleanup().await;

    updater_task.await.context("Auto updater task panicked")?;
    tracing::info!("Zeitgeist web stopped");
    Ok(())
}

//! 能力调用包装：统一超时 + 结构化审计日志

use std::future::Future;
use std::time::{Duration, Instant};

use tokio::time::timeout;

use crate::core::PipelineError;

/// 在超时内执行一次能力调用；超时返回 `PipelineError::Timeout`；每次调用输出 JSON 审计日志
pub async fn audited<T, F>(
    capability: &str,
    provider: &str,
    limit: Duration,
    call: F,
) -> Result<T, PipelineError>
where
    F: Future<Output = Result<T, PipelineError>>,
{
    let start = Instant::now();
    let result = timeout(limit, call).await;

    let (ok, outcome): (bool, &str) = match &result {
        Ok(Ok(_)) => (true, "ok"),
        Ok(Err(_)) => (false, "error"),
        Err(_) => (false, "timeout"),
    };
    let duration_ms = start.elapsed().as_millis() as u64;
    let audit = serde_json::json!({
        "event": "capability_audit",
        "capability": capability,
        "provider": provider,
        "ok": ok,
        "outcome": outcome,
        "duration_ms": duration_ms,
    });
    tracing::info!(audit = %audit.to_string(), "capability");

    match result {
        Ok(inner) => inner,
        Err(_) => Err(PipelineError::Timeout {
            capability: capability.to_string(),
            secs: limit.as_secs(),
        }),
    }
}

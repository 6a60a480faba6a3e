//! 运行状态看板：重入保护（AtomicBool CAS）+ watch 通道广播 StatusEvent
//!
//! 只有拿到 [`RunGuard`] 的一方可以推进状态。终态（Complete / Error）会保持一段展示时间，
//! 之后回到 Idle 并释放保护位；在此之前的新触发都是 no-op。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::core::state::{PipelineStatus, StatusEvent};

pub struct StatusBoard {
    running: AtomicBool,
    tx: watch::Sender<StatusEvent>,
}

impl StatusBoard {
    pub fn new() -> Arc<Self> {
        let (tx, _rx) = watch::channel(StatusEvent::default());
        Arc::new(Self {
            running: AtomicBool::new(false),
            tx,
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<StatusEvent> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> StatusEvent {
        self.tx.borrow().clone()
    }

    pub fn is_busy(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// 原子地从 Idle 进入运行；已在运行时返回 None
    pub fn try_acquire(self: &Arc<Self>) -> Option<RunGuard> {
        self.running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()?;
        Some(RunGuard {
            board: Arc::clone(self),
            finished: false,
        })
    }

    fn publish(&self, status: PipelineStatus, message: impl Into<String>) {
        let event = StatusEvent::new(status, message);
        tracing::info!(status = ?event.status, message = %event.message, "Pipeline status");
        self.tx.send_replace(event);
    }

    fn release(&self) {
        self.publish(PipelineStatus::Idle, "");
        self.running.store(false, Ordering::SeqCst);
    }
}

/// 一次运行的所有权；drop 时（例如任务被取消）直接回到 Idle
pub struct RunGuard {
    board: Arc<StatusBoard>,
    finished: bool,
}

impl RunGuard {
    pub fn set(&self, status: PipelineStatus, message: impl Into<String>) {
        self.board.publish(status, message);
    }

    /// 进入终态并在 `hold` 之后回到 Idle；hold 为零时立即回到 Idle
    pub fn finish(mut self, status: PipelineStatus, message: impl Into<String>, hold: Duration) {
        self.finished = true;
        self.board.publish(status, message);
        let board = Arc::clone(&self.board);
        if hold.is_zero() {
            board.release();
        } else {
            tokio::spawn(async move {
                tokio::time::sleep(hold).await;
                board.release();
            });
        }
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!("Pipeline run dropped before reaching a terminal state");
            self.board.release();
        }
    }
}

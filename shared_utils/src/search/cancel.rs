//! Cancellation Token
//!
//! 协作式取消：引擎在每次编码前检查令牌，不会打断正在进行的编码。
//! 令牌可由 Ctrl-C 处理器显式触发，也可在截止时间到达后自动触发。

use crate::errors::{Result, SqueezeError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    deadline: Option<Instant>,
}

/// 克隆开销很小，所有克隆共享同一个标志
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelState>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从现在起经过 `timeout` 后自动触发
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            inner: Arc::new(CancelState {
                cancelled: AtomicBool::new(false),
                deadline: Instant::now().checked_add(timeout),
            }),
        }
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        if self.inner.cancelled.load(Ordering::Relaxed) {
            return true;
        }
        match self.inner.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                self.inner.cancelled.store(true, Ordering::SeqCst);
                true
            }
            _ => false,
        }
    }

    #[inline]
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(SqueezeError::Cancelled)
        } else {
            Ok(())
        }
    }
}

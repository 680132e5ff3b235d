// ==========================================
// 钢筋网片 ERP 集成层 - 瞬时错误退避
// ==========================================
// 职责: 有界指数退避参数与等待
// 约定: 重试前由调用方负责"先查后建"，这里只负责节奏
// ==========================================

use crate::config::AllocationConfig;
use crate::engine::error::{EngineError, EngineResult};
use crate::repository::error::{RepositoryError, RepositoryResult};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// 退避策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub max_attempts: u32,
    pub base_ms: u64,
    pub max_ms: u64,
}

impl Backoff {
    pub fn from_config(config: &AllocationConfig) -> Self {
        Self {
            max_attempts: config.max_transient_retries,
            base_ms: config.backoff_base_ms,
            max_ms: config.backoff_max_ms,
        }
    }

    /// 第 attempt 次重试（从 1 开始）前的等待时长: base · 2^(attempt-1)，封顶 max
    pub fn delay(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(20);
        let ms = self.base_ms.saturating_mul(1u64 << shift).min(self.max_ms);
        Duration::from_millis(ms)
    }

    /// 是否还能继续重试
    pub fn allows(&self, attempt: u32) -> bool {
        attempt <= self.max_attempts
    }

    pub async fn wait(&self, attempt: u32, operation: &str) {
        let delay = self.delay(attempt);
        debug!(operation, attempt, delay_ms = delay.as_millis() as u64, "瞬时错误，退避后重试");
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

/// 读操作重试：仅数据库繁忙时退避重试，其余错误直接返回
pub async fn retry_read<T, F, Fut>(backoff: &Backoff, operation: &str, mut call: F) -> EngineResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = RepositoryResult<T>>,
{
    let mut attempt = 0;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(RepositoryError::Busy(message)) => {
                attempt += 1;
                if !backoff.allows(attempt) {
                    warn!(operation, attempts = attempt, "读操作重试耗尽");
                    return Err(EngineError::TransientExhausted {
                        operation: operation.to_string(),
                        attempts: attempt,
                        message,
                    });
                }
                backoff.wait(attempt, operation).await;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

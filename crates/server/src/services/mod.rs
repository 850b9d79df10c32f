pub mod bootstrap;
pub mod catalog;
pub mod credentials;
pub mod customer_service;
pub mod customize;
pub mod edge;
pub mod lifecycle;
pub mod orchestrator;
pub mod os_profile;
pub mod selector;
pub mod suggest;

use std::future::Future;
use std::time::Duration;

use common::{Error, Result};
use rand::Rng;
use tracing::warn;

/// 带抖动的指数退避重试
///
/// 只有凭据安装 (C6) 与边缘注册 (C8) 走这条路径；退避从 100ms 翻倍到
/// 800ms，每次叠加随机抖动。不可重试的错误立即向上返回。
pub async fn retry_with_backoff<T, F, Fut>(op_name: &str, mut f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    const MAX_ATTEMPTS: u32 = 3;

    let mut delay_ms: u64 = 100;
    let mut last_err: Option<Error> = None;

    for attempt in 1..=MAX_ATTEMPTS {
        match f().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_retryable() && attempt < MAX_ATTEMPTS => {
                let jitter = rand::thread_rng().gen_range(0..delay_ms / 2 + 1);
                warn!("{} 第 {} 次尝试失败: {}，{}ms 后重试", op_name, attempt, e, delay_ms + jitter);
                tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
                delay_ms = (delay_ms * 2).min(800);
                last_err = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    // 只有所有尝试都失败才会走到这里
    Err(last_err.unwrap_or_else(|| Error::Internal(format!("{} 重试耗尽", op_name))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_retry_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff("测试", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(Error::EdgeUnavailable("瞬时故障".into()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_stops_on_non_retryable() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry_with_backoff("测试", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::Conflict("不可重试".into())) }
        })
        .await;

        assert!(matches!(result, Err(Error::Conflict(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_exhausts_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry_with_backoff("测试", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::CredentialsInstallFailed("持续故障".into())) }
        })
        .await;

        assert!(matches!(result, Err(Error::CredentialsInstallFailed(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}

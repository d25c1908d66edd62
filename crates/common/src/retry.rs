use std::future::Future;

use crate::config::Config;
use crate::error::FsError;

/// Run `op` until it succeeds, fails terminally, or runs out of
///  attempts
///
/// Each attempt must rebuild its work from freshly fetched state.
///  Exhausting the attempts on conflicts or transient failures turns
///  into [`FsError::Conflict`].
pub(crate) async fn with_retries<T, F, Fut>(
    config: &Config,
    label: &str,
    mut op: F,
) -> Result<T, FsError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, FsError>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < max_attempts => {
                tracing::debug!("{}: attempt {} failed, retrying: {}", label, attempt, err);
                tokio::time::sleep(config.retry_backoff * attempt).await;
            }
            Err(err) if err.is_retryable() => {
                tracing::warn!("{}: giving up after {} attempts: {}", label, attempt, err);
                return Err(FsError::Conflict { attempts: attempt });
            }
            Err(err) => return Err(err),
        }
    }
}

/// Bound a single remote call by the configured request timeout
pub(crate) async fn timed<T, E, Fut>(config: &Config, fut: Fut) -> Result<T, FsError>
where
    Fut: Future<Output = Result<T, E>>,
    FsError: From<E>,
{
    match tokio::time::timeout(config.request_timeout, fut).await {
        Ok(result) => result.map_err(FsError::from),
        Err(_) => Err(FsError::Timeout),
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::pointer::PointerError;

    fn config() -> Config {
        Config {
            max_attempts: 3,
            retry_backoff: Duration::from_millis(1),
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let calls = AtomicU32::new(0);
        let result = with_retries(&config(), "test", |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 3 {
                    Err(FsError::Timeout)
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_conflicts_become_conflict() {
        let result: Result<(), _> = with_retries(&config(), "test", |_| async {
            Err(FsError::Pointer(PointerError::CasConflict {
                expected: None,
                actual: None,
            }))
        })
        .await;
        assert!(matches!(result, Err(FsError::Conflict { attempts: 3 })));
    }

    #[tokio::test]
    async fn test_terminal_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retries(&config(), "test", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(FsError::Pointer(PointerError::InvalidSignature)) }
        })
        .await;
        assert!(matches!(
            result,
            Err(FsError::Pointer(PointerError::InvalidSignature))
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timed_out_call_is_timeout() {
        let config = Config {
            request_timeout: Duration::from_millis(5),
            ..Config::default()
        };
        let result: Result<(), FsError> = timed(&config, async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, FsError>(())
        })
        .await;
        assert!(matches!(result, Err(FsError::Timeout)));
    }
}

//! Blocking bridge between the synchronous adapter contract and the async
//! database drivers.

use std::future::Future;
use std::time::Duration;

use hopbench_core::QueryError;
use tokio::runtime::{Builder, Runtime};

/// Single-threaded runtime owned by one adapter or loader.
pub(crate) fn current_thread() -> std::io::Result<Runtime> {
    Builder::new_current_thread().enable_all().build()
}

/// Run `fut` to completion, giving up after `timeout`.
pub(crate) fn bounded<F, T>(rt: &Runtime, timeout: Duration, fut: F) -> Result<T, QueryError>
where
    F: Future<Output = Result<T, QueryError>>,
{
    rt.block_on(async {
        match tokio::time::timeout(timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(QueryError::Timeout(timeout)),
        }
    })
}

/// Runtime for an adapter; failure to start one counts as a connection failure.
pub(crate) fn adapter_runtime() -> Result<Runtime, QueryError> {
    current_thread().map_err(|e| QueryError::Connection(format!("failed to start runtime: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounded_passes_result_through() {
        let rt = current_thread().unwrap();
        let value = bounded(&rt, Duration::from_secs(1), async { Ok::<_, QueryError>(7) });
        assert_eq!(value.unwrap(), 7);
    }

    #[test]
    fn test_bounded_times_out() {
        let rt = current_thread().unwrap();
        let timeout = Duration::from_millis(10);
        let result = bounded(&rt, timeout, async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, QueryError>(())
        });
        assert!(matches!(result, Err(QueryError::Timeout(d)) if d == timeout));
    }
}

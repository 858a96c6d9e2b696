use core::future::Future;

use tracing::warn;

use crate::error::Error;
use crate::util::retry::{RetryPolicy, RetryResult};

/// Runs a read-only node request under `policy`, retrying transport failures
/// and timeouts. Any other error is returned after the first attempt.
pub async fn retry_transient<T, F, Fut>(
    policy: &RetryPolicy,
    what: &str,
    mut request: F,
) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    policy
        .retry_async(
            |_| {
                let response = request();
                async move {
                    match response.await {
                        Ok(value) => RetryResult::Ok(value),
                        Err(e) if e.is_transient() => RetryResult::Retry(e),
                        Err(e) => RetryResult::Err(e),
                    }
                }
            },
            |attempt, e| warn!(attempt, "{what} failed, retrying: {e}"),
        )
        .await
        .map_err(|e| e.error)
}

use std::future::Future;
use std::time::Duration;

use tracing::debug;
use yatri_domain::StorageError;

const MAX_ATTEMPTS: u32 = 3;

/// Re-run `op` on transient storage conflicts (serialization failures,
/// deadlocks) with a short backoff, surfacing the error after the last
/// attempt. Non-retryable errors pass through immediately.
pub(crate) async fn with_retry<T, F, Fut>(label: &str, mut op: F) -> Result<T, StorageError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StorageError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Err(e) if e.is_retryable() && attempt < MAX_ATTEMPTS => {
                debug!("{} hit a storage conflict (attempt {}): {}", label, attempt, e);
                tokio::time::sleep(Duration::from_millis(10 * u64::from(attempt))).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}

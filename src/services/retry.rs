use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

const MAX_ATTEMPTS: usize = 3;
const BACKOFF_SECS: [u64; 2] = [1, 2];

/// Run an external call with fixed exponential backoff.
///
/// Up to 3 attempts with 1s/2s delays between them; the last error is
/// returned once attempts are exhausted. Every gateway that retries uses this
/// wrapper so the policy lives in exactly one place.
pub async fn with_backoff<T, E, F, Fut>(op: &str, mut call: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match call().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < MAX_ATTEMPTS => {
                tracing::warn!(op, attempt, error = %e, "attempt failed, backing off");
                sleep(Duration::from_secs(BACKOFF_SECS[attempt - 1])).await;
            }
            Err(e) => {
                tracing::error!(op, attempt, error = %e, "all attempts exhausted");
                return Err(e);
            }
        }
    }
}

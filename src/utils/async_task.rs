use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::trace;

/// Evaluates `probe` up to `max_attempts` times, sleeping `interval` between
/// attempts, and returns the first `Some` it yields.
///
/// There is no sleep after the last attempt, so an exhausted poll takes
/// `interval * (max_attempts - 1)` plus the probe time.
pub async fn poll_with_fixed_interval<F, Fut, T>(
    interval: Duration,
    max_attempts: usize,
    mut probe: F,
) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    for attempt in 1..=max_attempts {
        if let Some(found) = probe().await {
            trace!(attempt, "poll satisfied");
            return Some(found);
        }
        if attempt < max_attempts {
            sleep(interval).await;
        }
    }
    None
}

/// Runs `task_fn` in the background, logging its error instead of
/// dropping it silently.
pub(crate) fn spawn_task<F, Fut>(
    name: &str,
    task_fn: F,
) -> tokio::task::JoinHandle<()>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = crate::Result<()>> + Send + 'static,
{
    let name = name.to_string();
    tokio::spawn(async move {
        if let Err(e) = task_fn().await {
            tracing::error!("spawned task: {name} stopped with error: {:?}", e);
        }
    })
}

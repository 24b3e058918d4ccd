//! Bounded waits: timed polling and watch-channel conditions.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;

/// How a watch wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Satisfied,
    TimedOut,
    /// The sender was dropped before the condition held.
    Closed,
}

/// Evaluate `condition` immediately and then every `interval` until it
/// holds or `timeout` elapses. Returns whether it held.
pub async fn repeat_until<F, Fut>(interval: Duration, timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let poll = async {
        loop {
            if condition().await {
                return;
            }
            tokio::time::sleep(interval).await;
        }
    };
    tokio::time::timeout(timeout, poll).await.is_ok()
}

/// Wait until the value in `rx` satisfies `condition`, checking the
/// current value first.
pub async fn watch_until<T, F>(
    rx: &mut watch::Receiver<T>,
    timeout: Duration,
    mut condition: F,
) -> WaitOutcome
where
    F: FnMut(&T) -> bool,
{
    match tokio::time::timeout(timeout, rx.wait_for(|v| condition(v))).await {
        Ok(Ok(_)) => WaitOutcome::Satisfied,
        Ok(Err(_)) => WaitOutcome::Closed,
        Err(_) => WaitOutcome::TimedOut,
    }
}

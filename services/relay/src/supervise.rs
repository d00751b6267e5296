//! Background task supervision
//!
//! Each pump runs in its own task so a panic is caught at the task boundary
//! and reported instead of vanishing with a dropped `JoinHandle`.

use std::future::Future;

use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, error};

/// Run `task` to completion, logging how it ended.
pub(crate) async fn supervise<F>(name: String, task: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    match tokio::spawn(task).await {
        Ok(()) => debug!(task = %name, "Task finished"),
        Err(e) if e.is_panic() => error!(task = %name, "Task panicked: {}", e),
        Err(e) => debug!(task = %name, "Task aborted: {}", e),
    }
}

/// Spawn a supervised task onto the runtime
pub fn spawn_supervised<F>(name: impl Into<String>, task: F) -> JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(supervise(name.into(), task))
}

/// Spawn a supervised task tracked by `tracker`
pub(crate) fn track_supervised<F>(tracker: &TaskTracker, name: impl Into<String>, task: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    tracker.spawn(supervise(name.into(), task));
}

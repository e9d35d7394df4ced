//! Fire-and-forget task dispatch.
//!
//! The lint continuation runs on an independent concurrent task: the
//! caller neither waits nor receives a result. That absence of a result
//! channel is the contract, not an omission — delivery is at most once
//! per dispatch, and the daily refresh sweep compensates for anything
//! dropped here.
//!
//! Guarantees per dispatch call:
//!
//! - exactly one invocation of the work
//! - errors inside the work are caught and logged, never propagated
//! - a panic inside the work is isolated from the dispatching process
//! - no retry, no queue bound, no backpressure

use std::future::Future;

use canopy_core::error::Result;

/// Launches a named unit of work on a detached task.
///
/// The work's error is logged at error level and swallowed. A second
/// watcher task observes the join handle so panics are logged instead of
/// silently discarded.
pub fn spawn_detached<F>(name: &'static str, work: F)
where
    F: Future<Output = Result<()>> + Send + 'static,
{
    let handle = tokio::spawn(async move {
        if let Err(error) = work.await {
            tracing::error!(task = name, error = %error, "detached task failed");
        }
    });

    tokio::spawn(async move {
        if let Err(join_error) = handle.await {
            if join_error.is_panic() {
                tracing::error!(task = name, "detached task panicked");
            }
        }
    });
}

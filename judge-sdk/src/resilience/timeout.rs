//! Deadline and cancellation guard for provider calls

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::clock::Clock;
use crate::error::ProviderError;

/// Why a guarded call did not produce a value
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GuardError {
    /// The operation failed or missed its deadline
    #[error(transparent)]
    Failed(ProviderError),

    /// The caller's cancellation token fired
    #[error("operation cancelled")]
    Cancelled,
}

/// Run `operation` on its own task, bounded by `deadline` and `cancel`
///
/// On expiry or cancellation the task is aborted and its teardown awaited
/// before this returns, so no work outlives the guard.
pub async fn run_with_timeout<F, T>(
    operation: F,
    deadline: Duration,
    cancel: &CancellationToken,
    clock: &dyn Clock,
) -> Result<T, GuardError>
where
    F: Future<Output = Result<T, ProviderError>> + Send + 'static,
    T: Send + 'static,
{
    if cancel.is_cancelled() {
        return Err(GuardError::Cancelled);
    }

    let mut handle = tokio::spawn(operation);

    let outcome = tokio::select! {
        biased;

        joined = &mut handle => {
            return match joined {
                Ok(result) => result.map_err(GuardError::Failed),
                Err(join_error) => Err(GuardError::Failed(ProviderError::other(format!(
                    "provider task failed: {}",
                    join_error
                )))),
            };
        }
        _ = clock.sleep(deadline) => {
            GuardError::Failed(ProviderError::timeout(format!(
                "provider call exceeded deadline of {}ms",
                deadline.as_millis()
            )))
        }
        _ = cancel.cancelled() => GuardError::Cancelled,
    };

    handle.abort();
    let _ = handle.await;
    debug!(outcome = %outcome, "Guarded call torn down");
    Err(outcome)
}

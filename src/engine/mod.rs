pub mod catalog;
pub mod dispatch;
pub mod earnings;
pub mod events;
pub mod lifecycle;
pub mod queue;

use std::future::Future;
use std::time::Instant;

use tracing::warn;

use crate::error::{AppError, ErrorKind};
use crate::observability::metrics::Metrics;

/// Runs one core operation, recording latency and outcome.
pub(crate) async fn instrumented<T, F>(
    metrics: &Metrics,
    operation: &'static str,
    work: F,
) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>>,
{
    let start = Instant::now();
    let result = work.await;
    metrics.observe_operation(operation, start.elapsed().as_secs_f64(), result.is_ok());

    if let Err(err) = &result {
        match err.kind() {
            ErrorKind::Internal => {
                tracing::error!(operation, error = %err, "operation failed")
            }
            _ => warn!(operation, error = %err, "operation rejected"),
        }
    }
    result
}

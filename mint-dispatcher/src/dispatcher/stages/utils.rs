use std::{future::Future, time::Duration};

use tokio::time::sleep;
use tracing::warn;

use crate::error::{IsRetryable, MinterError};

use super::super::DispatcherState;

const MAX_CALL_ATTEMPTS: u32 = 3;
const CALL_RETRY_DELAY: Duration = Duration::from_millis(200);

/// Retries read-only ledger calls a bounded number of times while the error is
/// retryable. Never used for `submit`, which must not be sent twice.
pub(crate) async fn call_with_bounded_retries<F, T, Fut>(
    f: F,
    action: &str,
    state: &DispatcherState,
) -> Result<T, MinterError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, MinterError>>,
{
    let mut attempt: u32 = 1;
    loop {
        match f().await {
            Ok(result) => return Ok(result),
            Err(err) if err.is_retryable() && attempt < MAX_CALL_ATTEMPTS => {
                warn!(?err, action, attempt, "Error making call. Retrying...");
                state.metrics.update_call_retries_metric(
                    &err.to_metrics_label(),
                    action,
                    state.domain.as_str(),
                );
                attempt = attempt.saturating_add(1);
                sleep(CALL_RETRY_DELAY).await;
            }
            Err(err) => return Err(err),
        }
    }
}

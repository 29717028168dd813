use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Sleep for `duration`. Returns false if cancelled first.
pub(crate) async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        _ = cancel.cancelled() => false,
    }
}

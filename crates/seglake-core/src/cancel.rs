use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::error::{CoreError, CoreResult};

/// Runs `fut` unless `cancel` fires first.
///
/// An already-cancelled token short-circuits without polling `fut`.
pub async fn with_cancellation<T, F>(cancel: &CancellationToken, fut: F) -> CoreResult<T>
where
    F: Future<Output = CoreResult<T>>,
{
    if cancel.is_cancelled() {
        return Err(CoreError::Cancelled);
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(CoreError::Cancelled),
        res = fut => res,
    }
}

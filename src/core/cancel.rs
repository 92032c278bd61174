//! Cooperative cancellation around broker calls

use crate::broker::BrokerError;
use crate::core::error::{MessagingError, Result};
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Fail with [`MessagingError::Cancelled`] once the token is cancelled
pub fn ensure_active(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(MessagingError::Cancelled);
    }
    Ok(())
}

/// Run a broker call unless the token is cancelled first
///
/// The token is checked before the call starts and raced against it while it
/// runs. A call interrupted by cancellation is dropped, so whatever it would
/// have returned is never observed by the caller.
pub async fn guard<T, F>(cancel: &CancellationToken, provider: &'static str, call: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, BrokerError>>,
{
    ensure_active(cancel)?;

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(MessagingError::Cancelled),
        result = call => result.map_err(|source| MessagingError::broker(provider, source)),
    }
}

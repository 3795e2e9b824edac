//! Bounding external calls by the request deadline.

use std::future::Future;

use tokio::time::{Instant, timeout_at};
use tracing::warn;

use crate::auth::error::{AuthError, AuthResult};

/// Run `fut` unless `deadline` passes first.
pub async fn within<T, F>(deadline: Instant, what: &'static str, fut: F) -> AuthResult<T>
where
    F: Future<Output = T>,
{
    timeout_at(deadline, fut).await.map_err(|_| {
        warn!(stage = what, "request deadline exceeded during authentication");
        AuthError::Timeout
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_within_passes_through() {
        let deadline = Instant::now() + Duration::from_secs(5);
        let value = within(deadline, "test", async { 42 }).await.unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_within_times_out() {
        let deadline = Instant::now() + Duration::from_millis(10);
        let result = within(deadline, "test", tokio::time::sleep(Duration::from_secs(5))).await;
        assert!(matches!(result, Err(AuthError::Timeout)));
    }
}

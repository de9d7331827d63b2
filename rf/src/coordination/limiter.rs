//! Per-provider concurrency limits
//!
//! One counting semaphore per configured provider caps how many attempts
//! hit that provider at once. Providers without a configured limit are
//! unbounded and acquisition is a no-op.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

/// Counting semaphores keyed by provider name
#[derive(Debug, Default)]
pub struct ProviderLimiter {
    providers: HashMap<String, Arc<Semaphore>>,
    limits: HashMap<String, usize>,
}

impl ProviderLimiter {
    /// Build from configured limits; zero-valued limits are ignored
    pub fn new(limits: HashMap<String, usize>) -> Self {
        let providers = limits
            .iter()
            .filter(|(_, limit)| **limit > 0)
            .map(|(name, limit)| (name.clone(), Arc::new(Semaphore::new(*limit))))
            .collect();
        Self { providers, limits }
    }

    /// Acquire a slot for a provider, waiting while it is at capacity
    ///
    /// Returns `None` for unconfigured (unbounded) providers. The slot is
    /// released when the permit drops.
    pub async fn acquire(&self, provider: &str) -> Option<OwnedSemaphorePermit> {
        let semaphore = self.providers.get(provider)?.clone();
        debug!(%provider, available = semaphore.available_permits(), "acquiring provider slot");
        // The semaphore is never closed, so acquire_owned cannot fail
        semaphore.acquire_owned().await.ok()
    }

    /// Configured limit for a provider, if any
    pub fn limit(&self, provider: &str) -> Option<usize> {
        self.limits.get(provider).copied().filter(|l| *l > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    fn limiter(provider: &str, limit: usize) -> ProviderLimiter {
        ProviderLimiter::new(HashMap::from([(provider.to_string(), limit)]))
    }

    #[tokio::test]
    async fn test_unconfigured_provider_is_unbounded() {
        let limiter = ProviderLimiter::new(HashMap::new());
        assert!(limiter.acquire("anthropic").await.is_none());
        assert!(limiter.limit("anthropic").is_none());
    }

    #[tokio::test]
    async fn test_acquire_blocks_at_capacity() {
        let limiter = limiter("anthropic", 1);

        let permit = limiter.acquire("anthropic").await;
        assert!(permit.is_some());

        // Second acquire must not complete while the first permit is held
        let blocked = timeout(Duration::from_millis(50), limiter.acquire("anthropic")).await;
        assert!(blocked.is_err());

        drop(permit);
        let unblocked = timeout(Duration::from_millis(200), limiter.acquire("anthropic")).await;
        assert!(unblocked.is_ok());
    }

    #[tokio::test]
    async fn test_limits_are_per_provider() {
        let limiter = ProviderLimiter::new(HashMap::from([
            ("anthropic".to_string(), 1),
            ("openai".to_string(), 2),
        ]));

        let _a = limiter.acquire("anthropic").await;
        // A saturated provider must not block a different one
        let b = timeout(Duration::from_millis(50), limiter.acquire("openai")).await;
        assert!(b.is_ok());

        assert_eq!(limiter.limit("anthropic"), Some(1));
        assert_eq!(limiter.limit("openai"), Some(2));
    }

    #[tokio::test]
    async fn test_zero_limit_is_ignored() {
        let limiter = limiter("anthropic", 0);
        assert!(limiter.acquire("anthropic").await.is_none());
        assert!(limiter.limit("anthropic").is_none());
    }
}

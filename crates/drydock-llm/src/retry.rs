use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use drydock_core::errors::ProviderError;
use drydock_core::provider::{Completion, CompletionProvider, CompletionRequest};

/// Configuration for retry behavior.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter_factor: 0.2,
        }
    }
}

/// Wraps a completion provider with retry logic.
///
/// - Retries retryable errors with exponential backoff + jitter
/// - Respects `retry_after` hints from rate limit responses
/// - Fatal errors are returned immediately
pub struct RetryProvider<P: CompletionProvider> {
    inner: P,
    config: RetryConfig,
    total_retries: AtomicU64,
}

impl<P: CompletionProvider> RetryProvider<P> {
    pub fn new(inner: P, config: RetryConfig) -> Self {
        Self {
            inner,
            config,
            total_retries: AtomicU64::new(0),
        }
    }

    pub fn with_defaults(inner: P) -> Self {
        Self::new(inner, RetryConfig::default())
    }

    pub fn total_retries(&self) -> u64 {
        self.total_retries.load(Ordering::Relaxed)
    }

    /// Delay for a retry attempt: exponential backoff + jitter, unless the
    /// server suggested a delay.
    fn retry_delay(&self, attempt: u32, suggested: Option<Duration>) -> Duration {
        if let Some(delay) = suggested {
            return delay;
        }

        let exp_delay = self.config.base_delay.as_millis() as f64 * 2.0_f64.powi(attempt as i32);
        let capped = exp_delay.min(self.config.max_delay.as_millis() as f64);

        let jitter_range = capped * self.config.jitter_factor;
        let jitter = (random_u64() % (jitter_range as u64 * 2 + 1)) as f64 - jitter_range;
        let final_ms = (capped + jitter).max(100.0);

        Duration::from_millis(final_ms as u64)
    }
}

/// Simple non-cryptographic random u64 using thread-local xorshift state.
fn random_u64() -> u64 {
    use std::cell::Cell;
    use std::time::SystemTime;

    thread_local! {
        static STATE: Cell<u64> = Cell::new(
            SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos() as u64
                | 1
        );
    }

    STATE.with(|s| {
        let mut x = s.get();
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        s.set(x);
        x
    })
}

#[async_trait]
impl<P: CompletionProvider> CompletionProvider for RetryProvider<P> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn complete(
        &self,
        request: CompletionRequest<'_>,
    ) -> Result<Completion, ProviderError> {
        let mut attempt = 0;
        loop {
            let req = CompletionRequest {
                messages: request.messages,
                tools: request.tools,
                system: request.system,
                model: request.model,
            };
            match self.inner.complete(req).await {
                Ok(completion) => return Ok(completion),
                Err(e) => {
                    if e.is_fatal() || !e.is_retryable() || attempt == self.config.max_retries {
                        return Err(e);
                    }

                    let delay = self.retry_delay(attempt, e.suggested_delay());
                    self.total_retries.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        attempt = attempt + 1,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        kind = e.error_kind(),
                        error = %e,
                        "retrying after provider error"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockProvider, MockResponse};
    use drydock_core::messages::Message;

    async fn complete_once(provider: &impl CompletionProvider) -> Result<Completion, ProviderError> {
        let messages = vec![Message::user_text("hi")];
        provider
            .complete(CompletionRequest {
                messages: &messages,
                tools: &[],
                system: None,
                model: "mock-model",
            })
            .await
    }

    #[tokio::test]
    async fn success_on_first_try() {
        let mock = MockProvider::new(vec![MockResponse::text("hello")]);
        let retrying = RetryProvider::with_defaults(mock);

        let result = complete_once(&retrying).await;
        assert!(result.is_ok());
        assert_eq!(retrying.total_retries(), 0);
    }

    #[tokio::test]
    async fn retries_on_retryable_error() {
        let mock = MockProvider::new(vec![
            MockResponse::Error(ProviderError::ServerError {
                status: 500,
                body: "internal".into(),
            }),
            MockResponse::Error(ProviderError::ServerError {
                status: 500,
                body: "internal".into(),
            }),
            MockResponse::text("recovered"),
        ]);

        let config = RetryConfig {
            max_retries: 3,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
            ..Default::default()
        };
        let retrying = RetryProvider::new(mock, config);

        let result = complete_once(&retrying).await;
        assert!(result.is_ok());
        assert_eq!(retrying.total_retries(), 2);
    }

    #[tokio::test]
    async fn fatal_error_not_retried() {
        let mock = MockProvider::new(vec![
            MockResponse::Error(ProviderError::AuthenticationFailed("bad key".into())),
            MockResponse::text("should not reach"),
        ]);
        let retrying = RetryProvider::with_defaults(mock);

        let err = complete_once(&retrying).await.err().expect("expected error");
        assert!(matches!(err, ProviderError::AuthenticationFailed(_)));
        assert_eq!(retrying.total_retries(), 0);
    }

    #[tokio::test]
    async fn max_retries_exhausted() {
        let server_err = || {
            MockResponse::Error(ProviderError::ServerError {
                status: 500,
                body: "fail".into(),
            })
        };
        let mock = MockProvider::new(vec![server_err(), server_err(), server_err(), server_err()]);

        let config = RetryConfig {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            ..Default::default()
        };
        let retrying = RetryProvider::new(mock, config);

        let result = complete_once(&retrying).await;
        assert!(result.is_err());
        assert_eq!(retrying.total_retries(), 3);
    }

    #[test]
    fn retry_delay_respects_suggested() {
        let mock = MockProvider::new(vec![]);
        let retrying = RetryProvider::with_defaults(mock);

        let delay = retrying.retry_delay(0, Some(Duration::from_secs(5)));
        assert_eq!(delay, Duration::from_secs(5));
    }

    #[test]
    fn retry_delay_exponential_backoff() {
        let mock = MockProvider::new(vec![]);
        let config = RetryConfig {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            jitter_factor: 0.0,
            ..Default::default()
        };
        let retrying = RetryProvider::new(mock, config);

        assert_eq!(retrying.retry_delay(0, None).as_millis(), 100);
        assert_eq!(retrying.retry_delay(1, None).as_millis(), 200);
        assert_eq!(retrying.retry_delay(2, None).as_millis(), 400);
    }

    #[test]
    fn retry_delay_capped_at_max() {
        let mock = MockProvider::new(vec![]);
        let config = RetryConfig {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            jitter_factor: 0.0,
            ..Default::default()
        };
        let retrying = RetryProvider::new(mock, config);

        // 1s * 2^10 = 1024s, capped at 5s
        assert_eq!(retrying.retry_delay(10, None).as_millis(), 5000);
    }

    #[test]
    fn config_defaults() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.base_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(30));
        assert!((config.jitter_factor - 0.2).abs() < f64::EPSILON);
    }

    #[test]
    fn provider_delegates_name() {
        let mock = MockProvider::new(vec![]);
        let retrying = RetryProvider::with_defaults(mock);
        assert_eq!(retrying.name(), "mock");
    }
}

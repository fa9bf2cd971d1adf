use crate::config::RetryConfig;
use backon::{ExponentialBuilder, Retryable};
use docqa_vector_store::{EmbeddingProvider, VectorStoreError};
use std::time::Duration;

/// Exponential backoff for embedding calls. Only
/// [`VectorStoreError::EmbeddingUnavailable`] is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms.max(config.initial_delay_ms)),
        }
    }
}

impl RetryPolicy {
    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.initial_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_attempts.saturating_sub(1))
    }

    pub async fn embed_batch(
        &self,
        embedder: &dyn EmbeddingProvider,
        texts: &[String],
    ) -> docqa_vector_store::Result<Vec<Vec<f32>>> {
        (move || async move { embedder.embed_batch(texts).await })
            .retry(self.backoff())
            .when(VectorStoreError::is_retryable)
            .notify(|err, delay| {
                log::warn!("Embedding call failed ({err}); retrying in {delay:?}");
            })
            .await
    }

    pub async fn embed(
        &self,
        embedder: &dyn EmbeddingProvider,
        text: &str,
    ) -> docqa_vector_store::Result<Vec<f32>> {
        let mut vectors = self.embed_batch(embedder, &[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| VectorStoreError::Embedding("Empty embedding result".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use docqa_vector_store::StubEmbedder;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails the first `failures` calls, then delegates to a stub
    struct Flaky {
        failures: usize,
        retryable: bool,
        calls: AtomicUsize,
        inner: StubEmbedder,
    }

    impl Flaky {
        fn new(failures: usize, retryable: bool) -> Self {
            Self {
                failures,
                retryable,
                calls: AtomicUsize::new(0),
                inner: StubEmbedder::new(4),
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for Flaky {
        fn dimension(&self) -> usize {
            4
        }

        fn model_id(&self) -> &str {
            "flaky"
        }

        async fn embed_batch(&self, texts: &[String]) -> docqa_vector_store::Result<Vec<Vec<f32>>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(if self.retryable {
                    VectorStoreError::EmbeddingUnavailable("503".to_string())
                } else {
                    VectorStoreError::Embedding("401".to_string())
                });
            }
            self.inner.embed_batch(texts).await
        }
    }

    fn fast_policy(max_attempts: usize) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        }
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let flaky = Flaky::new(2, true);
        let vector = fast_policy(3).embed(&flaky, "hello").await.unwrap();
        assert_eq!(vector.len(), 4);
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn attempts_are_bounded() {
        let flaky = Flaky::new(5, true);
        let err = fast_policy(2).embed(&flaky, "hello").await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn permanent_failures_are_not_retried() {
        let flaky = Flaky::new(1, false);
        let err = fast_policy(5).embed(&flaky, "hello").await.unwrap_err();
        assert!(matches!(err, VectorStoreError::Embedding(_)));
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn policy_from_config() {
        let policy = RetryPolicy::from(&RetryConfig {
            max_attempts: 0,
            initial_delay_ms: 100,
            max_delay_ms: 10,
        });
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.max_delay, Duration::from_millis(100));
    }
}

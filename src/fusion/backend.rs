//! Fusion backend trait and cancellation support.

use crate::error::{FusionError, Result};
use crate::fusion::types::{FusionResult, RenderedPrompt};
use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

/// Lifecycle of a single fusion request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FusionState {
    /// Nothing submitted yet.
    #[default]
    Idle,
    /// Remote call in flight.
    Pending,
    /// Last request produced an image.
    Succeeded,
    /// Last request failed.
    Failed,
}

/// A remote model that can fuse a rendered prompt into an image.
///
/// Implementations make at most one remote call per `fuse` and never retry.
#[async_trait]
pub trait FusionBackend: Send + Sync {
    /// Sends the prompt and extracts the generated image.
    async fn fuse(&self, prompt: &RenderedPrompt) -> Result<FusionResult>;

    /// Returns the name of this backend for display.
    fn name(&self) -> &str;

    /// Checks if the backend is reachable and authenticated.
    async fn health_check(&self) -> Result<()>;
}

/// Extension trait adding cancellation to any backend.
#[async_trait]
pub trait FusionBackendExt: FusionBackend {
    /// Like [`FusionBackend::fuse`], but aborts when `cancel` fires.
    ///
    /// Dropping the in-flight future closes the underlying connection.
    async fn fuse_with_cancel(
        &self,
        prompt: &RenderedPrompt,
        cancel: &CancellationToken,
    ) -> Result<FusionResult> {
        if cancel.is_cancelled() {
            return Err(FusionError::Cancelled);
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(backend = self.name(), "fusion cancelled by caller");
                Err(FusionError::Cancelled)
            }
            result = self.fuse(prompt) => result,
        }
    }
}

impl<T: FusionBackend> FusionBackendExt for T {}

#[async_trait]
impl<T: FusionBackend + ?Sized> FusionBackend for Box<T> {
    async fn fuse(&self, prompt: &RenderedPrompt) -> Result<FusionResult> {
        (**self).fuse(prompt).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }

    async fn health_check(&self) -> Result<()> {
        (**self).health_check().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fusion::RequestBuilder;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct SlowBackend {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl FusionBackend for SlowBackend {
        async fn fuse(&self, _prompt: &RenderedPrompt) -> Result<FusionResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(FusionResult::new("image/png", "Zm9v"))
        }

        fn name(&self) -> &str {
            "slow"
        }

        async fn health_check(&self) -> Result<()> {
            Ok(())
        }
    }

    fn prompt() -> RenderedPrompt {
        RequestBuilder::new()
            .build_input(&Default::default())
            .unwrap()
    }

    #[tokio::test]
    async fn test_cancel_aborts_in_flight_call() {
        let backend = SlowBackend {
            calls: AtomicUsize::new(0),
        };
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = backend.fuse_with_cancel(&prompt(), &cancel).await.unwrap_err();
        assert!(matches!(err, FusionError::Cancelled));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_pre_cancelled_token_skips_call() {
        let backend = SlowBackend {
            calls: AtomicUsize::new(0),
        };
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = backend.fuse_with_cancel(&prompt(), &cancel).await.unwrap_err();
        assert!(matches!(err, FusionError::Cancelled));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_state_default() {
        assert_eq!(FusionState::default(), FusionState::Idle);
    }
}

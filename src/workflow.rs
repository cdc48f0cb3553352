//! The fusion workflow: gate, build, fuse, count.

use crate::error::{FusionError, Result};
use crate::fusion::{
    FusionBackend, FusionBackendExt, FusionInput, FusionResult, FusionState, RequestBuilder,
};
use crate::usage::{local_today, GateDecision, UsageGate, UsageStore};
use chrono::NaiveDate;
use tokio_util::sync::CancellationToken;

/// Runs fusions end to end against one backend and one usage store.
///
/// `run` takes `&mut self`, so a workflow has at most one request in flight.
pub struct FusionWorkflow<B, S> {
    backend: B,
    builder: RequestBuilder,
    gate: UsageGate<S>,
    state: FusionState,
    today: Option<NaiveDate>,
}

impl<B: FusionBackend, S: UsageStore> FusionWorkflow<B, S> {
    /// Creates a workflow with a default request builder.
    pub fn new(backend: B, gate: UsageGate<S>) -> Self {
        Self {
            backend,
            builder: RequestBuilder::new(),
            gate,
            state: FusionState::Idle,
            today: None,
        }
    }

    /// Replaces the request builder (e.g. to change the image size limit).
    pub fn with_builder(mut self, builder: RequestBuilder) -> Self {
        self.builder = builder;
        self
    }

    /// Pins the calendar day instead of reading the local clock.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    /// State of the most recent request.
    pub fn state(&self) -> FusionState {
        self.state
    }

    /// The usage gate.
    pub fn gate(&self) -> &UsageGate<S> {
        &self.gate
    }

    /// The backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(local_today)
    }

    /// Fuses `input` with no way to cancel.
    pub async fn fuse(&mut self, input: &FusionInput) -> Result<FusionResult> {
        self.run(input, &CancellationToken::new()).await
    }

    /// Fuses `input`, aborting the remote call if `cancel` fires.
    ///
    /// The usage count is incremented only when an image comes back.
    pub async fn run(
        &mut self,
        input: &FusionInput,
        cancel: &CancellationToken,
    ) -> Result<FusionResult> {
        let today = self.today();

        if let GateDecision::LimitReached { limit } = self.gate.check_and_maybe_reject(today)? {
            return Err(FusionError::LimitReached { limit });
        }

        let prompt = self.builder.build_input(input)?;

        self.state = FusionState::Pending;
        tracing::debug!(
            backend = self.backend.name(),
            first = input.first.kind(),
            second = input.second.kind(),
            "fusion pending"
        );

        match self.backend.fuse_with_cancel(&prompt, cancel).await {
            Ok(result) => {
                self.state = FusionState::Succeeded;
                match self.gate.record_success(today) {
                    Ok(count) => {
                        tracing::info!(count, limit = self.gate.limit(), "fusion succeeded")
                    }
                    Err(e) => tracing::warn!("fusion succeeded but usage was not recorded: {e}"),
                }
                Ok(result)
            }
            Err(e) => {
                self.state = FusionState::Failed;
                tracing::warn!(retryable = e.is_retryable(), "fusion failed: {e}");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fusion::{FusionItem, RenderedPrompt};
    use crate::usage::{MemoryUsageStore, UsageRecord, DAILY_LIMIT};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Backend that replies with a canned outcome and records prompts.
    struct StubBackend {
        outcome: fn() -> Result<FusionResult>,
        calls: AtomicUsize,
        prompts: Mutex<Vec<RenderedPrompt>>,
    }

    impl StubBackend {
        fn new(outcome: fn() -> Result<FusionResult>) -> Self {
            Self {
                outcome,
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl FusionBackend for StubBackend {
        async fn fuse(&self, prompt: &RenderedPrompt) -> Result<FusionResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(prompt.clone());
            (self.outcome)()
        }

        fn name(&self) -> &str {
            "stub"
        }

        async fn health_check(&self) -> Result<()> {
            Ok(())
        }
    }

    fn png_foo() -> Result<FusionResult> {
        Ok(FusionResult::new("image/png", "Zm9v"))
    }

    fn network_down() -> Result<FusionResult> {
        Err(FusionError::Upstream {
            status: 503,
            message: "unavailable".into(),
        })
    }

    fn blocked() -> Result<FusionResult> {
        Err(FusionError::SafetyBlocked("IMAGE_SAFETY".into()))
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
    }

    fn workflow(
        outcome: fn() -> Result<FusionResult>,
        count: u32,
    ) -> FusionWorkflow<StubBackend, MemoryUsageStore> {
        let store = MemoryUsageStore::with_record(UsageRecord {
            last_usage_date: Some(today()),
            usage_count: count,
        });
        FusionWorkflow::new(StubBackend::new(outcome), UsageGate::new(store)).with_today(today())
    }

    fn count(wf: &FusionWorkflow<StubBackend, MemoryUsageStore>) -> u32 {
        wf.gate().store().load().unwrap().usage_count
    }

    #[tokio::test]
    async fn test_rocket_frog_end_to_end() {
        let mut wf = workflow(png_foo, 0);
        assert_eq!(wf.state(), FusionState::Idle);

        let result = wf.fuse(&FusionInput::emojis("🚀", "🐸")).await.unwrap();

        assert_eq!(result.to_data_uri(), "data:image/png;base64,Zm9v");
        assert_eq!(count(&wf), 1);
        assert_eq!(wf.state(), FusionState::Succeeded);
        assert_eq!(wf.backend().calls(), 1);

        let prompts = wf.backend().prompts.lock().unwrap();
        let text = prompts[0].text();
        assert!(text.contains("🚀") && text.contains("🐸"));
    }

    #[tokio::test]
    async fn test_failure_leaves_count_unchanged() {
        let mut wf = workflow(network_down, 1);
        let err = wf.fuse(&FusionInput::default()).await.unwrap_err();

        assert!(err.is_fusion_failure());
        assert!(err.is_retryable());
        assert_eq!(count(&wf), 1);
        assert_eq!(wf.state(), FusionState::Failed);
    }

    #[tokio::test]
    async fn test_safety_block_is_not_retryable() {
        let mut wf = workflow(blocked, 0);
        let err = wf.fuse(&FusionInput::default()).await.unwrap_err();
        assert!(matches!(err, FusionError::SafetyBlocked(_)));
        assert!(!err.is_retryable());
        assert_eq!(count(&wf), 0);
    }

    #[tokio::test]
    async fn test_validation_error_never_calls_backend() {
        let mut wf = workflow(png_foo, 0);
        let input = FusionInput::new(FusionItem::emoji("ab"), FusionItem::emoji(""));
        let err = wf.fuse(&input).await.unwrap_err();

        match err {
            FusionError::Validation(errors) => assert_eq!(errors.len(), 2),
            other => panic!("expected Validation, got {other:?}"),
        }
        assert_eq!(wf.backend().calls(), 0);
        assert_eq!(wf.state(), FusionState::Idle);
        assert_eq!(count(&wf), 0);
    }

    #[tokio::test]
    async fn test_limit_reached_never_calls_backend() {
        let mut wf = workflow(png_foo, DAILY_LIMIT);
        let err = wf.fuse(&FusionInput::default()).await.unwrap_err();

        assert!(matches!(err, FusionError::LimitReached { limit } if limit == DAILY_LIMIT));
        assert_eq!(wf.backend().calls(), 0);
        assert_eq!(count(&wf), DAILY_LIMIT);
    }

    #[tokio::test]
    async fn test_limit_reached_after_three_fusions() {
        let mut wf = workflow(png_foo, 0);
        for _ in 0..DAILY_LIMIT {
            wf.fuse(&FusionInput::default()).await.unwrap();
        }
        let err = wf.fuse(&FusionInput::default()).await.unwrap_err();
        assert!(matches!(err, FusionError::LimitReached { .. }));
        assert_eq!(wf.backend().calls(), DAILY_LIMIT as usize);
    }

    #[tokio::test]
    async fn test_new_day_resets_before_fusing() {
        let store = MemoryUsageStore::with_record(UsageRecord {
            last_usage_date: NaiveDate::from_ymd_opt(2024, 4, 30),
            usage_count: DAILY_LIMIT,
        });
        let mut wf = FusionWorkflow::new(StubBackend::new(png_foo), UsageGate::new(store))
            .with_today(today());

        wf.fuse(&FusionInput::default()).await.unwrap();
        assert_eq!(count(&wf), 1);
    }

    #[tokio::test]
    async fn test_cancelled_run_is_not_counted() {
        let mut wf = workflow(png_foo, 0);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = wf.run(&FusionInput::default(), &cancel).await.unwrap_err();
        assert!(matches!(err, FusionError::Cancelled));
        assert_eq!(wf.state(), FusionState::Failed);
        assert_eq!(count(&wf), 0);
    }

    #[tokio::test]
    async fn test_image_item_reaches_backend_unchanged() {
        let png = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 7, 7, 7, 7];
        let item = FusionItem::from_image_bytes(&png);
        let FusionItem::Image(ref uri) = item else {
            unreachable!()
        };
        let (mime, body) = uri
            .strip_prefix("data:")
            .and_then(|r| r.split_once(";base64,"))
            .unwrap();

        let mut wf = workflow(png_foo, 0);
        wf.fuse(&FusionInput::new(item.clone(), FusionItem::emoji("🍩")))
            .await
            .unwrap();

        let prompts = wf.backend().prompts.lock().unwrap();
        let media: Vec<(&str, &str)> = prompts[0].media().collect();
        assert_eq!(media, vec![(mime, body)]);
    }
}

//! Provider fallback — a live adapter guarded by the offline responder.
//!
//! Two degraded modes stay distinct and observable on every result:
//! - `CallOrigin::Offline` when demo mode is on or the adapter has no
//!   credentials (the live adapter is never contacted)
//! - `CallOrigin::Fallback` when the live call failed or timed out

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use switchyard_core::error::ProviderError;
use switchyard_core::{
    CallOrigin, Cpir, ModelCallOptions, ModelCallResult, ModelCatalogEntry, ModelProvider,
    ProviderKey,
};
use tracing::{debug, warn};

use crate::offline::OfflineProvider;

/// Wraps a live adapter so a model call never fails.
pub struct FallbackProvider {
    primary: Arc<dyn ModelProvider>,
    offline: Arc<OfflineProvider>,
    timeout: Duration,
    demo_mode: bool,
}

impl FallbackProvider {
    pub fn new(primary: Arc<dyn ModelProvider>, offline: Arc<OfflineProvider>) -> Self {
        Self {
            primary,
            offline,
            timeout: Duration::from_secs(120),
            demo_mode: false,
        }
    }

    /// Upper bound on a single live call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Answer everything offline without contacting the live adapter.
    pub fn with_demo_mode(mut self, demo_mode: bool) -> Self {
        self.demo_mode = demo_mode;
        self
    }
}

#[async_trait]
impl ModelProvider for FallbackProvider {
    fn key(&self) -> ProviderKey {
        self.primary.key()
    }

    fn render_prompt(&self, cpir: &Cpir, model: &ModelCatalogEntry) -> String {
        self.primary.render_prompt(cpir, model)
    }

    async fn call_model(
        &self,
        prompt: &str,
        options: &ModelCallOptions,
    ) -> std::result::Result<ModelCallResult, ProviderError> {
        let provider = self.primary.key();

        if self.demo_mode || !self.primary.is_enabled() {
            debug!(
                provider = %provider,
                model_id = %options.model_id,
                demo_mode = self.demo_mode,
                "Answering offline"
            );
            return Ok(self.offline.respond(prompt, options, CallOrigin::Offline));
        }

        let failure = match tokio::time::timeout(self.timeout, self.primary.call_model(prompt, options)).await {
            Ok(Ok(result)) => return Ok(result),
            Ok(Err(e)) => e,
            Err(_) => ProviderError::Timeout(format!(
                "Provider '{}' timed out after {}s",
                provider,
                self.timeout.as_secs()
            )),
        };

        warn!(
            provider = %provider,
            model_id = %options.model_id,
            trace_id = options.trace_id.as_deref().unwrap_or(""),
            error = %failure,
            "Fallback: provider failed, answering offline"
        );
        Ok(self.offline.respond(prompt, options, CallOrigin::Fallback))
    }

    fn is_enabled(&self) -> bool {
        self.primary.is_enabled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use switchyard_core::ModelCatalog;

    /// A mock adapter that always fails.
    struct FailingProvider {
        error: ProviderError,
        call_count: Mutex<u32>,
    }

    impl FailingProvider {
        fn new(error: ProviderError) -> Self {
            Self {
                error,
                call_count: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.call_count.lock().unwrap()
        }
    }

    #[async_trait]
    impl ModelProvider for FailingProvider {
        fn key(&self) -> ProviderKey {
            ProviderKey::OpenAi
        }

        fn render_prompt(&self, cpir: &Cpir, model: &ModelCatalogEntry) -> String {
            crate::prompt::render_canonical_prompt(cpir, model)
        }

        async fn call_model(
            &self,
            _prompt: &str,
            _options: &ModelCallOptions,
        ) -> std::result::Result<ModelCallResult, ProviderError> {
            *self.call_count.lock().unwrap() += 1;
            Err(self.error.clone())
        }

        fn is_enabled(&self) -> bool {
            true
        }
    }

    /// A mock adapter that answers "live".
    struct SuccessProvider {
        enabled: bool,
        call_count: Mutex<u32>,
    }

    impl SuccessProvider {
        fn new(enabled: bool) -> Self {
            Self {
                enabled,
                call_count: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.call_count.lock().unwrap()
        }
    }

    #[async_trait]
    impl ModelProvider for SuccessProvider {
        fn key(&self) -> ProviderKey {
            ProviderKey::OpenAi
        }

        fn render_prompt(&self, cpir: &Cpir, model: &ModelCatalogEntry) -> String {
            crate::prompt::render_canonical_prompt(cpir, model)
        }

        async fn call_model(
            &self,
            _prompt: &str,
            _options: &ModelCallOptions,
        ) -> std::result::Result<ModelCallResult, ProviderError> {
            *self.call_count.lock().unwrap() += 1;
            Ok(ModelCallResult {
                text: "success".into(),
                input_tokens: 10,
                output_tokens: 2,
                cost_usd: 0.0,
                latency_ms: 5,
                origin: CallOrigin::Live,
            })
        }

        fn is_enabled(&self) -> bool {
            self.enabled
        }
    }

    /// A mock adapter that hangs forever (for timeout testing).
    struct HangingProvider;

    #[async_trait]
    impl ModelProvider for HangingProvider {
        fn key(&self) -> ProviderKey {
            ProviderKey::Anthropic
        }

        fn render_prompt(&self, cpir: &Cpir, model: &ModelCatalogEntry) -> String {
            crate::prompt::render_canonical_prompt(cpir, model)
        }

        async fn call_model(
            &self,
            _prompt: &str,
            _options: &ModelCallOptions,
        ) -> std::result::Result<ModelCallResult, ProviderError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            unreachable!()
        }

        fn is_enabled(&self) -> bool {
            true
        }
    }

    fn offline() -> Arc<OfflineProvider> {
        Arc::new(OfflineProvider::new(Arc::new(ModelCatalog::builtin())))
    }

    fn options() -> ModelCallOptions {
        ModelCallOptions::new(ProviderKey::OpenAi, "gpt-4o-mini")
    }

    #[tokio::test]
    async fn live_answer_passes_through() {
        let primary = Arc::new(SuccessProvider::new(true));
        let provider = FallbackProvider::new(primary.clone(), offline());

        let result = provider.call_model("hello", &options()).await.unwrap();
        assert_eq!(result.text, "success");
        assert_eq!(result.origin, CallOrigin::Live);
        assert_eq!(primary.calls(), 1);
    }

    #[tokio::test]
    async fn demo_mode_never_contacts_primary() {
        let primary = Arc::new(SuccessProvider::new(true));
        let provider = FallbackProvider::new(primary.clone(), offline()).with_demo_mode(true);

        let result = provider.call_model("hello", &options()).await.unwrap();
        assert_eq!(result.origin, CallOrigin::Offline);
        assert!(result.text.contains("deterministic mock response"));
        assert_eq!(primary.calls(), 0);
    }

    #[tokio::test]
    async fn disabled_primary_answers_offline() {
        let primary = Arc::new(SuccessProvider::new(false));
        let provider = FallbackProvider::new(primary.clone(), offline());

        let result = provider.call_model("hello", &options()).await.unwrap();
        assert_eq!(result.origin, CallOrigin::Offline);
        assert_eq!(primary.calls(), 0);
        assert!(!provider.is_enabled());
    }

    #[tokio::test]
    async fn failure_falls_back() {
        let primary = Arc::new(FailingProvider::new(ProviderError::ApiError {
            status_code: 500,
            message: "Internal Server Error".into(),
        }));
        let provider = FallbackProvider::new(primary.clone(), offline());

        let result = provider.call_model("hello", &options()).await.unwrap();
        assert_eq!(result.origin, CallOrigin::Fallback);
        assert!(result.text.contains("Claims:"));
        assert_eq!(primary.calls(), 1);
    }

    #[tokio::test]
    async fn rate_limit_falls_back() {
        let primary = Arc::new(FailingProvider::new(ProviderError::RateLimited {
            retry_after_secs: 60,
        }));
        let provider = FallbackProvider::new(primary, offline());
        let result = provider.call_model("hello", &options()).await.unwrap();
        assert_eq!(result.origin, CallOrigin::Fallback);
    }

    #[tokio::test]
    async fn timeout_triggers_fallback() {
        let provider = FallbackProvider::new(Arc::new(HangingProvider), offline())
            .with_timeout(Duration::from_millis(50));

        let result = provider.call_model("hello", &options()).await.unwrap();
        assert_eq!(result.origin, CallOrigin::Fallback);
        assert_eq!(provider.key(), ProviderKey::Anthropic);
    }
}

//! Deterministic offline responder.
//!
//! Synthesizes plausible structured text from a hash of the prompt and model
//! id. Used for demo mode, missing credentials and upstream failures, so a
//! run never stalls for lack of a backend.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use switchyard_core::error::ProviderError;
use switchyard_core::{
    CallOrigin, Cpir, ModelCallOptions, ModelCallResult, ModelCatalog, ModelCatalogEntry,
    ModelProvider, ProviderKey,
};

use crate::prompt::render_canonical_prompt;

/// Simulated round-trip added to every offline answer.
const SIMULATED_LATENCY_MS: u64 = 35;

const FRAMINGS: [&str; 3] = [
    "Focus on reliability and incremental execution.",
    "Bias toward fast wins and measurable checkpoints.",
    "Optimize for output quality with explicit tradeoffs.",
];

const ACTIONS: [&str; 3] = [
    "Define CPIR and ContextPack contracts first.",
    "Execute compare/chain through the same DAG runner.",
    "Store per-step prompt, cost, latency, and parsed outputs.",
];

/// Rolling hash over UTF-16 code units, modulo 1_000_003.
pub fn prompt_hash(input: &str) -> u64 {
    input
        .encode_utf16()
        .fold(0u64, |acc, unit| (acc * 31 + u64::from(unit)) % 1_000_003)
}

/// `max(1, ceil(chars / 4))`.
pub(crate) fn approx_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(4).max(1)
}

/// Build the offline answer text for a prompt/model pair.
pub fn synthesize_answer(prompt: &str, model_id: &str) -> String {
    let digest = prompt_hash(&format!("{model_id}:{prompt}"));
    let framing = FRAMINGS[(digest % 3) as usize];

    let claims = [
        format!(
            "Claim A ({model_id}): The request needs run-level orchestration primitives before model tuning."
        ),
        format!(
            "Claim B ({model_id}): Explanations are strongest when router factors are persisted per step."
        ),
        format!(
            "Claim C ({model_id}): Memory selection should stay model-agnostic and relevance-scored."
        ),
    ];

    let mut lines: Vec<String> = vec![
        framing.to_string(),
        String::new(),
        "Answer:".to_string(),
        format!("This is a deterministic mock response generated for {model_id}."),
        String::new(),
        "Claims:".to_string(),
    ];
    lines.extend(claims);
    lines.push(String::new());
    lines.push("Actions:".to_string());
    lines.extend(ACTIONS.iter().map(|a| a.to_string()));
    lines.push(String::new());
    lines.push("CodeBlocks:".to_string());
    lines.push("```rust".to_string());
    lines.push("struct StepPlanNode { id: String, depends_on: Vec<String> }".to_string());
    lines.push("```".to_string());

    lines.join("\n")
}

/// The offline adapter. Always enabled.
pub struct OfflineProvider {
    catalog: Arc<ModelCatalog>,
}

impl OfflineProvider {
    pub fn new(catalog: Arc<ModelCatalog>) -> Self {
        Self { catalog }
    }

    /// Answer a prompt, tagging the result with `origin`.
    ///
    /// Pricing uses the requested model's catalog entry, or the placeholder
    /// model's when the id is unknown.
    pub fn respond(
        &self,
        prompt: &str,
        options: &ModelCallOptions,
        origin: CallOrigin,
    ) -> ModelCallResult {
        let started = Instant::now();
        let text = synthesize_answer(prompt, &options.model_id);
        let input_tokens = approx_tokens(prompt);
        let output_tokens = approx_tokens(&text);
        let pricing = self
            .catalog
            .get(&options.model_id)
            .cloned()
            .unwrap_or_else(ModelCatalogEntry::placeholder);
        let cost_usd = pricing.estimate_cost_usd(input_tokens, output_tokens);

        ModelCallResult {
            text,
            input_tokens,
            output_tokens,
            cost_usd,
            latency_ms: u64::try_from(started.elapsed().as_millis())
                .unwrap_or(u64::MAX)
                .saturating_add(SIMULATED_LATENCY_MS),
            origin,
        }
    }
}

#[async_trait]
impl ModelProvider for OfflineProvider {
    fn key(&self) -> ProviderKey {
        ProviderKey::Mock
    }

    fn render_prompt(&self, cpir: &Cpir, model: &ModelCatalogEntry) -> String {
        render_canonical_prompt(cpir, model)
    }

    async fn call_model(
        &self,
        prompt: &str,
        options: &ModelCallOptions,
    ) -> std::result::Result<ModelCallResult, ProviderError> {
        Ok(self.respond(prompt, options, CallOrigin::Offline))
    }

    fn is_enabled(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline() -> OfflineProvider {
        OfflineProvider::new(Arc::new(ModelCatalog::builtin()))
    }

    #[test]
    fn hash_matches_reference_values() {
        assert_eq!(prompt_hash(""), 0);
        assert_eq!(prompt_hash("a"), 97);
        // (97 * 31 + 98) % 1_000_003
        assert_eq!(prompt_hash("ab"), 3105);
    }

    #[test]
    fn answer_is_deterministic_and_structured() {
        let a = synthesize_answer("prompt", "mock-analyst");
        let b = synthesize_answer("prompt", "mock-analyst");
        assert_eq!(a, b);
        assert!(a.contains("Answer:\nThis is a deterministic mock response generated for mock-analyst."));
        assert!(a.contains("Claim A (mock-analyst)"));
        assert!(a.contains("Actions:\nDefine CPIR and ContextPack contracts first."));
        assert_eq!(a.matches("```").count(), 2);
        assert!(FRAMINGS.iter().any(|f| a.starts_with(f)));
    }

    #[tokio::test]
    async fn offline_call_reports_usage() {
        let provider = offline();
        let options = ModelCallOptions::new(ProviderKey::Mock, "mock-balanced");
        let result = provider.call_model("twelve chars", &options).await.unwrap();

        assert_eq!(result.origin, CallOrigin::Offline);
        assert_eq!(result.input_tokens, 3);
        assert_eq!(result.output_tokens, approx_tokens(&result.text));
        assert_eq!(result.cost_usd, 0.0);
        assert!(result.latency_ms >= SIMULATED_LATENCY_MS);
    }

    #[test]
    fn offline_answer_priced_as_requested_model() {
        let provider = offline();
        let options = ModelCallOptions::new(ProviderKey::Anthropic, "claude-sonnet-4-20250514");
        let result = provider.respond(&"x".repeat(4000), &options, CallOrigin::Fallback);
        assert!(result.cost_usd > 0.0);
        assert_eq!(result.origin, CallOrigin::Fallback);

        let unknown = ModelCallOptions::new(ProviderKey::Mock, "not-in-catalog");
        assert_eq!(provider.respond("p", &unknown, CallOrigin::Offline).cost_usd, 0.0);
    }

    #[test]
    fn approx_tokens_never_zero() {
        assert_eq!(approx_tokens(""), 1);
        assert_eq!(approx_tokens("abcd"), 1);
        assert_eq!(approx_tokens("abcde"), 2);
    }
}

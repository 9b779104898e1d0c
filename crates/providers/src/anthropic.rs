//! Anthropic native adapter.
//!
//! Uses Anthropic's Messages API directly:
//! - `x-api-key` header authentication (not Bearer)
//! - `anthropic-version` header
//! - text content blocks joined with newlines

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use switchyard_core::error::ProviderError;
use switchyard_core::{
    CallOrigin, Cpir, ModelCallOptions, ModelCallResult, ModelCatalog, ModelCatalogEntry,
    ModelProvider, ProviderKey,
};
use tracing::debug;

use crate::offline::approx_tokens;
use crate::openai_compat::{http_client, status_error};
use crate::prompt::render_canonical_prompt;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MAX_TOKENS: u32 = 1200;

/// Anthropic Messages API adapter.
pub struct AnthropicProvider {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
    catalog: Arc<ModelCatalog>,
}

impl AnthropicProvider {
    pub fn new(api_key: Option<String>, catalog: Arc<ModelCatalog>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            client: http_client(Duration::from_secs(120)),
            catalog,
        }
    }

    /// Create with a custom base URL (e.g., for testing or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn request_body(prompt: &str, options: &ModelCallOptions) -> serde_json::Value {
        serde_json::json!({
            "model": options.model_id,
            "max_tokens": DEFAULT_MAX_TOKENS,
            "temperature": options.temperature,
            "messages": [{ "role": "user", "content": prompt }],
        })
    }

    fn build_result(
        &self,
        api_response: ApiResponse,
        prompt: &str,
        model_id: &str,
        started: Instant,
    ) -> ModelCallResult {
        let text = api_response
            .content
            .iter()
            .filter(|block| block.r#type == "text")
            .filter_map(|block| block.text.as_deref())
            .collect::<Vec<_>>()
            .join("\n");
        let input_tokens = api_response
            .usage
            .as_ref()
            .and_then(|u| u.input_tokens)
            .unwrap_or_else(|| approx_tokens(prompt));
        let output_tokens = api_response
            .usage
            .as_ref()
            .and_then(|u| u.output_tokens)
            .unwrap_or_else(|| approx_tokens(&text));
        let cost_usd = self
            .catalog
            .get(model_id)
            .map(|entry| entry.estimate_cost_usd(input_tokens, output_tokens))
            .unwrap_or(0.0);

        ModelCallResult {
            text,
            input_tokens,
            output_tokens,
            cost_usd,
            latency_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            origin: CallOrigin::Live,
        }
    }
}

#[async_trait]
impl ModelProvider for AnthropicProvider {
    fn key(&self) -> ProviderKey {
        ProviderKey::Anthropic
    }

    fn render_prompt(&self, cpir: &Cpir, model: &ModelCatalogEntry) -> String {
        render_canonical_prompt(cpir, model)
    }

    async fn call_model(
        &self,
        prompt: &str,
        options: &ModelCallOptions,
    ) -> std::result::Result<ModelCallResult, ProviderError> {
        let Some(api_key) = &self.api_key else {
            return Err(ProviderError::NotConfigured(
                "no API key for provider 'anthropic'".into(),
            ));
        };

        let url = format!("{}/v1/messages", self.base_url);
        let started = Instant::now();

        debug!(model = %options.model_id, "Sending Anthropic request");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&Self::request_body(prompt, options))
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let api_response: ApiResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("Failed to parse Anthropic response: {e}"),
            })?;

        Ok(self.build_result(api_response, prompt, &options.model_id, started))
    }

    fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }
}

// --- API types (internal) ---

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    r#type: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    input_tokens: Option<u64>,
    #[serde(default)]
    output_tokens: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> AnthropicProvider {
        AnthropicProvider::new(Some("sk-ant".into()), Arc::new(ModelCatalog::builtin()))
    }

    #[test]
    fn custom_base_url() {
        let p = provider().with_base_url("http://localhost:9999/");
        assert_eq!(p.base_url, "http://localhost:9999");
        assert!(p.is_enabled());
    }

    #[test]
    fn request_body_shape() {
        let options = ModelCallOptions::new(ProviderKey::Anthropic, "claude-sonnet-4-20250514");
        let body = AnthropicProvider::request_body("hello", &options);
        assert_eq!(body["max_tokens"], 1200);
        assert_eq!(body["messages"][0]["content"], "hello");
    }

    #[test]
    fn joins_text_blocks_and_skips_others() {
        let api: ApiResponse = serde_json::from_str(
            r#"{"content":[{"type":"text","text":"one"},{"type":"tool_use"},{"type":"text","text":"two"}],
                "usage":{"input_tokens":2000,"output_tokens":100}}"#,
        )
        .unwrap();
        let result = provider().build_result(api, "p", "claude-sonnet-4-20250514", Instant::now());
        assert_eq!(result.text, "one\ntwo");
        // 2000 * 0.003/1k + 100 * 0.015/1k
        assert!((result.cost_usd - 0.0075).abs() < 1e-12);
    }

    #[tokio::test]
    async fn disabled_without_key() {
        let p = AnthropicProvider::new(None, Arc::new(ModelCatalog::builtin()));
        assert!(!p.is_enabled());
        let options = ModelCallOptions::new(ProviderKey::Anthropic, "claude-sonnet-4-20250514");
        assert!(matches!(
            p.call_model("hi", &options).await,
            Err(ProviderError::NotConfigured(_))
        ));
    }
}

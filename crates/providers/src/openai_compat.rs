//! OpenAI-compatible chat completions adapter.
//!
//! Works with: OpenAI, Google Gemini (OpenAI endpoint), Mistral, and any
//! OpenAI-compatible endpoint behind a custom `api_url`.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use switchyard_core::error::ProviderError;
use switchyard_core::{
    CallOrigin, Cpir, ModelCallOptions, ModelCallResult, ModelCatalog, ModelCatalogEntry,
    ModelProvider, ProviderKey,
};
use tracing::{debug, warn};

use crate::offline::approx_tokens;
use crate::prompt::render_canonical_prompt;

/// Build the shared HTTP client.
pub(crate) fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Map a non-success HTTP status into a provider error.
pub(crate) async fn status_error(response: reqwest::Response) -> ProviderError {
    let status = response.status().as_u16();
    match status {
        429 => ProviderError::RateLimited {
            retry_after_secs: 5,
        },
        401 | 403 => ProviderError::AuthenticationFailed(
            "Invalid API key or insufficient permissions".into(),
        ),
        _ => {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Provider returned error");
            ProviderError::ApiError {
                status_code: status,
                message: error_body,
            }
        }
    }
}

/// An OpenAI-compatible model adapter.
pub struct OpenAiCompatProvider {
    key: ProviderKey,
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
    catalog: Arc<ModelCatalog>,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible adapter.
    pub fn new(
        key: ProviderKey,
        base_url: impl Into<String>,
        api_key: Option<String>,
        catalog: Arc<ModelCatalog>,
    ) -> Self {
        Self {
            key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            client: http_client(Duration::from_secs(120)),
            catalog,
        }
    }

    /// OpenAI (convenience constructor).
    pub fn openai(api_key: Option<String>, catalog: Arc<ModelCatalog>) -> Self {
        Self::new(ProviderKey::OpenAi, "https://api.openai.com/v1", api_key, catalog)
    }

    /// Google Gemini through its OpenAI-compatible endpoint.
    pub fn google(api_key: Option<String>, catalog: Arc<ModelCatalog>) -> Self {
        Self::new(
            ProviderKey::Google,
            "https://generativelanguage.googleapis.com/v1beta/openai",
            api_key,
            catalog,
        )
    }

    /// Mistral (convenience constructor).
    pub fn mistral(api_key: Option<String>, catalog: Arc<ModelCatalog>) -> Self {
        Self::new(ProviderKey::Mistral, "https://api.mistral.ai/v1", api_key, catalog)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request_body(prompt: &str, options: &ModelCallOptions) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": options.model_id,
            "temperature": options.temperature,
            "messages": [{ "role": "user", "content": prompt }],
        });
        if options.json_mode {
            body["response_format"] = serde_json::json!({ "type": "json_object" });
        }
        body
    }

    fn build_result(
        &self,
        api_response: ApiResponse,
        prompt: &str,
        model_id: &str,
        started: Instant,
    ) -> ModelCallResult {
        let text = api_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        let input_tokens = api_response
            .usage
            .as_ref()
            .and_then(|u| u.prompt_tokens)
            .unwrap_or_else(|| approx_tokens(prompt));
        let output_tokens = api_response
            .usage
            .as_ref()
            .and_then(|u| u.completion_tokens)
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
impl ModelProvider for OpenAiCompatProvider {
    fn key(&self) -> ProviderKey {
        self.key
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
            return Err(ProviderError::NotConfigured(format!(
                "no API key for provider '{}'",
                self.key
            )));
        };

        let url = format!("{}/chat/completions", self.base_url);
        let started = Instant::now();

        debug!(provider = %self.key, model = %options.model_id, "Sending completion request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {api_key}"))
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
                message: format!("Failed to parse response: {e}"),
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
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: Option<u64>,
    #[serde(default)]
    completion_tokens: Option<u64>,
}

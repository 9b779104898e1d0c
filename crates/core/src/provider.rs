//! ModelProvider trait — the abstraction over model backends.
//!
//! A provider renders a CPIR into prompt text and sends that prompt to a
//! model, reporting text plus token, cost and latency figures.
//!
//! Implementations: OpenAI-compatible, Anthropic, deterministic offline.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::catalog::{ModelCatalogEntry, ProviderKey};
use crate::cpir::Cpir;
use crate::error::ProviderError;

fn default_temperature() -> f32 {
    0.2
}

/// Per-call options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelCallOptions {
    pub model_id: String,
    pub provider: ProviderKey,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Ask the backend for a JSON object response
    #[serde(default)]
    pub json_mode: bool,

    /// Correlates provider logs with the run trace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}

impl ModelCallOptions {
    pub fn new(provider: ProviderKey, model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            provider,
            temperature: default_temperature(),
            json_mode: false,
            trace_id: None,
        }
    }

    pub fn with_json_mode(mut self, json_mode: bool) -> Self {
        self.json_mode = json_mode;
        self
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }
}

/// How a model call was actually answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallOrigin {
    /// The upstream backend answered
    Live,
    /// Demo mode or missing credentials; the offline responder answered
    Offline,
    /// The upstream call failed; the offline responder answered instead
    Fallback,
}

impl CallOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallOrigin::Live => "live",
            CallOrigin::Offline => "offline",
            CallOrigin::Fallback => "fallback",
        }
    }
}

impl std::fmt::Display for CallOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CallOrigin {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "live" => Ok(CallOrigin::Live),
            "offline" => Ok(CallOrigin::Offline),
            "fallback" => Ok(CallOrigin::Fallback),
            other => Err(format!("unknown call origin '{other}'")),
        }
    }
}

/// Result of one model call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelCallResult {
    pub text: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
    pub latency_ms: u64,
    pub origin: CallOrigin,
}

/// The core ModelProvider trait.
///
/// The executor calls `render_prompt()` then `call_model()` without knowing
/// which backend is behind the adapter.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Which vendor this adapter speaks to.
    fn key(&self) -> ProviderKey;

    /// Render the canonical prompt for a model. Pure.
    fn render_prompt(&self, cpir: &Cpir, model: &ModelCatalogEntry) -> String;

    /// Send a rendered prompt and get the completion back.
    async fn call_model(
        &self,
        prompt: &str,
        options: &ModelCallOptions,
    ) -> std::result::Result<ModelCallResult, ProviderError>;

    /// Whether credentials are present for this backend.
    fn is_enabled(&self) -> bool;
}

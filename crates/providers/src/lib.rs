//! Model provider adapters for Switchyard.
//!
//! All adapters implement the `switchyard_core::ModelProvider` trait.
//! The registry resolves a provider key to its adapter, and every live
//! adapter is wrapped so that failures degrade to the offline responder.

pub mod anthropic;
pub mod fallback;
pub mod offline;
pub mod openai_compat;
pub mod prompt;
pub mod registry;

pub use anthropic::AnthropicProvider;
pub use fallback::FallbackProvider;
pub use offline::{OfflineProvider, synthesize_answer};
pub use openai_compat::OpenAiCompatProvider;
pub use prompt::render_canonical_prompt;
pub use registry::{ProviderRegistry, build_from_config};

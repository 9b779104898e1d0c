//! Error types for the Switchyard domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all Switchyard operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Run store errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Contract violations on CPIR / ContextPack / preferences / decisions ---
    #[error("Validation failed: {0}")]
    Validation(String),

    // --- Malformed step graph ---
    #[error("Plan error: {0}")]
    Plan(String),

    // --- Missing entities ---
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    // --- Precondition failures (checked before any state is mutated) ---
    #[error("Precondition failed: {0}")]
    Precondition(String),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Shorthand for a validation failure.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Shorthand for a missing entity.
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Stored record is corrupt: {0}")]
    Corrupt(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn not_found_names_entity_and_id() {
        let err = Error::not_found("Run", "run_42");
        assert_eq!(err.to_string(), "Run not found: run_42");
    }

    #[test]
    fn store_error_converts_into_top_level() {
        let err: Error = StoreError::Storage("disk full".into()).into();
        assert!(matches!(err, Error::Store(_)));
        assert!(err.to_string().contains("disk full"));
    }
}

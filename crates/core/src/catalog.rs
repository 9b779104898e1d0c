//! Model catalog — the static facts the router and planner know about models.
//!
//! The catalog is an immutable value built once at startup (from the built-in
//! table plus configuration) and shared by reference. Nothing in the engine
//! reads a process-wide table, so tests can inject synthetic catalogs.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The backend vendor that serves a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKey {
    OpenAi,
    Anthropic,
    Google,
    Mistral,
    /// Deterministic offline responder, also used for internal steps
    Mock,
}

impl ProviderKey {
    pub const ALL: [ProviderKey; 5] = [
        ProviderKey::OpenAi,
        ProviderKey::Anthropic,
        ProviderKey::Google,
        ProviderKey::Mistral,
        ProviderKey::Mock,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKey::OpenAi => "openai",
            ProviderKey::Anthropic => "anthropic",
            ProviderKey::Google => "google",
            ProviderKey::Mistral => "mistral",
            ProviderKey::Mock => "mock",
        }
    }
}

impl std::fmt::Display for ProviderKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProviderKey {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        ProviderKey::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| format!("unknown provider '{s}'"))
    }
}

/// Static facts about one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelCatalogEntry {
    pub provider: ProviderKey,
    pub model_id: String,
    /// 1..=5, higher is better
    pub quality_tier: u8,
    /// 1..=5, higher is more expensive
    pub cost_tier: u8,
    /// 1..=5, higher is faster
    pub speed_tier: u8,
    pub supports_json: bool,
    pub input_usd_per_1k: f64,
    pub output_usd_per_1k: f64,
}

impl ModelCatalogEntry {
    fn builtin(
        provider: ProviderKey,
        model_id: &str,
        (quality_tier, cost_tier, speed_tier): (u8, u8, u8),
        input_usd_per_1k: f64,
        output_usd_per_1k: f64,
    ) -> Self {
        Self {
            provider,
            model_id: model_id.to_string(),
            quality_tier,
            cost_tier,
            speed_tier,
            supports_json: true,
            input_usd_per_1k,
            output_usd_per_1k,
        }
    }

    /// The zero-cost offline model used to pad plans and price offline answers.
    pub fn placeholder() -> Self {
        Self::builtin(ProviderKey::Mock, PLACEHOLDER_MODEL_ID, (3, 1, 5), 0.0, 0.0)
    }

    /// Price a call against this model, rounded to 6 decimals.
    pub fn estimate_cost_usd(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        let input_cost = (input_tokens as f64 / 1000.0) * self.input_usd_per_1k;
        let output_cost = (output_tokens as f64 / 1000.0) * self.output_usd_per_1k;
        round6(input_cost + output_cost)
    }

    pub fn validate(&self) -> Result<()> {
        if self.model_id.trim().is_empty() {
            return Err(Error::validation("catalog entry has an empty model id"));
        }
        for (name, tier) in [
            ("quality_tier", self.quality_tier),
            ("cost_tier", self.cost_tier),
            ("speed_tier", self.speed_tier),
        ] {
            if !(1..=5).contains(&tier) {
                return Err(Error::validation(format!(
                    "{}: {name} must be within 1..=5, got {tier}",
                    self.model_id
                )));
            }
        }
        if self.input_usd_per_1k < 0.0 || self.output_usd_per_1k < 0.0 {
            return Err(Error::validation(format!(
                "{}: prices must be non-negative",
                self.model_id
            )));
        }
        Ok(())
    }
}

/// Round a USD figure to 6 decimals.
pub fn round6(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

pub const PLACEHOLDER_MODEL_ID: &str = "mock-balanced";

const DEFAULT_AUTO_MODEL: &str = "gpt-4o-mini";
const DEFAULT_COMPARE_MODELS: [&str; 3] =
    ["gpt-4o-mini", "claude-sonnet-4-20250514", "gemini-2.5-flash"];

/// Most models a single run may fan out to.
pub const MAX_SELECTED_MODELS: usize = 4;

/// Immutable table of models plus default-selection helpers.
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    entries: Vec<ModelCatalogEntry>,
    default_auto: String,
    default_compare: Vec<String>,
}

impl ModelCatalog {
    /// Build a catalog from arbitrary entries.
    ///
    /// Defaults fall back to the first entry when the built-in default ids
    /// are not present.
    pub fn new(entries: Vec<ModelCatalogEntry>) -> Result<Self> {
        if entries.is_empty() {
            return Err(Error::validation("model catalog must not be empty"));
        }
        for (i, entry) in entries.iter().enumerate() {
            entry.validate()?;
            if entries[..i].iter().any(|e| e.model_id == entry.model_id) {
                return Err(Error::validation(format!(
                    "duplicate model id '{}' in catalog",
                    entry.model_id
                )));
            }
        }

        let default_auto = if entries.iter().any(|e| e.model_id == DEFAULT_AUTO_MODEL) {
            DEFAULT_AUTO_MODEL.to_string()
        } else {
            entries[0].model_id.clone()
        };

        let mut default_compare: Vec<String> = DEFAULT_COMPARE_MODELS
            .iter()
            .filter(|id| entries.iter().any(|e| e.model_id == **id))
            .map(|id| id.to_string())
            .collect();
        if default_compare.is_empty() {
            default_compare = entries
                .iter()
                .take(MAX_SELECTED_MODELS)
                .map(|e| e.model_id.clone())
                .collect();
        }

        Ok(Self {
            entries,
            default_auto,
            default_compare,
        })
    }

    /// The built-in nine-model table.
    pub fn builtin() -> Self {
        use ProviderKey::*;
        let entries = vec![
            ModelCatalogEntry::builtin(OpenAi, "gpt-4o-mini", (3, 2, 5), 0.00015, 0.0006),
            ModelCatalogEntry::builtin(OpenAi, "gpt-4.1-mini", (4, 3, 4), 0.0004, 0.0016),
            ModelCatalogEntry::builtin(OpenAi, "gpt-4.1", (5, 5, 3), 0.002, 0.008),
            ModelCatalogEntry::builtin(Anthropic, "claude-sonnet-4-20250514", (5, 4, 4), 0.003, 0.015),
            ModelCatalogEntry::builtin(Google, "gemini-2.5-flash", (4, 2, 5), 0.00035, 0.001),
            ModelCatalogEntry::builtin(Mistral, "mistral-large", (4, 3, 4), 0.002, 0.006),
            ModelCatalogEntry::placeholder(),
            ModelCatalogEntry::builtin(Mock, "mock-creative", (4, 1, 4), 0.0, 0.0),
            ModelCatalogEntry::builtin(Mock, "mock-analyst", (4, 1, 3), 0.0, 0.0),
        ];

        Self {
            entries,
            default_auto: DEFAULT_AUTO_MODEL.to_string(),
            default_compare: DEFAULT_COMPARE_MODELS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Add entries, rejecting ids that already exist.
    pub fn with_extra_entries(mut self, extra: Vec<ModelCatalogEntry>) -> Result<Self> {
        for entry in extra {
            entry.validate()?;
            if self.get(&entry.model_id).is_some() {
                return Err(Error::validation(format!(
                    "duplicate model id '{}' in catalog",
                    entry.model_id
                )));
            }
            self.entries.push(entry);
        }
        Ok(self)
    }

    /// Override the AUTO default. Unknown ids are ignored.
    pub fn with_default_auto_model(mut self, model_id: &str) -> Self {
        if self.get(model_id).is_some() {
            self.default_auto = model_id.to_string();
        }
        self
    }

    /// Override the COMPARE defaults.
    ///
    /// Takes effect only when at least two ids resolve; capped at four.
    pub fn with_compare_models<S: AsRef<str>>(mut self, model_ids: &[S]) -> Self {
        let known: Vec<String> = model_ids
            .iter()
            .map(|id| id.as_ref().trim())
            .filter(|id| self.get(id).is_some())
            .map(str::to_string)
            .collect();
        if known.len() >= 2 {
            self.default_compare = known.into_iter().take(MAX_SELECTED_MODELS).collect();
        }
        self
    }

    pub fn entries(&self) -> &[ModelCatalogEntry] {
        &self.entries
    }

    pub fn get(&self, model_id: &str) -> Option<&ModelCatalogEntry> {
        self.entries.iter().find(|e| e.model_id == model_id)
    }

    pub fn default_auto_model(&self) -> &ModelCatalogEntry {
        self.get(&self.default_auto).unwrap_or(&self.entries[0])
    }

    pub fn default_compare_models(&self) -> Vec<&ModelCatalogEntry> {
        self.default_compare
            .iter()
            .filter_map(|id| self.get(id))
            .collect()
    }

    /// Resolve caller-selected ids: unknown ids are dropped, at most four are
    /// kept, and an empty result falls back to the COMPARE defaults.
    pub fn resolve_selected<S: AsRef<str>>(&self, model_ids: &[S]) -> Vec<&ModelCatalogEntry> {
        let resolved: Vec<&ModelCatalogEntry> = model_ids
            .iter()
            .filter_map(|id| self.get(id.as_ref()))
            .take(MAX_SELECTED_MODELS)
            .collect();
        if resolved.is_empty() {
            self.default_compare_models()
        } else {
            resolved
        }
    }
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_has_nine_valid_models() {
        let catalog = ModelCatalog::builtin();
        assert_eq!(catalog.entries().len(), 9);
        for entry in catalog.entries() {
            assert!(entry.validate().is_ok(), "{}", entry.model_id);
        }
        assert_eq!(catalog.default_auto_model().model_id, "gpt-4o-mini");
        let compare: Vec<_> = catalog
            .default_compare_models()
            .into_iter()
            .map(|e| e.model_id.as_str())
            .collect();
        assert_eq!(compare, DEFAULT_COMPARE_MODELS);
    }

    #[test]
    fn resolve_selected_drops_unknown_and_caps() {
        let catalog = ModelCatalog::builtin();
        let picked = catalog.resolve_selected(&["gpt-4.1", "nope", "mock-analyst"]);
        let ids: Vec<_> = picked.iter().map(|e| e.model_id.as_str()).collect();
        assert_eq!(ids, ["gpt-4.1", "mock-analyst"]);

        let many = [
            "gpt-4.1", "gpt-4o-mini", "mock-analyst", "mock-creative", "mock-balanced",
        ];
        assert_eq!(catalog.resolve_selected(&many).len(), 4);
    }

    #[test]
    fn resolve_selected_falls_back_to_compare_defaults() {
        let catalog = ModelCatalog::builtin();
        let picked = catalog.resolve_selected(&["unknown-model"]);
        assert_eq!(picked.len(), 3);
        let empty: [&str; 0] = [];
        assert_eq!(catalog.resolve_selected(&empty).len(), 3);
    }

    #[test]
    fn compare_override_needs_two_known_ids() {
        let catalog = ModelCatalog::builtin().with_compare_models(&["gpt-4.1", "bogus"]);
        assert_eq!(catalog.default_compare_models().len(), 3);

        let catalog = ModelCatalog::builtin().with_compare_models(&["gpt-4.1", "mistral-large"]);
        let ids: Vec<_> = catalog
            .default_compare_models()
            .into_iter()
            .map(|e| e.model_id.clone())
            .collect();
        assert_eq!(ids, ["gpt-4.1", "mistral-large"]);
    }

    #[test]
    fn unknown_auto_override_is_ignored() {
        let catalog = ModelCatalog::builtin().with_default_auto_model("nope");
        assert_eq!(catalog.default_auto_model().model_id, "gpt-4o-mini");
        let catalog = ModelCatalog::builtin().with_default_auto_model("gpt-4.1");
        assert_eq!(catalog.default_auto_model().model_id, "gpt-4.1");
    }

    #[test]
    fn estimate_cost_rounds_to_six_decimals() {
        let catalog = ModelCatalog::builtin();
        let entry = catalog.get("gpt-4o-mini").unwrap();
        // 1000 * 0.00015/1k + 500 * 0.0006/1k = 0.00015 + 0.0003
        assert!((entry.estimate_cost_usd(1000, 500) - 0.00045).abs() < 1e-12);
        assert_eq!(catalog.get("mock-analyst").unwrap().estimate_cost_usd(5000, 5000), 0.0);
    }

    #[test]
    fn synthetic_catalog_picks_first_entry_as_defaults() {
        let mut entry = ModelCatalogEntry::placeholder();
        entry.model_id = "only-model".into();
        let catalog = ModelCatalog::new(vec![entry]).unwrap();
        assert_eq!(catalog.default_auto_model().model_id, "only-model");
        assert_eq!(catalog.default_compare_models().len(), 1);
    }

    #[test]
    fn rejects_duplicates_and_bad_tiers() {
        let dup = vec![ModelCatalogEntry::placeholder(), ModelCatalogEntry::placeholder()];
        assert!(ModelCatalog::new(dup).is_err());

        let mut bad = ModelCatalogEntry::placeholder();
        bad.quality_tier = 9;
        assert!(ModelCatalog::new(vec![bad]).is_err());
        assert!(ModelCatalog::new(Vec::new()).is_err());
    }

    #[test]
    fn provider_key_parses_lowercase() {
        assert_eq!("openai".parse::<ProviderKey>().unwrap(), ProviderKey::OpenAi);
        assert!("OpenAI".parse::<ProviderKey>().is_err());
        assert_eq!(serde_json::to_string(&ProviderKey::OpenAi).unwrap(), "\"openai\"");
    }
}

//! CPIR — the canonical, contextualized representation of one user request.
//!
//! A CPIR is built once per run and never mutated afterwards. Every routing
//! and prompt-rendering step reads it; model steps swap in a freshly compiled
//! [`ContextPack`] on a clone.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::message::Role;
use crate::routing::RouterPreferences;

pub const MAX_INTENT_CHARS: usize = 120;
pub const MAX_TURN_CHARS: usize = 320;
pub const MAX_MEMORY_ENTRY_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Coding,
    Reasoning,
    Creative,
    Research,
    Extraction,
    Planning,
    Critique,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Coding => "coding",
            TaskType::Reasoning => "reasoning",
            TaskType::Creative => "creative",
            TaskType::Research => "research",
            TaskType::Extraction => "extraction",
            TaskType::Planning => "planning",
            TaskType::Critique => "critique",
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Depth {
    Shallow,
    Medium,
    Deep,
}

impl Depth {
    pub fn as_str(&self) -> &'static str {
        match self {
            Depth::Shallow => "shallow",
            Depth::Medium => "medium",
            Depth::Deep => "deep",
        }
    }
}

impl std::fmt::Display for Depth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-supplied constraints, merged with preference-derived caps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Constraints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citations: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tone: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_cost_usd: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_latency_ms: Option<u64>,
}

impl Constraints {
    /// Effective cost cap: an explicit constraint wins, otherwise the
    /// preference cap when enabled.
    pub fn cost_cap(&self, prefs: &RouterPreferences) -> Option<f64> {
        self.max_cost_usd.or_else(|| prefs.cost_cap())
    }

    /// Effective latency cap, same precedence as [`Constraints::cost_cap`].
    pub fn latency_cap(&self, prefs: &RouterPreferences) -> Option<u64> {
        self.max_latency_ms.or_else(|| prefs.latency_cap())
    }

    /// Fold enabled preference caps into the unset constraint slots.
    pub fn merged_with(mut self, prefs: &RouterPreferences) -> Self {
        self.max_cost_usd = self.cost_cap(prefs);
        self.max_latency_ms = self.latency_cap(prefs);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(cost) = self.max_cost_usd
            && !(cost > 0.0 && cost.is_finite())
        {
            return Err(Error::validation(format!(
                "constraints.max_cost_usd must be positive, got {cost}"
            )));
        }
        if self.max_latency_ms == Some(0) {
            return Err(Error::validation("constraints.max_latency_ms must be positive"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpirInputs {
    pub user_text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputContractType {
    Freeform,
    Sections,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputContract {
    #[serde(rename = "type")]
    pub kind: OutputContractType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<serde_json::Map<String, serde_json::Value>>,
}

impl OutputContract {
    pub fn freeform() -> Self {
        Self {
            kind: OutputContractType::Freeform,
            schema: None,
        }
    }

    pub fn is_json(&self) -> bool {
        self.kind == OutputContractType::Json
    }
}

/// One recent conversation turn carried in a ContextPack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextTurn {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRef {
    pub memory_item_id: String,
    pub key: String,
}

/// Bounded, relevance-ranked snapshot of history and memory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextPack {
    pub summary: String,
    pub facts: Vec<String>,
    pub decisions: Vec<String>,
    pub open_questions: Vec<String>,
    pub constraints: Vec<String>,
    pub recent_turns: Vec<ContextTurn>,
    pub memory_refs: Vec<MemoryRef>,
}

impl ContextPack {
    pub fn validate(&self) -> Result<()> {
        if self.summary.trim().is_empty() {
            return Err(Error::validation("context pack summary must not be empty"));
        }
        for turn in &self.recent_turns {
            let len = turn.content.chars().count();
            if len > MAX_TURN_CHARS {
                return Err(Error::validation(format!(
                    "recent turn exceeds {MAX_TURN_CHARS} characters ({len})"
                )));
            }
        }
        let memory_entries = self
            .facts
            .iter()
            .chain(&self.decisions)
            .chain(&self.open_questions)
            .chain(&self.constraints);
        for entry in memory_entries {
            if entry.chars().count() > MAX_MEMORY_ENTRY_CHARS {
                return Err(Error::validation(format!(
                    "memory entry exceeds {MAX_MEMORY_ENTRY_CHARS} characters"
                )));
            }
        }
        Ok(())
    }
}

/// Contextualized Prompt Intermediate Representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cpir {
    pub intent: String,
    pub task_type: TaskType,
    pub depth: Depth,
    pub constraints: Constraints,
    pub inputs: CpirInputs,
    pub context_pack: ContextPack,
    pub output_contract: OutputContract,
}

impl Cpir {
    pub fn user_text(&self) -> &str {
        &self.inputs.user_text
    }

    /// Clone with a replacement context pack.
    pub fn with_context_pack(&self, context_pack: ContextPack) -> Self {
        Self {
            context_pack,
            ..self.clone()
        }
    }

    /// Clone with a replacement user text. Used for chain-stage prompts.
    pub fn with_user_text(&self, user_text: String) -> Self {
        Self {
            inputs: CpirInputs { user_text },
            ..self.clone()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.inputs.user_text.is_empty() {
            return Err(Error::validation("inputs.user_text must not be empty"));
        }
        let intent_len = self.intent.chars().count();
        if intent_len > MAX_INTENT_CHARS {
            return Err(Error::validation(format!(
                "intent exceeds {MAX_INTENT_CHARS} characters ({intent_len})"
            )));
        }
        self.constraints.validate()?;
        self.context_pack.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_cpir() -> Cpir {
        Cpir {
            intent: "Explain the borrow checker".into(),
            task_type: TaskType::Reasoning,
            depth: Depth::Medium,
            constraints: Constraints::default(),
            inputs: CpirInputs {
                user_text: "Explain the borrow checker".into(),
            },
            context_pack: ContextPack {
                summary: "No prior context yet.".into(),
                ..Default::default()
            },
            output_contract: OutputContract::freeform(),
        }
    }

    #[test]
    fn valid_cpir_passes() {
        assert!(sample_cpir().validate().is_ok());
    }

    #[test]
    fn empty_user_text_is_rejected() {
        let cpir = sample_cpir().with_user_text(String::new());
        assert!(matches!(cpir.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn long_intent_is_rejected() {
        let mut cpir = sample_cpir();
        cpir.intent = "x".repeat(121);
        assert!(cpir.validate().is_err());
    }

    #[test]
    fn overlong_turn_is_rejected() {
        let mut cpir = sample_cpir();
        cpir.context_pack.recent_turns.push(ContextTurn {
            role: Role::User,
            content: "y".repeat(321),
        });
        assert!(cpir.validate().is_err());
    }

    #[test]
    fn non_positive_caps_are_rejected() {
        let constraints = Constraints {
            max_cost_usd: Some(0.0),
            ..Default::default()
        };
        assert!(constraints.validate().is_err());
        let constraints = Constraints {
            max_latency_ms: Some(0),
            ..Default::default()
        };
        assert!(constraints.validate().is_err());
    }

    #[test]
    fn explicit_constraint_wins_over_preference_cap() {
        let prefs = RouterPreferences {
            cost_cap_enabled: true,
            max_cost_usd: Some(0.5),
            latency_cap_enabled: true,
            max_latency_ms: Some(2000),
            ..Default::default()
        };
        let constraints = Constraints {
            max_cost_usd: Some(0.01),
            ..Default::default()
        };
        let merged = constraints.merged_with(&prefs);
        assert_eq!(merged.max_cost_usd, Some(0.01));
        assert_eq!(merged.max_latency_ms, Some(2000));
    }

    #[test]
    fn disabled_preference_cap_is_ignored() {
        let prefs = RouterPreferences {
            cost_cap_enabled: false,
            max_cost_usd: Some(0.5),
            ..Default::default()
        };
        assert_eq!(Constraints::default().cost_cap(&prefs), None);
    }

    #[test]
    fn output_contract_serializes_type_field() {
        let json = serde_json::to_value(OutputContract::freeform()).unwrap();
        assert_eq!(json["type"], "freeform");
        assert!(json.get("schema").is_none());
    }
}

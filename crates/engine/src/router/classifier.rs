//! Heuristic request classifier.
//!
//! Pure functions over the raw user text: no I/O and no state, so the same
//! text always classifies the same way.

use switchyard_core::cpir::MAX_INTENT_CHARS;
use switchyard_core::{Depth, OutputContract, OutputContractType, TaskType};

use crate::token::truncate;

const CODE_HINTS: &[&str] = &[
    "code", "debug", "typescript", "javascript", "python", "sql", "bug", "refactor",
];
const RESEARCH_HINTS: &[&str] = &[
    "research",
    "sources",
    "citation",
    "compare studies",
    "paper",
    "market",
];
const CREATIVE_HINTS: &[&str] = &[
    "poem",
    "story",
    "creative",
    "lyrics",
    "brainstorm name",
    "script",
];
const EXTRACTION_HINTS: &[&str] = &["extract", "parse", "json", "table", "summarize into fields"];
const PLANNING_HINTS: &[&str] = &["plan", "roadmap", "timeline", "steps", "prioritize"];
const CRITIQUE_HINTS: &[&str] = &["critique", "review", "feedback", "evaluate"];

/// Checked in order; the first category with a hit wins.
const TASK_HINTS: [(TaskType, &[&str]); 6] = [
    (TaskType::Coding, CODE_HINTS),
    (TaskType::Research, RESEARCH_HINTS),
    (TaskType::Creative, CREATIVE_HINTS),
    (TaskType::Extraction, EXTRACTION_HINTS),
    (TaskType::Planning, PLANNING_HINTS),
    (TaskType::Critique, CRITIQUE_HINTS),
];

const DEEP_SIGNALS: &[&str] = &[
    "step-by-step",
    "deep",
    "thorough",
    "tradeoff",
    "architecture",
    "prove",
    "rigorous",
];
const MEDIUM_SIGNALS: &[&str] = &["explain", "analyze", "compare", "justify"];

const DEEP_LENGTH: usize = 900;
const MEDIUM_LENGTH: usize = 350;

fn includes_any(input: &str, terms: &[&str]) -> bool {
    terms.iter().any(|term| input.contains(term))
}

pub fn classify_task_type(user_text: &str) -> TaskType {
    let normalized = user_text.to_lowercase();
    TASK_HINTS
        .iter()
        .find(|(_, hints)| includes_any(&normalized, hints))
        .map(|(task, _)| *task)
        .unwrap_or(TaskType::Reasoning)
}

pub fn classify_depth(user_text: &str) -> Depth {
    let normalized = user_text.to_lowercase();
    let length = user_text.chars().count();

    if length > DEEP_LENGTH || includes_any(&normalized, DEEP_SIGNALS) {
        Depth::Deep
    } else if length > MEDIUM_LENGTH || includes_any(&normalized, MEDIUM_SIGNALS) {
        Depth::Medium
    } else {
        Depth::Shallow
    }
}

/// JSON when the text mentions JSON or a schema, sections for
/// sections/bullets, freeform otherwise.
pub fn infer_output_contract(user_text: &str) -> OutputContract {
    let normalized = user_text.to_lowercase();

    if normalized.contains("json") || normalized.contains("schema") {
        let mut schema = serde_json::Map::new();
        schema.insert("answer".into(), "string".into());
        schema.insert("actions".into(), "string[]".into());
        return OutputContract {
            kind: OutputContractType::Json,
            schema: Some(schema),
        };
    }

    if normalized.contains("sections") || normalized.contains("bullet") {
        return OutputContract {
            kind: OutputContractType::Sections,
            schema: None,
        };
    }

    OutputContract::freeform()
}

pub fn infer_intent(user_text: &str) -> String {
    truncate(user_text.trim(), MAX_INTENT_CHARS)
}

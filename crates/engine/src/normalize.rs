//! Output normalizer and disagreement detector.
//!
//! Pulls `Answer:`, `Claims:` and `Actions:` sections plus fenced code out of
//! free-form model text, then flags claims that share little vocabulary with
//! other claims. Purely lexical: it is an explainability aid, not an
//! entailment check.

use std::collections::HashSet;

use regex_lite::Regex;
use serde::{Deserialize, Serialize};

/// Answer length used when the text has no `Answer:` section.
const ANSWER_FALLBACK_CHARS: usize = 600;
/// Claims with a Jaccard similarity below this disagree.
const DISAGREEMENT_THRESHOLD: f64 = 0.35;
const MAX_DISAGREEMENTS: usize = 8;
const MAX_MISMATCHES_PER_CLAIM: usize = 3;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedOutput {
    pub answer: String,
    pub claims: Vec<String>,
    pub actions: Vec<String>,
    pub code_blocks: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Disagreement {
    pub claim: String,
    pub disagrees_with: Vec<String>,
}

/// Body of a `Heading:` section, up to the next capitalized heading line.
fn section(text: &str, heading: &str) -> String {
    let pattern = format!(
        r"(?i){}:\s*([\s\S]*?)(?:\n[A-Z][A-Za-z ]+:|$)",
        regex_lite::escape(heading)
    );
    let Ok(re) = Regex::new(&pattern) else {
        return String::new();
    };
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default()
}

/// One item per non-empty line, bullet and number markers stripped.
fn list_items(section: &str) -> Vec<String> {
    let Ok(marker) = Regex::new(r"^[-*\d.)\s]+") else {
        return Vec::new();
    };
    section
        .split('\n')
        .map(|line| marker.replace(line, "").trim().to_string())
        .filter(|line| !line.is_empty())
        .collect()
}

fn code_blocks(text: &str) -> Vec<String> {
    Regex::new(r"```[\s\S]*?```")
        .map(|re| re.find_iter(text).map(|m| m.as_str().to_string()).collect())
        .unwrap_or_default()
}

pub fn normalize_output(text: &str) -> NormalizedOutput {
    let mut answer = section(text, "Answer");
    if answer.is_empty() {
        answer = text.chars().take(ANSWER_FALLBACK_CHARS).collect();
    }

    NormalizedOutput {
        answer,
        claims: list_items(&section(text, "Claims")),
        actions: list_items(&section(text, "Actions")),
        code_blocks: code_blocks(text),
    }
}

fn word_set(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

/// Jaccard similarity of the two texts' word sets. Zero when both are empty.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = word_set(a);
    let b = word_set(b);
    let union = a.union(&b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(&b).count() as f64 / union as f64
}

/// Flag claims across all outputs that share little vocabulary with others.
///
/// At most eight claims are reported, each with up to three counterparts.
/// Repeated claim texts are reported once.
pub fn detect_disagreements(outputs: &[NormalizedOutput]) -> Vec<Disagreement> {
    let claims: Vec<&str> = outputs
        .iter()
        .flat_map(|o| o.claims.iter().map(String::as_str))
        .collect();

    let mut seen = HashSet::new();
    let mut disagreements = Vec::new();

    for &claim in &claims {
        if disagreements.len() == MAX_DISAGREEMENTS {
            break;
        }
        if seen.contains(claim) {
            continue;
        }
        let mismatches: Vec<String> = claims
            .iter()
            .filter(|&&other| other != claim && similarity(other, claim) < DISAGREEMENT_THRESHOLD)
            .take(MAX_MISMATCHES_PER_CLAIM)
            .map(|other| other.to_string())
            .collect();
        if mismatches.is_empty() {
            continue;
        }
        seen.insert(claim);
        disagreements.push(Disagreement {
            claim: claim.to_string(),
            disagrees_with: mismatches,
        });
    }

    disagreements
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_providers::synthesize_answer;

    #[test]
    fn recovers_offline_answer_sections() {
        let text = synthesize_answer("prompt text", "mock-analyst");
        let out = normalize_output(&text);

        assert_eq!(
            out.answer,
            "This is a deterministic mock response generated for mock-analyst."
        );
        assert_eq!(out.claims.len(), 3);
        assert!(out.claims[0].starts_with("Claim A (mock-analyst):"));
        assert_eq!(
            out.actions,
            vec![
                "Define CPIR and ContextPack contracts first.",
                "Execute compare/chain through the same DAG runner.",
                "Store per-step prompt, cost, latency, and parsed outputs.",
            ]
        );
        assert_eq!(out.code_blocks.len(), 1);
        assert!(out.code_blocks[0].starts_with("```rust"));
    }

    #[test]
    fn strips_bullets_and_numbers() {
        let text = "Answer: ok\nClaims:\n- first claim\n2) second claim\n* third\n\nActions:\n1. ship it";
        let out = normalize_output(text);
        assert_eq!(out.answer, "ok");
        assert_eq!(out.claims, vec!["first claim", "second claim", "third"]);
        assert_eq!(out.actions, vec!["ship it"]);
    }

    #[test]
    fn headings_are_case_insensitive() {
        let out = normalize_output("answer: lower case works");
        assert_eq!(out.answer, "lower case works");
    }

    #[test]
    fn missing_answer_falls_back_to_prefix() {
        let text = "z".repeat(700);
        let out = normalize_output(&text);
        assert_eq!(out.answer.chars().count(), 600);
        assert!(out.claims.is_empty());
        assert!(out.code_blocks.is_empty());
    }

    #[test]
    fn similarity_is_jaccard() {
        assert_eq!(similarity("a b c", "a b c"), 1.0);
        assert_eq!(similarity("", ""), 0.0);
        // {a, b} vs {b, c}: 1 / 3
        assert!((similarity("A, b", "b-c") - 1.0 / 3.0).abs() < 1e-9);
    }

    fn output(claims: &[&str]) -> NormalizedOutput {
        NormalizedOutput {
            claims: claims.iter().map(|c| c.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn dissimilar_claims_disagree() {
        let outputs = [
            output(&["rust is memory safe"]),
            output(&["rust is memory safe by default", "bananas are yellow fruit"]),
        ];
        let found = detect_disagreements(&outputs);

        for d in &found {
            assert!(d.disagrees_with.len() <= 3);
            for other in &d.disagrees_with {
                assert!(similarity(&d.claim, other) < 0.35);
            }
        }
        let banana = found
            .iter()
            .find(|d| d.claim == "bananas are yellow fruit")
            .unwrap();
        assert_eq!(banana.disagrees_with.len(), 2);
        // The two rust claims are similar enough to agree with each other.
        let rust = found.iter().find(|d| d.claim == "rust is memory safe").unwrap();
        assert_eq!(rust.disagrees_with, vec!["bananas are yellow fruit"]);
    }

    #[test]
    fn results_are_capped_and_deduplicated() {
        let claims: Vec<String> = (0..12).map(|i| format!("topic{i} word{i}")).collect();
        let refs: Vec<&str> = claims.iter().map(String::as_str).collect();
        let mut outputs = vec![output(&refs)];
        outputs.push(output(&["topic0 word0"]));

        let found = detect_disagreements(&outputs);
        assert_eq!(found.len(), 8);
        assert!(found.iter().all(|d| d.disagrees_with.len() == 3));
        let unique: HashSet<_> = found.iter().map(|d| d.claim.as_str()).collect();
        assert_eq!(unique.len(), found.len());
    }

    #[test]
    fn identical_claims_never_disagree() {
        let outputs = [output(&["same claim"]), output(&["same claim"])];
        assert!(detect_disagreements(&outputs).is_empty());
    }
}

//! Deterministic router scorer.
//!
//! Every catalog entry is scored against the CPIR's task type, depth and
//! output contract plus the caller's preferences. No randomness and no
//! wall-clock terms: identical inputs always produce the same ordering.

use switchyard_core::{
    Cpir, Depth, Error, ModelCatalog, ModelCatalogEntry, ModelChoice, Result, RouterCandidate,
    RouterDecision, RouterPreferences, TaskType,
};

use crate::token::estimate_tokens;

/// Fixed prompt overhead added to every token estimate.
const PROMPT_OVERHEAD_TOKENS: u64 = 200;
const MIN_PROJECTED_OUTPUT_TOKENS: f64 = 250.0;
const CAP_PENALTY: f64 = 4.0;

fn task_quality_bonus(task: TaskType) -> f64 {
    match task {
        TaskType::Coding => 1.2,
        TaskType::Reasoning => 1.0,
        TaskType::Creative => 0.8,
        TaskType::Research => 1.1,
        TaskType::Extraction => 0.7,
        TaskType::Planning => 0.9,
        TaskType::Critique => 1.0,
    }
}

fn depth_multiplier(depth: Depth) -> f64 {
    match depth {
        Depth::Shallow => 0.7,
        Depth::Medium => 1.0,
        Depth::Deep => 1.25,
    }
}

struct Weights {
    quality: f64,
    cost: f64,
    latency: f64,
    risk: f64,
    preference: f64,
}

impl Weights {
    fn from_preferences(prefs: &RouterPreferences) -> Self {
        let qf = prefs.quality_factor();
        Self {
            quality: 0.9 + qf,
            cost: 1.1 - qf * 0.8,
            latency: 0.9 - qf * 0.5,
            risk: 0.6,
            preference: 0.3 + qf * 0.4,
        }
    }
}

fn risk(entry: &ModelCatalogEntry, cpir: &Cpir) -> f64 {
    let mut risk = 0.0;
    if cpir.output_contract.is_json() && !entry.supports_json {
        risk += 2.0;
    }
    if cpir.depth == Depth::Deep && entry.quality_tier < 3 {
        risk += 1.2;
    }
    risk
}

fn preference_bonus(entry: &ModelCatalogEntry, prefs: &RouterPreferences) -> f64 {
    let qf = prefs.quality_factor();
    let quality_bias = f64::from(entry.quality_tier) * qf;
    let speed_cost_bias =
        ((f64::from(entry.speed_tier) + (6.0 - f64::from(entry.cost_tier))) / 2.0) * (1.0 - qf);
    quality_bias + speed_cost_bias
}

/// Penalty messages for every cap the projected run would exceed.
fn cap_penalties(
    entry: &ModelCatalogEntry,
    cpir: &Cpir,
    prefs: &RouterPreferences,
    token_estimate: u64,
) -> Vec<String> {
    let mut penalties = Vec::new();
    let tokens = token_estimate as f64;
    let projected_output = (tokens * 0.6).round().max(MIN_PROJECTED_OUTPUT_TOKENS);
    let projected_cost = (tokens / 1000.0) * entry.input_usd_per_1k
        + (projected_output / 1000.0) * entry.output_usd_per_1k;
    let projected_latency = u64::from(6 - entry.speed_tier.min(6)) * 600
        + if cpir.depth == Depth::Deep { 1200 } else { 400 };

    if let Some(cap) = cpir.constraints.cost_cap(prefs)
        && projected_cost > cap
    {
        penalties.push(format!("Projected cost {projected_cost:.4} exceeds cap."));
    }
    if let Some(cap) = cpir.constraints.latency_cap(prefs)
        && projected_latency > cap
    {
        penalties.push(format!("Projected latency {projected_latency}ms exceeds cap."));
    }
    penalties
}

/// Sum of per-field token estimates plus a fixed overhead.
pub fn estimate_token_need(cpir: &Cpir) -> u64 {
    let pack = &cpir.context_pack;
    estimate_tokens(cpir.user_text())
        + estimate_tokens(&pack.summary)
        + pack.facts.iter().map(|f| estimate_tokens(f)).sum::<u64>()
        + pack.decisions.iter().map(|d| estimate_tokens(d)).sum::<u64>()
        + pack
            .recent_turns
            .iter()
            .map(|t| estimate_tokens(&t.content))
            .sum::<u64>()
        + PROMPT_OVERHEAD_TOKENS
}

/// Score every catalog entry, in catalog order.
pub fn score_candidates(
    cpir: &Cpir,
    prefs: &RouterPreferences,
    catalog: &ModelCatalog,
) -> Vec<RouterCandidate> {
    let weights = Weights::from_preferences(prefs);
    let token_estimate = estimate_token_need(cpir);
    let depth = depth_multiplier(cpir.depth);
    let bonus = task_quality_bonus(cpir.task_type);

    catalog
        .entries()
        .iter()
        .map(|entry| {
            let quality = f64::from(entry.quality_tier) * bonus * depth;
            let cost = f64::from(entry.cost_tier);
            let latency = 6.0 - f64::from(entry.speed_tier);
            let risk = risk(entry, cpir);
            let preference = preference_bonus(entry, prefs);

            let score = weights.quality * quality
                - weights.cost * cost
                - weights.latency * latency
                - weights.risk * risk
                + weights.preference * preference;

            let mut reasons = vec![
                format!("quality={quality:.2}"),
                format!("costTier={}", entry.cost_tier),
                format!("speedTier={}", entry.speed_tier),
                format!("risk={risk:.2}"),
            ];
            let penalties = cap_penalties(entry, cpir, prefs, token_estimate);
            let penalty = penalties.len() as f64 * CAP_PENALTY;
            reasons.extend(penalties);

            RouterCandidate {
                provider: entry.provider,
                model_id: entry.model_id.clone(),
                score: score - penalty,
                reasons,
            }
        })
        .collect()
}

/// Score, sort (stable, descending) and pick the top candidate.
pub fn build_router_decision(
    cpir: &Cpir,
    prefs: &RouterPreferences,
    catalog: &ModelCatalog,
) -> Result<RouterDecision> {
    let mut candidates = score_candidates(cpir, prefs, catalog);
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

    let top = candidates
        .first()
        .ok_or_else(|| Error::validation("model catalog produced no router candidates"))?;
    let chosen = ModelChoice {
        provider: top.provider,
        model_id: top.model_id.clone(),
    };
    let reasoning = format!(
        "Selected {} for {}/{} with preference bias {}.",
        chosen.model_id, cpir.task_type, cpir.depth, prefs.quality_bias
    );

    let decision = RouterDecision {
        chosen,
        candidates,
        token_estimate: estimate_token_need(cpir),
        reasoning,
    };
    decision.validate()?;
    Ok(decision)
}

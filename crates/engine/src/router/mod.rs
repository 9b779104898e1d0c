//! Request routing: classify the user text into a CPIR, then score the
//! catalog to pick a model.

pub mod classifier;
pub mod scorer;

use switchyard_core::{
    Constraints, ContextPack, Cpir, CpirInputs, ModelCatalog, Result, RouterDecision,
    RouterPreferences,
};
use tracing::debug;

pub use classifier::{classify_depth, classify_task_type, infer_intent, infer_output_contract};
pub use scorer::{build_router_decision, estimate_token_need, score_candidates};

/// Assemble and validate a CPIR for one user turn.
pub fn build_cpir(
    user_text: &str,
    context_pack: ContextPack,
    constraints: Option<Constraints>,
) -> Result<Cpir> {
    let cpir = Cpir {
        intent: infer_intent(user_text),
        task_type: classify_task_type(user_text),
        depth: classify_depth(user_text),
        constraints: constraints.unwrap_or_default(),
        inputs: CpirInputs {
            user_text: user_text.to_string(),
        },
        context_pack,
        output_contract: infer_output_contract(user_text),
    };
    cpir.validate()?;

    debug!(
        task_type = %cpir.task_type,
        depth = %cpir.depth,
        json = cpir.output_contract.is_json(),
        "Built CPIR"
    );
    Ok(cpir)
}

/// Route a CPIR. Missing preferences mean a neutral quality bias of 50.
pub fn decide_route(
    cpir: &Cpir,
    preferences: Option<&RouterPreferences>,
    catalog: &ModelCatalog,
) -> Result<RouterDecision> {
    let defaults = RouterPreferences::default();
    let prefs = preferences.unwrap_or(&defaults);
    prefs.validate()?;

    let decision = build_router_decision(cpir, prefs, catalog)?;
    debug!(
        provider = %decision.chosen.provider,
        model = %decision.chosen.model_id,
        token_estimate = decision.token_estimate,
        "Route decided"
    );
    Ok(decision)
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_core::{Depth, Error, TaskType};

    fn pack() -> ContextPack {
        ContextPack {
            summary: "No prior context yet.".into(),
            ..Default::default()
        }
    }

    #[test]
    fn build_cpir_classifies_text() {
        let cpir = build_cpir("Debug this Python script step-by-step", pack(), None).unwrap();
        assert_eq!(cpir.task_type, TaskType::Coding);
        assert_eq!(cpir.depth, Depth::Deep);
        assert_eq!(cpir.constraints, Constraints::default());
        assert_eq!(cpir.user_text(), "Debug this Python script step-by-step");
    }

    #[test]
    fn build_cpir_rejects_empty_text() {
        assert!(matches!(
            build_cpir("", pack(), None),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn build_cpir_rejects_empty_summary() {
        assert!(build_cpir("hello", ContextPack::default(), None).is_err());
    }

    #[test]
    fn decide_route_validates_preferences() {
        let catalog = ModelCatalog::builtin();
        let cpir = build_cpir("hello there", pack(), None).unwrap();
        let bad = RouterPreferences {
            quality_bias: -1.0,
            ..Default::default()
        };
        assert!(decide_route(&cpir, Some(&bad), &catalog).is_err());

        let default_route = decide_route(&cpir, None, &catalog).unwrap();
        let explicit = decide_route(&cpir, Some(&RouterPreferences::default()), &catalog).unwrap();
        assert_eq!(default_route, explicit);
    }
}

//! Canonical prompt rendering shared by every adapter.
//!
//! All vendors receive the same text for the same CPIR, so step traces stay
//! comparable across models.

use switchyard_core::{Cpir, ModelCatalogEntry};

/// Render a CPIR into the prompt text sent to `model`.
pub fn render_canonical_prompt(cpir: &Cpir, model: &ModelCatalogEntry) -> String {
    let pack = &cpir.context_pack;
    let constraints = serde_json::to_string(&cpir.constraints).unwrap_or_default();
    let contract = serde_json::to_string(&cpir.output_contract).unwrap_or_default();

    let mut lines = vec![
        format!("You are {} acting as a specialist assistant.", model.model_id),
        format!("Intent: {}", cpir.intent),
        format!("TaskType: {}", cpir.task_type),
        format!("Depth: {}", cpir.depth),
        format!("Constraints: {constraints}"),
        format!("OutputContract: {contract}"),
        "ContextPack:".to_string(),
        format!("Summary: {}", pack.summary),
        format!("Facts: {}", pack.facts.join(" | ")),
        format!("Decisions: {}", pack.decisions.join(" | ")),
        format!("OpenQuestions: {}", pack.open_questions.join(" | ")),
        format!("ConstraintsList: {}", pack.constraints.join(" | ")),
        "RecentTurns:".to_string(),
    ];
    lines.extend(
        pack.recent_turns
            .iter()
            .map(|turn| format!("{}: {}", turn.role.as_str().to_uppercase(), turn.content)),
    );
    lines.push("UserRequest:".to_string());
    lines.push(cpir.inputs.user_text.clone());
    lines.push("Respond with clear reasoning and explicit assumptions.".to_string());
    lines.push(
        "If you make claims, keep them concise and list action items when relevant.".to_string(),
    );

    lines.join("\n")
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use switchyard_core::{
        Constraints, ContextPack, ContextTurn, CpirInputs, Depth, ModelCatalog, OutputContract,
        Role, TaskType,
    };

    pub(crate) fn sample_cpir(user_text: &str) -> Cpir {
        Cpir {
            intent: user_text.chars().take(120).collect(),
            task_type: TaskType::Planning,
            depth: Depth::Shallow,
            constraints: Constraints {
                tone: Some("direct".into()),
                ..Default::default()
            },
            inputs: CpirInputs {
                user_text: user_text.into(),
            },
            context_pack: ContextPack {
                summary: "No prior context yet.".into(),
                facts: vec!["stack: {\"lang\":\"rust\"}".into(), "db: {\"kind\":\"sqlite\"}".into()],
                recent_turns: vec![
                    ContextTurn {
                        role: Role::User,
                        content: "hi".into(),
                    },
                    ContextTurn {
                        role: Role::Assistant,
                        content: "hello".into(),
                    },
                ],
                ..Default::default()
            },
            output_contract: OutputContract::freeform(),
        }
    }

    #[test]
    fn renders_all_sections_in_order() {
        let catalog = ModelCatalog::builtin();
        let model = catalog.get("gpt-4.1").unwrap();
        let prompt = render_canonical_prompt(&sample_cpir("Plan the migration"), model);
        let lines: Vec<&str> = prompt.lines().collect();

        assert_eq!(lines[0], "You are gpt-4.1 acting as a specialist assistant.");
        assert_eq!(lines[2], "TaskType: planning");
        assert_eq!(lines[3], "Depth: shallow");
        assert_eq!(lines[4], r#"Constraints: {"tone":"direct"}"#);
        assert_eq!(lines[5], r#"OutputContract: {"type":"freeform"}"#);
        assert!(prompt.contains("Facts: stack: {\"lang\":\"rust\"} | db: {\"kind\":\"sqlite\"}"));
        assert!(prompt.contains("RecentTurns:\nUSER: hi\nASSISTANT: hello\nUserRequest:\nPlan the migration"));
        assert!(prompt.ends_with("list action items when relevant."));
    }

    #[test]
    fn rendering_is_pure() {
        let catalog = ModelCatalog::builtin();
        let model = catalog.default_auto_model();
        let cpir = sample_cpir("Same input");
        assert_eq!(
            render_canonical_prompt(&cpir, model),
            render_canonical_prompt(&cpir, model)
        );
    }
}

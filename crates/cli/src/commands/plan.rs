//! `switchyard plan` — print the step graph a mode would execute.

use switchyard_core::{ContextPack, Run, RunMode};
use switchyard_engine::{ModelRef, Planner, StepPlanNode, build_cpir};

use super::print_json;
use crate::RoutingArgs;
use crate::app::App;

fn model_label(node: &StepPlanNode) -> String {
    match &node.model {
        ModelRef::Fixed { provider, model_id } => format!("{provider}/{model_id}"),
        ModelRef::FromNode { node_id } => format!("<chosen by {node_id}>"),
    }
}

pub fn run(
    app: &App,
    message: &str,
    mode: RunMode,
    routing: &RoutingArgs,
    json: bool,
) -> anyhow::Result<()> {
    let cpir = build_cpir(message, ContextPack::default(), Some(routing.constraints()))?;
    let selected = app
        .catalog
        .resolve_selected(routing.models.as_slice())
        .into_iter()
        .map(|entry| entry.model_id.clone())
        .collect();
    // Not persisted; only the planner sees it.
    let run = Run::new("preview", mode, None, selected, routing.preferences(), cpir);

    let planner = Planner::new(app.catalog.clone());
    let plan = planner.plan_steps(&planner.build_run(&run)?)?;

    if json {
        return print_json(&plan);
    }

    println!("{mode} plan ({} steps):", plan.len());
    for node in &plan {
        let deps = if node.depends_on.is_empty() {
            "-".to_string()
        } else {
            node.depends_on.join(", ")
        };
        println!(
            "  {:<16} {:<9} {:<40} <- {deps}",
            node.id,
            node.step_type.as_str(),
            model_label(node)
        );
    }
    Ok(())
}

//! `switchyard route` — show the router's scoring for a message.

use switchyard_core::ContextPack;
use switchyard_engine::{build_cpir, decide_route};

use super::print_json;
use crate::RoutingArgs;
use crate::app::App;

pub fn run(app: &App, message: &str, routing: &RoutingArgs, json: bool) -> anyhow::Result<()> {
    let cpir = build_cpir(message, ContextPack::default(), Some(routing.constraints()))?;
    let decision = decide_route(&cpir, Some(&routing.preferences()), &app.catalog)?;

    if json {
        return print_json(&decision);
    }

    println!(
        "Task: {} / {}  (~{} tokens)\n",
        cpir.task_type, cpir.depth, decision.token_estimate
    );
    for (i, candidate) in decision.candidates.iter().enumerate() {
        let marker = if i == 0 { "*" } else { " " };
        println!(
            "{marker} {:>6.2}  {}/{}",
            candidate.score, candidate.provider, candidate.model_id
        );
        println!("          {}", candidate.reasons.join("; "));
    }
    println!("\n{}", decision.reasoning);
    Ok(())
}

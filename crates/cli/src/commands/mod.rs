pub mod init;
pub mod inspect;
pub mod memory;
pub mod models;
pub mod plan;
pub mod route;
pub mod run;

use switchyard_core::{RunDetails, Step};

pub(crate) fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn step_line(step: &Step) -> String {
    let origin = step.origin.map(|o| o.to_string()).unwrap_or_else(|| "-".into());
    format!(
        "  {:<16} {:<9} {:<38} {:<7} in={:<6} out={:<6} ${:<10.6} {:>6}ms  {}",
        step.node_id,
        step.step_type.as_str(),
        format!("{}/{}", step.provider, step.model_id),
        step.status.as_str(),
        step.input_tokens,
        step.output_tokens,
        step.cost_usd,
        step.latency_ms,
        origin,
    )
}

/// Human-readable run trace: router choice, one line per step, totals and
/// the final answer.
pub(crate) fn print_details(details: &RunDetails) {
    let run = &details.run;
    println!("Run {} [{}] {}", run.id, run.mode, run.status);
    println!("  Task: {} / {}", run.cpir.task_type, run.cpir.depth);
    if let Some(decision) = &run.router_decision {
        println!("  Router: {}", decision.reasoning);
    }

    println!("\nSteps:");
    for step in &details.steps {
        println!("{}", step_line(step));
        if let Some(err) = &step.error_message {
            println!("    error: {err}");
        }
    }

    let t = &run.totals;
    println!(
        "\nTotals: in={} out={} cost=${:.6} latency={}ms",
        t.input_tokens, t.output_tokens, t.cost_usd, t.latency_ms
    );

    let disagreements = details
        .steps
        .iter()
        .find_map(|s| s.output_parsed_json.as_ref()?.get("disagreements")?.as_array());
    if let Some(found) = disagreements
        && !found.is_empty()
    {
        println!("Disagreements flagged: {}", found.len());
    }

    for artifact in &details.artifacts {
        println!("\n{}:\n{}", artifact.title, artifact.content);
    }
}

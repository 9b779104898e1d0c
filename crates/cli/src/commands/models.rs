//! `switchyard models` — list the model catalog.

use super::print_json;
use crate::app::App;

pub fn run(app: &App, json: bool) -> anyhow::Result<()> {
    let catalog = &app.catalog;
    if json {
        return print_json(&catalog.entries());
    }

    let auto = &catalog.default_auto_model().model_id;
    let compare: Vec<&str> = catalog
        .default_compare_models()
        .into_iter()
        .map(|e| e.model_id.as_str())
        .collect();

    println!("Model catalog ({} models)", catalog.entries().len());
    println!(
        "  {:<10} {:<28} {:>3} {:>3} {:>3}  {:>9} {:>9}  defaults",
        "provider", "model", "Q", "C", "S", "in/1k", "out/1k"
    );
    for entry in catalog.entries() {
        let mut tags = Vec::new();
        if &entry.model_id == auto {
            tags.push("auto");
        }
        if compare.contains(&entry.model_id.as_str()) {
            tags.push("compare");
        }
        println!(
            "  {:<10} {:<28} {:>3} {:>3} {:>3}  {:>9.5} {:>9.5}  {}",
            entry.provider.to_string(),
            entry.model_id,
            entry.quality_tier,
            entry.cost_tier,
            entry.speed_tier,
            entry.input_usd_per_1k,
            entry.output_usd_per_1k,
            tags.join(",")
        );
    }
    Ok(())
}

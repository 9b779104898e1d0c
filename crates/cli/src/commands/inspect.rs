//! `switchyard inspect` — show a stored run.

use anyhow::anyhow;

use super::{print_details, print_json};
use crate::app::App;

pub async fn run(app: &App, run_id: &str, json: bool) -> anyhow::Result<()> {
    let details = app
        .store
        .run_details(run_id)
        .await?
        .ok_or_else(|| anyhow!("Run {run_id} not found"))?;

    if json {
        return print_json(&details);
    }
    print_details(&details);
    Ok(())
}

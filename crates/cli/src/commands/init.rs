//! `switchyard init` — write a default config file.

use std::path::Path;

use anyhow::Context;
use switchyard_config::AppConfig;

pub fn run(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        println!("Config already exists at: {}", path.display());
        println!("Edit it manually or re-run with --force to overwrite.");
        return Ok(());
    }

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(path, AppConfig::default_toml())
        .with_context(|| format!("Failed to write {}", path.display()))?;

    println!("Created config at: {}", path.display());
    println!("\nNext steps:");
    println!("  1. Add provider API keys and set demo_mode = false for live calls");
    println!("  2. Run: switchyard run \"your question\" --mode compare");
    Ok(())
}

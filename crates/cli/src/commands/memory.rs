//! `switchyard memory` — memory management commands.

use anyhow::{Context, bail};
use switchyard_core::{MemoryItem, MemoryItemType, MemoryPatch};
use switchyard_engine::NewMemory;

use super::print_json;
use crate::app::App;

fn print_item(item: &MemoryItem) {
    let state = if item.enabled { "on " } else { "off" };
    println!(
        "  {} [{}] {:<12} {} conf={:.2} {}",
        item.id,
        state,
        item.item_type.as_str(),
        item.key,
        item.confidence,
        serde_json::Value::Object(item.value.clone())
    );
}

pub async fn add(
    app: &App,
    session_id: &str,
    key: String,
    value: &str,
    item_type: MemoryItemType,
    confidence: Option<f64>,
    json: bool,
) -> anyhow::Result<()> {
    let value: serde_json::Value =
        serde_json::from_str(value).context("Memory value must be valid JSON")?;
    let item = app
        .sessions
        .create_memory(
            session_id,
            NewMemory {
                item_type,
                key,
                value,
                confidence,
                enabled: None,
            },
        )
        .await?;

    if json {
        return print_json(&item);
    }
    println!("Added memory item:");
    print_item(&item);
    Ok(())
}

pub async fn list(app: &App, session_id: &str, json: bool) -> anyhow::Result<()> {
    let items = app.sessions.list_memory(session_id).await?;
    if json {
        return print_json(&items);
    }

    if items.is_empty() {
        println!("No memory items for session {session_id}.");
        return Ok(());
    }
    println!("Memory for session {session_id} ({} items):", items.len());
    for item in &items {
        print_item(item);
    }
    Ok(())
}

pub async fn disable(app: &App, id: &str, json: bool) -> anyhow::Result<()> {
    let patch = MemoryPatch {
        enabled: Some(false),
        ..Default::default()
    };
    let item = app.sessions.patch_memory(id, &patch).await?;
    if json {
        return print_json(&item);
    }
    println!("Disabled memory item:");
    print_item(&item);
    Ok(())
}

pub async fn delete(app: &App, id: &str) -> anyhow::Result<()> {
    if !app.sessions.delete_memory(id).await? {
        bail!("Memory item {id} not found");
    }
    println!("Deleted memory item {id}.");
    Ok(())
}

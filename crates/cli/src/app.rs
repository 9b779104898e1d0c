//! Wiring from config to a ready engine.

use std::sync::Arc;

use anyhow::Context;
use switchyard_config::AppConfig;
use switchyard_core::{ModelCatalog, RunStore};
use switchyard_engine::{RunExecutor, SessionService};
use switchyard_providers::build_from_config;
use switchyard_store::{InMemoryStore, SqliteStore};
use tracing::debug;

pub struct App {
    pub catalog: Arc<ModelCatalog>,
    pub store: Arc<dyn RunStore>,
    pub sessions: SessionService,
    pub executor: RunExecutor,
}

impl App {
    pub async fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        let catalog = Arc::new(config.build_catalog()?);
        let store = open_store(&config).await?;
        let registry = Arc::new(build_from_config(&config, catalog.clone()));
        debug!(
            store = store.name(),
            providers = registry.list().len(),
            demo_mode = config.demo_mode,
            "Engine ready"
        );

        Ok(Self {
            sessions: SessionService::new(store.clone(), catalog.clone()),
            executor: RunExecutor::new(store.clone(), registry, catalog.clone()),
            catalog,
            store,
        })
    }
}

async fn open_store(config: &AppConfig) -> anyhow::Result<Arc<dyn RunStore>> {
    if config.store.backend == "memory" {
        return Ok(Arc::new(InMemoryStore::new()));
    }

    let path = config.store_path();
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create store directory {}", parent.display()))?;
    }
    let url = format!("sqlite://{}", path.display());
    let store = SqliteStore::new(&url)
        .await
        .with_context(|| format!("Failed to open run store at {}", path.display()))?;
    Ok(Arc::new(store))
}

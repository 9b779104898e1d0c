//! End-to-end run execution against the in-memory store and offline models.

use std::sync::Arc;

use async_trait::async_trait;
use switchyard_config::AppConfig;
use switchyard_core::{
    CallOrigin, Cpir, Error, ModelCallOptions, ModelCallResult, ModelCatalog, ModelCatalogEntry,
    ModelProvider, ProviderError, ProviderKey, Run, RunMode, RunStatus, RunStore, StepStatus,
    StepType,
};
use switchyard_engine::{PostMessage, RunExecutor, SessionService};
use switchyard_providers::{ProviderRegistry, build_from_config, render_canonical_prompt};
use switchyard_store::InMemoryStore;

struct Harness {
    store: Arc<InMemoryStore>,
    sessions: SessionService,
    executor: RunExecutor,
}

fn harness_with(registry: ProviderRegistry, catalog: Arc<ModelCatalog>) -> Harness {
    let store = Arc::new(InMemoryStore::new());
    Harness {
        sessions: SessionService::new(store.clone(), catalog.clone()),
        executor: RunExecutor::new(store.clone(), Arc::new(registry), catalog),
        store,
    }
}

fn harness() -> Harness {
    let catalog = Arc::new(ModelCatalog::builtin());
    let registry = build_from_config(&AppConfig::default(), catalog.clone());
    harness_with(registry, catalog)
}

impl Harness {
    async fn post(&self, mode: RunMode, content: &str) -> Run {
        let session = self.sessions.create_session("flow").await.unwrap();
        self.sessions
            .create_message_and_run(
                &session.id,
                PostMessage {
                    content: content.into(),
                    mode,
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .run
    }
}

/// Always refuses, standing in for a vendor outage without a fallback.
struct RefusingProvider;

#[async_trait]
impl ModelProvider for RefusingProvider {
    fn key(&self) -> ProviderKey {
        ProviderKey::Anthropic
    }

    fn render_prompt(&self, cpir: &Cpir, model: &ModelCatalogEntry) -> String {
        render_canonical_prompt(cpir, model)
    }

    async fn call_model(
        &self,
        _prompt: &str,
        _options: &ModelCallOptions,
    ) -> Result<ModelCallResult, ProviderError> {
        Err(ProviderError::ApiError {
            status_code: 503,
            message: "upstream unavailable".into(),
        })
    }

    fn is_enabled(&self) -> bool {
        true
    }
}

#[tokio::test]
async fn compare_run_completes_with_all_records() {
    let h = harness();
    let run = h
        .post(RunMode::Compare, "Compare approaches to caching in a web service")
        .await;

    let details = h.executor.execute_run(&run.id).await.unwrap();

    assert_eq!(details.run.status, RunStatus::Done);
    assert_eq!(details.steps.len(), 6);
    assert!(details.steps.iter().all(|s| s.status == StepStatus::Done));
    assert_eq!(details.artifacts.len(), 1);
    assert!(details.artifacts[0].content.starts_with("Merged final answer"));

    let decision = details.run.router_decision.as_ref().unwrap();
    assert!(!decision.candidates.is_empty());

    let model_steps: Vec<_> = details
        .steps
        .iter()
        .filter(|s| s.step_type == StepType::ModelCall)
        .collect();
    assert_eq!(model_steps.len(), 3);
    // Demo mode answers every vendor offline.
    assert!(model_steps.iter().all(|s| s.origin == Some(CallOrigin::Offline)));
    assert!(model_steps.iter().all(|s| !s.rendered_prompt.is_empty()));

    let judge = details
        .steps
        .iter()
        .find(|s| s.step_type == StepType::Judge)
        .unwrap();
    let parsed = judge.output_parsed_json.as_ref().unwrap();
    assert_eq!(parsed["normalized"].as_array().unwrap().len(), 3);

    let totals = details.run.totals;
    assert_eq!(
        totals.input_tokens,
        details.steps.iter().map(|s| s.input_tokens).sum::<u64>()
    );

    let messages = h.sessions.messages(&run.session_id).await.unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].content, details.artifacts[0].content);

    let memory = h.sessions.list_memory(&run.session_id).await.unwrap();
    assert_eq!(memory.len(), 1);
    assert_eq!(memory[0].key, format!("run-{}-summary", run.id));
    assert_eq!(memory[0].source_run_id.as_deref(), Some(run.id.as_str()));
}

#[tokio::test]
async fn executing_a_done_run_is_idempotent() {
    let h = harness();
    let run = h.post(RunMode::Compare, "What is a monad?").await;

    let first = h.executor.execute_run(&run.id).await.unwrap();
    let second = h.executor.execute_run(&run.id).await.unwrap();

    assert_eq!(first.steps.len(), second.steps.len());
    assert_eq!(second.artifacts.len(), 1);
    assert_eq!(h.store.list_messages(&run.session_id).await.unwrap().len(), 2);
    assert_eq!(h.store.list_memory(&run.session_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn auto_run_uses_the_routed_model() {
    let h = harness();
    let run = h.post(RunMode::Auto, "Explain ownership in Rust briefly").await;

    let details = h.executor.execute_run(&run.id).await.unwrap();
    assert_eq!(details.run.status, RunStatus::Done);
    assert_eq!(details.steps.len(), 3);

    let chosen = &details.run.router_decision.as_ref().unwrap().chosen;
    let auto = details
        .steps
        .iter()
        .find(|s| s.node_id == "auto_model")
        .unwrap();
    assert_eq!(auto.model_id, chosen.model_id);
    assert_eq!(auto.provider, chosen.provider);
    // A single-input merge passes the model output through.
    assert_eq!(details.artifacts[0].content, auto.output_raw);
}

#[tokio::test]
async fn chain_run_feeds_each_stage_forward() {
    let h = harness();
    let run = h.post(RunMode::Chain, "Design a rate limiter").await;

    let details = h.executor.execute_run(&run.id).await.unwrap();
    assert_eq!(details.run.status, RunStatus::Done);

    let order: Vec<&str> = details.steps.iter().map(|s| s.node_id.as_str()).collect();
    assert_eq!(
        order,
        ["router", "draft", "refine", "critique", "compress", "merge"]
    );

    let draft = &details.steps[1];
    let refine = &details.steps[2];
    assert!(refine.rendered_prompt.contains("Draft to refine:"));
    assert!(refine.rendered_prompt.contains(&draft.output_raw));
    assert!(details.steps[3].rendered_prompt.contains("Output to critique:"));
    assert!(details.steps[4].rendered_prompt.contains("Critique findings:"));

    let mut models: Vec<&str> = details.steps[1..5].iter().map(|s| s.model_id.as_str()).collect();
    models.sort_unstable();
    models.dedup();
    assert_eq!(models.len(), 4);
}

#[tokio::test]
async fn failing_model_marks_run_and_step_as_error() {
    let catalog = Arc::new(ModelCatalog::builtin());
    let mut registry = ProviderRegistry::new(catalog.clone());
    registry.register(Arc::new(RefusingProvider));
    let h = harness_with(registry, catalog);

    let run = h.post(RunMode::Compare, "Summarize the tradeoffs").await;
    let err = h.executor.execute_run(&run.id).await.unwrap_err();
    assert!(matches!(err, Error::Provider(_)));

    let stored = h.store.get_run(&run.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RunStatus::Error);

    let steps = h.store.steps_for_run(&run.id).await.unwrap();
    assert_eq!(steps[0].step_type, StepType::Router);
    assert_eq!(steps[0].status, StepStatus::Done);
    assert!(steps.iter().all(|s| s.status != StepStatus::Running));

    let failed = steps
        .iter()
        .find(|s| s.model_id == "claude-sonnet-4-20250514")
        .unwrap();
    assert_eq!(failed.status, StepStatus::Error);
    assert!(failed.error_message.as_deref().unwrap().contains("upstream unavailable"));

    assert!(h.store.artifacts_for_run(&run.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn missing_run_and_missing_message_are_rejected() {
    let h = harness();
    assert!(matches!(
        h.executor.execute_run("no-such-run").await,
        Err(Error::NotFound { .. })
    ));

    let posted = h.post(RunMode::Auto, "hello").await;
    let orphan = Run::new(
        posted.session_id.clone(),
        RunMode::Auto,
        None,
        vec![],
        Default::default(),
        posted.cpir.clone(),
    );
    let orphan = h.store.create_run(orphan).await.unwrap();
    assert!(matches!(
        h.executor.execute_run(&orphan.id).await,
        Err(Error::Precondition(_))
    ));

    let dangling = Run::new(
        posted.session_id.clone(),
        RunMode::Auto,
        Some("gone".into()),
        vec![],
        Default::default(),
        posted.cpir,
    );
    let dangling = h.store.create_run(dangling).await.unwrap();
    assert!(matches!(
        h.executor.execute_run(&dangling.id).await,
        Err(Error::Precondition(_))
    ));
}

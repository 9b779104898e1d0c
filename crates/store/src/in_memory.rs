//! In-memory run store — useful for testing and ephemeral sessions.

use async_trait::async_trait;
use std::sync::Arc;
use switchyard_core::error::StoreError;
use switchyard_core::{
    Artifact, MemoryItem, MemoryPatch, Message, Run, RunCompletion, RunPatch, RunStatus, RunStore,
    Session, Step, StepPatch, StoreResult,
};
use tokio::sync::RwLock;

#[derive(Default)]
struct State {
    sessions: Vec<Session>,
    messages: Vec<Message>,
    memory: Vec<MemoryItem>,
    runs: Vec<Run>,
    steps: Vec<Step>,
    artifacts: Vec<Artifact>,
}

impl State {
    fn run_mut(&mut self, id: &str) -> StoreResult<&mut Run> {
        self.runs
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| not_found("Run", id))
    }
}

fn not_found(entity: &'static str, id: &str) -> StoreError {
    StoreError::NotFound {
        entity,
        id: id.to_string(),
    }
}

/// Sorts most recently updated first. Later insertions win ties.
fn newest_first(mut items: Vec<MemoryItem>) -> Vec<MemoryItem> {
    items.reverse();
    items.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    items
}

/// A run store that keeps every record in vectors behind one lock.
/// Insertion order doubles as creation order.
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(State::default())),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RunStore for InMemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn create_session(&self, session: Session) -> StoreResult<Session> {
        self.state.write().await.sessions.push(session.clone());
        Ok(session)
    }

    async fn get_session(&self, id: &str) -> StoreResult<Option<Session>> {
        let state = self.state.read().await;
        Ok(state.sessions.iter().find(|s| s.id == id).cloned())
    }

    async fn create_message(&self, message: Message) -> StoreResult<Message> {
        self.state.write().await.messages.push(message.clone());
        Ok(message)
    }

    async fn get_message(&self, id: &str) -> StoreResult<Option<Message>> {
        let state = self.state.read().await;
        Ok(state.messages.iter().find(|m| m.id == id).cloned())
    }

    async fn recent_messages(&self, session_id: &str, limit: usize) -> StoreResult<Vec<Message>> {
        let state = self.state.read().await;
        Ok(state
            .messages
            .iter()
            .rev()
            .filter(|m| m.session_id == session_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn list_messages(&self, session_id: &str) -> StoreResult<Vec<Message>> {
        let state = self.state.read().await;
        Ok(state
            .messages
            .iter()
            .filter(|m| m.session_id == session_id)
            .cloned()
            .collect())
    }

    async fn create_memory(&self, item: MemoryItem) -> StoreResult<MemoryItem> {
        self.state.write().await.memory.push(item.clone());
        Ok(item)
    }

    async fn get_memory(&self, id: &str) -> StoreResult<Option<MemoryItem>> {
        let state = self.state.read().await;
        Ok(state.memory.iter().find(|m| m.id == id).cloned())
    }

    async fn list_memory(&self, session_id: &str) -> StoreResult<Vec<MemoryItem>> {
        let state = self.state.read().await;
        Ok(newest_first(
            state
                .memory
                .iter()
                .filter(|m| m.session_id == session_id)
                .cloned()
                .collect(),
        ))
    }

    async fn enabled_memory(&self, session_id: &str) -> StoreResult<Vec<MemoryItem>> {
        let state = self.state.read().await;
        Ok(newest_first(
            state
                .memory
                .iter()
                .filter(|m| m.session_id == session_id && m.enabled)
                .cloned()
                .collect(),
        ))
    }

    async fn update_memory(&self, id: &str, patch: &MemoryPatch) -> StoreResult<MemoryItem> {
        let mut state = self.state.write().await;
        let item = state
            .memory
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| not_found("MemoryItem", id))?;
        patch.apply(item);
        Ok(item.clone())
    }

    async fn delete_memory(&self, id: &str) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        let len_before = state.memory.len();
        state.memory.retain(|m| m.id != id);
        Ok(state.memory.len() < len_before)
    }

    async fn create_run(&self, run: Run) -> StoreResult<Run> {
        self.state.write().await.runs.push(run.clone());
        Ok(run)
    }

    async fn get_run(&self, id: &str) -> StoreResult<Option<Run>> {
        let state = self.state.read().await;
        Ok(state.runs.iter().find(|r| r.id == id).cloned())
    }

    async fn update_run(&self, id: &str, patch: &RunPatch) -> StoreResult<Run> {
        let mut state = self.state.write().await;
        let run = state.run_mut(id)?;
        patch.apply(run);
        Ok(run.clone())
    }

    async fn create_step(&self, step: Step) -> StoreResult<Step> {
        self.state.write().await.steps.push(step.clone());
        Ok(step)
    }

    async fn update_step(&self, id: &str, patch: &StepPatch) -> StoreResult<Step> {
        let mut state = self.state.write().await;
        let step = state
            .steps
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| not_found("Step", id))?;
        patch.apply(step);
        Ok(step.clone())
    }

    async fn steps_for_run(&self, run_id: &str) -> StoreResult<Vec<Step>> {
        let state = self.state.read().await;
        Ok(state
            .steps
            .iter()
            .filter(|s| s.run_id == run_id)
            .cloned()
            .collect())
    }

    async fn create_artifact(&self, artifact: Artifact) -> StoreResult<Artifact> {
        self.state.write().await.artifacts.push(artifact.clone());
        Ok(artifact)
    }

    async fn artifacts_for_run(&self, run_id: &str) -> StoreResult<Vec<Artifact>> {
        let state = self.state.read().await;
        Ok(state
            .artifacts
            .iter()
            .filter(|a| a.run_id == run_id)
            .cloned()
            .collect())
    }

    async fn complete_run(&self, completion: RunCompletion) -> StoreResult<Run> {
        // One write guard covers all four writes.
        let mut state = self.state.write().await;
        state.run_mut(&completion.run_id)?;

        state.artifacts.push(completion.artifact);
        state.messages.push(completion.message);
        state.memory.push(completion.memory);

        let run = state.run_mut(&completion.run_id)?;
        RunPatch {
            status: Some(RunStatus::Done),
            totals: Some(completion.totals),
            ..Default::default()
        }
        .apply(run);
        Ok(run.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use switchyard_core::{
        ContextPack, Cpir, CpirInputs, Constraints, Depth, MemoryItemType, OutputContract,
        ProviderKey, RouterPreferences, RunMode, RunTotals, StepStatus, StepType, TaskType,
    };

    fn cpir() -> Cpir {
        Cpir {
            intent: "hello".into(),
            task_type: TaskType::Reasoning,
            depth: Depth::Shallow,
            constraints: Constraints::default(),
            inputs: CpirInputs {
                user_text: "hello".into(),
            },
            context_pack: ContextPack {
                summary: "No prior context yet.".into(),
                ..Default::default()
            },
            output_contract: OutputContract::freeform(),
        }
    }

    fn value(key: &str) -> switchyard_core::MemoryValue {
        json!({ "v": key }).as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn recent_messages_newest_first() {
        let store = InMemoryStore::new();
        for i in 0..5 {
            store
                .create_message(Message::user("s1", format!("m{i}")))
                .await
                .unwrap();
        }
        store.create_message(Message::user("s2", "other")).await.unwrap();

        let recent = store.recent_messages("s1", 3).await.unwrap();
        let contents: Vec<_> = recent.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m4", "m3", "m2"]);

        let all = store.list_messages("s1").await.unwrap();
        assert_eq!(all.first().unwrap().content, "m0");
        assert_eq!(all.len(), 5);
    }

    #[tokio::test]
    async fn memory_crud_and_enabled_filter() {
        let store = InMemoryStore::new();
        let a = store
            .create_memory(MemoryItem::new("s1", MemoryItemType::Fact, "a", value("a")))
            .await
            .unwrap();
        let b = store
            .create_memory(MemoryItem::new("s1", MemoryItemType::Decision, "b", value("b")))
            .await
            .unwrap();

        let patch = MemoryPatch {
            enabled: Some(false),
            ..Default::default()
        };
        store.update_memory(&a.id, &patch).await.unwrap();

        let enabled = store.enabled_memory("s1").await.unwrap();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].id, b.id);

        // The patched item was touched last.
        let all = store.list_memory("s1").await.unwrap();
        assert_eq!(all[0].id, a.id);

        assert!(store.delete_memory(&a.id).await.unwrap());
        assert!(!store.delete_memory(&a.id).await.unwrap());
        assert!(matches!(
            store.update_memory("missing", &patch).await,
            Err(StoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn complete_run_writes_everything() {
        let store = InMemoryStore::new();
        let run = Run::new("s1", RunMode::Auto, None, vec![], RouterPreferences::default(), cpir());
        let run = store.create_run(run).await.unwrap();

        let step = Step::pending(&run.id, "router", StepType::Router, ProviderKey::Mock, "router-heuristic");
        let step = store.create_step(step).await.unwrap();
        store
            .update_step(&step.id, &StepPatch {
                status: Some(StepStatus::Done),
                ..Default::default()
            })
            .await
            .unwrap();

        let totals = RunTotals {
            input_tokens: 10,
            output_tokens: 5,
            cost_usd: 0.001,
            latency_ms: 40,
        };
        let done = store
            .complete_run(RunCompletion {
                run_id: run.id.clone(),
                artifact: Artifact::final_answer("s1", &run.id, "answer"),
                message: Message::assistant("s1", "answer"),
                memory: MemoryItem::new("s1", MemoryItemType::Fact, "k", value("x")),
                totals,
            })
            .await
            .unwrap();

        assert_eq!(done.status, RunStatus::Done);
        assert_eq!(done.totals, totals);

        let details = store.run_details(&run.id).await.unwrap().unwrap();
        assert_eq!(details.steps.len(), 1);
        assert_eq!(details.steps[0].status, StepStatus::Done);
        assert_eq!(details.artifacts.len(), 1);
        assert_eq!(store.list_messages("s1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn complete_missing_run_writes_nothing() {
        let store = InMemoryStore::new();
        let result = store
            .complete_run(RunCompletion {
                run_id: "nope".into(),
                artifact: Artifact::final_answer("s1", "nope", "x"),
                message: Message::assistant("s1", "x"),
                memory: MemoryItem::new("s1", MemoryItemType::Fact, "k", value("x")),
                totals: RunTotals::default(),
            })
            .await;
        assert!(result.is_err());
        assert!(store.list_messages("s1").await.unwrap().is_empty());
        assert!(store.list_memory("s1").await.unwrap().is_empty());
    }
}

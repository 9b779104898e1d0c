//! RunStore trait — durable storage for sessions, messages, memory, runs,
//! steps and artifacts.
//!
//! Implementations must give read-your-writes to a single writer: a step or
//! run update is visible to the next read issued by the same execution loop.
//!
//! Implementations: SQLite, in-memory (for testing and ephemeral use).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::memory::{MemoryItem, MemoryPatch};
use crate::message::{Message, Session};
use crate::run::{Artifact, Run, RunPatch, RunTotals, Step, StepPatch};

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// The writes that finish a successful run, applied as one unit.
#[derive(Debug, Clone)]
pub struct RunCompletion {
    pub run_id: String,
    pub artifact: Artifact,
    pub message: Message,
    pub memory: MemoryItem,
    pub totals: RunTotals,
}

/// A run together with its steps (creation order) and artifacts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunDetails {
    pub run: Run,
    pub steps: Vec<Step>,
    pub artifacts: Vec<Artifact>,
}

#[async_trait]
pub trait RunStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "memory").
    fn name(&self) -> &str;

    // --- Sessions & messages ---

    async fn create_session(&self, session: Session) -> StoreResult<Session>;

    async fn get_session(&self, id: &str) -> StoreResult<Option<Session>>;

    async fn create_message(&self, message: Message) -> StoreResult<Message>;

    async fn get_message(&self, id: &str) -> StoreResult<Option<Message>>;

    /// The newest `limit` messages of a session, newest first.
    async fn recent_messages(&self, session_id: &str, limit: usize) -> StoreResult<Vec<Message>>;

    /// Every message of a session, oldest first.
    async fn list_messages(&self, session_id: &str) -> StoreResult<Vec<Message>>;

    // --- Memory ---

    async fn create_memory(&self, item: MemoryItem) -> StoreResult<MemoryItem>;

    async fn get_memory(&self, id: &str) -> StoreResult<Option<MemoryItem>>;

    /// Every memory item of a session, most recently updated first.
    async fn list_memory(&self, session_id: &str) -> StoreResult<Vec<MemoryItem>>;

    /// Enabled memory items of a session, most recently updated first.
    async fn enabled_memory(&self, session_id: &str) -> StoreResult<Vec<MemoryItem>>;

    async fn update_memory(&self, id: &str, patch: &MemoryPatch) -> StoreResult<MemoryItem>;

    /// Returns `false` when no such item existed.
    async fn delete_memory(&self, id: &str) -> StoreResult<bool>;

    // --- Runs & steps ---

    async fn create_run(&self, run: Run) -> StoreResult<Run>;

    async fn get_run(&self, id: &str) -> StoreResult<Option<Run>>;

    async fn update_run(&self, id: &str, patch: &RunPatch) -> StoreResult<Run>;

    async fn create_step(&self, step: Step) -> StoreResult<Step>;

    async fn update_step(&self, id: &str, patch: &StepPatch) -> StoreResult<Step>;

    /// Steps of a run in creation order.
    async fn steps_for_run(&self, run_id: &str) -> StoreResult<Vec<Step>>;

    // --- Artifacts ---

    async fn create_artifact(&self, artifact: Artifact) -> StoreResult<Artifact>;

    async fn artifacts_for_run(&self, run_id: &str) -> StoreResult<Vec<Artifact>>;

    /// Persist the final artifact, assistant message and summary memory item,
    /// and mark the run `DONE` with its totals. All four writes land together.
    async fn complete_run(&self, completion: RunCompletion) -> StoreResult<Run>;

    /// Fetch a run with its related steps and artifacts.
    async fn run_details(&self, run_id: &str) -> StoreResult<Option<RunDetails>> {
        let Some(run) = self.get_run(run_id).await? else {
            return Ok(None);
        };
        let steps = self.steps_for_run(run_id).await?;
        let artifacts = self.artifacts_for_run(run_id).await?;
        Ok(Some(RunDetails {
            run,
            steps,
            artifacts,
        }))
    }
}

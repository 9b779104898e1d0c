//! Session service — the entry points that create sessions, user turns and
//! pending runs, and manage a session's long-term memory.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use switchyard_core::catalog::MAX_SELECTED_MODELS;
use switchyard_core::{
    Constraints, Error, MemoryItem, MemoryItemType, MemoryPatch, Message, ModelCatalog, Result,
    RouterPreferences, Run, RunMode, RunStore, Session,
};
use tracing::info;

use crate::context::ContextCompiler;
use crate::router::build_cpir;

const MAX_TITLE_CHARS: usize = 200;

/// A user turn plus how it should be run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostMessage {
    pub content: String,

    #[serde(default)]
    pub mode: RunMode,

    /// 1..=4 model ids when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_models: Option<Vec<String>>,

    #[serde(default)]
    pub preferences: RouterPreferences,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraints: Option<Constraints>,
}

/// The persisted user message and the pending run that will answer it.
#[derive(Debug, Clone, Serialize)]
pub struct PostedMessage {
    pub message: Message,
    pub run: Run,
}

/// Input for a new memory item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMemory {
    #[serde(rename = "type")]
    pub item_type: MemoryItemType,
    pub key: String,
    /// Must be a JSON object
    pub value: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

pub struct SessionService {
    store: Arc<dyn RunStore>,
    catalog: Arc<ModelCatalog>,
    compiler: ContextCompiler,
}

impl SessionService {
    pub fn new(store: Arc<dyn RunStore>, catalog: Arc<ModelCatalog>) -> Self {
        Self {
            compiler: ContextCompiler::new(store.clone()),
            store,
            catalog,
        }
    }

    pub async fn create_session(&self, title: &str) -> Result<Session> {
        let len = title.chars().count();
        if len == 0 || len > MAX_TITLE_CHARS {
            return Err(Error::validation(format!(
                "session title must be 1..={MAX_TITLE_CHARS} characters, got {len}"
            )));
        }
        let session = self.store.create_session(Session::new(title)).await?;
        info!(session_id = %session.id, "Session created");
        Ok(session)
    }

    async fn require_session(&self, session_id: &str) -> Result<Session> {
        self.store
            .get_session(session_id)
            .await?
            .ok_or_else(|| Error::not_found("Session", session_id))
    }

    /// Messages of a session, oldest first.
    pub async fn messages(&self, session_id: &str) -> Result<Vec<Message>> {
        self.require_session(session_id).await?;
        Ok(self.store.list_messages(session_id).await?)
    }

    /// Persist a user turn and create the `PENDING` run that answers it.
    pub async fn create_message_and_run(
        &self,
        session_id: &str,
        post: PostMessage,
    ) -> Result<PostedMessage> {
        if post.content.trim().is_empty() {
            return Err(Error::validation("message content must not be empty"));
        }
        if let Some(selected) = &post.selected_models
            && !(1..=MAX_SELECTED_MODELS).contains(&selected.len())
        {
            return Err(Error::validation(format!(
                "selected_models must list 1..={MAX_SELECTED_MODELS} models, got {}",
                selected.len()
            )));
        }
        post.preferences.validate()?;
        let constraints = post
            .constraints
            .unwrap_or_default()
            .merged_with(&post.preferences);
        constraints.validate()?;
        self.require_session(session_id).await?;

        let selected_ids: Vec<String> = self
            .catalog
            .resolve_selected(post.selected_models.as_deref().unwrap_or_default())
            .into_iter()
            .map(|entry| entry.model_id.clone())
            .collect();

        let message = self
            .store
            .create_message(Message::user(session_id, post.content.as_str()))
            .await?;
        let pack = self
            .compiler
            .compile_context_pack(session_id, &post.content)
            .await?;
        let cpir = build_cpir(&post.content, pack, Some(constraints))?;

        let run = Run::new(
            session_id,
            post.mode,
            Some(message.id.clone()),
            selected_ids,
            post.preferences,
            cpir,
        );
        let run = self.store.create_run(run).await?;
        info!(
            session_id,
            run_id = %run.id,
            mode = %run.mode,
            task_type = %run.cpir.task_type,
            "Run created"
        );

        Ok(PostedMessage { message, run })
    }

    pub async fn create_memory(&self, session_id: &str, input: NewMemory) -> Result<MemoryItem> {
        let serde_json::Value::Object(value) = input.value else {
            return Err(Error::validation("memory value must be a JSON object"));
        };
        let mut item = MemoryItem::new(session_id, input.item_type, input.key, value)
            .with_enabled(input.enabled.unwrap_or(true));
        if let Some(confidence) = input.confidence {
            item = item.with_confidence(confidence);
        }
        item.validate()?;
        self.require_session(session_id).await?;

        Ok(self.store.create_memory(item).await?)
    }

    pub async fn patch_memory(&self, id: &str, patch: &MemoryPatch) -> Result<MemoryItem> {
        patch.validate()?;
        if self.store.get_memory(id).await?.is_none() {
            return Err(Error::not_found("MemoryItem", id));
        }
        Ok(self.store.update_memory(id, patch).await?)
    }

    /// Returns `false` when no such item existed.
    pub async fn delete_memory(&self, id: &str) -> Result<bool> {
        Ok(self.store.delete_memory(id).await?)
    }

    /// Every memory item of a session, most recently updated first.
    pub async fn list_memory(&self, session_id: &str) -> Result<Vec<MemoryItem>> {
        Ok(self.store.list_memory(session_id).await?)
    }
}

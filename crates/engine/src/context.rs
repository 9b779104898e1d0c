//! Context compiler — builds the bounded [`ContextPack`] a model sees.
//!
//! Pulls the session's most recent messages and every enabled memory item,
//! ranks memory by lexical overlap with the request, and slots the top items
//! into the pack by type. Compiled fresh for every model step so memory
//! edits made mid-run are picked up.

use std::collections::HashSet;
use std::sync::Arc;

use switchyard_core::cpir::{MAX_MEMORY_ENTRY_CHARS, MAX_TURN_CHARS};
use switchyard_core::{
    ContextPack, ContextTurn, MemoryItem, MemoryItemType, MemoryRef, Message, Result, Role,
    RunStore,
};
use tracing::debug;

use crate::token::truncate;

/// Messages pulled into `recent_turns`.
pub const RECENT_TURN_LIMIT: usize = 8;
/// Memory items kept after ranking.
pub const MEMORY_TOP_K: usize = 6;

const SUMMARY_SNIPPET_CHARS: usize = 160;
const NO_CONTEXT_SUMMARY: &str = "No prior context yet.";

/// Lowercase alphanumeric tokens longer than two characters.
fn tokenize(text: &str) -> Vec<String> {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();
    cleaned
        .split_whitespace()
        .filter(|token| token.len() > 2)
        .map(str::to_string)
        .collect()
}

fn memory_json(item: &MemoryItem) -> String {
    serde_json::Value::Object(item.value.clone()).to_string()
}

/// Count memory tokens found in the query. Repeats in the memory text count
/// each time.
fn relevance(query: &HashSet<String>, item: &MemoryItem) -> usize {
    let material = format!("{} {}", item.key, memory_json(item));
    tokenize(&material)
        .iter()
        .filter(|token| query.contains(*token))
        .count()
}

/// Two-sentence synopsis of the latest user and assistant turns.
/// `newest_first` must be ordered most recent first.
fn summarize(newest_first: &[Message]) -> String {
    if newest_first.is_empty() {
        return NO_CONTEXT_SUMMARY.to_string();
    }

    let latest = |role: Role| {
        newest_first
            .iter()
            .find(|m| m.role == role)
            .map(|m| truncate(&m.content, SUMMARY_SNIPPET_CHARS))
    };
    let user = latest(Role::User).unwrap_or_else(|| "No user message yet.".to_string());
    let assistant =
        latest(Role::Assistant).unwrap_or_else(|| "No assistant response yet.".to_string());

    format!("Recent focus: user asked \"{user}\". Assistant context: \"{assistant}\".")
}

/// Compiles context packs from a run store.
pub struct ContextCompiler {
    store: Arc<dyn RunStore>,
}

impl ContextCompiler {
    pub fn new(store: Arc<dyn RunStore>) -> Self {
        Self { store }
    }

    pub async fn compile_context_pack(&self, session_id: &str, user_text: &str) -> Result<ContextPack> {
        let (messages, memory) = tokio::try_join!(
            self.store.recent_messages(session_id, RECENT_TURN_LIMIT),
            self.store.enabled_memory(session_id),
        )?;

        let query: HashSet<String> = tokenize(user_text).into_iter().collect();
        let mut scored: Vec<(usize, MemoryItem)> = memory
            .into_iter()
            .map(|item| (relevance(&query, &item), item))
            .collect();
        scored.sort_by(|(sa, a), (sb, b)| {
            sb.cmp(sa).then_with(|| b.confidence.total_cmp(&a.confidence))
        });
        scored.truncate(MEMORY_TOP_K);

        let mut pack = ContextPack {
            summary: summarize(&messages),
            ..Default::default()
        };

        for (_, item) in &scored {
            let entry = truncate(
                &format!("{}: {}", item.key, memory_json(item)),
                MAX_MEMORY_ENTRY_CHARS,
            );
            let bucket = match item.item_type {
                MemoryItemType::Fact => &mut pack.facts,
                MemoryItemType::Decision => &mut pack.decisions,
                MemoryItemType::Preference => &mut pack.constraints,
                MemoryItemType::ArtifactRef => &mut pack.open_questions,
            };
            bucket.push(entry);
            pack.memory_refs.push(MemoryRef {
                memory_item_id: item.id.clone(),
                key: item.key.clone(),
            });
        }

        pack.recent_turns = messages
            .iter()
            .rev()
            .map(|m| ContextTurn {
                role: m.role,
                content: truncate(&m.content, MAX_TURN_CHARS),
            })
            .collect();

        pack.validate()?;
        debug!(
            session_id,
            turns = pack.recent_turns.len(),
            memory = pack.memory_refs.len(),
            "Compiled context pack"
        );
        Ok(pack)
    }
}

//! In-process per-session conversation memory.
//!
//! Keeps a bounded window of user/assistant turns plus the last classified
//! entity for each session, so follow-up questions can omit the entity.

use rig::completion::AssistantContent;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Turns kept per session; older ones are dropped.
const HISTORY_WINDOW: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone)]
struct ChatTurn {
    role: Role,
    content: String,
}

#[derive(Default)]
struct SessionState {
    turns: Vec<ChatTurn>,
    entity: Option<String>,
}

/// Shared conversation memory keyed by session identifier.
#[derive(Clone, Default)]
pub struct SessionMemory {
    inner: Arc<Mutex<HashMap<String, SessionState>>>,
}

impl SessionMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// The session's turns converted to rig message history, oldest first.
    pub async fn history(&self, session_id: &str) -> Vec<rig::message::Message> {
        let sessions = self.inner.lock().await;
        let Some(state) = sessions.get(session_id) else {
            return Vec::new();
        };
        state
            .turns
            .iter()
            .map(|turn| match turn.role {
                Role::User => rig::message::Message::from(turn.content.as_str()),
                Role::Assistant => {
                    rig::message::Message::from(AssistantContent::from(turn.content.clone()))
                }
            })
            .collect()
    }

    /// The entity last classified for this session, if any.
    pub async fn last_entity(&self, session_id: &str) -> Option<String> {
        self.inner
            .lock()
            .await
            .get(session_id)
            .and_then(|state| state.entity.clone())
    }

    /// Record one completed exchange and the entity it was classified to.
    pub async fn record_exchange(
        &self,
        session_id: &str,
        entity: &str,
        user: &str,
        assistant: &str,
    ) {
        let mut sessions = self.inner.lock().await;
        let state = sessions.entry(session_id.to_string()).or_default();
        state.entity = Some(entity.to_string());
        state.turns.push(ChatTurn {
            role: Role::User,
            content: user.to_string(),
        });
        state.turns.push(ChatTurn {
            role: Role::Assistant,
            content: assistant.to_string(),
        });

        let excess = state.turns.len().saturating_sub(HISTORY_WINDOW);
        if excess > 0 {
            state.turns.drain(..excess);
        }
    }
}

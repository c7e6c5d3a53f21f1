//! AI advisor chat
//!
//! Session and history listings are non-critical: a failure degrades to an
//! empty list so the chat view still opens. Sending a message propagates
//! errors.

use super::degrade;
use crate::error::Result;
use crate::request::AuthorizedClient;
use abroad_core::{AbroadError, ChatMessage, ChatSession};
use serde::Serialize;
use uuid::Uuid;

pub const SESSIONS_PATH: &str = "/api/v2/agents/chat/sessions";

#[derive(Serialize)]
struct OutgoingMessage<'a> {
    content: &'a str,
}

#[derive(Clone)]
pub struct ChatApi {
    client: AuthorizedClient,
}

impl ChatApi {
    pub fn new(client: AuthorizedClient) -> Self {
        Self { client }
    }

    /// Id for a conversation that does not exist yet
    pub fn new_session_id(&self) -> Uuid {
        ChatSession::new_id()
    }

    pub async fn sessions(&self) -> Vec<ChatSession> {
        degrade(
            self.client.get_json(SESSIONS_PATH).await,
            "chat sessions",
        )
    }

    pub async fn messages(&self, session_id: Uuid) -> Vec<ChatMessage> {
        degrade(
            self.client
                .get_json(&format!("{SESSIONS_PATH}/{session_id}/messages"))
                .await,
            "chat messages",
        )
    }

    /// Send a user message and return the advisor's reply
    pub async fn send(&self, session_id: Uuid, text: &str) -> Result<ChatMessage> {
        if text.trim().is_empty() {
            return Err(AbroadError::ValidationError("message is empty".to_string()).into());
        }
        self.client
            .post_json(
                &format!("{SESSIONS_PATH}/{session_id}/messages"),
                &OutgoingMessage { content: text },
            )
            .await
    }
}

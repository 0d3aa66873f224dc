//! Conversation state and streaming response generation

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::Result;

mod chat;

pub use chat::ChatGenerator;

/// Role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One turn of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Multi-turn conversation history with a pinned system prompt.
///
/// History persists across interaction cycles so follow-up questions keep
/// their context.
#[derive(Debug, Clone)]
pub struct Conversation {
    system_prompt: String,
    messages: Vec<ChatMessage>,
}

impl Conversation {
    #[must_use]
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            messages: Vec::new(),
        }
    }

    /// Record the user's question before generation.
    pub fn push_user(&mut self, content: impl Into<String>) {
        self.ensure_system();
        self.messages.push(ChatMessage::user(content));
    }

    /// Record the assistant's reply once the full response has streamed in.
    ///
    /// Whitespace-only replies are dropped so a failed or empty generation
    /// never pollutes the history.
    pub fn push_assistant(&mut self, content: &str) {
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return;
        }
        self.messages.push(ChatMessage::assistant(trimmed));
    }

    /// Messages to send with the next generation request.
    #[must_use]
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Drop all turns; the system prompt is re-pinned on the next question.
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn ensure_system(&mut self) {
        if self
            .messages
            .first()
            .is_none_or(|message| message.role != ChatRole::System)
        {
            self.messages
                .insert(0, ChatMessage::system(self.system_prompt.clone()));
        }
    }
}

/// Stream of response text fragments as they arrive from the model.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Produces a streaming response for a conversation.
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    /// Start generating a response; fragments arrive on the returned
    /// stream in order.
    ///
    /// # Errors
    ///
    /// Returns error if the request cannot be started. Failures after the
    /// stream opens surface as `Err` items on the stream itself.
    async fn generate(&self, messages: &[ChatMessage]) -> Result<FragmentStream>;
}

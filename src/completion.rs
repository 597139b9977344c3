// completion.rs — Language-model completion boundary.
//
// The core only hands over retrieved context; message history belongs to the caller
// and is passed through untouched.

use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::retrieval::QueryContext;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }
}

pub trait CompletionProvider {
    fn complete(&self, model: &str, messages: &[ChatMessage]) -> Result<String, ProviderError>;
}

/// Message list for one question: context (if any), caller history, then the question.
pub fn build_messages(
    preamble: &str,
    context: &QueryContext,
    history: &[ChatMessage],
    question: &str,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    if !context.is_empty() {
        messages.push(ChatMessage::system(format!("{preamble}\n\n{}", context.block)));
    }
    messages.extend(history.iter().cloned());
    messages.push(ChatMessage::user(question));
    messages
}

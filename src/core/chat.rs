//! Conversation data model
//!
//! Messages are created by the orchestrator or by direct user action and
//! never mutated afterwards, except to toggle feedback or to be deleted.
//! Conversations are owned exclusively by the chat store and persisted as
//! a whole collection on every mutation.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Chat titles derived from the first message are cut at this many
/// characters.
pub const TITLE_MAX_CHARS: usize = 35;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    Tool,
}

/// User feedback on a message. Re-applying the same value clears it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Feedback {
    Like,
    Dislike,
}

/// A file attached to a user message: an image carried as a base64 data
/// URL, or a document whose text has already been extracted upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AttachedFile {
    Image {
        name: String,
        subtype: String,
        data_url: String,
        size: u64,
    },
    Document {
        name: String,
        subtype: String,
        content: String,
        size: u64,
    },
}

impl AttachedFile {
    pub fn name(&self) -> &str {
        match self {
            AttachedFile::Image { name, .. } | AttachedFile::Document { name, .. } => name,
        }
    }
}

/// A model's request to invoke an external function. Recorded and
/// answered with a simulated result; never actually executed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

/// One message in a conversation. `content` is `None` when the message
/// carries tool calls instead of text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: String,
    pub role: MessageRole,
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<AttachedFile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<Feedback>,
}

impl StoredMessage {
    fn base(role: MessageRole, content: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content,
            files: Vec::new(),
            model: None,
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
            feedback: None,
        }
    }

    pub fn user(content: impl Into<String>, files: Vec<AttachedFile>) -> Self {
        Self {
            files,
            ..Self::base(MessageRole::User, Some(content.into()))
        }
    }

    pub fn assistant(content: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            model: Some(model.into()),
            ..Self::base(MessageRole::Assistant, Some(content.into()))
        }
    }

    /// An assistant-role note authored by the client itself (switch
    /// notices, terminal failures, stop confirmations). Carries no model
    /// label and persists with the rest of the history.
    pub fn assistant_note(content: impl Into<String>) -> Self {
        Self::base(MessageRole::Assistant, Some(content.into()))
    }

    pub fn tool_call(tool_calls: Vec<ToolCallRequest>, model: impl Into<String>) -> Self {
        Self {
            model: Some(model.into()),
            tool_calls,
            ..Self::base(MessageRole::Assistant, None)
        }
    }

    pub fn tool_result(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            name: Some(name.into()),
            ..Self::base(MessageRole::Tool, Some(content.into()))
        }
    }

    /// Toggle feedback: applying the current value clears it, any other
    /// value replaces it.
    pub fn toggle_feedback(&mut self, feedback: Feedback) {
        self.feedback = if self.feedback == Some(feedback) {
            None
        } else {
            Some(feedback)
        };
    }
}

/// One conversation. The id is the creation timestamp in milliseconds,
/// kept unique by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: i64,
    pub title: String,
    pub last_updated: i64,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub messages: Vec<StoredMessage>,
}

impl Chat {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            title: "New Chat".to_string(),
            last_updated: id,
            pinned: false,
            messages: Vec::new(),
        }
    }

    pub fn push(&mut self, message: StoredMessage) {
        self.messages.push(message);
    }

    pub fn message(&self, message_id: &str) -> Option<&StoredMessage> {
        self.messages.iter().find(|message| message.id == message_id)
    }

    pub fn message_mut(&mut self, message_id: &str) -> Option<&mut StoredMessage> {
        self.messages
            .iter_mut()
            .find(|message| message.id == message_id)
    }
}

/// Derive a chat title from the first message: the first attachment name
/// as a bracketed prefix, then the text, cut at [`TITLE_MAX_CHARS`]
/// characters with an ellipsis when the text ran longer.
pub fn derive_title(text: &str, first_file: Option<&AttachedFile>) -> String {
    let prefixed = match first_file {
        Some(file) => format!("[{}] {}", file.name(), text),
        None => text.to_string(),
    };
    let mut title: String = prefixed.chars().take(TITLE_MAX_CHARS).collect();
    if text.chars().count() > TITLE_MAX_CHARS {
        title.push_str("...");
    }
    title
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_first_messages_are_truncated_with_ellipsis() {
        let text = "a".repeat(50);
        let title = derive_title(&text, None);
        assert_eq!(title.chars().count(), TITLE_MAX_CHARS + 3);
        assert!(title.ends_with("..."));
        assert!(title.starts_with(&"a".repeat(TITLE_MAX_CHARS)));
    }

    #[test]
    fn short_first_messages_become_the_title_verbatim() {
        assert_eq!(derive_title("hello ai", None), "hello ai");
    }

    #[test]
    fn first_attachment_name_prefixes_the_title() {
        let file = AttachedFile::Document {
            name: "notes.pdf".to_string(),
            subtype: "pdf".to_string(),
            content: String::new(),
            size: 1024,
        };
        assert_eq!(derive_title("summarize", Some(&file)), "[notes.pdf] summarize");
    }

    #[test]
    fn feedback_toggle_is_idempotent() {
        let mut message = StoredMessage::assistant("hi", "acme/model");
        message.toggle_feedback(Feedback::Like);
        assert_eq!(message.feedback, Some(Feedback::Like));
        message.toggle_feedback(Feedback::Like);
        assert_eq!(message.feedback, None);
    }

    #[test]
    fn feedback_switches_to_the_latest_value() {
        let mut message = StoredMessage::assistant("hi", "acme/model");
        message.toggle_feedback(Feedback::Like);
        message.toggle_feedback(Feedback::Dislike);
        assert_eq!(message.feedback, Some(Feedback::Dislike));
    }

    #[test]
    fn tool_call_messages_have_null_content() {
        let message = StoredMessage::tool_call(
            vec![ToolCallRequest {
                id: "call_1".to_string(),
                name: "lookup".to_string(),
                arguments: "{}".to_string(),
            }],
            "acme/model",
        );
        assert_eq!(message.role, MessageRole::Assistant);
        assert!(message.content.is_none());
        assert_eq!(message.tool_calls.len(), 1);
    }

    #[test]
    fn message_ids_are_unique() {
        let a = StoredMessage::user("one", Vec::new());
        let b = StoredMessage::user("one", Vec::new());
        assert_ne!(a.id, b.id);
    }
}

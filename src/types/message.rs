use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::types::{FeedbackType, SourceMetadata};

/// The author of a message in the conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// A message typed by the user.
    User,
    /// A message produced by the legal assistant.
    Assistant,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single message in the conversation.
///
/// Assistant messages start out empty and grow while their response streams in.
/// The `id` of a message never changes after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique identifier for the message.
    pub id: String,

    /// Who authored the message.
    pub role: MessageRole,

    /// The text of the message.
    pub content: String,

    /// Sources the assistant cited while answering.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<SourceMetadata>,

    /// Feedback the user left on this message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<FeedbackType>,

    /// When the message was created.
    #[serde(with = "crate::utils::time")]
    pub created_at: OffsetDateTime,
}

impl Message {
    /// Create a new message with a fresh identifier.
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            metadata: None,
            feedback: None,
            created_at: crate::utils::time::now(),
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    /// Create the empty assistant message that a streamed response fills in.
    pub fn placeholder() -> Self {
        Self::new(MessageRole::Assistant, String::new())
    }

    /// Returns true if this message was written by the assistant.
    pub fn is_assistant(&self) -> bool {
        self.role == MessageRole::Assistant
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, to_value};

    #[test]
    fn test_placeholder_is_empty_assistant() {
        let msg = Message::placeholder();
        assert!(msg.is_assistant());
        assert!(msg.content.is_empty());
        assert!(msg.metadata.is_none());
        assert!(msg.feedback.is_none());
    }

    #[test]
    fn test_ids_are_unique() {
        let a = Message::user("a");
        let b = Message::user("a");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_serializes_camel_case() {
        let mut msg = Message::user("Jaki jest okres wypowiedzenia?");
        msg.feedback = Some(FeedbackType::Positive);
        let value = to_value(&msg).unwrap();
        assert_eq!(value["role"], json!("user"));
        assert_eq!(value["feedback"], json!("positive"));
        assert!(value.get("createdAt").is_some());
        assert!(value.get("metadata").is_none());
    }

    #[test]
    fn test_deserializes_without_optional_fields() {
        let value = json!({
            "id": "m1",
            "role": "assistant",
            "content": "Okres wypowiedzenia wynosi...",
            "createdAt": "2024-03-01T10:00:00Z"
        });
        let msg: Message = serde_json::from_value(value).unwrap();
        assert_eq!(msg.id, "m1");
        assert_eq!(msg.role, MessageRole::Assistant);
        assert!(msg.feedback.is_none());
    }
}

use serde::{Deserialize, Serialize};

use crate::types::Message;

/// Body of a request to share a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShareRequest {
    /// The messages to publish.
    pub messages: Vec<Message>,
}

/// Reply to a share request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ShareResponse {
    /// Identifier under which the conversation can be fetched.
    pub share_id: String,
}

/// A conversation fetched by its share identifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SharedConversation {
    /// The stored messages.
    pub messages: Vec<Message>,

    /// When the share link stops working, as reported by the backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
}

//! The seam between the chat session and the assistant backend.

use crate::framing::EventStream;
use crate::{ChatRequest, FeedbackRequest, FeedbackResponse, Message, Result, SharedConversation};

/// Operations the chat session needs from the assistant backend.
///
/// [`crate::AssistantClient`] implements this over HTTP; tests substitute
/// scripted backends.
#[async_trait::async_trait]
pub trait ChatBackend: Send + Sync {
    /// Open a streamed response for `request`.
    ///
    /// Errors returned here happened before any event was received and are
    /// candidates for retry.
    async fn open_stream(&self, request: &ChatRequest) -> Result<EventStream>;

    /// Record feedback on an assistant message.
    async fn submit_feedback(&self, request: &FeedbackRequest) -> Result<FeedbackResponse>;

    /// Publish a conversation and return its share identifier.
    async fn share_conversation(&self, messages: &[Message]) -> Result<String>;

    /// Fetch a conversation by share identifier.
    async fn shared_conversation(&self, share_id: &str) -> Result<SharedConversation>;
}

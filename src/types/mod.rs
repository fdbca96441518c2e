// Public modules
pub mod chat_request;
pub mod feedback;
pub mod message;
pub mod share;
pub mod source_metadata;
pub mod stream_event;

// Re-exports
pub use chat_request::ChatRequest;
pub use feedback::{FeedbackRequest, FeedbackResponse, FeedbackType};
pub use message::{Message, MessageRole};
pub use share::{ShareRequest, ShareResponse, SharedConversation};
pub use source_metadata::{Source, SourceMetadata};
pub use stream_event::StreamEvent;

// Public modules
pub mod backend;
pub mod chat;
pub mod client;
pub mod error;
pub mod framing;
pub mod observability;
pub mod retry;
pub mod storage;
pub mod streaming;
pub mod types;
pub mod utils;

// Re-exports
pub use backend::ChatBackend;
pub use client::AssistantClient;
pub use error::{Error, Result};
pub use framing::{EventStream, FrameDecoder, process_frames};
pub use observability::register_biometrics;
pub use retry::{
    Backoff, RetryConfig, RetryContext, is_rate_limit_error, retry_after_hint, with_retry,
};
pub use storage::{FileStore, KeyValueStore, MemoryStore, SessionStorage};
pub use streaming::{MissingTerminal, StreamCallbacks, StreamOutcome, drive_stream, stream_message};
pub use types::*;

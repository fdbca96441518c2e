use serde::{Deserialize, Serialize};

use crate::types::Source;

/// A single frame of a streamed assistant response.
///
/// Frames arrive as newline-delimited JSON objects, discriminated by their
/// `type` field. A well-formed stream is `start`, any mix of `delta` and
/// `metadata`, then exactly one of `complete` or `error`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// The assistant has started producing a response.
    Start {
        /// Server-side identifier of the response, if it sends one.
        #[serde(default, rename = "messageId", skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },

    /// A fragment of response text.
    Delta {
        /// The new text, to be appended to what came before.
        #[serde(alias = "text")]
        content: String,
    },

    /// Citation data for the response.
    Metadata {
        /// Sources the response relies on.
        #[serde(default)]
        sources: Vec<Source>,
    },

    /// The response finished successfully.
    Complete {
        /// The full response text, when the backend repeats it.
        #[serde(default, alias = "text", skip_serializing_if = "Option::is_none")]
        content: Option<String>,
    },

    /// The backend failed while producing the response.
    Error {
        /// Description of the failure.
        #[serde(alias = "message")]
        error: String,
        /// HTTP-like status for the failure.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<u16>,
    },
}

impl StreamEvent {
    /// The wire name of this frame's type.
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Start { .. } => "start",
            StreamEvent::Delta { .. } => "delta",
            StreamEvent::Metadata { .. } => "metadata",
            StreamEvent::Complete { .. } => "complete",
            StreamEvent::Error { .. } => "error",
        }
    }

    /// Convenience constructor for a delta frame.
    pub fn delta(content: impl Into<String>) -> Self {
        StreamEvent::Delta {
            content: content.into(),
        }
    }
}

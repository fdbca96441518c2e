use serde::{Deserialize, Serialize};

/// A thumbs-up or thumbs-down on an assistant message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackType {
    /// The answer was helpful.
    Positive,
    /// The answer was not helpful.
    Negative,
}

impl std::str::FromStr for FeedbackType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "positive" | "+" | "up" | "good" => Ok(FeedbackType::Positive),
            "negative" | "-" | "down" | "bad" => Ok(FeedbackType::Negative),
            other => Err(format!("unknown feedback type: {other}")),
        }
    }
}

/// Body of a feedback submission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRequest {
    /// The assistant message being rated.
    pub message_id: String,
    /// The rating.
    pub feedback_type: FeedbackType,
}

/// The feedback endpoint's reply.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedbackResponse {
    /// "ok" once stored, "pending" while the message record is not yet persisted.
    #[serde(default)]
    pub status: String,
}

impl FeedbackResponse {
    /// Returns true if the backend has not persisted the message yet.
    pub fn is_pending(&self) -> bool {
        self.status.eq_ignore_ascii_case("pending")
    }
}

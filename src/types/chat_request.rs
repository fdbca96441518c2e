use serde::{Deserialize, Serialize};

/// Body of a request to the streaming chat endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    /// The user's question.
    pub message: String,

    /// Extracted text of documents the user attached, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_context: Option<String>,

    /// The persona's stable session identifier.
    pub session_id: String,

    /// Identifier of the placeholder assistant message being filled.
    pub message_id: String,

    /// Route the request to the premium model.
    pub use_premium_model: bool,
}

impl ChatRequest {
    /// Create a request without file context on the standard model.
    pub fn new(
        message: impl Into<String>,
        session_id: impl Into<String>,
        message_id: impl Into<String>,
    ) -> Self {
        Self {
            message: message.into(),
            file_context: None,
            session_id: session_id.into(),
            message_id: message_id.into(),
            use_premium_model: false,
        }
    }

    /// Attach document text to the request.
    pub fn with_file_context(mut self, file_context: Option<String>) -> Self {
        self.file_context = file_context;
        self
    }

    /// Select the premium model.
    pub fn with_premium_model(mut self, use_premium_model: bool) -> Self {
        self.use_premium_model = use_premium_model;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, to_value};

    #[test]
    fn test_wire_format() {
        let request = ChatRequest::new("Pytanie", "sess-1", "msg-1")
            .with_file_context(Some("Umowa najmu".to_string()))
            .with_premium_model(true);
        assert_eq!(
            to_value(&request).unwrap(),
            json!({
                "message": "Pytanie",
                "fileContext": "Umowa najmu",
                "sessionId": "sess-1",
                "messageId": "msg-1",
                "usePremiumModel": true
            })
        );
    }

    #[test]
    fn test_file_context_omitted_when_absent() {
        let value = to_value(ChatRequest::new("Pytanie", "s", "m")).unwrap();
        assert!(value.get("fileContext").is_none());
        assert_eq!(value["usePremiumModel"], json!(false));
    }
}

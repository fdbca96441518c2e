use futures::stream::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Response, StatusCode, header};
use std::env;
use std::time::Duration;
use url::Url;

use crate::backend::ChatBackend;
use crate::error::{Error, Result};
use crate::framing::{EventStream, process_frames};
use crate::observability::{CLIENT_REQUEST_ERRORS, CLIENT_REQUESTS};
use crate::retry::RetryConfig;
use crate::streaming::{self, MissingTerminal, StreamCallbacks, StreamOutcome};
use crate::types::{
    ChatRequest, FeedbackRequest, FeedbackResponse, Message, ShareRequest, ShareResponse,
    SharedConversation,
};

/// Base URL used when none is configured.
pub const DEFAULT_API_URL: &str = "http://localhost:54321/functions/v1/";
/// Request timeout used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
const MAX_ERROR_BODY: usize = 512;

/// Environment variable overriding the backend base URL.
pub const API_URL_ENV: &str = "MECENAS_API_URL";
/// Environment variable holding the backend's anonymous key.
pub const API_KEY_ENV: &str = "MECENAS_API_KEY";

/// HTTP client for the legal-assistant backend.
#[derive(Debug, Clone)]
pub struct AssistantClient {
    api_key: Option<String>,
    client: ReqwestClient,
    base_url: Url,
    timeout: Duration,
    missing_terminal: MissingTerminal,
}

impl AssistantClient {
    /// Create a new client.
    ///
    /// The anonymous key can be provided directly or read from the
    /// MECENAS_API_KEY environment variable; the base URL is read from
    /// MECENAS_API_URL when set.
    pub fn new(api_key: Option<String>) -> Result<Self> {
        let base_url = env::var(API_URL_ENV).ok();
        Self::with_options(api_key, base_url, None)
    }

    /// Create a new client with custom settings.
    pub fn with_options(
        api_key: Option<String>,
        base_url: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let api_key = api_key.or_else(|| env::var(API_KEY_ENV).ok());
        let timeout = timeout.unwrap_or(DEFAULT_TIMEOUT);
        let client = ReqwestClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                Error::http_client(
                    format!("Failed to build HTTP client: {e}"),
                    Some(Box::new(e)),
                )
            })?;

        let mut base_url = base_url.unwrap_or_else(|| DEFAULT_API_URL.to_string());
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        let base_url = Url::parse(&base_url)?;

        Ok(Self {
            api_key,
            client,
            base_url,
            timeout,
            missing_terminal: MissingTerminal::default(),
        })
    }

    /// Sets how a stream without a terminal frame is treated.
    pub fn with_missing_terminal(mut self, missing_terminal: MissingTerminal) -> Self {
        self.missing_terminal = missing_terminal;
        self
    }

    /// The base URL endpoints are resolved against.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    /// Create and return default headers for API requests.
    fn default_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(api_key) = &self.api_key {
            let invalid = |_| Error::validation("API key contains invalid characters", None);
            headers.insert("apikey", HeaderValue::from_str(api_key).map_err(invalid)?);
            headers.insert(
                header::AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {api_key}")).map_err(invalid)?,
            );
        }
        Ok(headers)
    }

    fn map_send_error(&self, e: reqwest::Error) -> Error {
        CLIENT_REQUEST_ERRORS.click();
        if e.is_timeout() {
            Error::timeout(
                format!("Request timed out: {e}"),
                Some(self.timeout.as_secs_f64()),
            )
        } else if e.is_connect() {
            Error::connection(format!("Connection error: {e}"), Some(Box::new(e)))
        } else {
            Error::http_client(format!("Request failed: {e}"), Some(Box::new(e)))
        }
    }

    /// Process API response errors and convert to our Error type
    async fn process_error_response(response: Response) -> Error {
        CLIENT_REQUEST_ERRORS.click();
        let status_code = response.status().as_u16();

        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|val| val.to_str().ok())
            .and_then(|val| val.parse::<u64>().ok());

        let error_body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return Error::http_client(
                    format!("Failed to read error response: {e}"),
                    Some(Box::new(e)),
                );
            }
        };

        // Edge functions answer with {"error": "..."} or {"error": {"message": "..."}}.
        let parsed = serde_json::from_str::<serde_json::Value>(&error_body).ok();
        let error_message = parsed
            .as_ref()
            .and_then(|v| {
                v.get("error")
                    .and_then(|e| e.as_str().or_else(|| e.get("message")?.as_str()))
                    .or_else(|| v.get("message")?.as_str())
            })
            .map(String::from)
            .unwrap_or_else(|| truncate_body(error_body));

        tracing::warn!(status = status_code, error = %error_message, "backend returned an error");

        match status_code {
            400 => Error::bad_request(error_message),
            401 => Error::authentication(error_message),
            403 => Error::permission(error_message),
            404 => Error::not_found(error_message, None),
            408 => Error::timeout(error_message, None),
            410 => Error::expired(error_message),
            429 => Error::rate_limit(error_message, retry_after),
            500 => Error::internal_server(error_message),
            502..=504 => Error::service_unavailable(error_message, retry_after),
            _ => Error::api(status_code, None, error_message),
        }
    }

    async fn post_json<T: serde::Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
        accept: Option<&'static str>,
    ) -> Result<Response> {
        let url = self.endpoint(path)?;
        let mut headers = self.default_headers()?;
        if let Some(accept) = accept {
            headers.insert(header::ACCEPT, HeaderValue::from_static(accept));
        }

        CLIENT_REQUESTS.click();
        let response = self
            .client
            .post(url)
            .headers(headers)
            .json(body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        if !response.status().is_success() {
            return Err(Self::process_error_response(response).await);
        }
        Ok(response)
    }

    /// Open a streamed chat response.
    ///
    /// Returns a stream of decoded events once the backend has accepted the
    /// request; connection and status failures are returned as errors.
    pub async fn stream(&self, request: &ChatRequest) -> Result<EventStream> {
        let response = self
            .post_json("chat", request, Some("application/x-ndjson"))
            .await?;
        let bytes = response.bytes_stream().map(|result| {
            result.map_err(|e| {
                CLIENT_REQUEST_ERRORS.click();
                if e.is_timeout() {
                    Error::timeout(format!("Stream timed out: {e}"), None)
                } else {
                    Error::streaming(format!("Error in HTTP stream: {e}"), Some(Box::new(e)))
                }
            })
        });
        Ok(process_frames(Box::pin(bytes)))
    }

    /// Send `request` and drive the streamed answer into `callbacks`.
    ///
    /// Exactly one of `on_message_complete` or `on_error` fires.
    pub async fn stream_message(
        &self,
        request: &ChatRequest,
        callbacks: &mut dyn StreamCallbacks,
    ) -> StreamOutcome {
        self.stream_message_with_retry(request, callbacks, &RetryConfig::none())
            .await
    }

    /// Like [`AssistantClient::stream_message`], retrying failures to open the stream.
    pub async fn stream_message_with_retry(
        &self,
        request: &ChatRequest,
        callbacks: &mut dyn StreamCallbacks,
        retry: &RetryConfig<Error>,
    ) -> StreamOutcome {
        streaming::stream_message(self, request, callbacks, retry, self.missing_terminal).await
    }

    /// Record feedback on an assistant message.
    ///
    /// A 202 response, or a body reporting `"pending"`, means the message
    /// record has not been persisted yet.
    pub async fn submit_feedback(&self, request: &FeedbackRequest) -> Result<FeedbackResponse> {
        let response = self.post_json("feedback", request, None).await?;
        if response.status() == StatusCode::ACCEPTED {
            return Ok(FeedbackResponse {
                status: "pending".to_string(),
            });
        }
        let body = response.text().await.map_err(|e| {
            Error::streaming(format!("Failed to read response: {e}"), Some(Box::new(e)))
        })?;
        if body.trim().is_empty() {
            return Ok(FeedbackResponse {
                status: "ok".to_string(),
            });
        }
        Ok(serde_json::from_str(&body)?)
    }

    /// Publish a conversation and return its share identifier.
    pub async fn share_conversation(&self, messages: &[Message]) -> Result<String> {
        let request = ShareRequest {
            messages: messages.to_vec(),
        };
        let response = self.post_json("share", &request, None).await?;
        let share = response.json::<ShareResponse>().await.map_err(|e| {
            Error::serialization(format!("Failed to parse response: {e}"), Some(Box::new(e)))
        })?;
        Ok(share.share_id)
    }

    /// Fetch a shared conversation. Unknown ids yield `NotFound`, stale ones `Expired`.
    pub async fn shared_conversation(&self, share_id: &str) -> Result<SharedConversation> {
        if share_id.is_empty() || share_id.contains('/') {
            return Err(Error::validation(
                "share id must be a non-empty path segment",
                Some("share_id".to_string()),
            ));
        }
        let url = self.endpoint(&format!("share/{share_id}"))?;
        CLIENT_REQUESTS.click();
        let response = self
            .client
            .get(url)
            .headers(self.default_headers()?)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        if !response.status().is_success() {
            return Err(Self::process_error_response(response).await);
        }
        response.json::<SharedConversation>().await.map_err(|e| {
            Error::serialization(format!("Failed to parse response: {e}"), Some(Box::new(e)))
        })
    }
}

#[async_trait::async_trait]
impl ChatBackend for AssistantClient {
    async fn open_stream(&self, request: &ChatRequest) -> Result<EventStream> {
        self.stream(request).await
    }

    async fn submit_feedback(&self, request: &FeedbackRequest) -> Result<FeedbackResponse> {
        AssistantClient::submit_feedback(self, request).await
    }

    async fn share_conversation(&self, messages: &[Message]) -> Result<String> {
        AssistantClient::share_conversation(self, messages).await
    }

    async fn shared_conversation(&self, share_id: &str) -> Result<SharedConversation> {
        AssistantClient::shared_conversation(self, share_id).await
    }
}

fn truncate_body(mut body: String) -> String {
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
        body.push_str("... [truncated]");
    }
    body
}

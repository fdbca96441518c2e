//! Drives a stream of decoded events into lifecycle callbacks.
//!
//! [`drive_stream`] owns accumulation of the response text and guarantees that
//! exactly one of [`StreamCallbacks::on_message_complete`] or
//! [`StreamCallbacks::on_error`] fires, however the underlying stream ends.

use std::time::Instant;

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::backend::ChatBackend;
use crate::observability::{
    STREAM_DURATION, STREAM_ERRORS, STREAM_EVENTS, STREAM_IMPLICIT_COMPLETIONS,
};
use crate::retry::{RetryConfig, with_retry};
use crate::{ChatRequest, Error, Result, SourceMetadata, StreamEvent};

/// Receives the lifecycle of one streamed response.
///
/// Callbacks fire in the order events arrive. Nothing fires after the terminal
/// callback.
pub trait StreamCallbacks: Send {
    /// The response has started. Fires once, before any content.
    fn on_message_start(&mut self) {}

    /// New content arrived; `accumulated` is the full text received so far.
    fn on_content_delta(&mut self, accumulated: &str);

    /// Citation data arrived. May fire several times, interleaved with content.
    fn on_source_metadata(&mut self, metadata: &SourceMetadata) {
        _ = metadata;
    }

    /// The response finished. Terminal.
    fn on_message_complete(&mut self, content: &str);

    /// The response failed. Terminal.
    fn on_error(&mut self, error: &Error);
}

/// What to do when a stream ends without a `complete` or `error` frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingTerminal {
    /// Treat the accumulated content as the complete response.
    #[default]
    Complete,
    /// Report the stream as truncated.
    Error,
}

/// How a driven stream ended.
#[derive(Debug, Clone)]
pub enum StreamOutcome {
    /// The response completed.
    Completed {
        /// Final response text.
        content: String,
        /// All citation data received, merged in arrival order.
        metadata: Option<SourceMetadata>,
    },
    /// The response failed.
    Failed(Error),
}

impl StreamOutcome {
    /// Returns true if the stream completed.
    pub fn is_completed(&self) -> bool {
        matches!(self, StreamOutcome::Completed { .. })
    }

    /// Convert into a `Result` carrying the final content.
    pub fn into_result(self) -> Result<String> {
        match self {
            StreamOutcome::Completed { content, .. } => Ok(content),
            StreamOutcome::Failed(err) => Err(err),
        }
    }
}

struct StreamDriver<'a> {
    callbacks: &'a mut dyn StreamCallbacks,
    content: String,
    metadata: Option<SourceMetadata>,
    started: bool,
}

impl StreamDriver<'_> {
    fn ensure_started(&mut self) {
        if !self.started {
            self.started = true;
            self.callbacks.on_message_start();
        }
    }

    /// Apply one event; returns the outcome once a terminal event arrives.
    fn apply(&mut self, event: StreamEvent) -> Option<StreamOutcome> {
        STREAM_EVENTS.click();
        tracing::trace!(kind = event.kind(), "stream event");
        match event {
            StreamEvent::Start { .. } => {
                if self.started {
                    tracing::warn!("ignoring duplicate start frame");
                }
                self.ensure_started();
                None
            }
            StreamEvent::Delta { content } => {
                self.ensure_started();
                self.content.push_str(&content);
                self.callbacks.on_content_delta(&self.content);
                None
            }
            StreamEvent::Metadata { sources } => {
                self.ensure_started();
                let metadata = SourceMetadata::new(sources);
                self.callbacks.on_source_metadata(&metadata);
                match &mut self.metadata {
                    Some(existing) => existing.merge(metadata),
                    None => self.metadata = Some(metadata),
                }
                None
            }
            StreamEvent::Complete { content } => {
                self.ensure_started();
                if let Some(content) = content {
                    if !content.starts_with(&self.content) {
                        tracing::warn!(
                            accumulated = self.content.len(),
                            final_len = content.len(),
                            "final content differs from accumulated deltas"
                        );
                    }
                    self.content = content;
                }
                Some(self.complete())
            }
            StreamEvent::Error { error, status } => {
                Some(self.fail(Error::stream_reported(error, status)))
            }
        }
    }

    fn complete(&mut self) -> StreamOutcome {
        let content = std::mem::take(&mut self.content);
        self.callbacks.on_message_complete(&content);
        StreamOutcome::Completed {
            content,
            metadata: self.metadata.take(),
        }
    }

    fn fail(&mut self, err: Error) -> StreamOutcome {
        STREAM_ERRORS.click();
        tracing::error!(error = %err, "stream failed");
        self.callbacks.on_error(&err);
        StreamOutcome::Failed(err)
    }
}

/// Consume `events`, dispatching each to `callbacks`.
///
/// Reading stops at the first terminal event. A stream that ends without one
/// is handled according to `missing_terminal`.
pub async fn drive_stream<S>(
    events: S,
    callbacks: &mut dyn StreamCallbacks,
    missing_terminal: MissingTerminal,
) -> StreamOutcome
where
    S: Stream<Item = Result<StreamEvent>>,
{
    let start = Instant::now();
    let mut events = std::pin::pin!(events);
    let mut driver = StreamDriver {
        callbacks,
        content: String::new(),
        metadata: None,
        started: false,
    };

    let outcome = loop {
        match events.next().await {
            Some(Ok(event)) => {
                if let Some(outcome) = driver.apply(event) {
                    break outcome;
                }
            }
            Some(Err(err)) => break driver.fail(err),
            None => match missing_terminal {
                MissingTerminal::Complete => {
                    STREAM_IMPLICIT_COMPLETIONS.click();
                    tracing::warn!(
                        content_len = driver.content.len(),
                        "stream ended without a terminal frame; treating as complete"
                    );
                    driver.ensure_started();
                    break driver.complete();
                }
                MissingTerminal::Error => {
                    break driver.fail(Error::truncated(
                        "stream ended without a terminal frame",
                    ));
                }
            },
        }
    };
    STREAM_DURATION.add(start.elapsed().as_secs_f64());
    outcome
}

/// Deliver a failure that happened before any event arrived.
fn fail_before_start(callbacks: &mut dyn StreamCallbacks, err: Error) -> StreamOutcome {
    STREAM_ERRORS.click();
    tracing::error!(error = %err, "stream could not be opened");
    callbacks.on_error(&err);
    StreamOutcome::Failed(err)
}

/// Send `request` to `backend` and drive the streamed response into `callbacks`.
///
/// Opening the stream (connecting and checking the response status) is
/// wrapped in `retry`; once events flow nothing is retried. Exactly one
/// terminal callback fires whether the failure happens while opening or
/// while streaming.
pub async fn stream_message<B>(
    backend: &B,
    request: &ChatRequest,
    callbacks: &mut dyn StreamCallbacks,
    retry: &RetryConfig<Error>,
    missing_terminal: MissingTerminal,
) -> StreamOutcome
where
    B: ChatBackend + ?Sized,
{
    tracing::debug!(
        message_id = %request.message_id,
        premium = request.use_premium_model,
        "opening assistant stream"
    );
    match with_retry(|| backend.open_stream(request), retry).await {
        Ok(events) => drive_stream(events, callbacks, missing_terminal).await,
        Err(err) => fail_before_start(callbacks, err),
    }
}

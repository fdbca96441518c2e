//! Core chat session management.
//!
//! `ChatSession` owns the conversation and drives each turn through the
//! streaming service. It is the only writer of the message store; observers
//! see every change through [`ChatObserver`].

use tokio::sync::mpsc;

use crate::backend::ChatBackend;
use crate::chat::classify::{ErrorCategory, FALLBACK_RESPONSE};
use crate::chat::config::ChatConfig;
use crate::chat::notice::Notice;
use crate::chat::store::MessageStore;
use crate::observability::{
    CHAT_FEEDBACK_PENDING, CHAT_FEEDBACK_SUBMISSIONS, CHAT_TURN_FAILURES, CHAT_TURNS,
};
use crate::retry::{RetryConfig, is_rate_limit_error, retry_after_hint, with_retry};
use crate::storage::SessionStorage;
use crate::streaming::{self, StreamCallbacks, StreamOutcome};
use crate::{
    ChatRequest, Error, FeedbackRequest, FeedbackType, Message, Result, SourceMetadata,
};

/// Where the current turn stands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TurnState {
    /// No turn has run yet, or the session was reset.
    #[default]
    Idle,
    /// The request is being sent.
    Sending,
    /// Response events are arriving.
    Streaming,
    /// The last turn completed.
    Succeeded,
    /// The last turn failed.
    Failed,
}

impl TurnState {
    /// Returns true while a turn is sending or streaming.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, TurnState::Sending | TurnState::Streaming)
    }
}

/// The result of one turn that got as far as the backend.
#[derive(Debug, Clone)]
pub enum TurnOutcome {
    /// The assistant answered.
    Completed {
        /// Id of the assistant message.
        message_id: String,
        /// The final answer.
        content: String,
    },
    /// The turn failed; the assistant message holds the fallback text.
    Failed {
        /// Id of the assistant message.
        message_id: String,
        /// What the user was told.
        category: ErrorCategory,
        /// The underlying failure.
        error: Error,
    },
}

impl TurnOutcome {
    /// Id of the assistant message this turn wrote.
    pub fn message_id(&self) -> &str {
        match self {
            TurnOutcome::Completed { message_id, .. } | TurnOutcome::Failed { message_id, .. } => {
                message_id
            }
        }
    }

    /// Returns true if the assistant answered.
    pub fn is_completed(&self) -> bool {
        matches!(self, TurnOutcome::Completed { .. })
    }
}

/// Receives every change the session makes.
pub trait ChatObserver: Send {
    /// A message was added to the conversation.
    fn message_appended(&mut self, message: &Message) {
        _ = message;
    }

    /// A message changed in place.
    fn message_updated(&mut self, message: &Message) {
        _ = message;
    }

    /// A turn started or finished.
    fn loading_changed(&mut self, loading: bool) {
        _ = loading;
    }

    /// Show a notification.
    fn notify(&mut self, notice: &Notice);
}

/// Writes one streamed response into the store.
struct TurnWriter<'a> {
    store: &'a mut MessageStore,
    state: &'a mut TurnState,
    message_id: &'a str,
    observer: &'a mut dyn ChatObserver,
}

impl TurnWriter<'_> {
    fn write(&mut self, content: &str) {
        if let Some(message) = self.store.set_content(self.message_id, content) {
            self.observer.message_updated(message);
        }
    }
}

impl StreamCallbacks for TurnWriter<'_> {
    fn on_message_start(&mut self) {
        *self.state = TurnState::Streaming;
    }

    fn on_content_delta(&mut self, accumulated: &str) {
        self.write(accumulated);
    }

    fn on_source_metadata(&mut self, metadata: &SourceMetadata) {
        if let Some(message) = self.store.merge_metadata(self.message_id, metadata) {
            self.observer.message_updated(message);
        }
    }

    fn on_message_complete(&mut self, content: &str) {
        self.write(content);
    }

    fn on_error(&mut self, error: &Error) {
        tracing::debug!(message_id = self.message_id, error = %error, "turn stream failed");
    }
}

/// A chat session: the conversation, its persisted identity and a backend.
pub struct ChatSession<B: ChatBackend> {
    backend: B,
    config: ChatConfig,
    storage: SessionStorage,
    store: MessageStore,
    state: TurnState,
    in_flight: Option<String>,
    use_premium_model: bool,
}

impl<B: ChatBackend> ChatSession<B> {
    /// Creates a new chat session.
    ///
    /// The premium model is only used when the configuration asks for it and
    /// the persisted unlock flag is set.
    pub fn new(backend: B, config: ChatConfig, storage: SessionStorage) -> Self {
        let use_premium_model = config.use_premium_model && storage.premium_unlocked();
        if config.use_premium_model && !use_premium_model {
            tracing::warn!("premium model requested but not unlocked; using the standard model");
        }
        Self {
            backend,
            config,
            storage,
            store: MessageStore::new(),
            state: TurnState::Idle,
            in_flight: None,
            use_premium_model,
        }
    }

    /// Sends a user message and streams the answer into a new assistant message.
    ///
    /// Opening the stream is retried on rate limits only. Any failure after
    /// validation replaces the assistant message with a fallback text, emits
    /// exactly one error notice and is returned as [`TurnOutcome::Failed`].
    ///
    /// # Errors
    ///
    /// `Busy` while another turn is in flight, `Validation` for blank input,
    /// and storage errors while resolving the session id.
    pub async fn send_message(
        &mut self,
        input: &str,
        file_context: Option<String>,
        observer: &mut dyn ChatObserver,
    ) -> Result<TurnOutcome> {
        if self.state.is_in_flight() {
            return Err(Error::busy("a response is still streaming"));
        }
        let text = input.trim();
        if text.is_empty() {
            return Err(Error::validation(
                "message must not be empty",
                Some("message".to_string()),
            ));
        }
        let session_id = self.storage.session_id()?;

        let user = Message::user(text);
        self.store.push(user.clone());
        observer.message_appended(&user);
        let placeholder = Message::placeholder();
        let message_id = placeholder.id.clone();
        self.store.push(placeholder.clone());
        observer.message_appended(&placeholder);

        self.state = TurnState::Sending;
        self.in_flight = Some(message_id.clone());
        observer.loading_changed(true);
        CHAT_TURNS.click();

        let request = ChatRequest::new(text, session_id, message_id.clone())
            .with_file_context(file_context)
            .with_premium_model(self.use_premium_model);
        let retry = RetryConfig::new(self.config.max_retries, self.config.retry_base_delay)
            .with_should_retry(is_rate_limit_error)
            .with_delay_hint(retry_after_hint)
            .with_on_retry(|ctx| {
                tracing::info!(
                    attempt = ctx.attempt + 1,
                    delay_ms = ctx.delay.as_millis() as u64,
                    error = %ctx.last_error,
                    "rate limited; retrying chat request"
                );
            });

        let mut writer = TurnWriter {
            store: &mut self.store,
            state: &mut self.state,
            message_id: &message_id,
            observer: &mut *observer,
        };
        let outcome = streaming::stream_message(
            &self.backend,
            &request,
            &mut writer,
            &retry,
            self.config.missing_terminal,
        )
        .await;

        self.in_flight = None;
        let outcome = match outcome {
            StreamOutcome::Completed { content, .. } => {
                self.state = TurnState::Succeeded;
                TurnOutcome::Completed {
                    message_id,
                    content,
                }
            }
            StreamOutcome::Failed(error) => {
                self.state = TurnState::Failed;
                let category = self.fail_turn(&message_id, &error, observer);
                TurnOutcome::Failed {
                    message_id,
                    category,
                    error,
                }
            }
        };
        observer.loading_changed(false);
        Ok(outcome)
    }

    fn fail_turn(
        &mut self,
        message_id: &str,
        error: &Error,
        observer: &mut dyn ChatObserver,
    ) -> ErrorCategory {
        CHAT_TURN_FAILURES.click();
        if let Some(message) = self.store.set_content(message_id, FALLBACK_RESPONSE) {
            observer.message_updated(message);
        }
        let category = ErrorCategory::classify(error);
        tracing::error!(
            message_id,
            category = %category,
            status = ?error.status_code(),
            error = %error,
            "chat turn failed"
        );
        observer.notify(&Notice::for_category(category));
        category
    }

    /// Repairs the conversation after a turn was abandoned mid-flight.
    ///
    /// The abandoned assistant message receives the fallback text and the
    /// session returns to idle. Returns false when there was nothing to repair.
    pub fn recover(&mut self, observer: &mut dyn ChatObserver) -> bool {
        let Some(message_id) = self.in_flight.take() else {
            return false;
        };
        tracing::warn!(message_id = %message_id, "recovering abandoned turn");
        CHAT_TURN_FAILURES.click();
        if let Some(message) = self.store.set_content(&message_id, FALLBACK_RESPONSE) {
            observer.message_updated(message);
        }
        self.state = TurnState::Idle;
        observer.loading_changed(false);
        true
    }

    /// Removes every message.
    pub fn clear(&mut self) -> Result<()> {
        if self.state.is_in_flight() {
            return Err(Error::busy("cannot clear while a response is streaming"));
        }
        self.store.clear();
        self.state = TurnState::Idle;
        Ok(())
    }

    /// Rates an assistant message and reports it to the backend.
    ///
    /// While the backend reports the message as not yet stored, submission is
    /// retried on the configured steps. One info notice announces the wait;
    /// the result is a success or an error notice. Backend failures never
    /// surface as errors.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown ids, `Validation` for messages not written by
    /// the assistant.
    pub async fn submit_feedback(
        &mut self,
        message_id: &str,
        feedback: FeedbackType,
        observer: &mut dyn ChatObserver,
    ) -> Result<()> {
        match self.store.get(message_id) {
            None => {
                return Err(Error::not_found(
                    "no such message",
                    Some(message_id.to_string()),
                ));
            }
            Some(message) if !message.is_assistant() => {
                return Err(Error::validation(
                    "only assistant messages take feedback",
                    Some("message_id".to_string()),
                ));
            }
            Some(_) => {}
        }
        if let Some(message) = self.store.set_feedback(message_id, feedback) {
            observer.message_updated(message);
        }
        CHAT_FEEDBACK_SUBMISSIONS.click();

        let request = FeedbackRequest {
            message_id: message_id.to_string(),
            feedback_type: feedback,
        };
        let retry = RetryConfig::stepped(self.config.feedback_retry_steps.clone())
            .with_should_retry(Error::is_pending);
        let (pending_tx, mut pending_rx) = mpsc::unbounded_channel::<()>();
        let backend = &self.backend;
        let request = &request;
        let submit = with_retry(
            || {
                let pending = pending_tx.clone();
                async move {
                    let response = backend.submit_feedback(request).await?;
                    if response.is_pending() {
                        CHAT_FEEDBACK_PENDING.click();
                        _ = pending.send(());
                        return Err(Error::pending("message is not stored yet"));
                    }
                    Ok(response)
                }
            },
            &retry,
        );
        let mut submit = std::pin::pin!(submit);

        let mut announced = false;
        let result = loop {
            tokio::select! {
                biased;
                Some(()) = pending_rx.recv(), if !announced => {
                    announced = true;
                    observer.notify(&pending_notice());
                }
                result = &mut submit => break result,
            }
        };
        if !announced && pending_rx.try_recv().is_ok() {
            observer.notify(&pending_notice());
        }

        match result {
            Ok(_) => {
                tracing::debug!(message_id, ?feedback, "feedback stored");
                observer.notify(&Notice::success(
                    "Dziękujemy za opinię",
                    "Twoja ocena została zapisana.",
                ));
            }
            Err(err) => {
                tracing::error!(message_id, error = %err, "feedback submission failed");
                observer.notify(&Notice::error(
                    "Nie udało się zapisać opinii",
                    "Spróbuj ponownie za chwilę.",
                ));
            }
        }
        Ok(())
    }

    /// Publishes the conversation and returns its share identifier.
    pub async fn share(&self) -> Result<String> {
        if self.store.is_empty() {
            return Err(Error::validation("nothing to share", None));
        }
        let share_id = self.backend.share_conversation(self.store.messages()).await?;
        tracing::info!(share_id = %share_id, messages = self.store.len(), "conversation shared");
        Ok(share_id)
    }

    /// Replaces the conversation with a shared one.
    pub async fn open_shared(&mut self, share_id: &str) -> Result<usize> {
        if self.state.is_in_flight() {
            return Err(Error::busy("cannot replace the conversation while streaming"));
        }
        let shared = self.backend.shared_conversation(share_id).await?;
        self.store.clear();
        for message in shared.messages {
            self.store.push(message);
        }
        self.state = TurnState::Idle;
        Ok(self.store.len())
    }

    /// Switches the premium model on or off.
    ///
    /// # Errors
    ///
    /// `Permission` when enabling without the unlock flag.
    pub fn set_premium_model(&mut self, enabled: bool) -> Result<()> {
        if enabled && !self.storage.premium_unlocked() {
            return Err(Error::permission("premium model is locked"));
        }
        self.use_premium_model = enabled;
        Ok(())
    }

    /// Persists the premium unlock flag.
    pub fn unlock_premium(&mut self) -> Result<()> {
        self.storage.set_premium_unlocked(true)
    }

    /// Returns true if turns request the premium model.
    pub fn premium_model(&self) -> bool {
        self.use_premium_model
    }

    /// Returns the messages, oldest first.
    pub fn messages(&self) -> &[Message] {
        self.store.messages()
    }

    /// Returns the newest assistant message.
    pub fn last_assistant(&self) -> Option<&Message> {
        self.store.last_assistant()
    }

    /// Returns true while a turn is in flight.
    pub fn is_loading(&self) -> bool {
        self.state.is_in_flight()
    }

    /// Returns the state of the current or last turn.
    pub fn state(&self) -> TurnState {
        self.state
    }

    /// Returns the persisted session id, creating it on first use.
    pub fn session_id(&mut self) -> Result<String> {
        self.storage.session_id()
    }

    /// Returns the session storage.
    pub fn storage(&self) -> &SessionStorage {
        &self.storage
    }

    /// Returns the session storage for mutation.
    pub fn storage_mut(&mut self) -> &mut SessionStorage {
        &mut self.storage
    }

    /// Returns the active configuration.
    pub fn config(&self) -> &ChatConfig {
        &self.config
    }
}

fn pending_notice() -> Notice {
    Notice::info(
        "Zapisywanie opinii",
        "Odpowiedź jest jeszcze zapisywana. Ponawiamy próbę.",
    )
}

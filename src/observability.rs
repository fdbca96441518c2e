use biometrics::{Collector, Counter, Moments};

pub(crate) static CLIENT_REQUESTS: Counter = Counter::new("mecenas.client.requests");
pub(crate) static CLIENT_REQUEST_ERRORS: Counter = Counter::new("mecenas.client.request_errors");
pub(crate) static CLIENT_REQUEST_RETRIES: Counter = Counter::new("mecenas.client.retries");
pub(crate) static CLIENT_RETRY_BACKOFF: Moments =
    Moments::new("mecenas.client.retry_backoff_seconds");

pub(crate) static STREAM_EVENTS: Counter = Counter::new("mecenas.stream.events");
pub(crate) static STREAM_ERRORS: Counter = Counter::new("mecenas.stream.errors");
pub(crate) static STREAM_BYTES: Counter = Counter::new("mecenas.stream.bytes");
pub(crate) static STREAM_MALFORMED_FRAMES: Counter =
    Counter::new("mecenas.stream.malformed_frames");
pub(crate) static STREAM_IMPLICIT_COMPLETIONS: Counter =
    Counter::new("mecenas.stream.implicit_completions");
pub(crate) static STREAM_DURATION: Moments = Moments::new("mecenas.stream.duration_seconds");

pub(crate) static CHAT_TURNS: Counter = Counter::new("mecenas.chat.turns");
pub(crate) static CHAT_TURN_FAILURES: Counter = Counter::new("mecenas.chat.turn_failures");
pub(crate) static CHAT_FEEDBACK_SUBMISSIONS: Counter =
    Counter::new("mecenas.chat.feedback_submissions");
pub(crate) static CHAT_FEEDBACK_PENDING: Counter = Counter::new("mecenas.chat.feedback_pending");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&CLIENT_REQUESTS);
    collector.register_counter(&CLIENT_REQUEST_ERRORS);
    collector.register_counter(&CLIENT_REQUEST_RETRIES);
    collector.register_moments(&CLIENT_RETRY_BACKOFF);

    collector.register_counter(&STREAM_EVENTS);
    collector.register_counter(&STREAM_ERRORS);
    collector.register_counter(&STREAM_BYTES);
    collector.register_counter(&STREAM_MALFORMED_FRAMES);
    collector.register_counter(&STREAM_IMPLICIT_COMPLETIONS);
    collector.register_moments(&STREAM_DURATION);

    collector.register_counter(&CHAT_TURNS);
    collector.register_counter(&CHAT_TURN_FAILURES);
    collector.register_counter(&CHAT_FEEDBACK_SUBMISSIONS);
    collector.register_counter(&CHAT_FEEDBACK_PENDING);
}

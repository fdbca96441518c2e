//! Newline-delimited JSON framing for streamed assistant responses.
//!
//! The backend writes one JSON object per line. The transport is free to split
//! or merge lines arbitrarily, so bytes are buffered until a full line is
//! available; multi-byte UTF-8 sequences split across reads are reassembled
//! before decoding. For compatibility with SSE-style proxies, `data:` prefixes,
//! `event:` lines, `:` comments, blank lines and the `[DONE]` marker are
//! tolerated.

use std::pin::Pin;

use bytes::{Bytes, BytesMut};
use futures::stream::{self, Stream, StreamExt};
use tokio_util::codec::Decoder;

use crate::observability::{STREAM_BYTES, STREAM_MALFORMED_FRAMES};
use crate::{Error, Result, StreamEvent};

/// Frames longer than this are treated as a protocol violation.
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 1 << 20;

/// A boxed stream of decoded events.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

/// Decodes newline-delimited [`StreamEvent`] frames.
///
/// Malformed frames are skipped with a warning rather than failing the stream.
#[derive(Debug, Clone)]
pub struct FrameDecoder {
    next_index: usize,
    max_frame_length: usize,
}

impl FrameDecoder {
    /// Create a decoder with the default frame length limit.
    pub fn new() -> Self {
        Self::with_max_frame_length(DEFAULT_MAX_FRAME_LENGTH)
    }

    /// Create a decoder that rejects frames longer than `max_frame_length` bytes.
    pub fn with_max_frame_length(max_frame_length: usize) -> Self {
        Self {
            next_index: 0,
            max_frame_length,
        }
    }

    fn check_length(&self, len: usize) -> Result<()> {
        if len > self.max_frame_length {
            return Err(Error::streaming(
                format!(
                    "frame exceeds maximum length of {} bytes",
                    self.max_frame_length
                ),
                None,
            ));
        }
        Ok(())
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameDecoder {
    type Item = StreamEvent;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<StreamEvent>> {
        loop {
            let Some(offset) = src[self.next_index..].iter().position(|b| *b == b'\n') else {
                // Only scan the new bytes next time.
                self.next_index = src.len();
                self.check_length(src.len())?;
                return Ok(None);
            };
            let line = src.split_to(self.next_index + offset + 1);
            self.next_index = 0;
            self.check_length(line.len() - 1)?;
            if let Some(event) = parse_frame(&line[..line.len() - 1]) {
                return Ok(Some(event));
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<StreamEvent>> {
        if let Some(event) = self.decode(src)? {
            return Ok(Some(event));
        }
        if src.iter().all(u8::is_ascii_whitespace) {
            src.clear();
            self.next_index = 0;
            return Ok(None);
        }
        // The last frame lacks its newline. Only JSON that stops short means
        // the connection closed mid-frame; anything else is parsed as a line.
        let rest = src.split_to(src.len());
        self.next_index = 0;
        match frame_payload(&rest) {
            Some(Ok(payload)) => match serde_json::from_str::<serde_json::Value>(payload) {
                Err(err) if err.is_eof() => Err(Error::truncated(format!(
                    "stream closed mid-frame after {} bytes: {err}",
                    rest.len()
                ))),
                _ => Ok(parse_frame(&rest)),
            },
            Some(Err(err)) => Err(Error::truncated(format!(
                "stream closed inside a UTF-8 sequence: {err}"
            ))),
            None => Ok(None),
        }
    }
}

/// Extract the JSON payload of a raw line, or `None` for lines that carry no frame.
fn frame_payload(line: &[u8]) -> Option<std::result::Result<&str, std::str::Utf8Error>> {
    let text = match std::str::from_utf8(line) {
        Ok(text) => text,
        Err(err) => return Some(Err(err)),
    };
    let text = text.trim();
    if text.is_empty() || text.starts_with(':') || text.starts_with("event:") {
        return None;
    }
    let text = text.strip_prefix("data:").map(str::trim).unwrap_or(text);
    if text.is_empty() {
        return None;
    }
    Some(Ok(text))
}

/// Parse one complete line into an event, logging and skipping malformed frames.
fn parse_frame(line: &[u8]) -> Option<StreamEvent> {
    let payload = match frame_payload(line)? {
        Ok(payload) => payload,
        Err(err) => {
            STREAM_MALFORMED_FRAMES.click();
            tracing::warn!(error = %err, "skipping frame with invalid UTF-8");
            return None;
        }
    };
    if payload == "[DONE]" {
        return Some(StreamEvent::Complete { content: None });
    }
    match serde_json::from_str::<StreamEvent>(payload) {
        Ok(event) => Some(event),
        Err(err) => {
            STREAM_MALFORMED_FRAMES.click();
            tracing::warn!(error = %err, frame = %payload, "skipping malformed frame");
            None
        }
    }
}

struct FrameState<S> {
    bytes: S,
    decoder: FrameDecoder,
    buffer: BytesMut,
    eof: bool,
    failed: bool,
}

/// Process a stream of bytes into a stream of decoded events.
///
/// The returned stream ends after the first error; transport errors are passed
/// through unchanged.
pub fn process_frames<S>(byte_stream: S) -> EventStream
where
    S: Stream<Item = Result<Bytes>> + Send + Unpin + 'static,
{
    let state = FrameState {
        bytes: byte_stream,
        decoder: FrameDecoder::new(),
        buffer: BytesMut::new(),
        eof: false,
        failed: false,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        if state.failed {
            return None;
        }
        loop {
            let decoded = if state.eof {
                state.decoder.decode_eof(&mut state.buffer)
            } else {
                state.decoder.decode(&mut state.buffer)
            };
            match decoded {
                Ok(Some(event)) => return Some((Ok(event), state)),
                Ok(None) if state.eof => return None,
                Ok(None) => {}
                Err(err) => {
                    state.failed = true;
                    return Some((Err(err), state));
                }
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    STREAM_BYTES.count(chunk.len() as u64);
                    state.buffer.extend_from_slice(&chunk);
                }
                Some(Err(err)) => {
                    state.failed = true;
                    return Some((Err(err), state));
                }
                None => state.eof = true,
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn chunks(parts: Vec<Vec<u8>>) -> impl Stream<Item = Result<Bytes>> + Send + Unpin + 'static {
        stream::iter(parts.into_iter().map(|p| Ok(Bytes::from(p))))
    }

    async fn collect(parts: Vec<Vec<u8>>) -> Vec<Result<StreamEvent>> {
        process_frames(chunks(parts)).collect().await
    }

    const BODY: &str = concat!(
        "{\"type\":\"start\"}\n",
        "{\"type\":\"delta\",\"content\":\"Okres \"}\n",
        "{\"type\":\"delta\",\"content\":\"wypowiedzenia żółć\"}\n",
        "{\"type\":\"complete\"}\n",
    );

    fn expected() -> Vec<StreamEvent> {
        vec![
            StreamEvent::Start { message_id: None },
            StreamEvent::delta("Okres "),
            StreamEvent::delta("wypowiedzenia żółć"),
            StreamEvent::Complete { content: None },
        ]
    }

    fn unwrap_all(events: Vec<Result<StreamEvent>>) -> Vec<StreamEvent> {
        events.into_iter().map(|e| e.unwrap()).collect()
    }

    #[tokio::test]
    async fn test_single_chunk() {
        let events = collect(vec![BODY.as_bytes().to_vec()]).await;
        assert_eq!(unwrap_all(events), expected());
    }

    #[tokio::test]
    async fn test_one_byte_per_read() {
        let parts = BODY.as_bytes().iter().map(|b| vec![*b]).collect();
        let events = collect(parts).await;
        assert_eq!(unwrap_all(events), expected());
    }

    #[tokio::test]
    async fn test_uneven_splits() {
        let bytes = BODY.as_bytes();
        for split in [1, 7, 13, 29, 64] {
            let parts = bytes.chunks(split).map(|c| c.to_vec()).collect();
            let events = collect(parts).await;
            assert_eq!(unwrap_all(events), expected(), "split size {split}");
        }
    }

    #[tokio::test]
    async fn test_malformed_frame_is_skipped() {
        let body = "{\"type\":\"delta\",\"content\":\"a\"}\nnot json\n{\"type\":\"ping\"}\n{\"type\":\"complete\"}\n";
        let events = unwrap_all(collect(vec![body.as_bytes().to_vec()]).await);
        assert_eq!(
            events,
            vec![StreamEvent::delta("a"), StreamEvent::Complete { content: None }]
        );
    }

    #[tokio::test]
    async fn test_tolerates_sse_framing() {
        let body = ": keep-alive\nevent: delta\ndata: {\"type\":\"delta\",\"content\":\"x\"}\n\ndata: [DONE]\n\n";
        let events = unwrap_all(collect(vec![body.as_bytes().to_vec()]).await);
        assert_eq!(
            events,
            vec![StreamEvent::delta("x"), StreamEvent::Complete { content: None }]
        );
    }

    #[tokio::test]
    async fn test_crlf_line_endings() {
        let body = "{\"type\":\"delta\",\"content\":\"x\"}\r\n{\"type\":\"complete\"}\r\n";
        let events = unwrap_all(collect(vec![body.as_bytes().to_vec()]).await);
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn test_final_frame_without_newline() {
        let body = "{\"type\":\"delta\",\"content\":\"x\"}\n{\"type\":\"complete\"}";
        let events = unwrap_all(collect(vec![body.as_bytes().to_vec()]).await);
        assert_eq!(
            events,
            vec![StreamEvent::delta("x"), StreamEvent::Complete { content: None }]
        );
    }

    #[tokio::test]
    async fn test_unknown_final_frame_without_newline_is_skipped() {
        let body = "{\"type\":\"delta\",\"content\":\"a\"}\n{\"type\":\"ping\"}";
        let events = unwrap_all(collect(vec![body.as_bytes().to_vec()]).await);
        assert_eq!(events, vec![StreamEvent::delta("a")]);
    }

    #[tokio::test]
    async fn test_done_marker_without_newline() {
        let body = "data: {\"type\":\"delta\",\"content\":\"x\"}\n\ndata: [DONE]";
        let events = unwrap_all(collect(vec![body.as_bytes().to_vec()]).await);
        assert_eq!(
            events,
            vec![StreamEvent::delta("x"), StreamEvent::Complete { content: None }]
        );
    }

    #[tokio::test]
    async fn test_garbage_final_line_is_skipped() {
        let body = "{\"type\":\"delta\",\"content\":\"x\"}\nnot json";
        let events = unwrap_all(collect(vec![body.as_bytes().to_vec()]).await);
        assert_eq!(events, vec![StreamEvent::delta("x")]);
    }

    #[tokio::test]
    async fn test_closed_mid_frame_is_truncation() {
        let body = "{\"type\":\"delta\",\"content\":\"x\"}\n{\"type\":\"del";
        let mut events = collect(vec![body.as_bytes().to_vec()]).await;
        assert_eq!(events.len(), 2);
        let last = events.pop().unwrap();
        assert!(last.unwrap_err().is_truncated());
    }

    #[tokio::test]
    async fn test_transport_error_ends_stream() {
        let parts: Vec<Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"{\"type\":\"delta\",\"content\":\"x\"}\n")),
            Err(Error::streaming("connection reset", None)),
            Ok(Bytes::from_static(b"{\"type\":\"complete\"}\n")),
        ];
        let events: Vec<_> = process_frames(stream::iter(parts)).collect().await;
        assert_eq!(events.len(), 2);
        assert!(events[0].is_ok());
        assert!(events[1].is_err());
    }

    #[test]
    fn test_oversized_frame_is_rejected() {
        let mut decoder = FrameDecoder::with_max_frame_length(8);
        let mut buf = BytesMut::from(&b"{\"type\":\"delta\""[..]);
        assert!(decoder.decode(&mut buf).is_err());
    }

    #[test]
    fn test_oversized_frame_with_newline_is_rejected() {
        let mut decoder = FrameDecoder::with_max_frame_length(16);
        let mut buf = BytesMut::from(&b"{\"type\":\"delta\",\"content\":\"too long\"}\n"[..]);
        assert!(decoder.decode(&mut buf).is_err());

        let mut decoder = FrameDecoder::with_max_frame_length(20);
        let mut buf = BytesMut::from(&b"{\"type\":\"complete\"}\n"[..]);
        assert_eq!(
            decoder.decode(&mut buf).unwrap(),
            Some(StreamEvent::Complete { content: None })
        );
    }

    #[test]
    fn test_decoder_resumes_scan() {
        let mut decoder = FrameDecoder::new();
        let mut buf = BytesMut::from(&b"{\"type\":"[..]);
        assert!(decoder.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(b"\"complete\"}\n");
        assert_eq!(
            decoder.decode(&mut buf).unwrap(),
            Some(StreamEvent::Complete { content: None })
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn test_partial_frame_waits_for_more_bytes() {
        let bytes = stream::iter(vec![Ok(Bytes::from_static(
            b"{\"type\":\"delta\",\"content\":\"a\"}\n{\"type\":\"del",
        ))])
        .chain(stream::pending());
        let mut events = tokio_test::task::spawn(process_frames(bytes));
        let first = tokio_test::assert_ready!(events.poll_next());
        assert_eq!(first.unwrap().unwrap(), StreamEvent::delta("a"));
        tokio_test::assert_pending!(events.poll_next());
    }
}

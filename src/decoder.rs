//! Incremental stream decoder.
//!
//! Turns the raw byte stream of a streaming completion response into typed
//! delta events. The wire format is line-delimited JSON, optionally framed as
//! Server-Sent Events:
//!
//! ```text
//! data: {"choices":[{"delta":{"content":"Hel"}}]}
//! data: {"choices":[{"delta":{"content":"lo"}}]}
//! data: {"choices":[{"delta":{},"finish_reason":"stop"}]}
//! data: [DONE]
//! ```
//!
//! The decoder is a restartable state machine
//! (`AwaitingFirstByte → Streaming → Done`) fed arbitrary byte slices via
//! [`StreamDecoder::push`]. Byte-boundary independence is mandatory: HTTP
//! reads split lines (and multi-byte characters) at arbitrary positions, so
//! incoming bytes are appended to a raw buffer and only complete lines are
//! processed; the trailing partial line is retained for the next read.
//!
//! Per line: blanks are skipped, a `data: ` prefix is stripped, the `[DONE]`
//! sentinel terminates the stream without parsing, and anything else is
//! parsed as JSON. A parse failure on a single line is non-fatal: it is
//! logged and skipped, preserving partial progress against corrupt upstream
//! events. Parsed deltas accumulate into a cumulative buffer and every
//! emission carries the full content-so-far, never just the delta.
//!
//! If the underlying stream ends without a finish indicator,
//! [`StreamDecoder::finish`] still produces the terminal event with whatever
//! content accumulated; nothing is dropped silently.

use crate::normalizer::strip_think_tags;
use crate::types::StreamChunk;

/// Decoder state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    /// No bytes observed yet
    AwaitingFirstByte,
    /// At least one byte observed, terminal condition not yet reached
    Streaming,
    /// Terminal: `[DONE]`, a finish indicator, or end-of-stream was seen
    Done,
}

/// Typed event produced by the decoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeEvent {
    /// A delta arrived; carries the cumulative content so far
    Content(String),
    /// Terminal event; carries the final content, think-tags stripped
    Done(String),
}

/// Restartable incremental parser for streaming completion bodies.
///
/// One decoder instance serves one response body. Feed it reads with
/// [`push`](Self::push) and call [`finish`](Self::finish) at end-of-stream.
pub struct StreamDecoder {
    state: DecoderState,
    /// Raw bytes of the trailing partial line
    buffer: Vec<u8>,
    /// Concatenation of all content deltas observed so far
    cumulative: String,
}

impl Default for StreamDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self {
            state: DecoderState::AwaitingFirstByte,
            buffer: Vec::new(),
            cumulative: String::new(),
        }
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// Content accumulated so far (un-normalized)
    pub fn cumulative(&self) -> &str {
        &self.cumulative
    }

    /// Feed one read's worth of bytes; returns the events it completed.
    ///
    /// Bytes arriving after the terminal state are discarded.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<DecodeEvent> {
        if self.state == DecoderState::Done {
            return Vec::new();
        }
        if self.state == DecoderState::AwaitingFirstByte && !bytes.is_empty() {
            self.state = DecoderState::Streaming;
        }

        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            // Complete lines only, so a split multi-byte character can only
            // sit in the retained partial, never inside this conversion.
            let line = String::from_utf8_lossy(&line[..line.len() - 1]);
            self.process_line(line.trim_end_matches('\r'), &mut events);
            if self.state == DecoderState::Done {
                self.buffer.clear();
                break;
            }
        }

        events
    }

    /// Signal end-of-stream.
    ///
    /// Processes any retained partial line, then emits the terminal event if
    /// no finish indicator was ever observed. Returns `None` when the stream
    /// already terminated.
    pub fn finish(&mut self) -> Option<DecodeEvent> {
        if self.state == DecoderState::Done {
            return None;
        }

        let mut events = Vec::new();
        if !self.buffer.is_empty() {
            let remainder = String::from_utf8_lossy(&self.buffer).into_owned();
            self.buffer.clear();
            self.process_line(remainder.trim_end_matches('\r'), &mut events);
        }

        match events.pop() {
            Some(done @ DecodeEvent::Done(_)) => Some(done),
            _ => {
                self.state = DecoderState::Done;
                Some(DecodeEvent::Done(strip_think_tags(&self.cumulative)))
            }
        }
    }

    fn process_line(&mut self, line: &str, events: &mut Vec<DecodeEvent>) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }

        let payload = line.strip_prefix("data: ").unwrap_or(line);

        if payload == "[DONE]" {
            self.state = DecoderState::Done;
            events.push(DecodeEvent::Done(strip_think_tags(&self.cumulative)));
            return;
        }

        let chunk: StreamChunk = match serde_json::from_str(payload) {
            Ok(chunk) => chunk,
            Err(e) => {
                // Non-fatal: tolerate partial or corrupt upstream events
                log::debug!("skipping unparseable stream line: {e}: {payload:?}");
                return;
            }
        };

        let Some(choice) = chunk.choices.first() else {
            return;
        };

        if let Some(content) = choice.delta.content.as_deref() {
            if !content.is_empty() {
                self.cumulative.push_str(content);
                events.push(DecodeEvent::Content(self.cumulative.clone()));
            }
        }

        if choice.finish_reason.is_some() {
            self.state = DecoderState::Done;
            events.push(DecodeEvent::Done(strip_think_tags(&self.cumulative)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let decoder = StreamDecoder::new();
        assert_eq!(decoder.state(), DecoderState::AwaitingFirstByte);
        assert_eq!(decoder.cumulative(), "");
    }

    #[test]
    fn test_split_line_recombination() {
        // A JSON fragment's line arrives split across two reads
        let mut decoder = StreamDecoder::new();

        let events = decoder.push(b"data: {\"choices\":[{\"delta\":{\"content\":\"Hel");
        assert!(events.is_empty());
        assert_eq!(decoder.state(), DecoderState::Streaming);

        let events = decoder.push(b"lo\"}}]}\n");
        assert_eq!(events, vec![DecodeEvent::Content("Hello".to_string())]);
    }

    #[test]
    fn test_done_sentinel_terminates() {
        let mut decoder = StreamDecoder::new();
        let events = decoder.push(b"[DONE]\n");
        assert_eq!(events, vec![DecodeEvent::Done(String::new())]);
        assert_eq!(decoder.state(), DecoderState::Done);

        // No further events after the terminal state
        let events = decoder.push(b"data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n");
        assert!(events.is_empty());
    }

    #[test]
    fn test_data_prefixed_done_sentinel() {
        let mut decoder = StreamDecoder::new();
        decoder.push(b"data: {\"choices\":[{\"delta\":{\"content\":\"hi\"}}]}\n");
        let events = decoder.push(b"data: [DONE]\n");
        assert_eq!(events, vec![DecodeEvent::Done("hi".to_string())]);
    }

    #[test]
    fn test_cumulative_content_is_prefix_extending() {
        let mut decoder = StreamDecoder::new();
        let mut previous = String::new();

        for delta in ["One", " two", " three"] {
            let line =
                format!("data: {{\"choices\":[{{\"delta\":{{\"content\":\"{delta}\"}}}}]}}\n");
            let events = decoder.push(line.as_bytes());
            assert_eq!(events.len(), 1);
            match &events[0] {
                DecodeEvent::Content(cumulative) => {
                    assert!(cumulative.starts_with(&previous));
                    assert!(cumulative.len() > previous.len());
                    previous = cumulative.clone();
                }
                other => panic!("expected Content, got {other:?}"),
            }
        }

        assert_eq!(previous, "One two three");
    }

    #[test]
    fn test_finish_reason_emits_terminal_event() {
        let mut decoder = StreamDecoder::new();
        decoder.push(b"{\"choices\":[{\"delta\":{\"content\":\"answer\"}}]}\n");
        let events = decoder.push(b"{\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n");
        assert_eq!(events, vec![DecodeEvent::Done("answer".to_string())]);
        assert_eq!(decoder.state(), DecoderState::Done);
    }

    #[test]
    fn test_content_and_finish_in_one_line() {
        let mut decoder = StreamDecoder::new();
        let events = decoder.push(
            b"{\"choices\":[{\"delta\":{\"content\":\"all\"},\"finish_reason\":\"stop\"}]}\n",
        );
        assert_eq!(
            events,
            vec![
                DecodeEvent::Content("all".to_string()),
                DecodeEvent::Done("all".to_string()),
            ]
        );
    }

    #[test]
    fn test_unparseable_line_is_skipped() {
        let mut decoder = StreamDecoder::new();
        decoder.push(b"{\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n");
        let events = decoder.push(b"{{{{ garbage\n");
        assert!(events.is_empty());
        assert_eq!(decoder.state(), DecoderState::Streaming);

        // Stream continues normally afterwards
        let events = decoder.push(b"{\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\n");
        assert_eq!(events, vec![DecodeEvent::Content("ab".to_string())]);
    }

    #[test]
    fn test_blank_lines_skipped() {
        let mut decoder = StreamDecoder::new();
        let events = decoder.push(b"\n\r\n  \n");
        assert!(events.is_empty());
    }

    #[test]
    fn test_eof_without_finish_still_terminates_with_content() {
        let mut decoder = StreamDecoder::new();
        decoder.push(b"{\"choices\":[{\"delta\":{\"content\":\"partial\"}}]}\n");

        let terminal = decoder.finish();
        assert_eq!(terminal, Some(DecodeEvent::Done("partial".to_string())));
        assert_eq!(decoder.state(), DecoderState::Done);

        // finish is idempotent
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn test_finish_processes_retained_partial_line() {
        // Final line arrives without a trailing newline
        let mut decoder = StreamDecoder::new();
        decoder.push(b"{\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n");
        decoder.push(b"{\"choices\":[{\"delta\":{\"content\":\"b\"}}]}");

        let terminal = decoder.finish();
        assert_eq!(terminal, Some(DecodeEvent::Done("ab".to_string())));
    }

    #[test]
    fn test_terminal_content_is_think_stripped() {
        let mut decoder = StreamDecoder::new();
        let events = decoder.push(
            b"{\"choices\":[{\"delta\":{\"content\":\"<think>ignored</think>Visible answer\"},\"finish_reason\":\"stop\"}]}\n",
        );
        // Chunk events carry the raw cumulative; the terminal event is normalized
        assert_eq!(
            events,
            vec![
                DecodeEvent::Content("<think>ignored</think>Visible answer".to_string()),
                DecodeEvent::Done("Visible answer".to_string()),
            ]
        );
    }

    #[test]
    fn test_multiple_lines_in_one_read() {
        let mut decoder = StreamDecoder::new();
        let body = b"data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\ndata: {\"choices\":[{\"delta\":{\"content\":\"y\"}}]}\ndata: [DONE]\n";
        let events = decoder.push(body);
        assert_eq!(
            events,
            vec![
                DecodeEvent::Content("x".to_string()),
                DecodeEvent::Content("y".to_string()),
                DecodeEvent::Done("xy".to_string()),
            ]
        );
    }

    #[test]
    fn test_split_multibyte_character_across_reads() {
        // "é" is 0xC3 0xA9; split it across two pushes inside one line
        let mut decoder = StreamDecoder::new();
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"caf\u{e9}\"}}]}\n".as_bytes();
        let split = line.len() - 8; // inside the multi-byte sequence region
        decoder.push(&line[..split]);
        let events = decoder.push(&line[split..]);
        assert_eq!(events, vec![DecodeEvent::Content("caf\u{e9}".to_string())]);
    }
}

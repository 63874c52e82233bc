//! Incremental SSE (Server-Sent Events) decoder for streaming completions.
//!
//! [`SseDecoder`] turns an unbounded byte stream into a sequence of
//! [`StreamEvent`] values, per SSE framing:
//!
//! ```text
//! data: {"choices":[{"delta":{"content":"Hello"},...}],...}
//!
//! data: {"choices":[{"delta":{"content":" world"},...}],...}
//!
//! data: [DONE]
//! ```
//!
//! Bytes are accumulated and split strictly at `\n` (a trailing `\r` is
//! stripped), so decoding is correct for any fragmentation of the input,
//! including reads that split a line or a multi-byte UTF-8 character. A
//! blank line terminates an event block; the block's `data:` payloads are
//! joined with `\n` and parsed as JSON.
//!
//! Tolerance rules: comment (`:`) lines and event blocks whose payload is
//! not valid JSON are silently dropped. Payloads carrying a top-level
//! `error` field or a `finish_reason` of `"error"` raise
//! [`Error::StreamProtocol`] and halt decoding. After [`StreamEvent::Done`]
//! is emitted (from the `[DONE]` sentinel or end of input) no further
//! events are produced.

use crate::error::{Error, Result};

/// The sentinel payload that marks the end of an SSE stream.
const DONE_SENTINEL: &str = "[DONE]";

/// One decoded event from a streaming exchange.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A decoded JSON payload, typically an incremental completion delta.
    /// Usage-bearing chunks are delivered the same way.
    Chunk(serde_json::Value),
    /// End of stream. Always the final event; emitted exactly once.
    Done,
}

/// Incremental decoder state for one stream session.
///
/// Owned exclusively by one streaming call; never shared or restarted.
#[derive(Debug, Default)]
pub struct SseDecoder {
    /// Bytes of the current, not-yet-terminated line.
    line_buf: Vec<u8>,
    /// Completed lines of the current event block.
    event_lines: Vec<String>,
    /// Set once `Done` has been emitted or decoding has failed.
    finished: bool,
    /// A protocol error held back so that events decoded earlier in the
    /// same read are surfaced before it.
    pending_error: Option<Error>,
}

impl SseDecoder {
    /// Create a decoder with empty buffers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true once the decoder has emitted [`StreamEvent::Done`] or
    /// encountered a protocol error. Subsequent input is ignored.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Feed a read's worth of bytes and collect any completed events.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StreamProtocol`] if a decoded event carries an
    /// explicit error payload. The decoder is finished afterwards. Events
    /// that decoded successfully earlier in the same read are returned
    /// first; the error is then raised by the next `feed` or [`finish`]
    /// call, so the delivered events do not depend on how the input was
    /// fragmented into reads.
    ///
    /// [`finish`]: SseDecoder::finish
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<StreamEvent>> {
        if let Some(err) = self.pending_error.take() {
            return Err(err);
        }

        let mut events = Vec::new();
        if self.finished {
            return Ok(events);
        }

        for &byte in bytes {
            if byte != b'\n' {
                self.line_buf.push(byte);
                continue;
            }

            let line = self.take_line();
            match self.accept_line(&line) {
                Ok(Some(event)) => {
                    events.push(event);
                    if self.finished {
                        break;
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    if events.is_empty() {
                        return Err(err);
                    }
                    self.pending_error = Some(err);
                    break;
                }
            }
        }

        Ok(events)
    }

    /// Signal end of input: dispatch any pending partial event and, if the
    /// `[DONE]` sentinel never arrived, emit a final [`StreamEvent::Done`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::StreamProtocol`] if the pending event carries an
    /// explicit error payload, or if a prior [`feed`] call stashed one
    /// behind successfully decoded events.
    ///
    /// [`feed`]: SseDecoder::feed
    pub fn finish(&mut self) -> Result<Vec<StreamEvent>> {
        if let Some(err) = self.pending_error.take() {
            return Err(err);
        }

        let mut events = Vec::new();
        if self.finished {
            return Ok(events);
        }

        // A trailing line without a newline still counts.
        if !self.line_buf.is_empty() {
            let line = self.take_line();
            if !line.is_empty() {
                self.event_lines.push(line);
            }
        }
        if let Some(event) = self.dispatch()? {
            events.push(event);
        }

        if !self.finished {
            self.finished = true;
            events.push(StreamEvent::Done);
        }

        Ok(events)
    }

    /// Drain the line buffer into a string, stripping a trailing `\r`.
    fn take_line(&mut self) -> String {
        let mut bytes = std::mem::take(&mut self.line_buf);
        if bytes.last() == Some(&b'\r') {
            bytes.pop();
        }
        String::from_utf8_lossy(&bytes).into_owned()
    }

    /// Accumulate one completed line; a blank line dispatches the block.
    fn accept_line(&mut self, line: &str) -> Result<Option<StreamEvent>> {
        if line.is_empty() {
            return self.dispatch();
        }
        self.event_lines.push(line.to_string());
        Ok(None)
    }

    /// Dispatch the accumulated event block per SSE rules.
    fn dispatch(&mut self) -> Result<Option<StreamEvent>> {
        let lines = std::mem::take(&mut self.event_lines);

        // Comment lines are dropped before anything else; then collect the
        // data payloads (prefix stripped, one leading space trimmed).
        let data: Vec<&str> = lines
            .iter()
            .filter(|l| !l.starts_with(':'))
            .filter_map(|l| l.strip_prefix("data:"))
            .map(|p| p.strip_prefix(' ').unwrap_or(p))
            .collect();

        if data.is_empty() {
            return Ok(None);
        }

        if data.len() == 1 && data[0].trim() == DONE_SENTINEL {
            self.finished = true;
            return Ok(Some(StreamEvent::Done));
        }

        let payload = data.join("\n");
        let value: serde_json::Value = match serde_json::from_str(&payload) {
            Ok(v) => v,
            // Non-conforming producer fragment; tolerated, not surfaced.
            Err(_) => return Ok(None),
        };

        if let Some(err) = value.get("error") {
            self.finished = true;
            let message = err
                .get("message")
                .and_then(|m| m.as_str())
                .map(String::from)
                .or_else(|| err.as_str().map(String::from))
                .unwrap_or_else(|| err.to_string());
            return Err(Error::StreamProtocol(message));
        }

        if value["choices"][0]["finish_reason"] == "error" {
            self.finished = true;
            return Err(Error::StreamProtocol(
                "stream finished with error reason".into(),
            ));
        }

        Ok(Some(StreamEvent::Chunk(value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Run a full byte sequence through feed + finish.
    fn decode_all(input: &[u8]) -> Result<Vec<StreamEvent>> {
        let mut decoder = SseDecoder::new();
        let mut events = decoder.feed(input)?;
        events.extend(decoder.finish()?);
        Ok(events)
    }

    fn chunk_content(event: &StreamEvent) -> &str {
        match event {
            StreamEvent::Chunk(v) => v["choices"][0]["delta"]["content"].as_str().unwrap(),
            StreamEvent::Done => panic!("expected chunk, got Done"),
        }
    }

    // ── Happy path ──────────────────────────────────────────────────

    #[test]
    fn two_chunks_then_done() {
        let input = b"data: {\"choices\":[{\"delta\":{\"content\":\"Hello\"}}]}\n\n\
                      data: {\"choices\":[{\"delta\":{\"content\":\" world\"}}]}\n\n\
                      data: [DONE]\n\n";
        let events = decode_all(input).unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(chunk_content(&events[0]), "Hello");
        assert_eq!(chunk_content(&events[1]), " world");
        assert_eq!(events[2], StreamEvent::Done);
    }

    #[test]
    fn done_sentinel_stops_decoding_remaining_bytes() {
        let input = b"data: [DONE]\n\n\
                      data: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n\n";
        let events = decode_all(input).unwrap();
        assert_eq!(events, vec![StreamEvent::Done]);
    }

    #[test]
    fn done_without_space_after_colon() {
        let events = decode_all(b"data:[DONE]\n\n").unwrap();
        assert_eq!(events, vec![StreamEvent::Done]);
    }

    #[test]
    fn crlf_line_endings() {
        let input = b"data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\r\n\r\n\
                      data: [DONE]\r\n\r\n";
        let events = decode_all(input).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(chunk_content(&events[0]), "Hi");
        assert_eq!(events[1], StreamEvent::Done);
    }

    // ── Tolerance ───────────────────────────────────────────────────

    #[test]
    fn comment_lines_are_dropped() {
        let input = b": keep-alive\n\n\
                      data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n";
        let events = decode_all(input).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(chunk_content(&events[0]), "Hi");
    }

    #[test]
    fn comment_inside_event_block_is_ignored() {
        let input = b": note\ndata: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n";
        let events = decode_all(input).unwrap();
        assert_eq!(chunk_content(&events[0]), "Hi");
    }

    #[test]
    fn malformed_json_is_silently_skipped() {
        let input = b"data: { not valid json \n\n\
                      data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n\n";
        let events = decode_all(input).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(chunk_content(&events[0]), "ok");
        assert_eq!(events[1], StreamEvent::Done);
    }

    #[test]
    fn event_without_data_lines_is_skipped() {
        let input = b"event: message\nid: 42\nretry: 1000\n\n\
                      data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n\n";
        let events = decode_all(input).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(chunk_content(&events[0]), "ok");
    }

    #[test]
    fn multiple_data_lines_joined_with_newline() {
        // A JSON object split across two data lines; the `\n` join lands
        // between tokens, where it is plain whitespace.
        let input = b"data: {\"a\":\ndata: 1}\n\n";
        let events = decode_all(input).unwrap();
        assert_eq!(
            events[0],
            StreamEvent::Chunk(serde_json::json!({"a": 1}))
        );
    }

    #[test]
    fn usage_chunk_delivered_normally() {
        let input = b"data: {\"choices\":[],\"usage\":{\"total_tokens\":15}}\n\n";
        let events = decode_all(input).unwrap();
        match &events[0] {
            StreamEvent::Chunk(v) => assert_eq!(v["usage"]["total_tokens"], 15),
            other => panic!("expected chunk, got {other:?}"),
        }
    }

    // ── Protocol errors ─────────────────────────────────────────────

    #[test]
    fn error_payload_raises_and_halts() {
        let mut decoder = SseDecoder::new();
        let err = decoder
            .feed(b"data: {\"error\":{\"message\":\"boom\"}}\n\n")
            .unwrap_err();
        assert!(matches!(err, Error::StreamProtocol(_)));
        assert!(err.to_string().contains("boom"));

        // Nothing more comes out after the error.
        let after = decoder
            .feed(b"data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n\n")
            .unwrap();
        assert!(after.is_empty());
        assert!(decoder.finish().unwrap().is_empty());
    }

    #[test]
    fn chunk_before_error_in_same_read_is_surfaced() {
        let input = b"data: {\"choices\":[{\"delta\":{\"content\":\"partial\"}}]}\n\n\
                      data: {\"error\":{\"message\":\"boom\"}}\n\n";
        let mut decoder = SseDecoder::new();

        let events = decoder.feed(input).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(chunk_content(&events[0]), "partial");
        assert!(decoder.is_finished());

        // The stashed failure surfaces on the next call, exactly once.
        let err = decoder.feed(b"").unwrap_err();
        assert!(matches!(err, Error::StreamProtocol(_)));
        assert!(err.to_string().contains("boom"));
        assert!(decoder.feed(b"data: [DONE]\n\n").unwrap().is_empty());
        assert!(decoder.finish().unwrap().is_empty());
    }

    #[test]
    fn stashed_error_surfaces_through_finish() {
        let input = b"data: {\"choices\":[{\"delta\":{\"content\":\"partial\"}}]}\n\n\
                      data: {\"error\":{\"message\":\"boom\"}}\n\n";
        let mut decoder = SseDecoder::new();

        let events = decoder.feed(input).unwrap();
        assert_eq!(events.len(), 1);

        let err = decoder.finish().unwrap_err();
        assert!(err.to_string().contains("boom"));
        assert!(decoder.finish().unwrap().is_empty());
    }

    #[test]
    fn events_before_error_invariant_across_read_sizes() {
        let input: &[u8] = b"data: {\"choices\":[{\"delta\":{\"content\":\"partial\"}}]}\n\n\
                             data: {\"error\":{\"message\":\"boom\"}}\n\n\
                             data: {\"choices\":[{\"delta\":{\"content\":\"never\"}}]}\n\n";

        // Drain the way a stream session would: deliver events until the
        // error surfaces.
        let drain = |read_size: usize| {
            let mut decoder = SseDecoder::new();
            let mut delivered = Vec::new();
            for piece in input.chunks(read_size) {
                match decoder.feed(piece) {
                    Ok(events) => delivered.extend(events),
                    Err(err) => return (delivered, err.to_string()),
                }
            }
            match decoder.finish() {
                Ok(events) => {
                    delivered.extend(events);
                    (delivered, String::new())
                }
                Err(err) => (delivered, err.to_string()),
            }
        };

        let whole = drain(input.len());
        let sevens = drain(7);
        let singles = drain(1);

        assert_eq!(whole.0.len(), 1);
        assert_eq!(chunk_content(&whole.0[0]), "partial");
        assert!(whole.1.contains("boom"));
        assert_eq!(whole, sevens);
        assert_eq!(whole, singles);
    }

    #[test]
    fn error_payload_as_plain_string() {
        let err = decode_all(b"data: {\"error\":\"quota exceeded\"}\n\n").unwrap_err();
        assert!(err.to_string().contains("quota exceeded"));
    }

    #[test]
    fn error_finish_reason_raises() {
        let err =
            decode_all(b"data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"error\"}]}\n\n")
                .unwrap_err();
        assert!(matches!(err, Error::StreamProtocol(_)));
    }

    #[test]
    fn normal_finish_reason_is_a_chunk() {
        let input = b"data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n";
        let events = decode_all(input).unwrap();
        assert!(matches!(events[0], StreamEvent::Chunk(_)));
    }

    // ── End of input ────────────────────────────────────────────────

    #[test]
    fn finish_emits_done_when_sentinel_missing() {
        let mut decoder = SseDecoder::new();
        let events = decoder
            .feed(b"data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n")
            .unwrap();
        assert_eq!(events.len(), 1);

        let tail = decoder.finish().unwrap();
        assert_eq!(tail, vec![StreamEvent::Done]);
    }

    #[test]
    fn finish_is_idempotent() {
        let mut decoder = SseDecoder::new();
        assert_eq!(decoder.finish().unwrap(), vec![StreamEvent::Done]);
        assert!(decoder.finish().unwrap().is_empty());
    }

    #[test]
    fn finish_does_not_duplicate_done_after_sentinel() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(b"data: [DONE]\n\n").unwrap();
        assert_eq!(events, vec![StreamEvent::Done]);
        assert!(decoder.finish().unwrap().is_empty());
    }

    #[test]
    fn pending_event_flushed_at_end_of_input() {
        // No trailing blank line, no trailing newline at all.
        let mut decoder = SseDecoder::new();
        assert!(
            decoder
                .feed(b"data: {\"choices\":[{\"delta\":{\"content\":\"tail\"}}]}")
                .unwrap()
                .is_empty()
        );

        let events = decoder.finish().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(chunk_content(&events[0]), "tail");
        assert_eq!(events[1], StreamEvent::Done);
    }

    #[test]
    fn pending_done_sentinel_flushed_at_end_of_input() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"data: [DONE]").unwrap().is_empty());
        let events = decoder.finish().unwrap();
        assert_eq!(events, vec![StreamEvent::Done]);
    }

    // ── Read-boundary invariance ────────────────────────────────────

    fn decode_in_reads(input: &[u8], read_size: usize) -> Vec<StreamEvent> {
        let mut decoder = SseDecoder::new();
        let mut events = Vec::new();
        for piece in input.chunks(read_size) {
            events.extend(decoder.feed(piece).unwrap());
        }
        events.extend(decoder.finish().unwrap());
        events
    }

    #[test]
    fn read_boundary_invariance() {
        let input: &[u8] = b"data: {\"choices\":[{\"delta\":{\"content\":\"Hello\"}}]}\n\n\
                             data: {\"choices\":[{\"delta\":{\"content\":\" world\"}}]}\n\n\
                             data: [DONE]\n\n";

        let whole = decode_in_reads(input, input.len());
        let sevens = decode_in_reads(input, 7);
        let singles = decode_in_reads(input, 1);

        assert_eq!(whole.len(), 3);
        assert_eq!(whole, sevens);
        assert_eq!(whole, singles);
    }

    #[test]
    fn read_boundary_invariance_multibyte_utf8() {
        // "héllo" -- the é spans two bytes, which size-1 reads will split.
        let input = "data: {\"choices\":[{\"delta\":{\"content\":\"héllo\"}}]}\n\ndata: [DONE]\n\n"
            .as_bytes();

        let whole = decode_in_reads(input, input.len());
        let singles = decode_in_reads(input, 1);

        assert_eq!(whole, singles);
        assert_eq!(chunk_content(&whole[0]), "héllo");
    }
}

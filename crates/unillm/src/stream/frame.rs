//! Incremental frame parser
//!
//! Turns a raw byte stream into decoded JSON frames. Works for SSE
//! (`event:`/`data:` framing) and for plain newline-delimited JSON without
//! configuration: only lines matching the SSE prefixes get special handling.
//!
//! Two buffers make this robust to arbitrary read boundaries:
//!
//! 1. a line buffer, so a line is only inspected once its newline arrives;
//! 2. a carry buffer, so a line that fails to parse is retried joined with the
//!    following lines instead of being dropped.

use crate::Result;
use crate::transport::ByteStream;
use futures::{Stream, StreamExt};
use serde_json::Value;
use tracing::{debug, warn};

const DATA_PREFIX: &str = "data:";
const EVENT_PREFIX: &str = "event:";
const DONE_SENTINEL: &str = "[DONE]";

/// Stateful decoder fed one network read at a time
#[derive(Debug, Default)]
pub struct FrameParser {
    /// Trailing bytes of an incomplete UTF-8 sequence
    utf8_tail: Vec<u8>,
    /// Text after the last newline seen
    line: String,
    /// Candidate lines that did not parse yet
    carry: String,
    done: bool,
}

impl FrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once a terminal frame or `[DONE]` has been seen
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed one read; returns the frames it completed, in order
    ///
    /// `is_terminal` is checked on every yielded frame; after the first
    /// terminal frame nothing more is produced.
    pub fn push(&mut self, chunk: &[u8], is_terminal: impl Fn(&Value) -> bool) -> Vec<Value> {
        if self.done {
            return Vec::new();
        }
        self.decode(chunk);

        let mut frames = Vec::new();
        while let Some(newline) = self.line.find('\n') {
            let line: String = self.line.drain(..=newline).collect();
            if let Some(frame) = self.accept_line(&line) {
                let terminal = is_terminal(&frame);
                frames.push(frame);
                if terminal {
                    self.done = true;
                }
            }
            if self.done {
                self.line.clear();
                break;
            }
        }
        frames
    }

    /// End of input: one last attempt on whatever is buffered
    ///
    /// A frame that still fails to parse is logged and dropped; a truncated
    /// final frame is not an error.
    pub fn finish(&mut self) -> Option<Value> {
        if self.done {
            return None;
        }
        self.done = true;

        if !self.utf8_tail.is_empty() {
            let tail = std::mem::take(&mut self.utf8_tail);
            self.line.push_str(&String::from_utf8_lossy(&tail));
        }
        let line = std::mem::take(&mut self.line);
        if let Some(frame) = self.accept_line(&line) {
            return Some(frame);
        }

        let leftover = std::mem::take(&mut self.carry);
        if !leftover.trim().is_empty() {
            warn!(
                bytes = leftover.len(),
                "Discarding incomplete frame at end of stream"
            );
        }
        None
    }

    fn decode(&mut self, chunk: &[u8]) {
        let mut bytes = std::mem::take(&mut self.utf8_tail);
        bytes.extend_from_slice(chunk);

        match std::str::from_utf8(&bytes) {
            Ok(text) => self.line.push_str(text),
            Err(e) => {
                let valid = e.valid_up_to();
                self.line.push_str(&String::from_utf8_lossy(&bytes[..valid]));
                match e.error_len() {
                    // incomplete sequence at the end: keep it for the next read
                    None => self.utf8_tail = bytes[valid..].to_vec(),
                    Some(_) => {
                        warn!("Invalid UTF-8 in stream, replacing");
                        self.line.push_str(&String::from_utf8_lossy(&bytes[valid..]));
                    }
                }
            }
        }
    }

    /// Classify one physical line and try to complete a frame with it
    fn accept_line(&mut self, raw: &str) -> Option<Value> {
        let line = raw.trim_end_matches(['\n', '\r']);
        if line.starts_with(EVENT_PREFIX) {
            return None;
        }
        let candidate = line
            .strip_prefix(DATA_PREFIX)
            .map_or(line, |data| data.strip_prefix(' ').unwrap_or(data));
        if candidate.trim().is_empty() {
            return None;
        }
        if candidate.trim() == DONE_SENTINEL {
            debug!("Stream sent [DONE]");
            self.done = true;
            return None;
        }

        if self.carry.is_empty() {
            return match serde_json::from_str(candidate) {
                Ok(frame) => Some(frame),
                Err(_) => {
                    self.carry.push_str(candidate);
                    None
                }
            };
        }

        let joined = format!("{}\n{candidate}", self.carry);
        if let Ok(frame) = serde_json::from_str(&joined) {
            self.carry.clear();
            return Some(frame);
        }
        // only a whole object may replace the carry; a bare `2` could be part of it
        if let Ok(frame @ Value::Object(_)) = serde_json::from_str::<Value>(candidate) {
            warn!(
                bytes = self.carry.len(),
                "Dropping unparsable stream data before a complete frame"
            );
            self.carry.clear();
            return Some(frame);
        }
        self.carry = joined;
        None
    }
}

/// Lift a byte stream into a lazy stream of decoded frames
///
/// The stream ends when the input ends, when `[DONE]` arrives, or right
/// after a frame for which `is_terminal` returns true. A transport error
/// mid-stream is yielded once and ends the sequence without the final
/// flush.
pub fn frames<F>(mut bytes: ByteStream, is_terminal: F) -> impl Stream<Item = Result<Value>> + Send
where
    F: Fn(&Value) -> bool + Send + 'static,
{
    async_stream::stream! {
        let mut parser = FrameParser::new();
        let mut failed = false;
        while let Some(chunk) = bytes.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    warn!(error = %e, "Stream read failed");
                    failed = true;
                    yield Err(e);
                    break;
                }
            };
            for frame in parser.push(&chunk, &is_terminal) {
                yield Ok(frame);
            }
            if parser.is_done() {
                debug!("Terminal frame seen, stopping read");
                break;
            }
        }
        if !failed {
            if let Some(frame) = parser.finish() {
                yield Ok(frame);
            }
        }
    }
}

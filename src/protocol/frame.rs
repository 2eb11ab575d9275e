//! Incremental decoder for the send stream's event frames

use super::types::StreamEvent;
use thiserror::Error;

/// Prefix that marks an event line
pub const EVENT_MARKER: &str = "data:";

/// Longest unterminated line the decoder buffers before giving up
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;

/// Hard decoder failures. Malformed lines are not errors; they are dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("Event frame exceeds {limit} bytes without a line terminator")]
    FrameTooLarge { limit: usize },
}

/// Turns arbitrarily split byte fragments into typed events.
///
/// Lines are split on `\n` over raw bytes, so a UTF-8 sequence cut by a
/// fragment boundary is reassembled before it is decoded. Once `end` has been
/// decoded the decoder is terminated and ignores any further input.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    terminated: bool,
    max_frame_bytes: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::with_limit(MAX_FRAME_BYTES)
    }

    pub fn with_limit(max_frame_bytes: usize) -> Self {
        Self {
            buffer: Vec::new(),
            terminated: false,
            max_frame_bytes,
        }
    }

    /// Feed one fragment and drain every event completed by it
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<StreamEvent>, FrameError> {
        let mut events = Vec::new();
        if self.terminated || bytes.is_empty() {
            return Ok(events);
        }

        // The pending line holds no terminator, so scanning starts at the new bytes
        let mut search_from = self.buffer.len();
        self.buffer.extend_from_slice(bytes);

        let mut consumed = 0;
        while let Some(offset) = self.buffer[search_from..].iter().position(|b| *b == b'\n') {
            let line_end = search_from + offset;
            let event = decode_line(&self.buffer[consumed..line_end]);
            consumed = line_end + 1;
            search_from = consumed;

            if let Some(event) = event {
                let is_end = matches!(event, StreamEvent::End);
                events.push(event);
                if is_end {
                    self.terminated = true;
                    if consumed < self.buffer.len() {
                        tracing::debug!(
                            trailing = self.buffer.len() - consumed,
                            "Ignoring bytes after end frame"
                        );
                    }
                    self.buffer.clear();
                    return Ok(events);
                }
            }
        }
        self.buffer.drain(..consumed);

        if self.buffer.len() > self.max_frame_bytes {
            self.terminated = true;
            self.buffer.clear();
            return Err(FrameError::FrameTooLarge {
                limit: self.max_frame_bytes,
            });
        }

        Ok(events)
    }

    /// Signal end of input. An unterminated trailing line is discarded.
    pub fn finish(&mut self) {
        if !self.terminated && !self.buffer.is_empty() {
            tracing::debug!(
                pending = self.buffer.len(),
                "Discarding unterminated line at end of stream"
            );
        }
        self.buffer.clear();
        self.terminated = true;
    }

    /// Whether an `end` frame (or end of input) has been seen
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Bytes of the partial line waiting for its terminator
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    /// Decode a complete payload in one shot
    pub fn decode_all(input: &str) -> Result<Vec<StreamEvent>, FrameError> {
        let mut decoder = Self::new();
        decoder.feed(input.as_bytes())
    }
}

fn decode_line(line: &[u8]) -> Option<StreamEvent> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    let Ok(text) = std::str::from_utf8(line) else {
        tracing::debug!(len = line.len(), "Dropping event line that is not UTF-8");
        return None;
    };
    let payload = text.strip_prefix(EVENT_MARKER)?.trim_start();

    match serde_json::from_str::<StreamEvent>(payload) {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::debug!(error = %e, "Dropping malformed event frame");
            None
        }
    }
}

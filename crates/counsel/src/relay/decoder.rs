//! Incremental decoder for the upstream event stream
//!
//! Consumes one line of upstream text at a time and produces at most one
//! content delta, independent of any network transport. The only state is
//! whether the terminal sentinel has been seen, plus a diagnostic counter of
//! discarded frames.
//!
//! Malformed-frame policy: a line that is not valid JSON, or whose expected
//! fields are absent, is discarded without terminating the stream. Upstream
//! providers emit keep-alive and partial frames; the decoder is tolerant
//! rather than strict.

use serde_json::Value;

/// The terminal sentinel marking end of a streamed response
const DONE_SENTINEL: &str = "[DONE]";

/// Outcome of decoding one line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameEvent {
    /// A content delta to forward to the caller
    Delta(String),
    /// The terminal sentinel - no further lines will produce output
    Done,
    /// Nothing to forward (blank line, keep-alive, malformed frame)
    Skip,
}

/// Line-at-a-time decoder for `data:`-framed upstream events
#[derive(Debug, Default)]
pub struct FrameDecoder {
    finished: bool,
    skipped: u64,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the terminal sentinel has been seen
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Number of malformed frames discarded so far. Diagnostic only; the
    /// caller-visible stream is unaffected.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Decode one line of upstream text.
    ///
    /// Once [`FrameEvent::Done`] has been returned, every subsequent line
    /// decodes to [`FrameEvent::Skip`].
    pub fn decode_line(&mut self, line: &str) -> FrameEvent {
        if self.finished {
            return FrameEvent::Skip;
        }

        let Some(payload) = line.trim().strip_prefix("data:") else {
            // Blank keep-alive lines and anything else without the prefix
            return FrameEvent::Skip;
        };
        let payload = payload.trim();

        if payload == DONE_SENTINEL {
            self.finished = true;
            return FrameEvent::Done;
        }

        let Ok(frame) = serde_json::from_str::<Value>(payload) else {
            self.skipped += 1;
            tracing::debug!(line = %payload, "Discarding malformed stream frame");
            return FrameEvent::Skip;
        };

        match frame["choices"][0]["delta"]["content"].as_str() {
            Some(delta) if !delta.is_empty() => FrameEvent::Delta(delta.to_string()),
            _ => FrameEvent::Skip,
        }
    }
}

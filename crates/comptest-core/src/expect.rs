//! The read-until primitive.
//!
//! Output chunks are sanitized as they arrive and appended to a text buffer.
//! [`Expecter::read_until`] searches that buffer for a literal pattern, pulling
//! more output from the channel until the pattern shows up, the deadline
//! passes, or the stream ends. A match consumes the buffer up to and including
//! the pattern; a timeout consumes nothing, so text that was already read is
//! still there for the next search.

use std::time::Duration;

use comptest_pty::OutputReceiver;
use comptest_vt::Sanitizer;
use tokio::time::Instant;

/// A successful search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    /// Text between the previous match and this one.
    pub before: String,
    pub matched: String,
}

/// How a bounded search ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    Matched(Match),
    /// The pattern did not appear in time. `pending` is a copy of the
    /// unconsumed buffer.
    TimedOut { pending: String },
    /// The output stream ended without the pattern appearing.
    Closed { pending: String },
}

pub struct Expecter {
    output: OutputReceiver,
    sanitizer: Sanitizer,
    buffer: String,
    closed: bool,
}

impl Expecter {
    pub fn new(output: OutputReceiver) -> Self {
        Self {
            output,
            sanitizer: Sanitizer::new(),
            buffer: String::new(),
            closed: false,
        }
    }

    /// Text read but not yet consumed by a match.
    pub fn pending(&self) -> &str {
        &self.buffer
    }

    /// Whether the output stream has ended.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Read until `pattern` appears or `timeout` elapses, whichever is first.
    pub async fn read_until(&mut self, pattern: &str, timeout: Duration) -> ReadOutcome {
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(m) = self.take_match(pattern) {
                return ReadOutcome::Matched(m);
            }
            if self.closed {
                return ReadOutcome::Closed {
                    pending: self.buffer.clone(),
                };
            }

            match tokio::time::timeout_at(deadline, self.output.recv()).await {
                Ok(Some(chunk)) => self.sanitizer.feed_into(&chunk, &mut self.buffer),
                Ok(None) => self.closed = true,
                Err(_) => {
                    // Output that raced the deadline still belongs to this search.
                    self.drain_ready();
                    if let Some(m) = self.take_match(pattern) {
                        return ReadOutcome::Matched(m);
                    }
                    return ReadOutcome::TimedOut {
                        pending: self.buffer.clone(),
                    };
                }
            }
        }
    }

    /// Pull in whatever output is already queued, without waiting.
    pub fn drain_ready(&mut self) {
        loop {
            match self.output.try_recv() {
                Ok(chunk) => self.sanitizer.feed_into(&chunk, &mut self.buffer),
                Err(tokio::sync::mpsc::error::TryRecvError::Empty) => return,
                Err(tokio::sync::mpsc::error::TryRecvError::Disconnected) => {
                    self.closed = true;
                    return;
                }
            }
        }
    }

    /// Throw away everything read so far, including output already queued.
    /// Returns what was dropped.
    pub fn discard(&mut self) -> String {
        self.drain_ready();
        std::mem::take(&mut self.buffer)
    }

    fn take_match(&mut self, pattern: &str) -> Option<Match> {
        let start = self.buffer.find(pattern)?;
        let before = self.buffer[..start].to_string();
        self.buffer.drain(..start + pattern.len());
        Some(Match {
            before,
            matched: pattern.to_string(),
        })
    }
}

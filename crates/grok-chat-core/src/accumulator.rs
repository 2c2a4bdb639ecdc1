use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::StreamFailure;
use crate::stream::{LineReader, ProtocolEvent, interpret};

/// Assistant reply under construction.
///
/// Only the accumulator mutates it; once `finished` is set every further
/// `apply` is a no-op.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccumulatedMessage {
    content: String,
    finished: bool,
    error_note: Option<String>,
    finish_reason: Option<String>,
}

impl AccumulatedMessage {
    /// Raw markdown-ish text received so far, annotations included.
    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// The most recent in-band or transport error, if any.
    pub fn error_note(&self) -> Option<&str> {
        self.error_note.as_deref()
    }

    /// Last `finish_reason` reported by the server. Diagnostic only.
    pub fn finish_reason(&self) -> Option<&str> {
        self.finish_reason.as_deref()
    }

    /// Folds one event into the message. Returns true when the content
    /// changed and the renderer should repaint.
    pub fn apply(&mut self, event: ProtocolEvent) -> bool {
        if self.finished {
            return false;
        }
        match event {
            ProtocolEvent::Delta {
                text,
                finish_reason,
            } => {
                self.content.push_str(&text);
                if let Some(reason) = finish_reason {
                    self.record_finish_reason(reason);
                }
                true
            }
            ProtocolEvent::Error { message } => {
                warn!(%message, "error reported inside stream");
                self.annotate("Stream Error", &message);
                true
            }
            ProtocolEvent::Finish { reason } => {
                self.record_finish_reason(reason);
                false
            }
            ProtocolEvent::Ignorable => false,
        }
    }

    fn record_finish_reason(&mut self, reason: String) {
        debug!(%reason, "stream reported finish reason");
        self.finish_reason = Some(reason);
    }

    fn annotate(&mut self, label: &str, message: &str) {
        self.content.push_str(&format!("\n\n--- {label}: {message} ---"));
        self.error_note = Some(message.to_string());
    }

    fn finalize(&mut self, failure: Option<&StreamFailure>) {
        if self.finished {
            return;
        }
        if let Some(failure) = failure {
            let note = match failure {
                StreamFailure::Transport { message } => message.clone(),
                StreamFailure::Cancelled => failure.to_string(),
            };
            self.annotate("Error reading stream", &note);
        }
        self.finished = true;
    }
}

/// Lifecycle of one streaming exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExchangeState {
    AwaitingFirstByte,
    Receiving,
    Finalized,
}

/// Couples a [`LineReader`] with the message it feeds.
///
/// Finalization consumes the assembler, so nothing can reach the message
/// after it has been handed off.
#[derive(Debug)]
pub struct StreamAssembler {
    reader: LineReader,
    message: AccumulatedMessage,
    state: ExchangeState,
}

impl Default for StreamAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamAssembler {
    pub fn new() -> Self {
        Self {
            reader: LineReader::new(),
            message: AccumulatedMessage::default(),
            state: ExchangeState::AwaitingFirstByte,
        }
    }

    pub fn state(&self) -> ExchangeState {
        self.state
    }

    pub fn message(&self) -> &AccumulatedMessage {
        &self.message
    }

    /// True once any error annotation has been appended.
    pub fn error_noted(&self) -> bool {
        self.message.error_note.is_some()
    }

    /// Frames a chunk into complete lines without interpreting them.
    ///
    /// Use with [`apply_line`](Self::apply_line) when the caller needs to
    /// notify someone after every individual fragment.
    pub fn frame(&mut self, chunk: &[u8]) -> Vec<String> {
        self.state = ExchangeState::Receiving;
        self.reader.feed(chunk)
    }

    /// Interprets one line and applies it. Returns the rerender flag.
    pub fn apply_line(&mut self, line: &str) -> bool {
        self.message.apply(interpret(line))
    }

    /// Frames and applies a whole chunk. Returns how many fragments changed
    /// the content.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> usize {
        self.frame(chunk)
            .iter()
            .filter(|line| self.message.apply(interpret(line)))
            .count()
    }

    /// Takes any unterminated trailing data as a final line.
    pub fn take_trailing_line(&mut self) -> Option<String> {
        std::mem::take(&mut self.reader).finish()
    }

    /// Marks the message finished after the transport closed or failed.
    ///
    /// Does not flush trailing data; call
    /// [`take_trailing_line`](Self::take_trailing_line) first, or use
    /// [`close`](Self::close) / [`fail`](Self::fail).
    pub fn finalize(mut self, failure: Option<&StreamFailure>) -> AccumulatedMessage {
        self.message.finalize(failure);
        self.state = ExchangeState::Finalized;
        self.message
    }

    /// Transport closed normally: flush the tail and finalize.
    pub fn close(mut self) -> AccumulatedMessage {
        if let Some(line) = self.take_trailing_line() {
            self.apply_line(&line);
        }
        self.finalize(None)
    }

    /// Transport failed: keep everything received, annotate, finalize.
    pub fn fail(mut self, failure: &StreamFailure) -> AccumulatedMessage {
        if let Some(line) = self.take_trailing_line() {
            self.apply_line(&line);
        }
        self.finalize(Some(failure))
    }
}

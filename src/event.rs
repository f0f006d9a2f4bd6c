//! Outbound notifications
//!
//! The worker reports everything through one ordered stream of
//! [`EngineEvent`]s: decoded frames, console text, poll start/finish and
//! state transitions. Console messages are the only error channel a
//! collaborator sees, so each one is also logged.

use std::fmt;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::info;

use crate::codec::{format_bits, format_registers, FormatSpec};
use crate::queue::PollRequest;

/// Poll engine lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EngineState {
    #[default]
    Idle,
    ConfiguringConnection,
    Polling,
    StoppingRequested,
    Finished,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::ConfiguringConnection => "configuring connection",
            Self::Polling => "polling",
            Self::StoppingRequested => "stopping",
            Self::Finished => "finished",
        })
    }
}

/// Raw words from one read, paired with the request that produced them.
///
/// Frames carry no identity: each one replaces whatever the consumer
/// rendered from the previous frame. A failed read yields an empty frame.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    pub request: PollRequest,
    /// Registers as read, or one 0/1 word per bit for coil reads
    pub words: Vec<u16>,
}

impl DecodedFrame {
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Display strings for the frame. Bit reads ignore `spec`.
    pub fn render(&self, spec: &FormatSpec) -> Vec<String> {
        if self.request.function.is_bit_access() {
            format_bits(&self.words)
        } else {
            format_registers(&self.words, spec)
        }
    }
}

/// A timestamped line for the collaborator's console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleMessage {
    pub timestamp: DateTime<Utc>,
    pub text: String,
}

impl ConsoleMessage {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            text: text.into(),
        }
    }
}

impl fmt::Display for ConsoleMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.timestamp.format("%H:%M:%S%.3f"), self.text)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Data(DecodedFrame),
    Message(ConsoleMessage),
    PollStarted,
    PollFinished,
    StateChanged(EngineState),
}

impl EngineEvent {
    /// Console text, if this is a message.
    pub fn message_text(&self) -> Option<&str> {
        match self {
            Self::Message(m) => Some(&m.text),
            _ => None,
        }
    }
}

/// Worker-side sender for [`EngineEvent`]s.
///
/// Sends never fail from the worker's point of view: once the consumer is
/// gone, events are discarded.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<EngineEvent>,
}

impl EventSink {
    pub fn new(tx: mpsc::UnboundedSender<EngineEvent>) -> Self {
        Self { tx }
    }

    /// A sink plus the receiving end.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn emit(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }

    pub fn message(&self, text: impl Into<String>) {
        let message = ConsoleMessage::new(text);
        info!("{}", message.text);
        self.emit(EngineEvent::Message(message));
    }

    pub fn data(&self, request: &PollRequest, words: Vec<u16>) {
        self.emit(EngineEvent::Data(DecodedFrame {
            request: request.clone(),
            words,
        }));
    }
}

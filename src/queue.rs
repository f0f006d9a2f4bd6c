//! Request queue and backpressure
//!
//! Work reaches the worker through two channels:
//!
//! | Channel | Capacity | When full |
//! |---------|----------|-----------|
//! | poll slot | 1 | [`EngineError::QueueFull`], pending request untouched |
//! | writes | unbounded | never |
//!
//! The poll slot is a bounded channel of capacity one, so the fullness check
//! and the insert are a single `try_send`. Writes are FIFO and only ever
//! drained by the worker.

use std::fmt;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::device_limits::DeviceLimits;
use crate::error::EngineError;
use crate::protocol::FunctionCode;

/// One read job: a single pass or a timed repeating poll.
///
/// `duration == 0` runs exactly one pass. `interval == 0` runs passes
/// back to back. An infinite duration polls until stopped.
#[derive(Debug, Clone, PartialEq)]
pub struct PollRequest {
    pub function: FunctionCode,
    pub start_address: u16,
    pub length: u16,
    /// Seconds between the starts of consecutive passes
    pub interval: f64,
    /// Seconds the loop keeps running
    pub duration: f64,
}

impl PollRequest {
    /// A single pass.
    pub fn single(function: FunctionCode, start_address: u16, length: u16) -> Self {
        Self {
            function,
            start_address,
            length,
            interval: 0.0,
            duration: 0.0,
        }
    }

    /// Poll until stopped, one pass every `interval` seconds.
    pub fn continuous(function: FunctionCode, start_address: u16, length: u16, interval: f64) -> Self {
        Self::single(function, start_address, length)
            .with_interval(interval)
            .with_duration(f64::INFINITY)
    }

    pub fn with_interval(mut self, interval: f64) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_duration(mut self, duration: f64) -> Self {
        self.duration = duration;
        self
    }

    /// Check the request against `limits` and convert its timing.
    pub fn plan(&self, limits: &DeviceLimits) -> Result<PollPlan, String> {
        limits.check(self.function, self.length as usize)?;
        check_range(self.start_address, self.length as usize)?;

        let interval = Duration::try_from_secs_f64(self.interval)
            .map_err(|_| format!("invalid interval {}", self.interval))?;
        let duration = if self.duration == f64::INFINITY {
            None
        } else {
            Some(
                Duration::try_from_secs_f64(self.duration)
                    .map_err(|_| format!("invalid duration {}", self.duration))?,
            )
        };

        Ok(PollPlan { interval, duration })
    }
}

impl fmt::Display for PollRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{function: {}, start: {}, length: {}, interval: {}s, duration: {}s}}",
            self.function.to_u8(),
            self.start_address,
            self.length,
            self.interval,
            self.duration
        )
    }
}

/// Validated timing of a poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPlan {
    pub interval: Duration,
    /// `None` polls until stopped
    pub duration: Option<Duration>,
}

impl PollPlan {
    /// Whether a poll that began at `started` has run past its duration.
    /// The bound is inclusive.
    pub fn is_expired(&self, started: Instant) -> bool {
        self.duration.is_some_and(|d| started.elapsed() > d)
    }
}

/// One write job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRequest {
    pub function: FunctionCode,
    pub start_address: u16,
    /// Register values, or coil states where non-zero is on
    pub values: Vec<u16>,
}

impl WriteRequest {
    pub fn coils(start_address: u16, states: &[bool]) -> Self {
        Self {
            function: FunctionCode::WriteMultipleCoils,
            start_address,
            values: states.iter().map(|&on| u16::from(on)).collect(),
        }
    }

    pub fn registers(start_address: u16, values: Vec<u16>) -> Self {
        Self {
            function: FunctionCode::WriteMultipleRegisters,
            start_address,
            values,
        }
    }

    /// Coil states, non-zero meaning on.
    pub fn coil_states(&self) -> Vec<bool> {
        self.values.iter().map(|&v| v != 0).collect()
    }

    pub fn validate(&self, limits: &DeviceLimits) -> Result<(), String> {
        if !self.function.is_write() {
            return Err(format!("{} is not a write function", self.function));
        }
        limits.check(self.function, self.values.len())?;
        check_range(self.start_address, self.values.len())
    }
}

impl fmt::Display for WriteRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{function: {}, start: {}, values: {:?}}}",
            self.function.to_u8(),
            self.start_address,
            self.values
        )
    }
}

fn check_range(start: u16, count: usize) -> Result<(), String> {
    if start as usize + count > 0x1_0000 {
        return Err(format!(
            "address range {}..{} exceeds 65535",
            start,
            start as usize + count
        ));
    }
    Ok(())
}

// ============================================================================
// Channels
// ============================================================================

/// Submitter side. Cheap to clone.
#[derive(Debug, Clone)]
pub struct RequestQueue {
    polls: mpsc::Sender<PollRequest>,
    writes: mpsc::UnboundedSender<WriteRequest>,
}

/// Worker side.
#[derive(Debug)]
pub struct RequestReceiver {
    polls: mpsc::Receiver<PollRequest>,
    writes: mpsc::UnboundedReceiver<WriteRequest>,
}

/// Create a connected queue pair.
pub fn request_queue() -> (RequestQueue, RequestReceiver) {
    let (poll_tx, poll_rx) = mpsc::channel(1);
    let (write_tx, write_rx) = mpsc::unbounded_channel();
    (
        RequestQueue {
            polls: poll_tx,
            writes: write_tx,
        },
        RequestReceiver {
            polls: poll_rx,
            writes: write_rx,
        },
    )
}

impl RequestQueue {
    /// Place a request in the poll slot without blocking.
    pub fn submit_poll(&self, request: PollRequest) -> Result<(), EngineError> {
        match self.polls.try_send(request) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(EngineError::QueueFull),
            Err(TrySendError::Closed(_)) => Err(EngineError::Shutdown),
        }
    }

    pub fn submit_write(&self, request: WriteRequest) -> Result<(), EngineError> {
        self.writes.send(request).map_err(|_| EngineError::Shutdown)
    }

    pub fn is_poll_pending(&self) -> bool {
        self.polls.capacity() == 0
    }
}

impl RequestReceiver {
    /// Take the pending poll request, waiting at most `wait` for one.
    pub async fn next_poll(&mut self, wait: Duration) -> Option<PollRequest> {
        tokio::time::timeout(wait, self.polls.recv()).await.ok().flatten()
    }

    pub fn try_next_write(&mut self) -> Option<WriteRequest> {
        self.writes.try_recv().ok()
    }

    pub async fn next_write(&mut self) -> Option<WriteRequest> {
        self.writes.recv().await
    }
}

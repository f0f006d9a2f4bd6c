//! Poll engine
//!
//! A single worker task owns the [`ConnectionManager`] and therefore the only
//! live transport. Everything else talks to it through channels:
//!
//! ```text
//!  PollerHandle ──settings──▶ ┐
//!               ──poll slot─▶ │  worker  ──EngineEvent──▶ Poller::next_event
//!               ──writes────▶ │  (owns the connection)
//!               ──signal────▶ ┘
//! ```
//!
//! ## One poll
//!
//! 1. Emit `PollStarted`, then take the pending request (bounded wait).
//! 2. Apply any connection configuration still in flight.
//! 3. Validate the request; a bad one ends the poll with no I/O.
//! 4. Until a stop is requested: read, emit the words, report the pass. Stop
//!    once the duration has elapsed, otherwise idle out the interval. Queued
//!    writes run only inside that idle window, in submission order. A zero
//!    duration therefore reads exactly once.
//! 5. Emit `PollFinished`, clear the stop flag, emit `"Polling Stopped."` and
//!    return to idle.
//!
//! A stop requested before the poll reaches its loop is kept, so the poll ends
//! without reading.
//!
//! ## Cancellation
//!
//! [`StopToken`] is checked before every read and wakes the idle window
//! immediately. An in-flight read or write is never interrupted, so the
//! worst-case stop latency is one I/O round trip.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{ConnectionSettings, EngineConfig};
use crate::connection::{ConfigGate, ConnectionManager, Connector};
use crate::device_limits::DeviceLimits;
use crate::dispatcher::Dispatcher;
use crate::error::EngineError;
use crate::event::{EngineEvent, EngineState, EventSink};
use crate::queue::{request_queue, PollPlan, PollRequest, RequestQueue, RequestReceiver, WriteRequest};

// ============================================================================
// Stop token
// ============================================================================

/// Cooperative stop signal shared by the worker and its handles.
#[derive(Debug, Clone, Default)]
pub struct StopToken {
    inner: Arc<StopInner>,
}

#[derive(Debug, Default)]
struct StopInner {
    stopped: AtomicBool,
    notify: Notify,
}

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.inner.stopped.store(true, Ordering::Release);
        self.inner.notify.notify_waiters();
    }

    pub fn is_stop_requested(&self) -> bool {
        self.inner.stopped.load(Ordering::Acquire)
    }

    pub fn reset(&self) {
        self.inner.stopped.store(false, Ordering::Release);
    }

    /// Resolves once a stop has been requested.
    pub async fn cancelled(&self) {
        loop {
            // Register before checking so a concurrent request_stop is not missed.
            let notified = self.inner.notify.notified();
            if self.is_stop_requested() {
                return;
            }
            notified.await;
        }
    }
}

// ============================================================================
// Worker
// ============================================================================

#[derive(Debug)]
enum Control {
    PollAvailable,
    Shutdown,
}

enum Next {
    Control(Option<Control>),
    Configure(Option<ConnectionSettings>),
    Write(Option<WriteRequest>),
}

struct Worker<C: Connector> {
    config: EngineConfig,
    connection: ConnectionManager<C>,
    dispatcher: Dispatcher,
    requests: RequestReceiver,
    control_rx: mpsc::UnboundedReceiver<Control>,
    config_rx: mpsc::UnboundedReceiver<ConnectionSettings>,
    gate: ConfigGate,
    stop: StopToken,
    events: EventSink,
    state: watch::Sender<EngineState>,
}

impl<C: Connector> Worker<C> {
    async fn run(mut self) {
        debug!("Poll worker started");
        loop {
            let next = tokio::select! {
                biased;
                settings = self.config_rx.recv() => Next::Configure(settings),
                control = self.control_rx.recv() => Next::Control(control),
                write = self.requests.next_write() => Next::Write(write),
            };

            match next {
                Next::Control(Some(Control::PollAvailable)) => self.act_on_poll_request().await,
                Next::Configure(Some(settings)) => self.apply_settings(settings).await,
                Next::Write(Some(write)) => self.execute_write(write).await,
                Next::Control(Some(Control::Shutdown))
                | Next::Control(None)
                | Next::Configure(None)
                | Next::Write(None) => break,
            }
        }

        self.connection.shutdown().await;
        self.set_state(EngineState::Idle);
        debug!("Poll worker stopped");
    }

    fn set_state(&self, state: EngineState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!("Engine state: {} -> {}", previous, state);
            self.events.emit(EngineEvent::StateChanged(state));
        }
    }

    async fn apply_settings(&mut self, settings: ConnectionSettings) {
        let resume = *self.state.borrow();
        self.set_state(EngineState::ConfiguringConnection);

        match &settings {
            ConnectionSettings::Tcp { host, port } => self
                .events
                .message(format!("Attempting to connect to {} on port {}", host, port)),
            ConnectionSettings::Serial(serial) => self.events.message(format!(
                "Attempting to open {} at {} baud",
                serial.port, serial.baud_rate
            )),
        }

        match self.connection.configure(settings).await {
            Ok(()) => self.events.message("Connection Successful"),
            Err(e) => {
                warn!("Connection configuration failed: {}", e);
                self.events.message("Connection Failed");
            }
        }

        self.gate.release();
        self.set_state(resume);
    }

    async fn execute_write(&mut self, write: WriteRequest) {
        let outcome = self
            .dispatcher
            .write(&mut self.connection, write.function, write.start_address, &write.values)
            .await;
        if outcome.is_success() {
            info!("Write {} complete", write);
        }
    }

    /// Finish a poll that never reached the loop.
    fn abort_poll(&self) {
        self.set_state(EngineState::Finished);
        self.events.emit(EngineEvent::PollFinished);
        self.stop.reset();
        self.set_state(EngineState::Idle);
    }

    async fn act_on_poll_request(&mut self) {
        self.events.emit(EngineEvent::PollStarted);

        let Some(request) = self.requests.next_poll(self.config.dequeue_timeout).await else {
            warn!(
                "Poll signaled but no request arrived within {:?}",
                self.config.dequeue_timeout
            );
            self.abort_poll();
            return;
        };

        // A configuration accepted before the signal must land before the first read.
        while self.gate.is_busy() {
            match self.config_rx.recv().await {
                Some(settings) => self.apply_settings(settings).await,
                None => break,
            }
        }

        let plan = match request.plan(&self.config.limits) {
            Ok(plan) => plan,
            Err(reason) => {
                self.events
                    .message(format!("Request badly formatted: {} ({})", request, reason));
                self.abort_poll();
                return;
            }
        };

        self.set_state(EngineState::Polling);
        info!("Polling {}", request);

        self.poll_loop(&request, plan).await;

        if self.stop.is_stop_requested() {
            self.set_state(EngineState::StoppingRequested);
        }
        self.set_state(EngineState::Finished);
        self.events.emit(EngineEvent::PollFinished);
        self.stop.reset();
        self.events.message("Polling Stopped.");
        self.set_state(EngineState::Idle);
    }

    async fn poll_loop(&mut self, request: &PollRequest, plan: PollPlan) {
        let started = Instant::now();
        // Reported before incrementing, so the first success after a failure is poll 0.
        let mut successful: u64 = 1;
        let mut retries: u64 = 0;

        // The duration is checked after each pass, so a zero duration still reads once.
        while !self.stop.is_stop_requested() {
            let pass_started = Instant::now();

            let words = self
                .dispatcher
                .read(
                    &mut self.connection,
                    request.function,
                    request.start_address,
                    request.length,
                )
                .await
                .into_words();
            let ok = !words.is_empty();
            self.events.data(request, words);

            if ok {
                retries = 0;
                self.events.message(format!("Poll {} complete.", successful));
                successful += 1;
            } else {
                successful = 0;
                self.events
                    .message(format!("Poll Failed. Retrying... {}", retries));
                retries += 1;
            }

            if plan.is_expired(started) {
                break;
            }
            self.pace(pass_started, plan.interval).await;
            if plan.is_expired(started) {
                break;
            }
        }
    }

    /// Idle until `interval` has passed since `pass_started`, running queued
    /// writes as they come.
    async fn pace(&mut self, pass_started: Instant, interval: Duration) {
        loop {
            let elapsed = pass_started.elapsed();
            if elapsed >= interval || self.stop.is_stop_requested() {
                return;
            }

            if let Some(write) = self.requests.try_next_write() {
                self.execute_write(write).await;
                continue;
            }

            let wait = (interval - elapsed).min(self.config.idle_tick);
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = self.stop.cancelled() => {}
            }
        }
    }
}

// ============================================================================
// Collaborator API
// ============================================================================

/// Submits work to a running engine. Cheap to clone.
#[derive(Debug, Clone)]
pub struct PollerHandle {
    queue: RequestQueue,
    control: mpsc::UnboundedSender<Control>,
    settings: mpsc::UnboundedSender<ConnectionSettings>,
    gate: ConfigGate,
    stop: StopToken,
    state: watch::Receiver<EngineState>,
    limits: DeviceLimits,
}

impl PollerHandle {
    /// Hand new connection settings to the worker.
    ///
    /// Rejected with [`EngineError::ConfigurationBusy`] while a previous
    /// configuration is still being applied; nothing is queued.
    pub fn submit_connection_settings(&self, settings: ConnectionSettings) -> Result<(), EngineError> {
        if !self.gate.try_acquire() {
            debug!("Configuration rejected, gate busy: {}", settings);
            return Err(EngineError::ConfigurationBusy);
        }
        if self.settings.send(settings).is_err() {
            self.gate.release();
            return Err(EngineError::Shutdown);
        }
        Ok(())
    }

    /// Whether a connection configuration is in progress.
    pub fn is_busy(&self) -> bool {
        self.gate.is_busy()
    }

    /// Place a request in the poll slot. Does not start the poll.
    pub fn submit_poll(&self, request: PollRequest) -> Result<(), EngineError> {
        self.queue.submit_poll(request)
    }

    /// Tell the worker a poll request is waiting.
    pub fn signal_poll_available(&self) -> Result<(), EngineError> {
        self.control
            .send(Control::PollAvailable)
            .map_err(|_| EngineError::Shutdown)
    }

    /// [`submit_poll`](Self::submit_poll) followed by a signal.
    pub fn start_poll(&self, request: PollRequest) -> Result<(), EngineError> {
        self.submit_poll(request)?;
        self.signal_poll_available()
    }

    pub fn is_poll_pending(&self) -> bool {
        self.queue.is_poll_pending()
    }

    /// Queue a write. It runs between passes of an active poll, or right
    /// away when idle.
    pub fn submit_write(&self, request: WriteRequest) -> Result<(), EngineError> {
        request
            .validate(&self.limits)
            .map_err(EngineError::MalformedRequest)?;
        self.queue.submit_write(request)
    }

    /// Ask an active poll to stop at its next check.
    pub fn request_stop(&self) {
        self.stop.request_stop();
    }

    pub fn state(&self) -> EngineState {
        *self.state.borrow()
    }
}

/// A running engine and its event stream.
#[derive(Debug)]
pub struct Poller {
    handle: PollerHandle,
    events: mpsc::UnboundedReceiver<EngineEvent>,
    task: JoinHandle<()>,
}

impl Poller {
    /// Spawn the worker on the current tokio runtime.
    pub fn spawn<C: Connector>(connector: C, config: EngineConfig) -> Self {
        let (queue, requests) = request_queue();
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (settings_tx, config_rx) = mpsc::unbounded_channel();
        let (events, event_rx) = EventSink::channel();
        let (state_tx, state_rx) = watch::channel(EngineState::Idle);
        let gate = ConfigGate::new();
        let stop = StopToken::new();

        let worker = Worker {
            connection: ConnectionManager::new(connector, config.io_timeout),
            dispatcher: Dispatcher::new(config.slave_id, events.clone()),
            requests,
            control_rx,
            config_rx,
            gate: gate.clone(),
            stop: stop.clone(),
            events,
            state: state_tx,
            config: config.clone(),
        };

        let handle = PollerHandle {
            queue,
            control: control_tx,
            settings: settings_tx,
            gate,
            stop,
            state: state_rx,
            limits: config.limits,
        };

        info!("Spawning poll worker for slave {}", config.slave_id);
        let task = tokio::spawn(worker.run());

        Self {
            handle,
            events: event_rx,
            task,
        }
    }

    pub fn handle(&self) -> PollerHandle {
        self.handle.clone()
    }

    pub async fn next_event(&mut self) -> Option<EngineEvent> {
        self.events.recv().await
    }

    pub fn try_next_event(&mut self) -> Option<EngineEvent> {
        self.events.try_recv().ok()
    }

    /// Stop any active poll, close the connection and wait for the worker.
    pub async fn shutdown(self) {
        self.handle.request_stop();
        let _ = self.handle.control.send(Control::Shutdown);
        if let Err(e) = self.task.await {
            warn!("Poll worker ended abnormally: {}", e);
        }
    }
}

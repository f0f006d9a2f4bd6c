//! Poll engine behavior against an in-memory device.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use modbus_visualizer::{
    ConnectionSettings, Connector, EngineConfig, EngineError, EngineEvent, EngineState,
    FunctionCode, ModbusError, ModbusRequest, ModbusResponse, ModbusResult, ModbusTransport,
    PollRequest, Poller, TransportStats, WriteRequest,
};

const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// In-memory device
// ============================================================================

struct DeviceState {
    registers: Vec<u16>,
    coils: Vec<bool>,
    /// Upcoming reads that time out
    failing_reads: usize,
    /// Exception code returned for every read
    exception: Option<u8>,
    connect_delay: Duration,
    refuse_connections: bool,
    log: Vec<String>,
}

impl Default for DeviceState {
    fn default() -> Self {
        let mut registers = vec![0u16; 1000];
        registers[..8].copy_from_slice(&[
            0x40C0, 0x00FF, 0x00FF, 0x40C0, 0xC040, 0xFF00, 0xFF00, 0xC040,
        ]);
        Self {
            registers,
            coils: vec![false; 1000],
            failing_reads: 0,
            exception: None,
            connect_delay: Duration::ZERO,
            refuse_connections: false,
            log: Vec::new(),
        }
    }
}

#[derive(Clone, Default)]
struct Device(Arc<Mutex<DeviceState>>);

impl Device {
    fn with<R>(&self, f: impl FnOnce(&mut DeviceState) -> R) -> R {
        f(&mut self.0.lock().unwrap())
    }

    fn log(&self) -> Vec<String> {
        self.with(|d| d.log.clone())
    }

    fn serve(&self, request: &ModbusRequest) -> ModbusResult<ModbusResponse> {
        let mut d = self.0.lock().unwrap();
        let start = request.address as usize;
        let end = start + request.quantity as usize;

        if request.function.is_read() {
            d.log.push(format!(
                "read {} {} {}",
                request.function.to_u8(),
                request.address,
                request.quantity
            ));
            if d.failing_reads > 0 {
                d.failing_reads -= 1;
                return Err(ModbusError::timeout("receive", 100));
            }
            if let Some(code) = d.exception {
                return Err(ModbusError::exception(request.function.to_u8(), code));
            }
        }

        let data = match request.function {
            FunctionCode::ReadHoldingRegisters | FunctionCode::ReadInputRegisters => {
                let mut data = vec![(request.quantity * 2) as u8];
                data.extend(d.registers[start..end].iter().flat_map(|r| r.to_be_bytes()));
                data
            }
            FunctionCode::ReadCoils | FunctionCode::ReadDiscreteInputs => {
                let mut packed = vec![0u8; (request.quantity as usize).div_ceil(8)];
                for (i, &on) in d.coils[start..end].iter().enumerate() {
                    if on {
                        packed[i / 8] |= 1 << (i % 8);
                    }
                }
                let mut data = vec![packed.len() as u8];
                data.extend(packed);
                data
            }
            FunctionCode::WriteMultipleRegisters => {
                let values: Vec<u16> = request
                    .data
                    .chunks_exact(2)
                    .map(|p| u16::from_be_bytes([p[0], p[1]]))
                    .collect();
                d.log.push(format!("write registers {} {:?}", request.address, values));
                d.registers[start..end].copy_from_slice(&values);
                echo(request)
            }
            FunctionCode::WriteMultipleCoils => {
                let states: Vec<bool> = (0..request.quantity as usize)
                    .map(|i| request.data[i / 8] & (1 << (i % 8)) != 0)
                    .collect();
                d.log.push(format!("write coils {} {:?}", request.address, states));
                d.coils[start..end].copy_from_slice(&states);
                echo(request)
            }
        };
        Ok(ModbusResponse::new_success(request.slave_id, request.function, data))
    }
}

fn echo(request: &ModbusRequest) -> Vec<u8> {
    let mut data = request.address.to_be_bytes().to_vec();
    data.extend(request.quantity.to_be_bytes());
    data
}

struct MockTransport {
    device: Device,
    connected: bool,
}

impl ModbusTransport for MockTransport {
    async fn request(&mut self, request: &ModbusRequest) -> ModbusResult<ModbusResponse> {
        self.device.serve(request)
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn close(&mut self) -> ModbusResult<()> {
        self.connected = false;
        self.device.with(|d| d.log.push("close".to_string()));
        Ok(())
    }

    fn get_stats(&self) -> TransportStats {
        TransportStats::default()
    }
}

struct MockConnector {
    device: Device,
}

impl Connector for MockConnector {
    type Transport = MockTransport;

    async fn connect(
        &mut self,
        settings: &ConnectionSettings,
        _timeout: Duration,
    ) -> ModbusResult<MockTransport> {
        let (delay, refuse) = self.device.with(|d| {
            d.log.push(format!("connect {}", settings));
            (d.connect_delay, d.refuse_connections)
        });
        tokio::time::sleep(delay).await;
        if refuse {
            return Err(ModbusError::connection("refused"));
        }
        Ok(MockTransport {
            device: self.device.clone(),
            connected: true,
        })
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn settings() -> ConnectionSettings {
    ConnectionSettings::tcp("127.0.0.1", 5020)
}

fn spawn(device: &Device) -> Poller {
    spawn_with(device, EngineConfig::default())
}

fn spawn_with(device: &Device, config: EngineConfig) -> Poller {
    Poller::spawn(
        MockConnector {
            device: device.clone(),
        },
        config,
    )
}

async fn next_event(poller: &mut Poller) -> EngineEvent {
    tokio::time::timeout(EVENT_TIMEOUT, poller.next_event())
        .await
        .expect("timed out waiting for an event")
        .expect("event stream closed")
}

/// Collect events up to and including the first one matching `done`.
async fn events_until(poller: &mut Poller, done: impl Fn(&EngineEvent) -> bool) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    loop {
        let event = next_event(poller).await;
        let finished = done(&event);
        events.push(event);
        if finished {
            return events;
        }
    }
}

fn is_message(event: &EngineEvent, text: &str) -> bool {
    event.message_text() == Some(text)
}

fn messages(events: &[EngineEvent]) -> Vec<&str> {
    events.iter().filter_map(EngineEvent::message_text).collect()
}

fn frames(events: &[EngineEvent]) -> Vec<Vec<u16>> {
    events
        .iter()
        .filter_map(|e| match e {
            EngineEvent::Data(frame) => Some(frame.words.clone()),
            _ => None,
        })
        .collect()
}

async fn connect(poller: &mut Poller) {
    poller
        .handle()
        .submit_connection_settings(settings())
        .unwrap();
    events_until(poller, |e| is_message(e, "Connection Successful")).await;
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_single_pass() {
    let device = Device::default();
    let mut poller = spawn(&device);
    let handle = poller.handle();

    handle.submit_connection_settings(settings()).unwrap();
    handle
        .start_poll(PollRequest::single(FunctionCode::ReadHoldingRegisters, 0, 4))
        .unwrap();

    let events = events_until(&mut poller, |e| is_message(e, "Polling Stopped.")).await;

    assert_eq!(
        messages(&events),
        vec![
            "Attempting to connect to 127.0.0.1 on port 5020",
            "Connection Successful",
            "Poll 1 complete.",
            "Polling Stopped.",
        ]
    );
    assert_eq!(frames(&events), vec![vec![0x40C0, 0x00FF, 0x00FF, 0x40C0]]);

    let started = events.iter().position(|e| *e == EngineEvent::PollStarted);
    let finished = events.iter().position(|e| *e == EngineEvent::PollFinished);
    assert!(started < finished);

    poller.shutdown().await;
}

#[tokio::test]
async fn test_zero_duration_ignores_interval_for_pass_count() {
    let device = Device::default();
    let mut poller = spawn(&device);
    connect(&mut poller).await;

    let request = PollRequest::single(FunctionCode::ReadInputRegisters, 2, 2).with_interval(0.2);
    poller.handle().start_poll(request).unwrap();

    let events = events_until(&mut poller, |e| is_message(e, "Polling Stopped.")).await;
    assert_eq!(frames(&events).len(), 1);
    poller.shutdown().await;
}

#[tokio::test]
async fn test_queue_full_keeps_pending_request() {
    let device = Device::default();
    let mut poller = spawn(&device);
    connect(&mut poller).await;
    let handle = poller.handle();

    let first = PollRequest::single(FunctionCode::ReadHoldingRegisters, 4, 2);
    let second = PollRequest::single(FunctionCode::ReadHoldingRegisters, 0, 8);

    handle.submit_poll(first).unwrap();
    assert!(handle.is_poll_pending());
    assert_eq!(handle.submit_poll(second), Err(EngineError::QueueFull));

    handle.signal_poll_available().unwrap();
    let events = events_until(&mut poller, |e| is_message(e, "Polling Stopped.")).await;

    assert_eq!(frames(&events), vec![vec![0xC040, 0xFF00]]);
    assert!(device.log().contains(&"read 3 4 2".to_string()));
    assert!(!device.log().contains(&"read 3 0 8".to_string()));
    poller.shutdown().await;
}

#[tokio::test]
async fn test_stop_latency_under_one_interval() {
    let device = Device::default();
    let mut poller = spawn(&device);
    connect(&mut poller).await;
    let handle = poller.handle();

    handle
        .start_poll(PollRequest::continuous(FunctionCode::ReadHoldingRegisters, 0, 2, 5.0))
        .unwrap();
    events_until(&mut poller, |e| is_message(e, "Poll 1 complete.")).await;
    assert_eq!(handle.state(), EngineState::Polling);

    let stop_requested = Instant::now();
    handle.request_stop();
    let events = events_until(&mut poller, |e| is_message(e, "Polling Stopped.")).await;

    assert!(stop_requested.elapsed() < Duration::from_secs(1));
    assert!(frames(&events).is_empty());

    let states: Vec<EngineState> = events
        .iter()
        .filter_map(|e| match e {
            EngineEvent::StateChanged(s) => Some(*s),
            _ => None,
        })
        .collect();
    assert_eq!(
        states,
        vec![EngineState::StoppingRequested, EngineState::Finished]
    );

    events_until(&mut poller, |e| *e == EngineEvent::StateChanged(EngineState::Idle)).await;
    assert_eq!(handle.state(), EngineState::Idle);
    poller.shutdown().await;
}

#[tokio::test]
async fn test_stop_right_after_start_is_kept() {
    let device = Device::default();
    let mut poller = spawn(&device);
    connect(&mut poller).await;
    let handle = poller.handle();

    handle
        .start_poll(PollRequest::continuous(FunctionCode::ReadHoldingRegisters, 0, 2, 0.2))
        .unwrap();
    handle.request_stop();

    let events = events_until(&mut poller, |e| is_message(e, "Polling Stopped.")).await;
    assert!(frames(&events).is_empty());
    assert!(events.contains(&EngineEvent::StateChanged(EngineState::StoppingRequested)));
    assert!(!device.log().iter().any(|l| l.starts_with("read")));

    // The flag is cleared on exit, so the next poll runs.
    handle
        .start_poll(PollRequest::single(FunctionCode::ReadHoldingRegisters, 0, 2))
        .unwrap();
    let events = events_until(&mut poller, |e| is_message(e, "Polling Stopped.")).await;
    assert_eq!(frames(&events), vec![vec![0x40C0, 0x00FF]]);
    poller.shutdown().await;
}

#[tokio::test]
async fn test_timed_poll_ends_after_duration() {
    let device = Device::default();
    let mut poller = spawn(&device);
    connect(&mut poller).await;

    let request = PollRequest::single(FunctionCode::ReadHoldingRegisters, 0, 2)
        .with_interval(0.1)
        .with_duration(0.25);
    poller.handle().start_poll(request).unwrap();

    let events = events_until(&mut poller, |e| is_message(e, "Polling Stopped.")).await;
    let passes = frames(&events).len();
    assert!((2..=4).contains(&passes), "{} passes", passes);
    poller.shutdown().await;
}

#[tokio::test]
async fn test_writes_run_between_reads_in_order() {
    let device = Device::default();
    let mut poller = spawn(&device);
    connect(&mut poller).await;
    let handle = poller.handle();

    handle
        .start_poll(PollRequest::continuous(FunctionCode::ReadHoldingRegisters, 10, 2, 0.3))
        .unwrap();
    events_until(&mut poller, |e| is_message(e, "Poll 1 complete.")).await;

    handle.submit_write(WriteRequest::registers(10, vec![7])).unwrap();
    handle.submit_write(WriteRequest::registers(11, vec![8])).unwrap();
    handle.submit_write(WriteRequest::coils(0, &[true, false, true])).unwrap();

    let events = events_until(&mut poller, |e| is_message(e, "Poll 2 complete.")).await;
    handle.request_stop();
    events_until(&mut poller, |e| is_message(e, "Polling Stopped.")).await;

    assert_eq!(frames(&events), vec![vec![7, 8]]);

    let log: Vec<String> = device
        .log()
        .into_iter()
        .filter(|l| l.starts_with("read") || l.starts_with("write"))
        .collect();
    assert_eq!(
        &log[..5],
        &[
            "read 3 10 2",
            "write registers 10 [7]",
            "write registers 11 [8]",
            "write coils 0 [true, false, true]",
            "read 3 10 2",
        ]
    );
    poller.shutdown().await;
}

#[tokio::test]
async fn test_idle_write_runs_immediately() {
    let device = Device::default();
    let mut poller = spawn(&device);
    connect(&mut poller).await;

    poller
        .handle()
        .submit_write(WriteRequest::registers(100, vec![1, 2, 3]))
        .unwrap();

    let deadline = Instant::now() + EVENT_TIMEOUT;
    while !device.log().iter().any(|l| l == "write registers 100 [1, 2, 3]") {
        assert!(Instant::now() < deadline, "write never reached the device");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(device.with(|d| d.registers[100..103].to_vec()), vec![1, 2, 3]);
    poller.shutdown().await;
}

#[tokio::test]
async fn test_malformed_write_rejected_at_submit() {
    let device = Device::default();
    let poller = spawn(&device);
    let handle = poller.handle();

    assert!(matches!(
        handle.submit_write(WriteRequest::registers(0, vec![])),
        Err(EngineError::MalformedRequest(_))
    ));
    assert!(matches!(
        handle.submit_write(WriteRequest::registers(65535, vec![1, 2])),
        Err(EngineError::MalformedRequest(_))
    ));
    poller.shutdown().await;
}

#[tokio::test]
async fn test_exception_code_mapping() {
    let device = Device::default();
    device.with(|d| d.exception = Some(2));
    let mut poller = spawn(&device);
    connect(&mut poller).await;

    poller
        .handle()
        .start_poll(PollRequest::single(FunctionCode::ReadHoldingRegisters, 0, 2))
        .unwrap();
    let events = events_until(&mut poller, |e| is_message(e, "Polling Stopped.")).await;

    assert_eq!(
        messages(&events),
        vec![
            "Modbus Error Code 2: Illegal Data Access",
            "Poll Failed. Retrying... 0",
            "Polling Stopped.",
        ]
    );
    assert_eq!(frames(&events), vec![Vec::<u16>::new()]);
    poller.shutdown().await;
}

#[tokio::test]
async fn test_failures_retry_until_success() {
    let device = Device::default();
    device.with(|d| d.failing_reads = 2);
    let mut poller = spawn(&device);
    connect(&mut poller).await;
    let handle = poller.handle();

    handle
        .start_poll(PollRequest::continuous(FunctionCode::ReadCoils, 0, 4, 0.02))
        .unwrap();
    let events = events_until(&mut poller, |e| is_message(e, "Poll 1 complete.")).await;
    handle.request_stop();
    events_until(&mut poller, |e| is_message(e, "Polling Stopped.")).await;

    // The counter restarts from zero after a failure.
    assert_eq!(
        messages(&events),
        vec![
            "Connection Failed.",
            "Poll Failed. Retrying... 0",
            "Connection Failed.",
            "Poll Failed. Retrying... 1",
            "Poll 0 complete.",
            "Poll 1 complete.",
        ]
    );
    assert_eq!(frames(&events).last(), Some(&vec![0, 0, 0, 0]));
    poller.shutdown().await;
}

#[tokio::test]
async fn test_unsupported_poll_function() {
    let device = Device::default();
    let mut poller = spawn(&device);
    connect(&mut poller).await;

    poller
        .handle()
        .start_poll(PollRequest::single(FunctionCode::WriteMultipleRegisters, 0, 2))
        .unwrap();
    let events = events_until(&mut poller, |e| is_message(e, "Polling Stopped.")).await;

    assert_eq!(messages(&events)[0], "Function code not supported: 16");
    assert!(!device.log().iter().any(|l| l.starts_with("read")));
    poller.shutdown().await;
}

#[tokio::test]
async fn test_malformed_poll_request() {
    let device = Device::default();
    let mut poller = spawn(&device);
    connect(&mut poller).await;

    poller
        .handle()
        .start_poll(PollRequest::single(FunctionCode::ReadHoldingRegisters, 0, 0))
        .unwrap();
    let events = events_until(&mut poller, |e| *e == EngineEvent::PollFinished).await;

    let texts = messages(&events);
    assert_eq!(texts.len(), 1);
    assert!(texts[0].starts_with("Request badly formatted:"));
    assert!(!device.log().iter().any(|l| l.starts_with("read")));
    poller.shutdown().await;
}

#[tokio::test]
async fn test_signal_without_request_finishes() {
    let device = Device::default();
    let config = EngineConfig::default().with_dequeue_timeout(Duration::from_millis(50));
    let mut poller = spawn_with(&device, config);

    poller.handle().signal_poll_available().unwrap();
    let events = events_until(&mut poller, |e| *e == EngineEvent::PollFinished).await;

    assert_eq!(events.first(), Some(&EngineEvent::PollStarted));
    assert!(messages(&events).is_empty());
    poller.shutdown().await;
}

#[tokio::test]
async fn test_configuration_busy_then_reconfigure() {
    let device = Device::default();
    device.with(|d| d.connect_delay = Duration::from_millis(200));
    let mut poller = spawn(&device);
    let handle = poller.handle();

    handle.submit_connection_settings(settings()).unwrap();
    assert!(handle.is_busy());
    assert_eq!(
        handle.submit_connection_settings(ConnectionSettings::tcp("10.0.0.2", 502)),
        Err(EngineError::ConfigurationBusy)
    );

    events_until(&mut poller, |e| is_message(e, "Connection Successful")).await;
    while handle.is_busy() {
        tokio::task::yield_now().await;
    }

    handle
        .submit_connection_settings(ConnectionSettings::tcp("10.0.0.2", 502))
        .unwrap();
    events_until(&mut poller, |e| is_message(e, "Connection Successful")).await;

    assert_eq!(
        device.log(),
        vec![
            "connect tcp://127.0.0.1:5020",
            "close",
            "connect tcp://10.0.0.2:502",
        ]
    );
    poller.shutdown().await;
}

#[tokio::test]
async fn test_poll_waits_for_configuration() {
    let device = Device::default();
    device.with(|d| d.connect_delay = Duration::from_millis(100));
    let mut poller = spawn(&device);
    let handle = poller.handle();

    handle.submit_connection_settings(settings()).unwrap();
    handle
        .start_poll(PollRequest::single(FunctionCode::ReadHoldingRegisters, 0, 2))
        .unwrap();
    let events = events_until(&mut poller, |e| is_message(e, "Polling Stopped.")).await;

    let texts = messages(&events);
    let connected = texts.iter().position(|t| *t == "Connection Successful");
    let polled = texts.iter().position(|t| *t == "Poll 1 complete.");
    assert!(connected.is_some() && connected < polled);
    poller.shutdown().await;
}

#[tokio::test]
async fn test_connection_failure_reported() {
    let device = Device::default();
    device.with(|d| d.refuse_connections = true);
    let mut poller = spawn(&device);
    let handle = poller.handle();

    handle.submit_connection_settings(settings()).unwrap();
    events_until(&mut poller, |e| is_message(e, "Connection Failed")).await;

    while handle.is_busy() {
        tokio::task::yield_now().await;
    }

    // The next read retries the link from the remembered settings.
    handle
        .start_poll(PollRequest::single(FunctionCode::ReadHoldingRegisters, 0, 1))
        .unwrap();
    let events = events_until(&mut poller, |e| is_message(e, "Polling Stopped.")).await;
    assert_eq!(
        messages(&events),
        vec!["Connection Failed.", "Poll Failed. Retrying... 0", "Polling Stopped."]
    );
    assert_eq!(
        device.log(),
        vec!["connect tcp://127.0.0.1:5020", "connect tcp://127.0.0.1:5020"]
    );
    poller.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_closes_connection() {
    let device = Device::default();
    let mut poller = spawn(&device);
    connect(&mut poller).await;
    let handle = poller.handle();

    poller.shutdown().await;

    assert_eq!(device.log().last().map(String::as_str), Some("close"));
    assert_eq!(
        handle.start_poll(PollRequest::single(FunctionCode::ReadCoils, 0, 1)),
        Err(EngineError::Shutdown)
    );
}

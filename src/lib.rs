//! # Modbus Visualizer - Register Polling Engine and Formatter
//!
//! Polls one Modbus device over TCP or a serial line and renders the raw
//! 16-bit register words as typed, human-readable values.
//!
//! ## Features
//!
//! - **Poll engine**: one worker owns the connection; single-pass and
//!   periodic polls, writes interleaved between passes, cooperative stop
//! - **Backpressure**: single-slot poll queue that rejects when full, atomic
//!   configuration gate
//! - **Formatter**: uint16/int16/uint32/int32/float32 under independent byte
//!   and word order, rendered in base 2, 8, 10 or 16
//! - **Transports**: Modbus TCP, RTU and ASCII (serial behind the `rtu` feature)
//!
//! ## Supported Function Codes
//!
//! | Code | Function | Engine path |
//! |------|----------|-------------|
//! | 0x01 | Read Coils | poll |
//! | 0x02 | Read Discrete Inputs | poll |
//! | 0x03 | Read Holding Registers | poll |
//! | 0x04 | Read Input Registers | poll |
//! | 0x0F | Write Multiple Coils | write |
//! | 0x10 | Write Multiple Registers | write |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use modbus_visualizer::{
//!     ConnectionSettings, DataType, DeviceConnector, EngineConfig, EngineEvent, FormatSpec,
//!     FunctionCode, PollRequest, Poller,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut poller = Poller::spawn(DeviceConnector, EngineConfig::default());
//!     let handle = poller.handle();
//!
//!     handle.submit_connection_settings(ConnectionSettings::tcp("127.0.0.1", 502))?;
//!     handle.start_poll(PollRequest::single(FunctionCode::ReadHoldingRegisters, 0, 8))?;
//!
//!     let spec = FormatSpec::new(DataType::Float32);
//!     while let Some(event) = poller.next_event().await {
//!         match event {
//!             EngineEvent::Data(frame) => println!("{:?}", frame.render(&spec)),
//!             EngineEvent::Message(message) => println!("{}", message),
//!             EngineEvent::PollFinished => break,
//!             _ => {}
//!         }
//!     }
//!
//!     poller.shutdown().await;
//!     Ok(())
//! }
//! ```

// ============================================================================
// Protocol modules
// ============================================================================

/// Error types for transports and engine submitters
pub mod error;

/// Modbus protocol constants
pub mod constants;

/// Stack-allocated PDU
pub mod pdu;

/// Function codes, requests and responses
pub mod protocol;

/// TCP, RTU and ASCII framing
pub mod transport;

/// Read/write primitives over any transport
pub mod client;

/// Per-device quantity limits
pub mod device_limits;

// ============================================================================
// Formatter modules
// ============================================================================

/// Byte and word order handling
pub mod bytes;

/// Decoded register values
pub mod value;

/// Register formatting
pub mod codec;

// ============================================================================
// Engine modules
// ============================================================================

/// Engine and connection configuration
pub mod config;

/// Connection ownership and the configuration gate
pub mod connection;

/// Poll slot and write queue
pub mod queue;

/// Outbound notifications
pub mod event;

/// Function code dispatch and failure classification
pub mod dispatcher;

/// Poll worker and collaborator API
pub mod engine;

// ============================================================================
// Re-exports
// ============================================================================

// === Async runtime ===
pub use tokio;

// === Errors ===
pub use error::{EngineError, ModbusError, ModbusResult};

// === Protocol ===
pub use client::{GenericModbusClient, ModbusClient};
pub use protocol::{exception_message, FunctionCode, ModbusRequest, ModbusResponse, SlaveId};
pub use transport::{ModbusTransport, TcpTransport, TransportStats};

#[cfg(feature = "rtu")]
pub use transport::{AsciiTransport, RtuTransport};

// === Formatter ===
pub use bytes::{ByteOrder, WordOrder};
pub use codec::{decode_registers, format_bits, format_registers, DataType, FormatSpec, Radix};
pub use value::RegisterValue;

// === Engine ===
pub use config::{
    ConnectionSettings, DataBits, EngineConfig, Parity, SerialSettings, SerialVariant, StopBits,
};
pub use connection::{ConfigGate, ConnectionManager, Connector, DeviceConnector, DeviceTransport};
pub use device_limits::DeviceLimits;
pub use dispatcher::{Dispatcher, ReadOutcome, WriteOutcome};
pub use engine::{Poller, PollerHandle, StopToken};
pub use event::{ConsoleMessage, DecodedFrame, EngineEvent, EngineState, EventSink};
pub use queue::{PollRequest, WriteRequest};

// === Protocol limits ===
pub use constants::{MAX_READ_COILS, MAX_READ_REGISTERS, MAX_WRITE_COILS, MAX_WRITE_REGISTERS};

/// Modbus TCP default port
pub const DEFAULT_TCP_PORT: u16 = 502;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

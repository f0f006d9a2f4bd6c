//! Error types
//!
//! Two layers of failure live here:
//!
//! - [`ModbusError`]: anything that can go wrong while talking to the device
//!   (transport, framing, exception responses). The poll engine never lets
//!   these escape; they are classified by the dispatcher and turned into
//!   console messages plus an empty result.
//! - [`EngineError`]: rejections returned synchronously to whoever submits
//!   work to the engine (busy configuration gate, full poll slot, ...).

use thiserror::Error;

/// Result type for transport and protocol operations
pub type ModbusResult<T> = Result<T, ModbusError>;

/// Errors raised by transports, clients and PDU handling.
#[derive(Debug, Error)]
pub enum ModbusError {
    /// Could not establish or lost the link to the device
    #[error("Connection error: {message}")]
    Connection { message: String },

    /// Underlying I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An operation did not complete in time
    #[error("Timeout during {operation} after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// Response did not match the request
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// Malformed frame (bad length, CRC/LRC mismatch, ...)
    #[error("Frame error: {message}")]
    Frame { message: String },

    /// Device answered with an exception response
    #[error("Modbus exception {code} on function 0x{function:02X}")]
    Exception { function: u8, code: u8 },

    /// Function code is not valid for the requested operation
    #[error("Invalid function code: 0x{code:02X}")]
    InvalidFunction { code: u8 },

    /// Request payload failed validation
    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    /// Connection settings could not be applied
    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl ModbusError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    pub fn frame(message: impl Into<String>) -> Self {
        Self::Frame {
            message: message.into(),
        }
    }

    pub fn exception(function: u8, code: u8) -> Self {
        Self::Exception { function, code }
    }

    pub fn invalid_function(code: u8) -> Self {
        Self::InvalidFunction { code }
    }

    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Exception code carried by an exception response, if this is one.
    pub fn exception_code(&self) -> Option<u8> {
        match self {
            Self::Exception { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Whether the link should be considered broken after this error.
    pub fn is_link_failure(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::Io(_) | Self::Timeout { .. }
        )
    }
}

/// Errors returned to callers submitting work to the poll engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// A connection configuration is already being applied
    #[error("connection configuration already in progress")]
    ConfigurationBusy,

    /// A poll request is already pending in the single-slot queue
    #[error("poll queue is full")]
    QueueFull,

    /// The request could not be executed as given
    #[error("request badly formatted: {0}")]
    MalformedRequest(String),

    /// The engine worker is no longer running
    #[error("poll engine has shut down")]
    Shutdown,
}

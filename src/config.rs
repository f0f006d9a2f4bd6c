//! Engine and connection configuration
//!
//! [`EngineConfig`] is fixed when the worker is spawned. [`ConnectionSettings`]
//! is the runtime payload a collaborator submits; each submission fully
//! replaces the previous one.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::device_limits::DeviceLimits;
use crate::error::{ModbusError, ModbusResult};
use crate::protocol::SlaveId;

/// Default unit id used for every request.
pub const DEFAULT_SLAVE_ID: SlaveId = 1;

/// Default per-I/O deadline (connect, send, receive).
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(5);

/// Bounded wait when draining the poll slot after a signal.
pub const DEFAULT_DEQUEUE_TIMEOUT: Duration = Duration::from_secs(1);

/// Idle increment between stop checks inside the pacing window.
pub const DEFAULT_IDLE_TICK: Duration = Duration::from_millis(10);

/// Worker configuration.
///
/// ```rust
/// use modbus_visualizer::{DeviceLimits, EngineConfig};
/// use std::time::Duration;
///
/// let config = EngineConfig::new()
///     .with_slave_id(17)
///     .with_io_timeout(Duration::from_secs(2))
///     .with_limits(DeviceLimits::conservative());
/// assert_eq!(config.slave_id, 17);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub slave_id: SlaveId,
    pub io_timeout: Duration,
    pub dequeue_timeout: Duration,
    pub idle_tick: Duration,
    pub limits: DeviceLimits,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_slave_id(mut self, slave_id: SlaveId) -> Self {
        self.slave_id = slave_id;
        self
    }

    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    pub fn with_dequeue_timeout(mut self, timeout: Duration) -> Self {
        self.dequeue_timeout = timeout;
        self
    }

    /// Smaller ticks lower stop latency at the cost of more wakeups.
    pub fn with_idle_tick(mut self, tick: Duration) -> Self {
        self.idle_tick = tick;
        self
    }

    pub fn with_limits(mut self, limits: DeviceLimits) -> Self {
        self.limits = limits;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            slave_id: DEFAULT_SLAVE_ID,
            io_timeout: DEFAULT_IO_TIMEOUT,
            dequeue_timeout: DEFAULT_DEQUEUE_TIMEOUT,
            idle_tick: DEFAULT_IDLE_TICK,
            limits: DeviceLimits::default(),
        }
    }
}

// ============================================================================
// Connection settings
// ============================================================================

/// Where and how to reach the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionSettings {
    Tcp { host: String, port: u16 },
    Serial(SerialSettings),
}

impl ConnectionSettings {
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port,
        }
    }

    pub fn serial(settings: SerialSettings) -> Self {
        Self::Serial(settings)
    }
}

impl fmt::Display for ConnectionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp { host, port } => write!(f, "tcp://{}:{}", host, port),
            Self::Serial(s) => write!(
                f,
                "{} {} {}{}{} ({})",
                s.port, s.baud_rate, s.byte_size, s.parity, s.stop_bits, s.variant
            ),
        }
    }
}

/// Serial line parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialSettings {
    pub port: String,
    pub baud_rate: u32,
    pub stop_bits: StopBits,
    pub byte_size: DataBits,
    pub parity: Parity,
    pub variant: SerialVariant,
}

impl SerialSettings {
    /// 8N1 RTU at the given baud rate.
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
            stop_bits: StopBits::One,
            byte_size: DataBits::Eight,
            parity: Parity::None,
            variant: SerialVariant::Rtu,
        }
    }

    pub fn with_stop_bits(mut self, stop_bits: StopBits) -> Self {
        self.stop_bits = stop_bits;
        self
    }

    pub fn with_byte_size(mut self, byte_size: DataBits) -> Self {
        self.byte_size = byte_size;
        self
    }

    pub fn with_parity(mut self, parity: Parity) -> Self {
        self.parity = parity;
        self
    }

    pub fn with_variant(mut self, variant: SerialVariant) -> Self {
        self.variant = variant;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopBits {
    One,
    Two,
}

impl fmt::Display for StopBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::One => "1",
            Self::Two => "2",
        })
    }
}

impl TryFrom<u8> for StopBits {
    type Error = ModbusError;

    fn try_from(bits: u8) -> ModbusResult<Self> {
        match bits {
            1 => Ok(Self::One),
            2 => Ok(Self::Two),
            other => Err(ModbusError::configuration(format!("Unsupported stop bits: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataBits {
    Five,
    Six,
    Seven,
    Eight,
}

impl fmt::Display for DataBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Five => "5",
            Self::Six => "6",
            Self::Seven => "7",
            Self::Eight => "8",
        })
    }
}

impl TryFrom<u8> for DataBits {
    type Error = ModbusError;

    fn try_from(bits: u8) -> ModbusResult<Self> {
        match bits {
            5 => Ok(Self::Five),
            6 => Ok(Self::Six),
            7 => Ok(Self::Seven),
            8 => Ok(Self::Eight),
            other => Err(ModbusError::configuration(format!("Unsupported byte size: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    None,
    Even,
    Odd,
}

impl fmt::Display for Parity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "N",
            Self::Even => "E",
            Self::Odd => "O",
        })
    }
}

impl FromStr for Parity {
    type Err = ModbusError;

    fn from_str(s: &str) -> ModbusResult<Self> {
        match s.to_ascii_uppercase().as_str() {
            "N" | "NONE" => Ok(Self::None),
            "E" | "EVEN" => Ok(Self::Even),
            "O" | "ODD" => Ok(Self::Odd),
            _ => Err(ModbusError::configuration(format!("Unknown parity: {}", s))),
        }
    }
}

/// Serial framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerialVariant {
    Rtu,
    Ascii,
}

impl fmt::Display for SerialVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Rtu => "rtu",
            Self::Ascii => "ascii",
        })
    }
}

impl FromStr for SerialVariant {
    type Err = ModbusError;

    fn from_str(s: &str) -> ModbusResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "rtu" => Ok(Self::Rtu),
            "ascii" => Ok(Self::Ascii),
            _ => Err(ModbusError::configuration(format!("Unknown serial framing: {}", s))),
        }
    }
}

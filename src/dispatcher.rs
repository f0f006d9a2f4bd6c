//! Protocol operation dispatcher
//!
//! Maps a [`FunctionCode`] to the client primitive that serves it and folds
//! the result into an outcome the engine can act on:
//!
//! | Failure | Console message | Outcome |
//! |---------|-----------------|---------|
//! | read with a write code (or the reverse) | `Function code not supported: {code}` | `Unsupported` |
//! | exception response | `Modbus Error Code {code}: {message}` | `Exception(code)` |
//! | connection, I/O or timeout | `Connection Failed.` | `TransportFailure` |
//! | anything else | `Request failed: {error}` | `Failed` |
//!
//! Successful operations emit nothing; the caller reports them.

use tracing::debug;

use crate::client::ModbusClient;
use crate::connection::{ConnectionManager, Connector};
use crate::error::{ModbusError, ModbusResult};
use crate::event::EventSink;
use crate::protocol::{exception_message, FunctionCode, SlaveId};

/// Result of one read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Registers, or one 0/1 word per bit truncated to the requested length
    Data(Vec<u16>),
    Unsupported(FunctionCode),
    Exception(u8),
    TransportFailure,
    Failed(String),
}

impl ReadOutcome {
    /// The words read, empty on any failure.
    pub fn into_words(self) -> Vec<u16> {
        match self {
            Self::Data(words) => words,
            _ => Vec::new(),
        }
    }
}

/// Result of one write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    Unsupported(FunctionCode),
    Exception(u8),
    TransportFailure,
    Failed(String),
}

impl WriteOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Written)
    }
}

/// Classified failure, shared by both paths.
enum Failure {
    Unsupported(FunctionCode),
    Exception(u8),
    Transport,
    Other(String),
}

/// Runs single operations against the manager's live client.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    slave_id: SlaveId,
    events: EventSink,
}

impl Dispatcher {
    pub fn new(slave_id: SlaveId, events: EventSink) -> Self {
        Self { slave_id, events }
    }

    pub fn slave_id(&self) -> SlaveId {
        self.slave_id
    }

    /// Read `quantity` values starting at `address`.
    pub async fn read<C: Connector>(
        &self,
        connection: &mut ConnectionManager<C>,
        function: FunctionCode,
        address: u16,
        quantity: u16,
    ) -> ReadOutcome {
        if !function.is_read() {
            self.report_unsupported(function);
            return ReadOutcome::Unsupported(function);
        }

        let slave_id = self.slave_id;
        let result: ModbusResult<Vec<u16>> = async {
            let client = connection.client().await?;
            match function {
                FunctionCode::ReadCoils => client
                    .read_01(slave_id, address, quantity)
                    .await
                    .map(bits_to_words),
                FunctionCode::ReadDiscreteInputs => client
                    .read_02(slave_id, address, quantity)
                    .await
                    .map(bits_to_words),
                FunctionCode::ReadHoldingRegisters => {
                    client.read_03(slave_id, address, quantity).await
                }
                FunctionCode::ReadInputRegisters => {
                    client.read_04(slave_id, address, quantity).await
                }
                FunctionCode::WriteMultipleCoils | FunctionCode::WriteMultipleRegisters => {
                    Err(ModbusError::invalid_function(function.to_u8()))
                }
            }
        }
        .await;

        match result {
            Ok(words) => {
                debug!("{} @{} x{} -> {} words", function, address, quantity, words.len());
                ReadOutcome::Data(words)
            }
            Err(e) => match self.classify(function, e) {
                Failure::Unsupported(f) => ReadOutcome::Unsupported(f),
                Failure::Exception(code) => ReadOutcome::Exception(code),
                Failure::Transport => ReadOutcome::TransportFailure,
                Failure::Other(text) => ReadOutcome::Failed(text),
            },
        }
    }

    /// Write `values` starting at `address`. For coils, non-zero is on.
    pub async fn write<C: Connector>(
        &self,
        connection: &mut ConnectionManager<C>,
        function: FunctionCode,
        address: u16,
        values: &[u16],
    ) -> WriteOutcome {
        if !function.is_write() {
            self.report_unsupported(function);
            return WriteOutcome::Unsupported(function);
        }

        let slave_id = self.slave_id;
        let result: ModbusResult<()> = async {
            let client = connection.client().await?;
            match function {
                FunctionCode::WriteMultipleCoils => {
                    let states: Vec<bool> = values.iter().map(|&v| v != 0).collect();
                    client.write_0f(slave_id, address, &states).await
                }
                FunctionCode::WriteMultipleRegisters => {
                    client.write_10(slave_id, address, values).await
                }
                _ => Err(ModbusError::invalid_function(function.to_u8())),
            }
        }
        .await;

        match result {
            Ok(()) => {
                debug!("{} @{} x{} written", function, address, values.len());
                WriteOutcome::Written
            }
            Err(e) => match self.classify(function, e) {
                Failure::Unsupported(f) => WriteOutcome::Unsupported(f),
                Failure::Exception(code) => WriteOutcome::Exception(code),
                Failure::Transport => WriteOutcome::TransportFailure,
                Failure::Other(text) => WriteOutcome::Failed(text),
            },
        }
    }

    fn report_unsupported(&self, function: FunctionCode) {
        self.events
            .message(format!("Function code not supported: {}", function.to_u8()));
    }

    fn classify(&self, function: FunctionCode, error: ModbusError) -> Failure {
        if let Some(code) = error.exception_code() {
            self.events.message(format!(
                "Modbus Error Code {}: {}",
                code,
                exception_message(code)
            ));
            return Failure::Exception(code);
        }
        if error.is_link_failure() {
            debug!("{} failed: {}", function, error);
            self.events.message("Connection Failed.");
            return Failure::Transport;
        }
        if let ModbusError::InvalidFunction { .. } = error {
            self.report_unsupported(function);
            return Failure::Unsupported(function);
        }
        let text = error.to_string();
        self.events.message(format!("Request failed: {}", text));
        Failure::Other(text)
    }
}

fn bits_to_words(bits: Vec<bool>) -> Vec<u16> {
    bits.into_iter().map(u16::from).collect()
}

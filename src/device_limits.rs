//! Per-device quantity limits
//!
//! The protocol caps a single request at 125 registers / 2000 bits for reads
//! and 123 registers / 1968 coils for writes. Some devices accept less, so the
//! engine validates poll and write requests against a configurable
//! [`DeviceLimits`] before any I/O happens.

use crate::constants::{MAX_READ_COILS, MAX_READ_REGISTERS, MAX_WRITE_COILS, MAX_WRITE_REGISTERS};
use crate::protocol::FunctionCode;

/// Quantity limits for one device.
///
/// ```rust
/// use modbus_visualizer::{DeviceLimits, FunctionCode};
///
/// let limits = DeviceLimits::new().with_max_read_registers(50);
/// assert_eq!(limits.max_quantity(FunctionCode::ReadHoldingRegisters), 50);
/// assert!(limits.check(FunctionCode::ReadInputRegisters, 51).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceLimits {
    pub max_read_registers: u16,
    pub max_write_registers: u16,
    pub max_read_coils: u16,
    pub max_write_coils: u16,
}

impl DeviceLimits {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lower limits for older or less capable devices.
    pub fn conservative() -> Self {
        Self {
            max_read_registers: 50,
            max_write_registers: 50,
            max_read_coils: 500,
            max_write_coils: 500,
        }
    }

    pub fn with_max_read_registers(mut self, count: u16) -> Self {
        self.max_read_registers = count;
        self
    }

    pub fn with_max_write_registers(mut self, count: u16) -> Self {
        self.max_write_registers = count;
        self
    }

    pub fn with_max_read_coils(mut self, count: u16) -> Self {
        self.max_read_coils = count;
        self
    }

    pub fn with_max_write_coils(mut self, count: u16) -> Self {
        self.max_write_coils = count;
        self
    }

    /// Largest quantity this device accepts for `function`, never above the
    /// protocol maximum.
    pub fn max_quantity(&self, function: FunctionCode) -> u16 {
        let configured = match function {
            FunctionCode::ReadCoils | FunctionCode::ReadDiscreteInputs => self.max_read_coils,
            FunctionCode::ReadHoldingRegisters | FunctionCode::ReadInputRegisters => {
                self.max_read_registers
            }
            FunctionCode::WriteMultipleCoils => self.max_write_coils,
            FunctionCode::WriteMultipleRegisters => self.max_write_registers,
        };
        configured.min(function.max_quantity() as u16)
    }

    /// Validate a quantity for `function`; the error text names the bound.
    pub fn check(&self, function: FunctionCode, quantity: usize) -> Result<(), String> {
        let max = self.max_quantity(function);
        if quantity == 0 {
            return Err(format!("{} requires at least one value", function.name()));
        }
        if quantity > max as usize {
            return Err(format!(
                "{} quantity {} exceeds device limit {}",
                function.name(),
                quantity,
                max
            ));
        }
        Ok(())
    }
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            max_read_registers: MAX_READ_REGISTERS as u16,
            max_write_registers: MAX_WRITE_REGISTERS as u16,
            max_read_coils: MAX_READ_COILS as u16,
            max_write_coils: MAX_WRITE_COILS as u16,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

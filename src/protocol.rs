//! Modbus protocol definitions
//!
//! Function codes are a closed set: every operation the engine can perform is
//! a variant of [`FunctionCode`], so dispatch is an exhaustive `match` instead
//! of a lookup table. Raw codes coming from outside are converted once with
//! [`FunctionCode::from_u8`].

use std::fmt;

use crate::constants::{
    EXCEPTION_ACKNOWLEDGE, EXCEPTION_FLAG, EXCEPTION_GATEWAY_PATH_UNAVAILABLE,
    EXCEPTION_GATEWAY_TARGET_FAILED, EXCEPTION_ILLEGAL_DATA_ADDRESS,
    EXCEPTION_ILLEGAL_DATA_VALUE, EXCEPTION_ILLEGAL_FUNCTION, EXCEPTION_MEMORY_PARITY_ERROR,
    EXCEPTION_NEGATIVE_ACKNOWLEDGE, EXCEPTION_SERVER_DEVICE_BUSY,
    EXCEPTION_SERVER_DEVICE_FAILURE, FC_READ_COILS, FC_READ_DISCRETE_INPUTS,
    FC_READ_HOLDING_REGISTERS, FC_READ_INPUT_REGISTERS, FC_WRITE_MULTIPLE_COILS,
    FC_WRITE_MULTIPLE_REGISTERS, MAX_READ_COILS, MAX_READ_REGISTERS, MAX_WRITE_COILS,
    MAX_WRITE_REGISTERS,
};
use crate::error::{ModbusError, ModbusResult};
use crate::pdu::{ModbusPdu, PduBuilder};

/// Modbus slave/unit identifier
pub type SlaveId = u8;

/// Function codes understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionCode {
    /// 0x01
    ReadCoils,
    /// 0x02
    ReadDiscreteInputs,
    /// 0x03
    ReadHoldingRegisters,
    /// 0x04
    ReadInputRegisters,
    /// 0x0F
    WriteMultipleCoils,
    /// 0x10
    WriteMultipleRegisters,
}

impl FunctionCode {
    /// Wire value of this function code.
    pub const fn to_u8(self) -> u8 {
        match self {
            Self::ReadCoils => FC_READ_COILS,
            Self::ReadDiscreteInputs => FC_READ_DISCRETE_INPUTS,
            Self::ReadHoldingRegisters => FC_READ_HOLDING_REGISTERS,
            Self::ReadInputRegisters => FC_READ_INPUT_REGISTERS,
            Self::WriteMultipleCoils => FC_WRITE_MULTIPLE_COILS,
            Self::WriteMultipleRegisters => FC_WRITE_MULTIPLE_REGISTERS,
        }
    }

    /// Parse a raw function code.
    pub fn from_u8(code: u8) -> ModbusResult<Self> {
        match code {
            FC_READ_COILS => Ok(Self::ReadCoils),
            FC_READ_DISCRETE_INPUTS => Ok(Self::ReadDiscreteInputs),
            FC_READ_HOLDING_REGISTERS => Ok(Self::ReadHoldingRegisters),
            FC_READ_INPUT_REGISTERS => Ok(Self::ReadInputRegisters),
            FC_WRITE_MULTIPLE_COILS => Ok(Self::WriteMultipleCoils),
            FC_WRITE_MULTIPLE_REGISTERS => Ok(Self::WriteMultipleRegisters),
            other => Err(ModbusError::invalid_function(other)),
        }
    }

    #[inline]
    pub fn is_read(self) -> bool {
        matches!(
            self,
            Self::ReadCoils
                | Self::ReadDiscreteInputs
                | Self::ReadHoldingRegisters
                | Self::ReadInputRegisters
        )
    }

    #[inline]
    pub fn is_write(self) -> bool {
        !self.is_read()
    }

    /// Whether the function addresses single-bit values (coils/discrete inputs).
    #[inline]
    pub fn is_bit_access(self) -> bool {
        matches!(
            self,
            Self::ReadCoils | Self::ReadDiscreteInputs | Self::WriteMultipleCoils
        )
    }

    /// Largest quantity a single request with this function may carry.
    pub fn max_quantity(self) -> usize {
        match self {
            Self::ReadCoils | Self::ReadDiscreteInputs => MAX_READ_COILS,
            Self::ReadHoldingRegisters | Self::ReadInputRegisters => MAX_READ_REGISTERS,
            Self::WriteMultipleCoils => MAX_WRITE_COILS,
            Self::WriteMultipleRegisters => MAX_WRITE_REGISTERS,
        }
    }

    /// Human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            Self::ReadCoils => "Read Coils",
            Self::ReadDiscreteInputs => "Read Discrete Inputs",
            Self::ReadHoldingRegisters => "Read Holding Registers",
            Self::ReadInputRegisters => "Read Input Registers",
            Self::WriteMultipleCoils => "Write Multiple Coils",
            Self::WriteMultipleRegisters => "Write Multiple Registers",
        }
    }
}

impl TryFrom<u8> for FunctionCode {
    type Error = ModbusError;

    fn try_from(code: u8) -> ModbusResult<Self> {
        Self::from_u8(code)
    }
}

impl fmt::Display for FunctionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X} ({})", self.to_u8(), self.name())
    }
}

/// Human-readable message for an exception code.
///
/// Code 9 is not assigned by the protocol and, like any other unassigned
/// value, falls back to "Unknown Exception Code".
pub fn exception_message(code: u8) -> &'static str {
    match code {
        EXCEPTION_ILLEGAL_FUNCTION => "Illegal Function",
        EXCEPTION_ILLEGAL_DATA_ADDRESS => "Illegal Data Access",
        EXCEPTION_ILLEGAL_DATA_VALUE => "Illegal Data Value",
        EXCEPTION_SERVER_DEVICE_FAILURE => "Slave Device Failure",
        EXCEPTION_ACKNOWLEDGE => "Acknowledge",
        EXCEPTION_SERVER_DEVICE_BUSY => "Slave Device Busy",
        EXCEPTION_NEGATIVE_ACKNOWLEDGE => "Negative Acknowledge",
        EXCEPTION_MEMORY_PARITY_ERROR => "Memory Parity Error",
        EXCEPTION_GATEWAY_PATH_UNAVAILABLE => "Gateway Path Unavailable",
        EXCEPTION_GATEWAY_TARGET_FAILED => "Gateway Target Device Failed to Respond",
        _ => "Unknown Exception Code",
    }
}

/// A single request as handed to a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModbusRequest {
    pub slave_id: SlaveId,
    pub function: FunctionCode,
    pub address: u16,
    /// Number of coils/registers addressed
    pub quantity: u16,
    /// Packed payload for writes (coil bits or big-endian registers), without byte count
    pub data: Vec<u8>,
}

impl ModbusRequest {
    /// Build a read request. Fails for write function codes.
    pub fn read(
        slave_id: SlaveId,
        function: FunctionCode,
        address: u16,
        quantity: u16,
    ) -> ModbusResult<Self> {
        if !function.is_read() {
            return Err(ModbusError::invalid_function(function.to_u8()));
        }
        Ok(Self {
            slave_id,
            function,
            address,
            quantity,
            data: Vec::new(),
        })
    }

    /// Build a write multiple coils request (FC15).
    pub fn write_coils(slave_id: SlaveId, address: u16, values: &[bool]) -> Self {
        let mut data = vec![0u8; values.len().div_ceil(8)];
        for (i, &on) in values.iter().enumerate() {
            if on {
                data[i / 8] |= 1 << (i % 8);
            }
        }
        Self {
            slave_id,
            function: FunctionCode::WriteMultipleCoils,
            address,
            quantity: values.len() as u16,
            data,
        }
    }

    /// Build a write multiple registers request (FC16).
    pub fn write_registers(slave_id: SlaveId, address: u16, values: &[u16]) -> Self {
        let data = values.iter().flat_map(|v| v.to_be_bytes()).collect();
        Self {
            slave_id,
            function: FunctionCode::WriteMultipleRegisters,
            address,
            quantity: values.len() as u16,
            data,
        }
    }

    /// Check quantity against protocol limits and the address space.
    pub fn validate(&self) -> ModbusResult<()> {
        let quantity = self.quantity as usize;
        if quantity == 0 || quantity > self.function.max_quantity() {
            return Err(ModbusError::invalid_data(format!(
                "Invalid quantity {} for {}",
                self.quantity, self.function
            )));
        }
        if self.address as usize + quantity > 0x1_0000 {
            return Err(ModbusError::invalid_data(format!(
                "Address range {}+{} exceeds 65535",
                self.address, self.quantity
            )));
        }
        Ok(())
    }

    /// Encode this request as a PDU.
    pub fn to_pdu(&self) -> ModbusResult<ModbusPdu> {
        let fc = self.function.to_u8();
        match self.function {
            FunctionCode::ReadCoils
            | FunctionCode::ReadDiscreteInputs
            | FunctionCode::ReadHoldingRegisters
            | FunctionCode::ReadInputRegisters => {
                PduBuilder::build_read_request(fc, self.address, self.quantity)
            }
            FunctionCode::WriteMultipleCoils | FunctionCode::WriteMultipleRegisters => {
                Ok(PduBuilder::new()
                    .function_code(fc)?
                    .address(self.address)?
                    .quantity(self.quantity)?
                    .byte(self.data.len() as u8)?
                    .data(&self.data)?
                    .build())
            }
        }
    }
}

/// A successful (non-exception) response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModbusResponse {
    pub slave_id: SlaveId,
    pub function: FunctionCode,
    /// PDU bytes following the function code
    data: Vec<u8>,
}

impl ModbusResponse {
    pub fn new_success(slave_id: SlaveId, function: FunctionCode, data: Vec<u8>) -> Self {
        Self {
            slave_id,
            function,
            data,
        }
    }

    /// Interpret a raw response PDU. Exception responses become
    /// [`ModbusError::Exception`].
    pub fn from_pdu(slave_id: SlaveId, pdu: &[u8]) -> ModbusResult<Self> {
        let (&fc, rest) = pdu
            .split_first()
            .ok_or_else(|| ModbusError::frame("Empty response PDU"))?;

        if fc & EXCEPTION_FLAG != 0 {
            let code = rest
                .first()
                .copied()
                .ok_or_else(|| ModbusError::frame("Exception response without code"))?;
            return Err(ModbusError::exception(fc & !EXCEPTION_FLAG, code));
        }

        Ok(Self::new_success(
            slave_id,
            FunctionCode::from_u8(fc)?,
            rest.to_vec(),
        ))
    }

    /// Raw payload (after the function code).
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Payload of a read response with its byte-count prefix checked and stripped.
    fn counted_payload(&self) -> ModbusResult<&[u8]> {
        let (&count, rest) = self
            .data
            .split_first()
            .ok_or_else(|| ModbusError::frame("Missing byte count"))?;
        rest.get(..count as usize).ok_or_else(|| {
            ModbusError::frame(format!(
                "Byte count {} exceeds payload of {} bytes",
                count,
                rest.len()
            ))
        })
    }

    /// Decode an FC03/FC04 payload into registers.
    pub fn parse_registers(&self) -> ModbusResult<Vec<u16>> {
        let payload = self.counted_payload()?;
        if payload.len() % 2 != 0 {
            return Err(ModbusError::frame("Odd register byte count"));
        }
        Ok(payload
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect())
    }

    /// Decode an FC01/FC02 payload into bits, LSB first within each byte.
    /// The result is padded to a multiple of 8; callers truncate.
    pub fn parse_bits(&self) -> ModbusResult<Vec<bool>> {
        let payload = self.counted_payload()?;
        Ok(payload
            .iter()
            .flat_map(|&byte| (0..8).map(move |bit| byte & (1 << bit) != 0))
            .collect())
    }
}

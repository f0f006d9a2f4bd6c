//! Response parsing must reject garbage with an error, never a panic.

#![no_main]

use libfuzzer_sys::fuzz_target;
use modbus_visualizer::ModbusResponse;

fuzz_target!(|data: &[u8]| {
    if let Ok(response) = ModbusResponse::from_pdu(1, data) {
        let _ = response.parse_registers();
        let _ = response.parse_bits();
    }
});

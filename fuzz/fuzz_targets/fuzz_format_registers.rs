//! The formatter must accept any word sequence under any format.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use modbus_visualizer::{format_registers, ByteOrder, DataType, FormatSpec, Radix, WordOrder};

#[derive(Debug, Arbitrary)]
struct Input {
    words: Vec<u16>,
    data_type: u8,
    lsb_first: bool,
    lsw_first: bool,
    radix: u8,
}

fuzz_target!(|input: Input| {
    let data_type = match input.data_type % 5 {
        0 => DataType::Uint16,
        1 => DataType::Int16,
        2 => DataType::Uint32,
        3 => DataType::Int32,
        _ => DataType::Float32,
    };
    let radix = match input.radix % 4 {
        0 => Radix::Binary,
        1 => Radix::Octal,
        2 => Radix::Decimal,
        _ => Radix::Hexadecimal,
    };
    let spec = FormatSpec::new(data_type)
        .with_byte_order(if input.lsb_first { ByteOrder::LsbFirst } else { ByteOrder::MsbFirst })
        .with_word_order(if input.lsw_first { WordOrder::LswFirst } else { WordOrder::MswFirst })
        .with_radix(radix);

    let out = format_registers(&input.words, &spec);
    let per_value = data_type.register_count();
    assert_eq!(out.len(), input.words.len() / per_value * per_value);
});

//! Register formatter fixtures and properties.

use modbus_visualizer::bytes::{u16_to_word, u32_to_words};
use modbus_visualizer::value::format_float;
use modbus_visualizer::{format_registers, ByteOrder, DataType, FormatSpec, Radix, WordOrder};
use proptest::prelude::*;

fn spec(data_type: DataType, byte_order: ByteOrder, word_order: WordOrder) -> FormatSpec {
    FormatSpec::new(data_type)
        .with_byte_order(byte_order)
        .with_word_order(word_order)
}

#[test]
fn test_endianness_matrix() {
    use ByteOrder::*;
    use WordOrder::*;

    let cases = [
        ([0x40C0, 0x00FF], MsbFirst, MswFirst),
        ([0x00FF, 0x40C0], MsbFirst, LswFirst),
        ([0xC040, 0xFF00], LsbFirst, MswFirst),
        ([0xFF00, 0xC040], LsbFirst, LswFirst),
    ];

    for (words, byte_order, word_order) in cases {
        let float = spec(DataType::Float32, byte_order, word_order);
        assert_eq!(
            format_registers(&words, &float),
            vec!["6.000121593475342", ""],
            "{:04X?} as {} / {}",
            words,
            byte_order,
            word_order
        );

        let unsigned = spec(DataType::Uint32, byte_order, word_order);
        assert_eq!(format_registers(&words, &unsigned), vec!["1086324991", ""]);

        let signed = spec(DataType::Int32, byte_order, word_order);
        assert_eq!(format_registers(&words, &signed), vec!["1086324991", ""]);
    }
}

#[test]
fn test_mismatched_orders_change_the_value() {
    let words = [0x40C0, 0x00FF];
    let swapped = spec(DataType::Uint32, ByteOrder::MsbFirst, WordOrder::LswFirst);
    assert_eq!(format_registers(&words, &swapped), vec!["16728256", ""]);
}

#[test]
fn test_uint32_hex() {
    let hex = FormatSpec::new(DataType::Uint32).with_radix(Radix::Hexadecimal);
    assert_eq!(format_registers(&[0x0201, 0xFFFE], &hex), vec!["0x0201FFFE", ""]);
}

#[test]
fn test_uint32_all_radices() {
    let words = [0x0201, 0xFFFE];
    let render = |radix| format_registers(&words, &FormatSpec::new(DataType::Uint32).with_radix(radix));

    assert_eq!(render(Radix::Decimal), vec!["33685502", ""]);
    assert_eq!(render(Radix::Octal), vec!["0o00200377776", ""]);
    assert_eq!(
        render(Radix::Binary),
        vec!["0b00000010000000011111111111111110", ""]
    );
}

#[test]
fn test_sixteen_bit_fixtures() {
    let words = [0x0201, 0xFFFE];

    let unsigned = FormatSpec::new(DataType::Uint16);
    assert_eq!(format_registers(&words, &unsigned), vec!["513", "65534"]);

    let signed = FormatSpec::new(DataType::Int16);
    assert_eq!(format_registers(&words, &signed), vec!["513", "-2"]);

    let signed_hex = signed.with_radix(Radix::Hexadecimal);
    assert_eq!(format_registers(&words, &signed_hex), vec!["0x0201", "-0x0002"]);

    let unsigned_bin = unsigned.with_radix(Radix::Binary);
    assert_eq!(
        format_registers(&[0x0005], &unsigned_bin),
        vec!["0b0000000000000101"]
    );
}

#[test]
fn test_lsb_first_sixteen_bit() {
    let lsb = FormatSpec::new(DataType::Uint16).with_byte_order(ByteOrder::LsbFirst);
    assert_eq!(format_registers(&[0x0201, 0xFFFE], &lsb), vec!["258", "65279"]);
}

#[test]
fn test_several_floats() {
    let float = FormatSpec::new(DataType::Float32);
    assert_eq!(
        format_registers(&[0xC040, 0x2010, 0x4010, 0x2080], &float),
        vec!["-3.0019569396972656", "", "2.251983642578125", ""]
    );
}

#[test]
fn test_float_ignores_radix() {
    let words = [0x40C0, 0x00FF];
    let decimal = FormatSpec::new(DataType::Float32);
    let hex = decimal.with_radix(Radix::Hexadecimal);
    assert_eq!(format_registers(&words, &decimal), format_registers(&words, &hex));
}

#[test]
fn test_ragged_input_drops_remainder() {
    let float = FormatSpec::new(DataType::Float32);
    let output = format_registers(&[0x40C0, 0x00FF, 0x1234], &float);
    assert_eq!(output, vec!["6.000121593475342", ""]);

    let int = FormatSpec::new(DataType::Int32);
    assert!(format_registers(&[0xFFFF], &int).is_empty());
}

#[test]
fn test_formatting_is_segment_independent() {
    let float = FormatSpec::new(DataType::Float32);
    let words = [0x40C0, 0x00FF, 0xC040, 0x2010];

    let whole = format_registers(&words, &float);
    let mut pieces = format_registers(&words[..2], &float);
    pieces.extend(format_registers(&words[2..], &float));
    assert_eq!(whole, pieces);
}

// ============================================================================
// Properties
// ============================================================================

fn byte_orders() -> impl Strategy<Value = ByteOrder> {
    prop_oneof![Just(ByteOrder::MsbFirst), Just(ByteOrder::LsbFirst)]
}

fn word_orders() -> impl Strategy<Value = WordOrder> {
    prop_oneof![Just(WordOrder::MswFirst), Just(WordOrder::LswFirst)]
}

fn radices() -> impl Strategy<Value = Radix> {
    prop_oneof![
        Just(Radix::Binary),
        Just(Radix::Octal),
        Just(Radix::Decimal),
        Just(Radix::Hexadecimal),
    ]
}

fn data_types() -> impl Strategy<Value = DataType> {
    prop_oneof![
        Just(DataType::Uint16),
        Just(DataType::Int16),
        Just(DataType::Uint32),
        Just(DataType::Int32),
        Just(DataType::Float32),
    ]
}

proptest! {
    #[test]
    fn prop_u32_round_trip(value: u32, bo in byte_orders(), wo in word_orders()) {
        let words = u32_to_words(value, bo, wo);
        let out = format_registers(&words, &spec(DataType::Uint32, bo, wo));
        prop_assert_eq!(out, vec![value.to_string(), String::new()]);
    }

    #[test]
    fn prop_i32_round_trip(value: i32, bo in byte_orders(), wo in word_orders()) {
        let words = u32_to_words(value as u32, bo, wo);
        let out = format_registers(&words, &spec(DataType::Int32, bo, wo));
        prop_assert_eq!(out, vec![value.to_string(), String::new()]);
    }

    #[test]
    fn prop_f32_round_trip(value in proptest::num::f32::NORMAL, bo in byte_orders(), wo in word_orders()) {
        let words = u32_to_words(value.to_bits(), bo, wo);
        let out = format_registers(&words, &spec(DataType::Float32, bo, wo));
        prop_assert_eq!(&out[0], &format_float(f64::from(value)));
        let parsed: f64 = out[0].parse().unwrap();
        prop_assert_eq!(parsed as f32, value);
    }

    #[test]
    fn prop_i16_round_trip(value: i16, bo in byte_orders()) {
        let word = u16_to_word(value as u16, bo);
        let out = format_registers(&[word], &FormatSpec::new(DataType::Int16).with_byte_order(bo));
        prop_assert_eq!(out, vec![value.to_string()]);
    }

    #[test]
    fn prop_deterministic_and_sized(
        words in proptest::collection::vec(any::<u16>(), 0..64),
        dt in data_types(),
        bo in byte_orders(),
        wo in word_orders(),
        radix in radices(),
    ) {
        let spec = spec(dt, bo, wo).with_radix(radix);
        let first = format_registers(&words, &spec);
        prop_assert_eq!(&first, &format_registers(&words, &spec));

        // One slot per consumed register; a ragged tail consumes none.
        let per_value = dt.register_count();
        prop_assert_eq!(first.len(), words.len() / per_value * per_value);
    }

    #[test]
    fn prop_hex_width_fixed(value: u32) {
        let hex = FormatSpec::new(DataType::Uint32).with_radix(Radix::Hexadecimal);
        let out = format_registers(&u32_to_words(value, ByteOrder::MsbFirst, WordOrder::MswFirst), &hex);
        prop_assert_eq!(out[0].len(), 10);
        prop_assert_eq!(u32::from_str_radix(&out[0][2..], 16).unwrap(), value);
    }
}

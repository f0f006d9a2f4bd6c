//! Formatter throughput

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use modbus_visualizer::{format_registers, ByteOrder, DataType, FormatSpec, Radix, WordOrder};

fn registers(count: usize) -> Vec<u16> {
    (0..count as u32)
        .map(|i| (i.wrapping_mul(0x9E37) ^ 0x40C0) as u16)
        .collect()
}

fn benchmark_data_types(c: &mut Criterion) {
    let words = registers(125);
    let mut group = c.benchmark_group("data_types");

    for data_type in [
        DataType::Uint16,
        DataType::Int16,
        DataType::Uint32,
        DataType::Int32,
        DataType::Float32,
    ] {
        let spec = FormatSpec::new(data_type)
            .with_byte_order(ByteOrder::LsbFirst)
            .with_word_order(WordOrder::LswFirst);
        group.bench_with_input(BenchmarkId::from_parameter(data_type), &spec, |b, spec| {
            b.iter(|| format_registers(black_box(&words), spec))
        });
    }

    group.finish();
}

fn benchmark_radices(c: &mut Criterion) {
    let words = registers(125);
    let mut group = c.benchmark_group("radices");

    for radix in [Radix::Binary, Radix::Octal, Radix::Decimal, Radix::Hexadecimal] {
        let spec = FormatSpec::new(DataType::Int32).with_radix(radix);
        group.bench_with_input(BenchmarkId::from_parameter(radix), &spec, |b, spec| {
            b.iter(|| format_registers(black_box(&words), spec))
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_data_types, benchmark_radices);
criterion_main!(benches);

//! Console poller
//!
//! Polls a Modbus TCP device and prints each frame under a chosen format.
//! Ctrl-C stops a continuous poll.
//!
//! Usage:
//!   poll <host> <port> <function> <start> <length> [options]
//!
//! Options:
//!   --interval <secs>     pause between passes (default 1)
//!   --duration <secs>     how long to poll; "inf" polls until Ctrl-C (default 0, one pass)
//!   --type <type>         uint16 | int16 | uint32 | int32 | float32 (default uint16)
//!   --byte-order <order>  msb | lsb (default msb)
//!   --word-order <order>  msw | lsw (default msw)
//!   --radix <base>        2 | 8 | 10 | 16 (default 10)
//!   --slave <id>          unit id (default 1)
//!
//! Example: poll 127.0.0.1 5020 3 0 8 --type float32 --duration inf
//!
//! Set RUST_LOG=modbus_visualizer=debug for engine and transport logs.

use std::error::Error;

use tracing_subscriber::EnvFilter;

use modbus_visualizer::{
    ByteOrder, ConnectionSettings, DataType, DeviceConnector, EngineConfig, EngineEvent,
    FormatSpec, FunctionCode, PollRequest, Poller, Radix, WordOrder,
};

/// Values per printed row, matching a ten-row register table.
const ROW: usize = 10;

struct Args {
    host: String,
    port: u16,
    request: PollRequest,
    format: FormatSpec,
    slave_id: u8,
}

fn usage() -> String {
    "usage: poll <host> <port> <function> <start> <length> [--interval s] [--duration s|inf] \
     [--type t] [--byte-order msb|lsb] [--word-order msw|lsw] [--radix 2|8|10|16] [--slave id]"
        .to_string()
}

fn parse_args() -> Result<Args, Box<dyn Error>> {
    let raw: Vec<String> = std::env::args().skip(1).collect();
    if raw.len() < 5 {
        return Err(usage().into());
    }

    let host = raw[0].clone();
    let port: u16 = raw[1].parse()?;
    let function = FunctionCode::from_u8(raw[2].parse()?)?;
    let start: u16 = raw[3].parse()?;
    let length: u16 = raw[4].parse()?;

    let mut request = PollRequest::single(function, start, length).with_interval(1.0);
    let mut format = FormatSpec::default();
    let mut slave_id = 1;

    let mut rest = raw[5..].iter();
    while let Some(flag) = rest.next() {
        let value = rest
            .next()
            .ok_or_else(|| format!("missing value for {}", flag))?;
        match flag.as_str() {
            "--interval" => request.interval = value.parse()?,
            "--duration" => {
                request.duration = match value.as_str() {
                    "inf" => f64::INFINITY,
                    secs => secs.parse()?,
                }
            }
            "--type" => format.data_type = value.parse::<DataType>()?,
            "--byte-order" => format.byte_order = value.parse::<ByteOrder>()?,
            "--word-order" => format.word_order = value.parse::<WordOrder>()?,
            "--radix" => format.radix = Radix::try_from(value.parse::<u32>()?)?,
            "--slave" => slave_id = value.parse()?,
            other => return Err(format!("unknown option {}\n{}", other, usage()).into()),
        }
    }

    // A single pass has nothing to pace.
    if request.duration == 0.0 {
        request.interval = 0.0;
    }

    Ok(Args {
        host,
        port,
        request,
        format,
        slave_id,
    })
}

fn print_frame(start: u16, values: &[String]) {
    for (row, chunk) in values.chunks(ROW).enumerate() {
        let address = start as usize + row * ROW;
        println!("{:>5}: {}", address, chunk.join("\t"));
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let args = parse_args()?;

    let config = EngineConfig::default().with_slave_id(args.slave_id);
    let mut poller = Poller::spawn(DeviceConnector, config);
    let handle = poller.handle();

    handle.submit_connection_settings(ConnectionSettings::tcp(args.host, args.port))?;
    handle.start_poll(args.request)?;

    let stopper = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("Stopping...");
            stopper.request_stop();
        }
    });

    while let Some(event) = poller.next_event().await {
        match event {
            EngineEvent::Data(frame) if !frame.is_empty() => {
                print_frame(frame.request.start_address, &frame.render(&args.format));
            }
            EngineEvent::Message(message) => println!("{}", message),
            EngineEvent::PollFinished => break,
            _ => {}
        }
    }

    poller.shutdown().await;
    Ok(())
}

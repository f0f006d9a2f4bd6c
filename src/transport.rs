//! Transport layer
//!
//! All three framings carry the same PDU and differ only in the envelope:
//!
//! | Transport | Envelope |
//! |-----------|----------|
//! | [`TcpTransport`] | MBAP header (transaction, protocol, length, unit) + PDU |
//! | [`RtuTransport`] | slave id + PDU + CRC-16/MODBUS (little-endian) |
//! | [`AsciiTransport`] | `:` + hex(slave id + PDU + LRC) + CRLF |
//!
//! Transports are connected on construction. A link failure (I/O error or
//! timeout) drops the underlying stream and [`ModbusTransport::is_connected`]
//! turns false; reconnecting is the connection manager's job.

use std::future::Future;
use std::time::Duration;

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::constants::{MAX_MBAP_LENGTH, MBAP_HEADER_LEN};
use crate::error::{ModbusError, ModbusResult};
use crate::protocol::{ModbusRequest, ModbusResponse};

#[cfg(feature = "rtu")]
use crate::config::{DataBits, Parity, SerialSettings, StopBits};
#[cfg(feature = "rtu")]
use crate::constants::{MAX_ASCII_FRAME_SIZE, MAX_RTU_FRAME_SIZE};
#[cfg(feature = "rtu")]
use crc::{Crc, CRC_16_MODBUS};

#[cfg(feature = "rtu")]
const CRC_MODBUS: Crc<u16> = Crc::<u16>::new(&CRC_16_MODBUS);

/// A request/response channel to one device.
pub trait ModbusTransport: Send + Sync {
    /// Send a request and wait for the matching response.
    ///
    /// Exception responses surface as [`ModbusError::Exception`].
    fn request(
        &mut self,
        request: &ModbusRequest,
    ) -> impl Future<Output = ModbusResult<ModbusResponse>> + Send;

    /// Whether the underlying link is believed to be up.
    fn is_connected(&self) -> bool;

    /// Release the underlying link.
    fn close(&mut self) -> impl Future<Output = ModbusResult<()>> + Send;

    fn get_stats(&self) -> TransportStats;
}

/// Per-transport counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportStats {
    pub requests_sent: u64,
    pub responses_received: u64,
    pub errors: u64,
    pub timeouts: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

impl TransportStats {
    fn record_failure(&mut self, error: &ModbusError) {
        self.errors += 1;
        if matches!(error, ModbusError::Timeout { .. }) {
            self.timeouts += 1;
        }
    }
}

fn hex_dump(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Run one I/O step under a deadline.
async fn io_step<T>(
    limit: Duration,
    operation: &str,
    fut: impl Future<Output = std::io::Result<T>>,
) -> ModbusResult<T> {
    match timeout(limit, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(ModbusError::Io(e)),
        Err(_) => Err(ModbusError::timeout(operation, limit.as_millis() as u64)),
    }
}

// ============================================================================
// TCP
// ============================================================================

/// Modbus TCP transport.
pub struct TcpTransport {
    stream: Option<TcpStream>,
    peer: String,
    timeout: Duration,
    transaction_id: u16,
    stats: TransportStats,
}

impl TcpTransport {
    /// Open a TCP connection to `host:port`, bounded by `timeout`.
    pub async fn connect(host: &str, port: u16, timeout: Duration) -> ModbusResult<Self> {
        let peer = format!("{}:{}", host, port);
        let stream = io_step(timeout, "connect", TcpStream::connect((host, port)))
            .await
            .map_err(|e| ModbusError::connection(format!("Failed to connect to {}: {}", peer, e)))?;
        // Frames are small and latency bound.
        stream.set_nodelay(true)?;
        debug!("TCP connected to {}", peer);

        Ok(Self {
            stream: Some(stream),
            peer,
            timeout,
            transaction_id: 0,
            stats: TransportStats::default(),
        })
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    fn next_transaction_id(&mut self) -> u16 {
        self.transaction_id = self.transaction_id.wrapping_add(1);
        self.transaction_id
    }

    fn encode(transaction_id: u16, unit_id: u8, pdu: &[u8]) -> BytesMut {
        let mut frame = BytesMut::with_capacity(MBAP_HEADER_LEN + 1 + pdu.len());
        frame.put_u16(transaction_id);
        frame.put_u16(0);
        frame.put_u16((pdu.len() + 1) as u16);
        frame.put_u8(unit_id);
        frame.put_slice(pdu);
        frame
    }

    /// Write one frame and read back the MBAP header plus PDU.
    async fn exchange(
        stream: &mut TcpStream,
        limit: Duration,
        frame: &[u8],
    ) -> ModbusResult<([u8; MBAP_HEADER_LEN + 1], Vec<u8>)> {
        io_step(limit, "send request", stream.write_all(frame)).await?;

        let mut header = [0u8; MBAP_HEADER_LEN + 1];
        io_step(limit, "read response header", stream.read_exact(&mut header)).await?;

        let length = u16::from_be_bytes([header[4], header[5]]) as usize;
        if !(2..=MAX_MBAP_LENGTH).contains(&length) {
            return Err(ModbusError::frame(format!("Invalid MBAP length {}", length)));
        }

        let mut pdu = vec![0u8; length - 1];
        io_step(limit, "read response data", stream.read_exact(&mut pdu)).await?;
        Ok((header, pdu))
    }

    async fn transact(&mut self, request: &ModbusRequest) -> ModbusResult<ModbusResponse> {
        request.validate()?;
        let pdu = request.to_pdu()?;
        let tid = self.next_transaction_id();
        let frame = Self::encode(tid, request.slave_id, pdu.as_slice());
        let limit = self.timeout;

        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| ModbusError::connection("TCP transport is not connected"))?;

        self.stats.requests_sent += 1;
        self.stats.bytes_sent += frame.len() as u64;
        trace!("[MODBUS-TCP] send slave:{} {}", request.slave_id, hex_dump(&frame));

        let (header, body) = Self::exchange(stream, limit, &frame).await?;
        self.stats.responses_received += 1;
        self.stats.bytes_received += (header.len() + body.len()) as u64;
        trace!(
            "[MODBUS-TCP] receive slave:{} {} {}",
            header[6],
            hex_dump(&header),
            hex_dump(&body)
        );

        let echoed = u16::from_be_bytes([header[0], header[1]]);
        if echoed != tid {
            return Err(ModbusError::protocol(format!(
                "Transaction ID mismatch: expected {}, got {}",
                tid, echoed
            )));
        }

        ModbusResponse::from_pdu(header[6], &body)
    }
}

impl ModbusTransport for TcpTransport {
    async fn request(&mut self, request: &ModbusRequest) -> ModbusResult<ModbusResponse> {
        let result = self.transact(request).await;
        if let Err(ref e) = result {
            self.stats.record_failure(e);
            // A half-read frame leaves the stream unusable.
            if e.is_link_failure() || matches!(e, ModbusError::Frame { .. }) {
                debug!("TCP link to {} dropped: {}", self.peer, e);
                self.stream = None;
            }
        }
        result
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn close(&mut self) -> ModbusResult<()> {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }
        Ok(())
    }

    fn get_stats(&self) -> TransportStats {
        self.stats.clone()
    }
}

// ============================================================================
// Serial (RTU / ASCII)
// ============================================================================

#[cfg(feature = "rtu")]
fn open_serial(settings: &SerialSettings, io_timeout: Duration) -> ModbusResult<tokio_serial::SerialStream> {
    let data_bits = match settings.byte_size {
        DataBits::Five => tokio_serial::DataBits::Five,
        DataBits::Six => tokio_serial::DataBits::Six,
        DataBits::Seven => tokio_serial::DataBits::Seven,
        DataBits::Eight => tokio_serial::DataBits::Eight,
    };
    let stop_bits = match settings.stop_bits {
        StopBits::One => tokio_serial::StopBits::One,
        StopBits::Two => tokio_serial::StopBits::Two,
    };
    let parity = match settings.parity {
        Parity::None => tokio_serial::Parity::None,
        Parity::Even => tokio_serial::Parity::Even,
        Parity::Odd => tokio_serial::Parity::Odd,
    };

    let builder = tokio_serial::new(&settings.port, settings.baud_rate)
        .data_bits(data_bits)
        .stop_bits(stop_bits)
        .parity(parity)
        .timeout(io_timeout);

    tokio_serial::SerialStream::open(&builder).map_err(|e| {
        ModbusError::connection(format!("Failed to open serial port {}: {}", settings.port, e))
    })
}

/// Silent interval that terminates an RTU frame (3.5 character times,
/// fixed at 1.75 ms above 19200 baud).
#[cfg(feature = "rtu")]
fn rtu_frame_gap(baud_rate: u32) -> Duration {
    if baud_rate > 19_200 {
        Duration::from_micros(1_750)
    } else {
        let char_time_us = 11_000_000 / u64::from(baud_rate.max(1));
        Duration::from_micros(char_time_us * 35 / 10)
    }
}

/// Scheduler jitter makes sub-millisecond silence detection unreliable.
#[cfg(feature = "rtu")]
const MIN_FRAME_SILENCE: Duration = Duration::from_millis(5);

/// Modbus RTU transport over a serial line.
#[cfg(feature = "rtu")]
pub struct RtuTransport {
    port: Option<tokio_serial::SerialStream>,
    port_name: String,
    timeout: Duration,
    frame_gap: Duration,
    stats: TransportStats,
}

#[cfg(feature = "rtu")]
impl RtuTransport {
    pub fn open(settings: &SerialSettings, timeout: Duration) -> ModbusResult<Self> {
        let port = open_serial(settings, timeout)?;
        debug!("RTU port {} opened at {} baud", settings.port, settings.baud_rate);
        Ok(Self {
            port: Some(port),
            port_name: settings.port.clone(),
            timeout,
            frame_gap: rtu_frame_gap(settings.baud_rate),
            stats: TransportStats::default(),
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    fn encode(slave_id: u8, pdu: &[u8]) -> BytesMut {
        let mut frame = BytesMut::with_capacity(pdu.len() + 3);
        frame.put_u8(slave_id);
        frame.put_slice(pdu);
        let crc = CRC_MODBUS.checksum(&frame);
        frame.put_u16_le(crc);
        frame
    }

    /// Split a received ADU into slave id and PDU after checking its CRC.
    fn decode(frame: &[u8]) -> ModbusResult<(u8, &[u8])> {
        if frame.len() < 4 {
            return Err(ModbusError::frame("RTU frame too short"));
        }
        let body_len = frame.len() - 2;
        let received = u16::from_le_bytes([frame[body_len], frame[body_len + 1]]);
        let computed = CRC_MODBUS.checksum(&frame[..body_len]);
        if received != computed {
            return Err(ModbusError::frame(format!(
                "CRC mismatch: expected 0x{:04X}, got 0x{:04X}",
                computed, received
            )));
        }
        Ok((frame[0], &frame[1..body_len]))
    }

    /// Read until the line has been silent for one frame gap.
    async fn read_frame(
        port: &mut tokio_serial::SerialStream,
        limit: Duration,
        silence: Duration,
    ) -> ModbusResult<Vec<u8>> {
        let mut frame = Vec::with_capacity(MAX_RTU_FRAME_SIZE);
        let mut chunk = [0u8; MAX_RTU_FRAME_SIZE];

        let n = io_step(limit, "read response", port.read(&mut chunk)).await?;
        if n == 0 {
            return Err(ModbusError::connection("Serial port closed"));
        }
        frame.extend_from_slice(&chunk[..n]);

        loop {
            match timeout(silence, port.read(&mut chunk)).await {
                Ok(Ok(0)) | Err(_) => break,
                Ok(Ok(n)) => {
                    frame.extend_from_slice(&chunk[..n]);
                    if frame.len() > MAX_RTU_FRAME_SIZE {
                        return Err(ModbusError::frame("RTU frame too large"));
                    }
                }
                Ok(Err(e)) => return Err(ModbusError::Io(e)),
            }
        }
        Ok(frame)
    }

    async fn transact(&mut self, request: &ModbusRequest) -> ModbusResult<ModbusResponse> {
        request.validate()?;
        let pdu = request.to_pdu()?;
        let frame = Self::encode(request.slave_id, pdu.as_slice());
        let limit = self.timeout;
        let gap = self.frame_gap;

        let port = self
            .port
            .as_mut()
            .ok_or_else(|| ModbusError::connection("Serial port not open"))?;

        tokio::time::sleep(gap).await;
        self.stats.requests_sent += 1;
        self.stats.bytes_sent += frame.len() as u64;
        trace!("[MODBUS-RTU] send slave:{} {}", request.slave_id, hex_dump(&frame));

        io_step(limit, "send request", port.write_all(&frame)).await?;
        io_step(limit, "flush request", port.flush()).await?;

        let reply = Self::read_frame(port, limit, gap.max(MIN_FRAME_SILENCE)).await?;
        self.stats.responses_received += 1;
        self.stats.bytes_received += reply.len() as u64;
        trace!("[MODBUS-RTU] receive {}", hex_dump(&reply));

        let (slave_id, body) = Self::decode(&reply)?;
        if slave_id != request.slave_id {
            return Err(ModbusError::protocol(format!(
                "Response slave ID mismatch: expected {}, got {}",
                request.slave_id, slave_id
            )));
        }
        ModbusResponse::from_pdu(slave_id, body)
    }
}

#[cfg(feature = "rtu")]
impl ModbusTransport for RtuTransport {
    async fn request(&mut self, request: &ModbusRequest) -> ModbusResult<ModbusResponse> {
        let result = self.transact(request).await;
        if let Err(ref e) = result {
            self.stats.record_failure(e);
            if matches!(e, ModbusError::Io(_) | ModbusError::Connection { .. }) {
                self.port = None;
            }
        }
        result
    }

    fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    async fn close(&mut self) -> ModbusResult<()> {
        self.port = None;
        Ok(())
    }

    fn get_stats(&self) -> TransportStats {
        self.stats.clone()
    }
}

/// Two's complement of the byte sum.
#[cfg(feature = "rtu")]
fn lrc(data: &[u8]) -> u8 {
    data.iter()
        .fold(0u8, |acc, &b| acc.wrapping_add(b))
        .wrapping_neg()
}

#[cfg(feature = "rtu")]
fn hex_value(c: u8) -> ModbusResult<u8> {
    match c {
        b'0'..=b'9' => Ok(c - b'0'),
        b'A'..=b'F' => Ok(c - b'A' + 10),
        b'a'..=b'f' => Ok(c - b'a' + 10),
        _ => Err(ModbusError::frame(format!("Invalid ASCII hex character 0x{:02X}", c))),
    }
}

/// Modbus ASCII transport over a serial line.
#[cfg(feature = "rtu")]
pub struct AsciiTransport {
    port: Option<tokio_serial::SerialStream>,
    port_name: String,
    timeout: Duration,
    stats: TransportStats,
}

#[cfg(feature = "rtu")]
impl AsciiTransport {
    pub fn open(settings: &SerialSettings, timeout: Duration) -> ModbusResult<Self> {
        let port = open_serial(settings, timeout)?;
        debug!("ASCII port {} opened at {} baud", settings.port, settings.baud_rate);
        Ok(Self {
            port: Some(port),
            port_name: settings.port.clone(),
            timeout,
            stats: TransportStats::default(),
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    fn encode(slave_id: u8, pdu: &[u8]) -> BytesMut {
        let mut raw = Vec::with_capacity(pdu.len() + 2);
        raw.push(slave_id);
        raw.extend_from_slice(pdu);
        raw.push(lrc(&raw));

        let mut frame = BytesMut::with_capacity(raw.len() * 2 + 3);
        frame.put_u8(b':');
        for byte in raw {
            frame.put_slice(format!("{:02X}", byte).as_bytes());
        }
        frame.put_slice(b"\r\n");
        frame
    }

    /// Decode `:`…CRLF into slave id and PDU after checking the LRC.
    fn decode(line: &[u8]) -> ModbusResult<(u8, Vec<u8>)> {
        let body = line
            .strip_prefix(b":")
            .and_then(|rest| rest.strip_suffix(b"\r\n"))
            .ok_or_else(|| ModbusError::frame("ASCII frame must start with ':' and end with CRLF"))?;
        if body.len() % 2 != 0 || body.len() < 6 {
            return Err(ModbusError::frame(format!("Bad ASCII frame length {}", body.len())));
        }

        let raw = body
            .chunks_exact(2)
            .map(|pair| -> ModbusResult<u8> { Ok((hex_value(pair[0])? << 4) | hex_value(pair[1])?) })
            .collect::<ModbusResult<Vec<u8>>>()?;

        let (&received, payload) = raw
            .split_last()
            .ok_or_else(|| ModbusError::frame("Empty ASCII frame"))?;
        let computed = lrc(payload);
        if received != computed {
            return Err(ModbusError::frame(format!(
                "LRC mismatch: expected 0x{:02X}, got 0x{:02X}",
                computed, received
            )));
        }
        Ok((payload[0], payload[1..].to_vec()))
    }

    async fn read_line(port: &mut tokio_serial::SerialStream) -> ModbusResult<Vec<u8>> {
        let mut line = Vec::with_capacity(64);
        let mut chunk = [0u8; 64];
        loop {
            let n = port.read(&mut chunk).await?;
            if n == 0 {
                return Err(ModbusError::connection("Serial port closed"));
            }
            line.extend_from_slice(&chunk[..n]);
            if line.ends_with(b"\r\n") {
                // Discard noise received before the start character.
                if let Some(start) = line.iter().position(|&b| b == b':') {
                    line.drain(..start);
                }
                return Ok(line);
            }
            if line.len() > MAX_ASCII_FRAME_SIZE {
                return Err(ModbusError::frame("ASCII frame too large"));
            }
        }
    }

    async fn transact(&mut self, request: &ModbusRequest) -> ModbusResult<ModbusResponse> {
        request.validate()?;
        let pdu = request.to_pdu()?;
        let frame = Self::encode(request.slave_id, pdu.as_slice());
        let limit = self.timeout;

        let port = self
            .port
            .as_mut()
            .ok_or_else(|| ModbusError::connection("Serial port not open"))?;

        self.stats.requests_sent += 1;
        self.stats.bytes_sent += frame.len() as u64;
        trace!("[MODBUS-ASCII] send {}", String::from_utf8_lossy(&frame).trim_end());

        io_step(limit, "send request", port.write_all(&frame)).await?;
        io_step(limit, "flush request", port.flush()).await?;

        let line = match timeout(limit, Self::read_line(port)).await {
            Ok(result) => result?,
            Err(_) => return Err(ModbusError::timeout("read response", limit.as_millis() as u64)),
        };
        self.stats.responses_received += 1;
        self.stats.bytes_received += line.len() as u64;
        trace!("[MODBUS-ASCII] receive {}", String::from_utf8_lossy(&line).trim_end());

        let (slave_id, body) = Self::decode(&line)?;
        if slave_id != request.slave_id {
            return Err(ModbusError::protocol(format!(
                "Response slave ID mismatch: expected {}, got {}",
                request.slave_id, slave_id
            )));
        }
        ModbusResponse::from_pdu(slave_id, &body)
    }
}

#[cfg(feature = "rtu")]
impl ModbusTransport for AsciiTransport {
    async fn request(&mut self, request: &ModbusRequest) -> ModbusResult<ModbusResponse> {
        let result = self.transact(request).await;
        if let Err(ref e) = result {
            self.stats.record_failure(e);
            if matches!(e, ModbusError::Io(_) | ModbusError::Connection { .. }) {
                self.port = None;
            }
        }
        result
    }

    fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    async fn close(&mut self) -> ModbusResult<()> {
        self.port = None;
        Ok(())
    }

    fn get_stats(&self) -> TransportStats {
        self.stats.clone()
    }
}

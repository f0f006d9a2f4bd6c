//! Connection management
//!
//! The worker owns exactly one [`ConnectionManager`], which owns exactly one
//! live client. Applying new [`ConnectionSettings`] always closes the old
//! link before the new one is opened, so serial ports are released before
//! they are re-opened.
//!
//! Opening a link is delegated to a [`Connector`], which lets tests swap in an
//! in-memory device. [`DeviceConnector`] is the real one.
//!
//! [`ConfigGate`] is the busy flag shared between submitters and the worker.
//! Acquiring it is a compare-and-swap, so two overlapping configuration
//! attempts cannot both get through.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::client::{GenericModbusClient, ModbusClient};
use crate::config::ConnectionSettings;
use crate::error::{ModbusError, ModbusResult};
use crate::protocol::{ModbusRequest, ModbusResponse};
use crate::transport::{ModbusTransport, TcpTransport, TransportStats};

#[cfg(feature = "rtu")]
use crate::config::{SerialSettings, SerialVariant};
#[cfg(feature = "rtu")]
use crate::transport::{AsciiTransport, RtuTransport};

/// Opens transports from settings.
pub trait Connector: Send + 'static {
    type Transport: ModbusTransport + 'static;

    fn connect(
        &mut self,
        settings: &ConnectionSettings,
        timeout: Duration,
    ) -> impl Future<Output = ModbusResult<Self::Transport>> + Send;
}

// ============================================================================
// Real devices
// ============================================================================

/// Any transport [`DeviceConnector`] can produce.
pub enum DeviceTransport {
    Tcp(TcpTransport),
    #[cfg(feature = "rtu")]
    Rtu(RtuTransport),
    #[cfg(feature = "rtu")]
    Ascii(AsciiTransport),
}

impl ModbusTransport for DeviceTransport {
    async fn request(&mut self, request: &ModbusRequest) -> ModbusResult<ModbusResponse> {
        match self {
            Self::Tcp(t) => t.request(request).await,
            #[cfg(feature = "rtu")]
            Self::Rtu(t) => t.request(request).await,
            #[cfg(feature = "rtu")]
            Self::Ascii(t) => t.request(request).await,
        }
    }

    fn is_connected(&self) -> bool {
        match self {
            Self::Tcp(t) => t.is_connected(),
            #[cfg(feature = "rtu")]
            Self::Rtu(t) => t.is_connected(),
            #[cfg(feature = "rtu")]
            Self::Ascii(t) => t.is_connected(),
        }
    }

    async fn close(&mut self) -> ModbusResult<()> {
        match self {
            Self::Tcp(t) => t.close().await,
            #[cfg(feature = "rtu")]
            Self::Rtu(t) => t.close().await,
            #[cfg(feature = "rtu")]
            Self::Ascii(t) => t.close().await,
        }
    }

    fn get_stats(&self) -> TransportStats {
        match self {
            Self::Tcp(t) => t.get_stats(),
            #[cfg(feature = "rtu")]
            Self::Rtu(t) => t.get_stats(),
            #[cfg(feature = "rtu")]
            Self::Ascii(t) => t.get_stats(),
        }
    }
}

/// Connects over TCP or, with the `rtu` feature, a serial line.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceConnector;

impl Connector for DeviceConnector {
    type Transport = DeviceTransport;

    async fn connect(
        &mut self,
        settings: &ConnectionSettings,
        timeout: Duration,
    ) -> ModbusResult<DeviceTransport> {
        match settings {
            ConnectionSettings::Tcp { host, port } => {
                let transport = TcpTransport::connect(host, *port, timeout).await?;
                Ok(DeviceTransport::Tcp(transport))
            }
            ConnectionSettings::Serial(serial) => open_serial(serial, timeout),
        }
    }
}

#[cfg(feature = "rtu")]
fn open_serial(settings: &SerialSettings, timeout: Duration) -> ModbusResult<DeviceTransport> {
    match settings.variant {
        SerialVariant::Rtu => RtuTransport::open(settings, timeout).map(DeviceTransport::Rtu),
        SerialVariant::Ascii => AsciiTransport::open(settings, timeout).map(DeviceTransport::Ascii),
    }
}

#[cfg(not(feature = "rtu"))]
fn open_serial(
    settings: &crate::config::SerialSettings,
    _timeout: Duration,
) -> ModbusResult<DeviceTransport> {
    Err(ModbusError::configuration(format!(
        "serial support is disabled; cannot open {}",
        settings.port
    )))
}

// ============================================================================
// Busy gate
// ============================================================================

/// Atomic "configuration in progress" flag.
#[derive(Debug, Clone, Default)]
pub struct ConfigGate {
    busy: Arc<AtomicBool>,
}

impl ConfigGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a configuration as in progress. Returns `false` if one already is.
    pub fn try_acquire(&self) -> bool {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn release(&self) {
        self.busy.store(false, Ordering::Release);
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

// ============================================================================
// Manager
// ============================================================================

/// Sole owner of the live client.
pub struct ConnectionManager<C: Connector> {
    connector: C,
    client: Option<GenericModbusClient<C::Transport>>,
    settings: Option<ConnectionSettings>,
    io_timeout: Duration,
}

impl<C: Connector> ConnectionManager<C> {
    pub fn new(connector: C, io_timeout: Duration) -> Self {
        Self {
            connector,
            client: None,
            settings: None,
            io_timeout,
        }
    }

    /// Replace the connection: close the current one, then open `settings`.
    ///
    /// The settings are remembered even when opening fails, so a later
    /// operation can retry the link.
    pub async fn configure(&mut self, settings: ConnectionSettings) -> ModbusResult<()> {
        self.close().await;
        self.settings = Some(settings.clone());
        self.open(&settings).await
    }

    async fn open(&mut self, settings: &ConnectionSettings) -> ModbusResult<()> {
        let transport = self.connector.connect(settings, self.io_timeout).await?;
        self.client = Some(GenericModbusClient::new(transport));
        debug!("Connected: {}", settings);
        Ok(())
    }

    /// Close the live link, if any. Close errors are logged and swallowed.
    pub async fn close(&mut self) {
        if let Some(mut client) = self.client.take() {
            if let Err(e) = client.close().await {
                warn!("Error while closing connection: {}", e);
            }
        }
    }

    /// Close and forget the settings.
    pub async fn shutdown(&mut self) {
        self.close().await;
        self.settings = None;
    }

    pub fn is_connected(&self) -> bool {
        self.client.as_ref().is_some_and(|c| c.is_connected())
    }

    pub fn settings(&self) -> Option<&ConnectionSettings> {
        self.settings.as_ref()
    }

    pub fn stats(&self) -> Option<TransportStats> {
        self.client.as_ref().map(|c| c.get_stats())
    }

    /// The live client. If the link has dropped, it is re-opened once from the
    /// remembered settings.
    pub async fn client(&mut self) -> ModbusResult<&mut GenericModbusClient<C::Transport>> {
        if !self.is_connected() {
            let settings = self
                .settings
                .clone()
                .ok_or_else(|| ModbusError::connection("No connection configured"))?;
            self.close().await;
            debug!("Link down, reconnecting to {}", settings);
            self.open(&settings).await?;
        }
        self.client
            .as_mut()
            .ok_or_else(|| ModbusError::connection("No connection configured"))
    }
}

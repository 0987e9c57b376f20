//! Frame listener: UDP producer reporting frame numbers.
//!
//! Each datagram carries a JSON array `[high, low]` of two byte-wide
//! fields. The frame number is `(high << 8) | low`; a missing or `null`
//! field counts as `0`. Anything else, including a field above `255`, is a
//! processing error: it is logged and the listener keeps going.
//!
//! | Key | Default | Range | Restart |
//! |-----|---------|-------|---------|
//! | `port` | `8000` | 1 – 63999 | yes |
//! | `address` | `0.0.0.0` | IP address | yes |
//! | `enabled` | `true` | | yes |
//! | `mode` | `trigger` | `trigger` / `streaming` | no |

use std::net::{IpAddr, SocketAddr};
use std::ops::RangeInclusive;

use async_trait::async_trait;
use serde_json::Value;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use interlink_app::ports::{DriverContext, ModuleDriver};
use interlink_app::producer::Emitter;
use interlink_domain::error::{InterlinkError, ProcessingError, ValidationError, json_kind};
use interlink_domain::module::{ConfigExt, ENABLED_KEY, ModuleConfig, ModuleRole};

use crate::error::ModuleIoError;

pub const PORT_KEY: &str = "port";
pub const ADDRESS_KEY: &str = "address";
pub const DEFAULT_PORT: i64 = 8000;
pub const DEFAULT_ADDRESS: &str = "0.0.0.0";
const PORT_RANGE: RangeInclusive<i64> = 1..=63999;
const MAX_DATAGRAM: usize = 2048;

/// Combine a `[high, low]` packet into one frame number.
///
/// # Errors
///
/// [`ProcessingError::NotAnArray`] for a non-array payload,
/// [`ProcessingError::NotANumber`] when a present field is not an unsigned
/// integer, [`ProcessingError::FieldOutOfRange`] when it does not fit a byte.
pub fn decode_frame(raw: &Value) -> Result<Value, ProcessingError> {
    let fields = raw
        .as_array()
        .ok_or_else(|| ProcessingError::NotAnArray(json_kind(raw)))?;
    let field = |index: usize| match fields.get(index) {
        None | Some(Value::Null) => Ok(0),
        Some(value) => {
            let number = value
                .as_u64()
                .ok_or_else(|| ProcessingError::NotANumber(json_kind(value)))?;
            if number > u64::from(u8::MAX) {
                return Err(ProcessingError::FieldOutOfRange {
                    index,
                    value: number,
                });
            }
            Ok(number)
        }
    };
    let (high, low) = (field(0)?, field(1)?);
    Ok(Value::from((high << 8) | low))
}

struct Listener {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
    local_addr: SocketAddr,
}

/// UDP producer driver.
#[derive(Default)]
pub struct FrameListener {
    listener: Option<Listener>,
}

impl FrameListener {
    /// Address actually bound, while started.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().map(|l| l.local_addr)
    }
}

fn bind_address(config: &ModuleConfig) -> Result<SocketAddr, ValidationError> {
    let port = config.int_in_range(PORT_KEY, DEFAULT_PORT, PORT_RANGE)?;
    let ip: IpAddr = config
        .str_or(ADDRESS_KEY, DEFAULT_ADDRESS)?
        .parse()
        .map_err(|_| ValidationError::InvalidType {
            field: ADDRESS_KEY.to_string(),
            expected: "IP address",
        })?;
    // range-checked above
    let port = u16::try_from(port).unwrap_or_default();
    Ok(SocketAddr::new(ip, port))
}

#[async_trait]
impl ModuleDriver for FrameListener {
    fn role(&self) -> ModuleRole {
        ModuleRole::Producer
    }

    fn validate(&self, config: &ModuleConfig) -> Result<(), ValidationError> {
        bind_address(config).map(|_| ())
    }

    fn restart_keys(&self) -> &'static [&'static str] {
        &[PORT_KEY, ADDRESS_KEY, ENABLED_KEY]
    }

    async fn acquire(
        &mut self,
        config: &ModuleConfig,
        ctx: &DriverContext,
    ) -> Result<(), InterlinkError> {
        let emitter = ctx.emitter.clone().ok_or(ModuleIoError::MissingEmitter)?;
        let address = bind_address(config)?;
        let socket = UdpSocket::bind(address)
            .await
            .map_err(|source| ModuleIoError::Bind {
                address: address.to_string(),
                source,
            })?;
        let local_addr = socket.local_addr().map_err(|source| ModuleIoError::Bind {
            address: address.to_string(),
            source,
        })?;

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(receive_loop(socket, emitter, cancel.clone()));
        tracing::info!(module_id = %ctx.module_id, %local_addr, "frame listener bound");
        self.listener = Some(Listener {
            cancel,
            handle,
            local_addr,
        });
        Ok(())
    }

    async fn release(&mut self) {
        let Some(listener) = self.listener.take() else {
            return;
        };
        listener.cancel.cancel();
        if let Err(err) = listener.handle.await {
            tracing::warn!(%err, "frame listener task ended abnormally");
        }
        tracing::debug!(local_addr = %listener.local_addr, "frame listener closed");
    }
}

async fn receive_loop(socket: UdpSocket, emitter: Emitter, cancel: CancellationToken) {
    let mut buf = [0_u8; MAX_DATAGRAM];
    loop {
        let received = tokio::select! {
            () = cancel.cancelled() => break,
            received = socket.recv_from(&mut buf) => received,
        };
        match received {
            Ok((len, peer)) => {
                tracing::trace!(module_id = %emitter.module_id(), %peer, len, "datagram received");
                ingest_datagram(&emitter, &buf[..len]);
            }
            Err(err) => {
                tracing::warn!(module_id = %emitter.module_id(), %err, "udp receive failed");
            }
        }
    }
}

/// Feed one datagram through the producer's change-gate.
pub fn ingest_datagram(emitter: &Emitter, datagram: &[u8]) {
    match serde_json::from_slice::<Value>(datagram) {
        Ok(raw) => {
            emitter.ingest_with(&raw, decode_frame);
        }
        Err(err) => {
            let raw = Value::String(String::from_utf8_lossy(datagram).into_owned());
            emitter.ingest_with(&raw, |_| Err(ProcessingError::Malformed(err.to_string())));
        }
    }
}

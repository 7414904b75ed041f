//! Over-the-air firmware upload.
//!
//! [`v1`] speaks the native TCP protocol of the device's OTA component.
//! Devices running older firmware only understand the UDP-invite protocol
//! in [`legacy`]; it is tried once when the native handshake cannot even
//! start.

pub mod legacy;
pub mod v1;

use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

use md5::{Digest, Md5};
use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;
use tracing::{info, warn};

/// Receive and connect timeout of every network step.
pub const TIMEOUT: Duration = Duration::from_secs(10);

/// Size of the chunks the firmware is streamed in.
pub const CHUNK_SIZE: usize = 1024;

/// Environment variable holding the default legacy host port.
pub const HOST_PORT_ENV: &str = "ESPHOMEYAML_OTA_HOST_PORT";

#[derive(Debug, Error)]
pub enum OtaError {
    #[error("Error: Invalid magic byte")]
    InvalidMagic,
    #[error(
        "Error: Couldn't prepare flash memory for update. Is the binary too big? Please try restarting the ESP."
    )]
    UpdatePrepareFailed,
    #[error("Error: Authentication invalid. Is the password correct?")]
    AuthInvalid,
    #[error("Error: Writing OTA data to flash memory failed. See USB logs for more information.")]
    WritingFlash,
    #[error("Error: Finishing update failed. See the MQTT/USB logs for more information.")]
    UpdateEndFailed,
    #[error(
        "Error: Please press the reset button on the ESP. A manual reset is required on the first OTA-Update after flashing via USB."
    )]
    InvalidBootstrapping,
    #[error("Unknown error from ESP")]
    Unknown,
    #[error("Unexpected response from ESP: 0x{0:02X}")]
    UnexpectedResponse(u8),
    #[error("Unsupported OTA version {0}")]
    UnsupportedVersion(u8),
    #[error("ESP requests password, but no password given!")]
    PasswordRequired,
    #[error("Error resolving IP address of {host}. Is it connected to WiFi?")]
    Resolve { host: String },
    #[error("Could not start OTA session: {0}")]
    Handshake(#[source] Box<OtaError>),
    #[error("Error communicating with ESP while {step}: {source}")]
    Io {
        step: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("Timed out while {0}")]
    Timeout(&'static str),
    #[error("No response from the ESP")]
    NoResponse,
    #[error("Legacy upload failed: {0}")]
    Legacy(String),
    #[error("Could not read firmware {path}: {source}")]
    Firmware {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("Upload interrupted")]
    Interrupted,
}

impl OtaError {
    pub(crate) fn io(step: &'static str) -> impl FnOnce(io::Error) -> OtaError {
        move |source| match source.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => OtaError::Timeout(step),
            _ => OtaError::Io { step, source },
        }
    }

    /// Whether the native protocol never got going, so the legacy
    /// protocol is worth a try.
    #[must_use]
    pub fn is_handshake_failure(&self) -> bool {
        matches!(self, OtaError::Handshake(_))
    }
}

/// Resolve `host:port`. A trailing `.local` is stripped and retried, as
/// mDNS names often only resolve without it.
pub fn resolve(host: &str, port: u16) -> Result<Vec<SocketAddr>, OtaError> {
    let mut candidates = vec![host.to_string()];
    if let Some(stripped) = host.strip_suffix(".local") {
        candidates.push(stripped.to_string());
    }
    for candidate in &candidates {
        match (candidate.as_str(), port).to_socket_addrs() {
            Ok(addrs) => {
                let addrs: Vec<SocketAddr> = addrs.collect();
                if !addrs.is_empty() {
                    return Ok(addrs);
                }
            }
            Err(err) => warn!("Could not resolve {candidate}: {err}"),
        }
    }
    Err(OtaError::Resolve {
        host: host.to_string(),
    })
}

/// Lowercase hex MD5 of `data`.
#[must_use]
pub fn md5_hex(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

/// Firmware image to upload.
#[derive(Debug, Clone)]
pub struct Firmware {
    /// Path shown in messages and mixed into the legacy client nonce.
    pub name: String,
    pub data: Vec<u8>,
}

impl Firmware {
    pub fn read(path: &Path) -> Result<Self, OtaError> {
        let name = path.display().to_string();
        let data = std::fs::read(path).map_err(|source| OtaError::Firmware {
            path: name.clone(),
            source,
        })?;
        Ok(Self { name, data })
    }

    #[must_use]
    pub fn md5(&self) -> String {
        md5_hex(&self.data)
    }
}

/// Where and how to upload.
#[derive(Debug, Clone)]
pub struct OtaTarget {
    pub host: String,
    pub port: u16,
    pub password: String,
    /// Local TCP port the legacy protocol listens on.
    pub host_port: u16,
}

/// Which protocol completed the upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Native,
    Legacy,
}

/// Host port for the legacy protocol: the explicit value, else
/// [`HOST_PORT_ENV`], else a random port in 10000..=60000.
#[must_use]
pub fn host_port(explicit: Option<u16>) -> u16 {
    explicit
        .or_else(|| {
            std::env::var(HOST_PORT_ENV)
                .ok()
                .and_then(|value| value.trim().parse().ok())
        })
        .unwrap_or_else(random_host_port)
}

fn random_host_port() -> u16 {
    let mut buf = [0u8; 2];
    OsRng.fill_bytes(&mut buf);
    10_000 + u16::from_le_bytes(buf) % 50_001
}

/// Upload `firmware`, falling back to the legacy protocol once when the
/// native handshake fails.
pub fn upload(
    target: &OtaTarget,
    firmware: &Firmware,
    progress: &mut dyn FnMut(usize, usize),
) -> Result<Protocol, OtaError> {
    let addrs = resolve(&target.host, target.port)?;
    info!("Connecting to {}", addrs[0]);
    match v1::perform(&addrs, &target.password, &firmware.data, progress) {
        Ok(()) => Ok(Protocol::Native),
        Err(err) if err.is_handshake_failure() => {
            warn!("{err}");
            info!("Trying the legacy OTA protocol...");
            legacy::perform(target, addrs[0], firmware, progress)?;
            Ok(Protocol::Legacy)
        }
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn md5_is_lowercase_hex() {
        assert_eq!(md5_hex(b""), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn resolves_loopback() {
        let addrs = resolve("127.0.0.1", 8266).unwrap();
        assert_eq!(addrs[0].port(), 8266);
    }

    #[test]
    fn explicit_host_port_wins() {
        assert_eq!(host_port(Some(12_345)), 12_345);
        for _ in 0..32 {
            assert!((10_000..=60_000).contains(&random_host_port()));
        }
    }
}

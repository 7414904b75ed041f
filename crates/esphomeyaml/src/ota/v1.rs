//! Native OTA protocol, version 1.
//!
//! Every device answer is a single status byte. Codes below 128 are
//! acknowledgements; codes from 128 up are errors that end the session.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::{Duration, Instant};

use rand::rngs::OsRng;
use rand::RngCore;
use socket2::SockRef;
use tracing::{debug, info};

use super::{md5_hex, OtaError, CHUNK_SIZE, TIMEOUT};
use crate::interrupt;

pub const MAGIC_BYTES: [u8; 5] = [0x6C, 0x26, 0xF7, 0x5C, 0x45];
pub const OTA_VERSION: u8 = 1;

/// Feature flags sent after the handshake. Compression is not offered.
pub const FEATURES: u8 = 0x00;

pub const RESPONSE_OK: u8 = 0;
pub const RESPONSE_REQUEST_AUTH: u8 = 1;

pub const RESPONSE_HEADER_OK: u8 = 64;
pub const RESPONSE_AUTH_OK: u8 = 65;
pub const RESPONSE_UPDATE_PREPARE_OK: u8 = 66;
pub const RESPONSE_BIN_MD5_OK: u8 = 67;
pub const RESPONSE_RECEIVE_OK: u8 = 68;
pub const RESPONSE_UPDATE_END_OK: u8 = 69;
pub const RESPONSE_SUPPORTS_COMPRESSION: u8 = 70;

pub const RESPONSE_ERROR_MAGIC: u8 = 128;
pub const RESPONSE_ERROR_UPDATE_PREPARE: u8 = 129;
pub const RESPONSE_ERROR_AUTH_INVALID: u8 = 130;
pub const RESPONSE_ERROR_WRITING_FLASH: u8 = 131;
pub const RESPONSE_ERROR_UPDATE_END: u8 = 132;
pub const RESPONSE_ERROR_INVALID_BOOTSTRAPPING: u8 = 133;
pub const RESPONSE_ERROR_UNKNOWN: u8 = 255;

/// Poll interval of blocking reads, so Ctrl-C is noticed.
const READ_SLICE: Duration = Duration::from_millis(250);

/// Kernel send buffer requested before the firmware is streamed.
pub const SEND_BUFFER_SIZE: usize = 8192;

/// Map a device error code to its error.
#[must_use]
pub fn device_error(code: u8) -> Option<OtaError> {
    Some(match code {
        RESPONSE_ERROR_MAGIC => OtaError::InvalidMagic,
        RESPONSE_ERROR_UPDATE_PREPARE => OtaError::UpdatePrepareFailed,
        RESPONSE_ERROR_AUTH_INVALID => OtaError::AuthInvalid,
        RESPONSE_ERROR_WRITING_FLASH => OtaError::WritingFlash,
        RESPONSE_ERROR_UPDATE_END => OtaError::UpdateEndFailed,
        RESPONSE_ERROR_INVALID_BOOTSTRAPPING => OtaError::InvalidBootstrapping,
        RESPONSE_ERROR_UNKNOWN => OtaError::Unknown,
        _ => return None,
    })
}

fn check(code: u8, expect: &[u8]) -> Result<u8, OtaError> {
    if let Some(err) = device_error(code) {
        return Err(err);
    }
    if expect.contains(&code) {
        Ok(code)
    } else {
        Err(OtaError::UnexpectedResponse(code))
    }
}

struct Session {
    stream: TcpStream,
}

impl Session {
    fn connect(addrs: &[SocketAddr]) -> Result<Self, OtaError> {
        let mut last = None;
        for addr in addrs {
            match TcpStream::connect_timeout(addr, TIMEOUT) {
                Ok(stream) => {
                    stream.set_nodelay(true).map_err(OtaError::io("connecting"))?;
                    stream
                        .set_write_timeout(Some(TIMEOUT))
                        .map_err(OtaError::io("connecting"))?;
                    return Ok(Self { stream });
                }
                Err(err) => {
                    debug!("Connecting to {addr} failed: {err}");
                    last = Some(err);
                }
            }
        }
        let source = last.unwrap_or_else(|| io::Error::from(io::ErrorKind::AddrNotAvailable));
        Err(OtaError::io("connecting")(source))
    }

    fn send(&mut self, data: &[u8], step: &'static str) -> Result<(), OtaError> {
        self.stream.write_all(data).map_err(OtaError::io(step))
    }

    /// Read exactly `buf.len()` bytes within [`TIMEOUT`].
    fn read_exact(&mut self, buf: &mut [u8], step: &'static str) -> Result<(), OtaError> {
        self.stream
            .set_read_timeout(Some(READ_SLICE))
            .map_err(OtaError::io(step))?;
        let deadline = Instant::now() + TIMEOUT;
        let mut filled = 0;
        while filled < buf.len() {
            if interrupt::interrupted() {
                return Err(OtaError::Interrupted);
            }
            match self.stream.read(&mut buf[filled..]) {
                Ok(0) => {
                    return Err(OtaError::Io {
                        step,
                        source: io::Error::from(io::ErrorKind::UnexpectedEof),
                    })
                }
                Ok(n) => filled += n,
                Err(err)
                    if matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) =>
                {
                    if Instant::now() >= deadline {
                        return Err(OtaError::Timeout(step));
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(OtaError::Io { step, source: err }),
            }
        }
        Ok(())
    }

    fn receive(&mut self, expect: &[u8], step: &'static str) -> Result<u8, OtaError> {
        let mut code = [0u8; 1];
        self.read_exact(&mut code, step)?;
        check(code[0], expect)
    }

    fn set_nodelay(&self, on: bool) -> Result<(), OtaError> {
        self.stream.set_nodelay(on).map_err(OtaError::io("configuring socket"))
    }

    /// Best effort; a socket that refuses the option still uploads.
    fn cap_send_buffer(&self) {
        if let Err(err) = SockRef::from(&self.stream).set_send_buffer_size(SEND_BUFFER_SIZE) {
            debug!("Could not set send buffer size: {err}");
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

/// Run a complete v1 session uploading `firmware`.
///
/// Failures before the device acknowledged the magic preamble are wrapped
/// in [`OtaError::Handshake`].
pub fn perform(
    addrs: &[SocketAddr],
    password: &str,
    firmware: &[u8],
    progress: &mut dyn FnMut(usize, usize),
) -> Result<(), OtaError> {
    let mut session = handshake(addrs).map_err(|err| OtaError::Handshake(Box::new(err)))?;

    session.send(&[FEATURES], "sending features")?;
    session.receive(
        &[RESPONSE_HEADER_OK, RESPONSE_SUPPORTS_COMPRESSION],
        "receiving features",
    )?;

    let auth = session.receive(&[RESPONSE_REQUEST_AUTH, RESPONSE_AUTH_OK], "receiving auth")?;
    if auth == RESPONSE_REQUEST_AUTH {
        authenticate(&mut session, password)?;
    }

    let size = u32::try_from(firmware.len()).map_err(|_| OtaError::UpdatePrepareFailed)?;
    session.send(&size.to_be_bytes(), "sending binary size")?;
    session.receive(&[RESPONSE_UPDATE_PREPARE_OK], "preparing update")?;

    session.send(md5_hex(firmware).as_bytes(), "sending binary MD5")?;
    session.receive(&[RESPONSE_BIN_MD5_OK], "verifying binary MD5")?;

    info!("Uploading {} bytes", firmware.len());
    session.set_nodelay(false)?;
    session.cap_send_buffer();
    let mut sent = 0;
    for chunk in firmware.chunks(CHUNK_SIZE) {
        if interrupt::interrupted() {
            return Err(OtaError::Interrupted);
        }
        session.send(chunk, "sending firmware")?;
        sent += chunk.len();
        progress(sent, firmware.len());
    }
    session.set_nodelay(true)?;

    info!("Waiting for result...");
    session.receive(&[RESPONSE_RECEIVE_OK], "receiving result")?;
    session.receive(&[RESPONSE_UPDATE_END_OK], "finishing update")?;
    session.send(&[RESPONSE_OK], "acknowledging")?;
    info!("OTA successful");
    Ok(())
}

fn handshake(addrs: &[SocketAddr]) -> Result<Session, OtaError> {
    let mut session = Session::connect(addrs)?;
    session.send(&MAGIC_BYTES, "sending magic")?;
    let mut answer = [0u8; 2];
    session.read_exact(&mut answer, "receiving version")?;
    check(answer[0], &[RESPONSE_OK])?;
    if answer[1] != OTA_VERSION {
        return Err(OtaError::UnsupportedVersion(answer[1]));
    }
    Ok(session)
}

fn authenticate(session: &mut Session, password: &str) -> Result<(), OtaError> {
    if password.is_empty() {
        return Err(OtaError::PasswordRequired);
    }
    let mut nonce = [0u8; 32];
    session.read_exact(&mut nonce, "receiving nonce")?;
    let nonce = String::from_utf8_lossy(&nonce).into_owned();
    debug!("Auth: Nonce is {nonce}");

    let mut random = [0u8; 16];
    OsRng.fill_bytes(&mut random);
    let cnonce = md5_hex(&random);
    session.send(cnonce.as_bytes(), "sending cnonce")?;

    let result = auth_response(password, &nonce, &cnonce);
    debug!("Auth: Result is {result}");
    session.send(result.as_bytes(), "sending auth result")?;
    session.receive(&[RESPONSE_AUTH_OK], "authenticating")?;
    Ok(())
}

/// Hex `MD5(password + nonce + cnonce)`.
#[must_use]
pub fn auth_response(password: &str, nonce: &str, cnonce: &str) -> String {
    md5_hex(format!("{password}{nonce}{cnonce}").as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_take_precedence_over_expectations() {
        assert!(matches!(
            check(RESPONSE_ERROR_AUTH_INVALID, &[RESPONSE_ERROR_AUTH_INVALID]),
            Err(OtaError::AuthInvalid)
        ));
        assert_eq!(check(RESPONSE_AUTH_OK, &[RESPONSE_AUTH_OK]).unwrap(), RESPONSE_AUTH_OK);
        assert_eq!(
            check(0x2A, &[RESPONSE_AUTH_OK]).unwrap_err().to_string(),
            "Unexpected response from ESP: 0x2A"
        );
    }

    #[test]
    fn every_error_code_has_a_message() {
        for code in [128, 129, 130, 131, 132, 133, 255] {
            assert!(device_error(code).is_some(), "{code}");
        }
        assert!(device_error(RESPONSE_OK).is_none());
    }

    #[test]
    fn send_buffer_is_capped_before_streaming() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let session = Session::connect(&[listener.local_addr().unwrap()]).unwrap();
        session.cap_send_buffer();
        let size = SockRef::from(&session.stream).send_buffer_size().unwrap();
        // Linux reports twice the requested value to account for bookkeeping.
        assert!(size <= 2 * SEND_BUFFER_SIZE, "send buffer is {size}");
    }

    #[test]
    fn auth_response_concatenates_before_hashing() {
        assert_eq!(auth_response("pw", "n", "c"), md5_hex(b"pwnc"));
    }
}

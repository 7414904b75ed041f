//! Legacy OTA protocol for devices flashed before the native protocol.
//!
//! The client invites the device over UDP, the device then connects back
//! to a TCP port opened by the client and pulls the firmware.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, UdpSocket};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::{md5_hex, Firmware, OtaError, OtaTarget, CHUNK_SIZE, TIMEOUT};
use crate::interrupt;

const FLASH: u32 = 0;
const AUTH: u32 = 200;
const INVITE_ATTEMPTS: usize = 10;
const INVITE_TIMEOUT: Duration = Duration::from_secs(1);
const RESULT_TIMEOUT: Duration = Duration::from_secs(60);
const ACCEPT_POLL: Duration = Duration::from_millis(100);

/// Client nonce: hex `MD5(filename + size + md5 + host)`.
#[must_use]
pub fn cnonce(filename: &str, size: usize, file_md5: &str, host: &str) -> String {
    md5_hex(format!("{filename}{size}{file_md5}{host}").as_bytes())
}

/// Hex `MD5(MD5(password) + ":" + nonce + ":" + cnonce)`.
#[must_use]
pub fn auth_response(password: &str, nonce: &str, cnonce: &str) -> String {
    let password_md5 = md5_hex(password.as_bytes());
    md5_hex(format!("{password_md5}:{nonce}:{cnonce}").as_bytes())
}

/// Run a legacy session against `remote`.
pub fn perform(
    target: &OtaTarget,
    remote: SocketAddr,
    firmware: &Firmware,
    progress: &mut dyn FnMut(usize, usize),
) -> Result<(), OtaError> {
    let listener = TcpListener::bind(("0.0.0.0", target.host_port))
        .map_err(OtaError::io("listening for the device"))?;
    info!("Starting on 0.0.0.0:{}", target.host_port);
    let file_md5 = firmware.md5();
    info!("Upload size: {}", firmware.data.len());

    invite(target, remote, firmware, &file_md5)?;

    info!("Waiting for device...");
    let mut connection = accept(&listener)?;
    let result = transfer(&mut connection, &firmware.data, progress);
    let _ = connection.shutdown(Shutdown::Both);
    result
}

fn invite(
    target: &OtaTarget,
    remote: SocketAddr,
    firmware: &Firmware,
    file_md5: &str,
) -> Result<(), OtaError> {
    let size = firmware.data.len();
    let message = format!("{FLASH} {} {size} {file_md5}\n", target.host_port);
    info!("Sending invitation to {}", target.host);
    let bind = if remote.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
    let socket = UdpSocket::bind(bind).map_err(OtaError::io("sending invitation"))?;
    socket
        .set_read_timeout(Some(INVITE_TIMEOUT))
        .map_err(OtaError::io("sending invitation"))?;

    let mut buf = [0u8; 37];
    let mut answer = None;
    for attempt in 1..=INVITE_ATTEMPTS {
        if interrupt::interrupted() {
            return Err(OtaError::Interrupted);
        }
        socket
            .send_to(message.as_bytes(), remote)
            .map_err(OtaError::io("sending invitation"))?;
        match socket.recv(&mut buf) {
            Ok(n) => {
                answer = Some(String::from_utf8_lossy(&buf[..n]).into_owned());
                break;
            }
            Err(err) => debug!("Invitation attempt {attempt} failed: {err}"),
        }
    }
    let Some(answer) = answer else {
        return Err(OtaError::NoResponse);
    };
    if answer == "OK" {
        return Ok(());
    }
    let Some(nonce) = answer
        .strip_prefix("AUTH")
        .and_then(|rest| rest.split_whitespace().next())
    else {
        return Err(OtaError::Legacy(format!("Bad Answer: {answer}")));
    };
    if target.password.is_empty() {
        return Err(OtaError::PasswordRequired);
    }

    let cnonce = cnonce(&firmware.name, size, file_md5, &target.host);
    let result = auth_response(&target.password, nonce, &cnonce);
    info!("Authenticating...");
    socket
        .send_to(format!("{AUTH} {cnonce} {result}\n").as_bytes(), remote)
        .map_err(OtaError::io("authenticating"))?;
    socket
        .set_read_timeout(Some(TIMEOUT))
        .map_err(OtaError::io("authenticating"))?;
    let mut buf = [0u8; 32];
    let n = socket.recv(&mut buf).map_err(|_| {
        OtaError::Legacy("No Answer to our Authentication".to_string())
    })?;
    let answer = String::from_utf8_lossy(&buf[..n]);
    if answer != "OK" {
        return Err(OtaError::Legacy(format!("FAIL: {answer}")));
    }
    info!("OK");
    Ok(())
}

fn accept(listener: &TcpListener) -> Result<TcpStream, OtaError> {
    listener
        .set_nonblocking(true)
        .map_err(OtaError::io("waiting for device"))?;
    let deadline = Instant::now() + TIMEOUT;
    loop {
        match listener.accept() {
            Ok((stream, addr)) => {
                debug!("Device connected from {addr}");
                stream
                    .set_nonblocking(false)
                    .map_err(OtaError::io("waiting for device"))?;
                return Ok(stream);
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                if interrupt::interrupted() {
                    return Err(OtaError::Interrupted);
                }
                if Instant::now() >= deadline {
                    return Err(OtaError::Legacy("No response from device".to_string()));
                }
                thread::sleep(ACCEPT_POLL);
            }
            Err(err) => return Err(OtaError::io("waiting for device")(err)),
        }
    }
}

fn transfer(
    connection: &mut TcpStream,
    data: &[u8],
    progress: &mut dyn FnMut(usize, usize),
) -> Result<(), OtaError> {
    connection
        .set_read_timeout(Some(TIMEOUT))
        .map_err(OtaError::io("uploading"))?;
    connection
        .set_write_timeout(Some(TIMEOUT))
        .map_err(OtaError::io("uploading"))?;
    info!("Uploading...");
    let mut sent = 0;
    let mut ack = [0u8; 10];
    let mut acked = 0;
    for chunk in data.chunks(CHUNK_SIZE) {
        if interrupt::interrupted() {
            return Err(OtaError::Interrupted);
        }
        connection.write_all(chunk).map_err(OtaError::io("uploading"))?;
        acked = connection.read(&mut ack).map_err(OtaError::io("uploading"))?;
        sent += chunk.len();
        progress(sent, data.len());
    }
    // Acks are byte counts; the result may arrive together with the last one.
    if ack[..acked].contains(&b'O') {
        info!("Result: OK");
        return Ok(());
    }

    info!("Waiting for result...");
    connection
        .set_read_timeout(Some(RESULT_TIMEOUT))
        .map_err(OtaError::io("waiting for result"))?;
    let mut buf = [0u8; 32];
    loop {
        let n = connection
            .read(&mut buf)
            .map_err(|_| OtaError::Legacy("No Result!".to_string()))?;
        if n == 0 {
            return Err(OtaError::Legacy("No Result!".to_string()));
        }
        if buf[..n].contains(&b'O') {
            info!("Result: OK");
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonce_inputs_are_concatenated() {
        assert_eq!(
            cnonce("firmware.bin", 3, "abc", "node.local"),
            md5_hex(b"firmware.bin3abcnode.local")
        );
        let password_md5 = md5_hex(b"secret");
        assert_eq!(
            auth_response("secret", "n0", "c0"),
            md5_hex(format!("{password_md5}:n0:c0").as_bytes())
        );
    }

    #[test]
    fn full_session_against_a_mock_device() {
        let device = UdpSocket::bind("127.0.0.1:0").unwrap();
        let remote = device.local_addr().unwrap();
        let host_port = {
            let free = TcpListener::bind("127.0.0.1:0").unwrap();
            free.local_addr().unwrap().port()
        };
        let firmware = Firmware {
            name: "firmware.bin".to_string(),
            data: (0..3000u32).map(|i| (i % 251) as u8).collect(),
        };
        let expected = firmware.data.clone();

        let handle = thread::spawn(move || {
            let mut buf = [0u8; 128];
            let (n, client) = device.recv_from(&mut buf).unwrap();
            let invite = String::from_utf8_lossy(&buf[..n]).into_owned();
            let parts: Vec<&str> = invite.split_whitespace().collect();
            assert_eq!(parts[0], "0");
            assert_eq!(parts[2], "3000");
            assert_eq!(parts[3], md5_hex(&expected));
            let port: u16 = parts[1].parse().unwrap();
            device.send_to(b"OK", client).unwrap();

            let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
            let mut received = Vec::new();
            for size in expected.chunks(CHUNK_SIZE).map(<[u8]>::len) {
                let mut chunk = vec![0u8; size];
                stream.read_exact(&mut chunk).unwrap();
                received.extend_from_slice(&chunk);
                stream.write_all(size.to_string().as_bytes()).unwrap();
            }
            stream.write_all(b"OK").unwrap();
            received
        });

        let target = OtaTarget {
            host: "127.0.0.1".to_string(),
            port: remote.port(),
            password: String::new(),
            host_port,
        };
        let mut last = 0;
        perform(&target, remote, &firmware, &mut |sent, _| last = sent).unwrap();
        assert_eq!(last, 3000);
        assert_eq!(handle.join().unwrap(), firmware.data);
    }
}

//! Native OTA sessions against an in-process mock device.

use std::io::{ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream, UdpSocket};
use std::thread::{self, JoinHandle};

use esphomeyaml::ota::v1::{
    self, MAGIC_BYTES, OTA_VERSION, RESPONSE_AUTH_OK, RESPONSE_BIN_MD5_OK,
    RESPONSE_ERROR_AUTH_INVALID, RESPONSE_ERROR_MAGIC, RESPONSE_HEADER_OK, RESPONSE_OK, RESPONSE_RECEIVE_OK,
    RESPONSE_REQUEST_AUTH, RESPONSE_UPDATE_END_OK, RESPONSE_UPDATE_PREPARE_OK,
};
use esphomeyaml::ota::{self, md5_hex, Firmware, OtaError, OtaTarget, Protocol, CHUNK_SIZE};

const NONCE: &str = "0123456789abcdef0123456789abcdef";

/// What the mock device observed.
#[derive(Debug, Default)]
struct Seen {
    features: u8,
    size: u32,
    md5: String,
    firmware: Vec<u8>,
    final_ack: Option<u8>,
}

fn read_n(stream: &mut TcpStream, n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    stream.read_exact(&mut buf).expect("read from client");
    buf
}

/// Accept one session. `password` enables authentication; a wrong answer
/// is rejected with AUTH_INVALID.
fn spawn_device(password: Option<&'static str>) -> (u16, JoinHandle<Seen>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    serve_native(listener, password)
}

fn serve_native(listener: TcpListener, password: Option<&'static str>) -> (u16, JoinHandle<Seen>) {
    let port = listener.local_addr().expect("addr").port();
    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept");
        let mut seen = Seen::default();
        assert_eq!(read_n(&mut stream, 5), MAGIC_BYTES);
        stream.write_all(&[RESPONSE_OK, OTA_VERSION]).unwrap();

        seen.features = read_n(&mut stream, 1)[0];
        stream.write_all(&[RESPONSE_HEADER_OK]).unwrap();

        if let Some(password) = password {
            stream.write_all(&[RESPONSE_REQUEST_AUTH]).unwrap();
            stream.write_all(NONCE.as_bytes()).unwrap();
            let cnonce = String::from_utf8(read_n(&mut stream, 32)).unwrap();
            let result = String::from_utf8(read_n(&mut stream, 32)).unwrap();
            if result != v1::auth_response(password, NONCE, &cnonce) {
                stream.write_all(&[RESPONSE_ERROR_AUTH_INVALID]).unwrap();
                return seen;
            }
        }
        stream.write_all(&[RESPONSE_AUTH_OK]).unwrap();

        let size: [u8; 4] = read_n(&mut stream, 4).try_into().unwrap();
        seen.size = u32::from_be_bytes(size);
        stream.write_all(&[RESPONSE_UPDATE_PREPARE_OK]).unwrap();

        seen.md5 = String::from_utf8(read_n(&mut stream, 32)).unwrap();
        stream.write_all(&[RESPONSE_BIN_MD5_OK]).unwrap();

        seen.firmware = read_n(&mut stream, seen.size as usize);
        stream
            .write_all(&[RESPONSE_RECEIVE_OK, RESPONSE_UPDATE_END_OK])
            .unwrap();
        let mut ack = [0u8; 1];
        if stream.read_exact(&mut ack).is_ok() {
            seen.final_ack = Some(ack[0]);
        }
        seen
    });
    (port, handle)
}

/// A TCP listener and a UDP socket sharing one loopback port number, like a
/// device that serves both protocols.
fn dual_stack_ports() -> (TcpListener, UdpSocket) {
    for _ in 0..20 {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().expect("addr").port();
        if let Ok(udp) = UdpSocket::bind(("127.0.0.1", port)) {
            return (listener, udp);
        }
    }
    panic!("no port free for both TCP and UDP");
}

fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    listener.local_addr().expect("addr").port()
}

/// Answer the native magic with INVALID_MAGIC, then hand the listener back
/// so the test can count later connection attempts.
fn spawn_old_native_stack(listener: TcpListener) -> JoinHandle<TcpListener> {
    thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept");
        assert_eq!(read_n(&mut stream, 5), MAGIC_BYTES);
        stream.write_all(&[RESPONSE_ERROR_MAGIC, OTA_VERSION]).unwrap();
        listener
    })
}

/// Legacy side of the device: accept the invitation, connect back and pull
/// the image, acknowledging every chunk.
fn spawn_legacy_device(udp: UdpSocket) -> JoinHandle<(String, Vec<u8>)> {
    thread::spawn(move || {
        let mut buf = [0u8; 128];
        let (n, client) = udp.recv_from(&mut buf).expect("invitation");
        let invitation = String::from_utf8_lossy(&buf[..n]).into_owned();
        let parts: Vec<&str> = invitation.split_whitespace().collect();
        let port: u16 = parts[1].parse().unwrap();
        let size: usize = parts[2].parse().unwrap();
        udp.send_to(b"OK", client).unwrap();

        let mut stream = TcpStream::connect(("127.0.0.1", port)).expect("connect back");
        let mut received = Vec::new();
        while received.len() < size {
            let len = CHUNK_SIZE.min(size - received.len());
            received.extend(read_n(&mut stream, len));
            stream.write_all(len.to_string().as_bytes()).unwrap();
        }
        stream.write_all(b"OK").unwrap();
        (invitation, received)
    })
}

fn firmware(len: usize) -> Firmware {
    Firmware {
        name: "firmware.bin".to_string(),
        data: (0..len).map(|i| (i * 7 % 256) as u8).collect(),
    }
}

fn target(port: u16, password: &str) -> OtaTarget {
    OtaTarget {
        host: "127.0.0.1".to_string(),
        port,
        password: password.to_string(),
        host_port: free_port(),
    }
}

#[test]
fn authenticated_upload_reaches_the_device_intact() {
    let (port, device) = spawn_device(Some("secret"));
    let firmware = firmware(5000);
    let mut updates = Vec::new();
    let protocol = ota::upload(&target(port, "secret"), &firmware, &mut |sent, total| {
        updates.push((sent, total));
    })
    .expect("upload");
    assert_eq!(protocol, Protocol::Native);

    let seen = device.join().expect("device thread");
    assert_eq!(seen.features, v1::FEATURES);
    assert_eq!(seen.size, 5000);
    assert_eq!(seen.md5, md5_hex(&firmware.data));
    assert_eq!(seen.firmware, firmware.data);
    assert_eq!(seen.final_ack, Some(RESPONSE_OK));

    assert_eq!(updates.len(), 5);
    assert!(updates.windows(2).all(|pair| pair[0].0 < pair[1].0));
    assert_eq!(updates.iter().filter(|(sent, _)| *sent == 5000).count(), 1);
    assert!(updates.iter().all(|(_, total)| *total == 5000));
}

#[test]
fn open_device_skips_authentication() {
    let (port, device) = spawn_device(None);
    let firmware = firmware(10);
    ota::upload(&target(port, ""), &firmware, &mut |_, _| {}).expect("upload");
    assert_eq!(device.join().expect("device thread").firmware, firmware.data);
}

#[test]
fn wrong_password_fails_without_fallback() {
    let (listener, udp) = dual_stack_ports();
    let (port, device) = serve_native(listener, Some("secret"));
    let err = ota::upload(&target(port, "wrong"), &firmware(100), &mut |_, _| {})
        .expect_err("rejected");
    assert!(matches!(err, OtaError::AuthInvalid), "{err}");
    assert!(!err.is_handshake_failure());
    assert!(device.join().expect("device thread").firmware.is_empty());

    udp.set_nonblocking(true).unwrap();
    let mut buf = [0u8; 64];
    let invitation = udp.recv_from(&mut buf);
    assert_eq!(invitation.map(|_| ()).unwrap_err().kind(), ErrorKind::WouldBlock);
}

#[test]
fn rejected_magic_falls_back_to_legacy_once() {
    let (listener, udp) = dual_stack_ports();
    let port = listener.local_addr().unwrap().port();
    let native = spawn_old_native_stack(listener);
    let legacy = spawn_legacy_device(udp);

    let firmware = firmware(2500);
    let mut last = 0;
    let protocol = ota::upload(&target(port, ""), &firmware, &mut |sent, _| last = sent)
        .expect("legacy upload");
    assert_eq!(protocol, Protocol::Legacy);
    assert_eq!(last, 2500);

    let (invitation, received) = legacy.join().expect("legacy device");
    assert!(invitation.starts_with("0 "), "{invitation}");
    assert!(invitation.trim_end().ends_with(&md5_hex(&firmware.data)));
    assert_eq!(received, firmware.data);

    let listener = native.join().expect("native device");
    listener.set_nonblocking(true).unwrap();
    assert_eq!(listener.accept().map(|_| ()).unwrap_err().kind(), ErrorKind::WouldBlock);
}

#[test]
fn missing_password_is_reported_before_sending() {
    let (port, device) = spawn_device(Some("secret"));
    let err = ota::upload(&target(port, ""), &firmware(100), &mut |_, _| {})
        .expect_err("password required");
    assert!(matches!(err, OtaError::PasswordRequired), "{err}");
    let _ = device.join();
}

//! MQTT helpers: a blocking session used by the log tail, retained
//! message cleanup, and the broker certificate fingerprint.

use std::io::Write;
use std::net::TcpStream;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use esphomeyaml_config::components::mqtt::MqttSettings;
use rand::rngs::OsRng;
use rand::RngCore;
use rumqttc::{Client, ConnectionError, Event, MqttOptions, Packet, Publish, QoS};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, SignatureScheme};
use sha1::{Digest, Sha1};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::interrupt;

const KEEP_ALIVE: Duration = Duration::from_secs(30);
const TLS_PORT: u16 = 8883;

/// How long `clean-mqtt` waits for retained messages once subscribed.
const RETAINED_WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum MqttError {
    #[error("No mqtt section in the configuration")]
    NotConfigured,
    #[error("MQTT request failed: {0}")]
    Client(#[from] rumqttc::ClientError),
    #[error("MQTT connection to {broker} failed: {message}")]
    Connection { broker: String, message: String },
    #[error("MQTT broker {0} closed the connection")]
    Disconnected(String),
    #[error("TLS connection to {broker} failed: {message}")]
    Tls { broker: String, message: String },
}

/// Command line overrides of the configured connection settings.
#[derive(Debug, Clone, Default)]
pub struct MqttOverrides {
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: Option<String>,
}

/// A connected client whose event loop runs on a background thread.
pub struct MqttSession {
    broker: String,
    client: Client,
    events: Receiver<Result<Event, ConnectionError>>,
    worker: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for MqttSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttSession").field("broker", &self.broker).finish_non_exhaustive()
    }
}

fn random_client_id() -> String {
    let mut buf = [0u8; 4];
    OsRng.fill_bytes(&mut buf);
    format!("esphomeyaml-{}", hex::encode(buf))
}

impl MqttSession {
    /// Start connecting to the broker of `settings`.
    #[must_use]
    pub fn connect(settings: &MqttSettings, overrides: &MqttOverrides) -> Self {
        let client_id = overrides.client_id.clone().unwrap_or_else(random_client_id);
        let mut options = MqttOptions::new(client_id, settings.broker.clone(), settings.port);
        options.set_keep_alive(KEEP_ALIVE);
        let username = overrides.username.as_deref().unwrap_or(&settings.username);
        if !username.is_empty() {
            let password = overrides.password.as_deref().unwrap_or(&settings.password);
            options.set_credentials(username, password);
        }
        let broker = format!("{}:{}", settings.broker, settings.port);
        info!("Connecting to MQTT broker {broker}");

        let (client, mut connection) = Client::new(options, 16);
        let (sender, events) = crossbeam_channel::unbounded();
        let worker = thread::spawn(move || {
            for event in connection.iter() {
                let failed = event.is_err();
                if sender.send(event).is_err() || failed {
                    break;
                }
            }
        });
        Self {
            broker,
            client,
            events,
            worker: Some(worker),
        }
    }

    pub fn subscribe(&self, topic: &str, qos: QoS) -> Result<(), MqttError> {
        self.client.subscribe(topic, qos)?;
        Ok(())
    }

    pub fn publish(&self, topic: &str, payload: &[u8], retain: bool) -> Result<(), MqttError> {
        self.client
            .publish(topic, QoS::AtLeastOnce, retain, payload.to_vec())?;
        Ok(())
    }

    /// Next incoming publish, `None` when `timeout` passes without one.
    pub fn next_publish(&mut self, timeout: Duration) -> Result<Option<Publish>, MqttError> {
        loop {
            match self.events.recv_timeout(timeout) {
                Ok(Ok(Event::Incoming(Packet::Publish(publish)))) => return Ok(Some(publish)),
                Ok(Ok(Event::Incoming(Packet::ConnAck(_)))) => {
                    info!("Connected to MQTT broker {}", self.broker);
                }
                Ok(Ok(event)) => debug!("MQTT event: {event:?}"),
                Ok(Err(err)) => {
                    return Err(MqttError::Connection {
                        broker: self.broker.clone(),
                        message: err.to_string(),
                    })
                }
                Err(RecvTimeoutError::Timeout) => return Ok(None),
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(MqttError::Disconnected(self.broker.clone()))
                }
            }
        }
    }
}

impl Drop for MqttSession {
    fn drop(&mut self) {
        let _ = self.client.disconnect();
        // Keep draining so the worker sees the disconnect.
        while self.events.recv_timeout(Duration::from_millis(100)).is_ok() {}
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// Topics `clean-mqtt` clears by default: the discovery tree and the
/// node's own topics.
#[must_use]
pub fn default_clean_topics(settings: &MqttSettings) -> Vec<String> {
    vec![
        format!("{}/#", settings.discovery_prefix),
        format!("{}/#", settings.topic_prefix),
    ]
}

/// Publish an empty retained payload over every retained message below
/// `topics`. Returns the number of cleared topics.
pub fn clear_retained(
    session: &mut MqttSession,
    topics: &[String],
    out: &mut dyn Write,
) -> Result<usize, MqttError> {
    for topic in topics {
        session.subscribe(topic, QoS::AtLeastOnce)?;
        info!("Clearing retained messages below {topic}");
    }
    let mut cleared = 0;
    let mut idle = Duration::ZERO;
    let poll = Duration::from_millis(250);
    while idle < RETAINED_WAIT && !interrupt::interrupted() {
        let Some(publish) = session.next_publish(poll)? else {
            idle += poll;
            continue;
        };
        idle = Duration::ZERO;
        if !publish.retain || publish.payload.is_empty() {
            continue;
        }
        let _ = writeln!(out, "Clearing topic {}", publish.topic);
        session.publish(&publish.topic, b"", true)?;
        cleared += 1;
    }
    Ok(cleared)
}

/// Accepts any certificate; used only to read the broker's certificate.
#[derive(Debug)]
struct AcceptAny(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAny {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

/// Lowercase hex SHA1 of a DER certificate.
#[must_use]
pub fn sha1_fingerprint(der: &[u8]) -> String {
    hex::encode(Sha1::digest(der))
}

/// Fetch the broker's leaf certificate and return its SHA1 fingerprint.
/// Uses port 8883 unless the configuration names another port than 1883.
pub fn fingerprint(settings: &MqttSettings) -> Result<String, MqttError> {
    let port = if settings.port == 1883 { TLS_PORT } else { settings.port };
    let broker = format!("{}:{port}", settings.broker);
    let tls_error = |message: String| MqttError::Tls {
        broker: broker.clone(),
        message,
    };

    let provider = CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()));
    let config = rustls::ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()
        .map_err(|err| tls_error(err.to_string()))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAny(provider)))
        .with_no_client_auth();
    let server_name = ServerName::try_from(settings.broker.clone())
        .map_err(|err| tls_error(err.to_string()))?;
    let mut connection = rustls::ClientConnection::new(Arc::new(config), server_name)
        .map_err(|err| tls_error(err.to_string()))?;
    let mut tcp = TcpStream::connect((settings.broker.as_str(), port))
        .map_err(|err| tls_error(err.to_string()))?;
    tcp.set_read_timeout(Some(crate::ota::TIMEOUT))
        .map_err(|err| tls_error(err.to_string()))?;
    while connection.is_handshaking() {
        connection
            .complete_io(&mut tcp)
            .map_err(|err| tls_error(err.to_string()))?;
    }
    let certificate = connection
        .peer_certificates()
        .and_then(|certs| certs.first())
        .ok_or_else(|| tls_error("broker sent no certificate".to_string()))?;
    let fingerprint = sha1_fingerprint(certificate.as_ref());
    connection.send_close_notify();
    if let Err(err) = connection.complete_io(&mut tcp) {
        warn!("Closing TLS connection failed: {err}");
    }
    Ok(fingerprint)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> MqttSettings {
        MqttSettings {
            broker: "192.168.1.10".into(),
            port: 1883,
            username: String::new(),
            password: String::new(),
            client_id: None,
            topic_prefix: "livingroom".into(),
            discovery_prefix: "homeassistant".into(),
            log_topic: Some("livingroom/debug".into()),
        }
    }

    #[test]
    fn clean_covers_discovery_and_node_topics() {
        assert_eq!(
            default_clean_topics(&settings()),
            vec!["homeassistant/#".to_string(), "livingroom/#".to_string()]
        );
    }

    #[test]
    fn fingerprint_is_lowercase_sha1() {
        assert_eq!(sha1_fingerprint(b"abc"), "a9993e364706816aba3e25717850c26c9cd0d89d");
    }

    #[test]
    fn generated_client_ids_differ() {
        let a = random_client_id();
        assert!(a.starts_with("esphomeyaml-"));
        assert_ne!(a, random_client_id());
    }
}

//! Log tails over a serial port or MQTT.
//!
//! Both print one line per log message prefixed with a local `[HH:MM:SS]`
//! timestamp. With `escape`, ESC characters are written as `\033` so the
//! output can be embedded in a web page.

use std::io::{self, Read, Write};
use std::time::Duration;

use rumqttc::QoS;
use thiserror::Error;
use time::macros::format_description;
use time::{OffsetDateTime, Time};
use tracing::info;

use crate::interrupt;
use crate::mqtt::{MqttError, MqttSession};

const SERIAL_TIMEOUT: Duration = Duration::from_millis(200);
const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Error)]
pub enum LogTailError {
    #[error("Could not open serial port {port}: {source}")]
    SerialOpen {
        port: String,
        #[source]
        source: serialport::Error,
    },
    #[error("Error reading serial port {port}: {source}")]
    SerialRead {
        port: String,
        #[source]
        source: io::Error,
    },
    #[error("Serial port {port} closed")]
    PortClosed { port: String },
    #[error("Serial logging is disabled, the logger's baud_rate is 0")]
    SerialDisabled,
    #[error("MQTT logging is disabled for this node, set mqtt.log_topic or pass --topic")]
    NoLogTopic,
    #[error(transparent)]
    Mqtt(#[from] MqttError),
    #[error("Could not write log output: {0}")]
    Output(#[source] io::Error),
}

/// Current local time, UTC when the offset cannot be determined.
#[must_use]
pub fn local_time() -> Time {
    OffsetDateTime::now_local()
        .unwrap_or_else(|_| OffsetDateTime::now_utc())
        .time()
}

/// `[HH:MM:SS]<line>` without carriage returns and newlines.
#[must_use]
pub fn format_line(time: Time, line: &str, escape: bool) -> String {
    let stamp = time
        .format(format_description!("[hour]:[minute]:[second]"))
        .unwrap_or_default();
    let line: String = line.chars().filter(|ch| *ch != '\r' && *ch != '\n').collect();
    let message = format!("[{stamp}]{line}");
    if escape {
        escape_ansi(&message)
    } else {
        message
    }
}

/// Replace ESC characters with the literal text `\033`.
#[must_use]
pub fn escape_ansi(text: &str) -> String {
    text.replace('\x1b', "\\033")
}

/// Splits a byte stream into lines, keeping partial lines across reads.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Add `data` and return every line it completed.
    pub fn push(&mut self, data: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(data);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|byte| *byte == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }
}

/// Print lines read from `port` at `baud_rate` until Ctrl-C.
pub fn tail_serial(
    port: &str,
    baud_rate: u32,
    escape: bool,
    out: &mut dyn Write,
) -> Result<(), LogTailError> {
    if baud_rate == 0 {
        return Err(LogTailError::SerialDisabled);
    }
    let mut serial = serialport::new(port, baud_rate)
        .timeout(SERIAL_TIMEOUT)
        .open()
        .map_err(|source| LogTailError::SerialOpen {
            port: port.to_string(),
            source,
        })?;
    info!("Starting log output from {port} with baud rate {baud_rate}");
    pump(&mut serial, escape, out).map_err(|err| match err {
        PumpError::Read(source) => LogTailError::SerialRead {
            port: port.to_string(),
            source,
        },
        PumpError::Write(err) => LogTailError::Output(err),
        PumpError::Closed => LogTailError::PortClosed {
            port: port.to_string(),
        },
    })
}

#[derive(Debug)]
enum PumpError {
    Read(io::Error),
    Write(io::Error),
    /// The input reached EOF; a serial port only does that when it is gone.
    Closed,
}

/// Copy timestamped lines from `input` to `out` until Ctrl-C.
fn pump(input: &mut dyn Read, escape: bool, out: &mut dyn Write) -> Result<(), PumpError> {
    let mut lines = LineBuffer::default();
    let mut buf = [0u8; 512];
    while !interrupt::interrupted() {
        let n = match input.read(&mut buf) {
            Ok(0) => return Err(PumpError::Closed),
            Ok(n) => n,
            Err(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                continue
            }
            Err(err) => return Err(PumpError::Read(err)),
        };
        for line in lines.push(&buf[..n]) {
            writeln!(out, "{}", format_line(local_time(), &line, escape)).map_err(PumpError::Write)?;
        }
        out.flush().map_err(PumpError::Write)?;
    }
    Ok(())
}

/// Print every message published to `topic` until Ctrl-C.
pub fn tail_mqtt(
    session: &mut MqttSession,
    topic: &str,
    escape: bool,
    out: &mut dyn Write,
) -> Result<(), LogTailError> {
    session.subscribe(topic, QoS::AtMostOnce)?;
    info!("Starting log output from {topic}");
    while !interrupt::interrupted() {
        let Some(publish) = session.next_publish(POLL_INTERVAL)? else {
            continue;
        };
        let payload = String::from_utf8_lossy(&publish.payload);
        writeln!(out, "{}", format_line(local_time(), &payload, escape))
            .map_err(LogTailError::Output)?;
        out.flush().map_err(LogTailError::Output)?;
    }
    Ok(())
}

//! Choosing between a USB serial port and over-the-air.

use esphomeyaml::Project;
use serialport::{SerialPortInfo, SerialPortType};
use tracing::{debug, info};

use crate::prompt;

/// Where an upload or log tail goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortChoice {
    Serial(String),
    Ota,
}

/// A serial port worth offering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialCandidate {
    pub name: String,
    pub description: String,
}

impl SerialCandidate {
    /// Only USB adapters are offered.
    fn from_info(info: SerialPortInfo) -> Option<Self> {
        match info.port_type {
            SerialPortType::UsbPort(usb) if !info.port_name.is_empty() => Some(Self {
                name: info.port_name,
                description: usb.product.unwrap_or_else(|| "n/a".to_string()),
            }),
            _ => None,
        }
    }
}

fn serial_candidates() -> Vec<SerialCandidate> {
    match serialport::available_ports() {
        Ok(ports) => ports.into_iter().filter_map(SerialCandidate::from_info).collect(),
        Err(err) => {
            debug!("Listing serial ports failed: {err}");
            Vec::new()
        }
    }
}

/// Labelled choices, OTA last. Empty when there is no serial port, since
/// then OTA is the only option.
#[must_use]
pub fn options(candidates: &[SerialCandidate], ota_host: &str) -> Vec<(String, PortChoice)> {
    if candidates.is_empty() {
        return Vec::new();
    }
    candidates
        .iter()
        .map(|port| {
            (
                format!("{} ({})", port.name, port.description),
                PortChoice::Serial(port.name.clone()),
            )
        })
        .chain(std::iter::once((format!("Over The Air ({ota_host})"), PortChoice::Ota)))
        .collect()
}

/// Use `given` when set, otherwise offer the connected USB ports and OTA.
pub fn choose(project: &Project, given: Option<&str>) -> anyhow::Result<PortChoice> {
    if let Some(port) = given {
        return Ok(PortChoice::Serial(port.to_string()));
    }
    let host = project
        .upload_address()
        .unwrap_or_else(|| project.name().to_string());
    let options = options(&serial_candidates(), &host);
    let Some((ota_label, _)) = options.last() else {
        return Ok(PortChoice::Ota);
    };
    info!("Found multiple serial port options, please choose one:");
    let labels: Vec<&str> = options.iter().map(|(label, _)| label.as_str()).collect();
    let picked = prompt::prompt_choice("Port", &labels, ota_label)?;
    Ok(options
        .into_iter()
        .find(|(label, _)| *label == picked)
        .map_or(PortChoice::Ota, |(_, choice)| choice))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(name: &str, description: &str) -> SerialCandidate {
        SerialCandidate {
            name: name.to_string(),
            description: description.to_string(),
        }
    }

    #[test]
    fn no_serial_port_means_no_question() {
        assert!(options(&[], "livingroom.local").is_empty());
    }

    #[test]
    fn serial_ports_come_before_ota() {
        let found = options(
            &[
                candidate("/dev/ttyUSB0", "CP2102 USB to UART"),
                candidate("/dev/ttyACM0", "n/a"),
            ],
            "livingroom.local",
        );
        assert_eq!(
            found,
            vec![
                (
                    "/dev/ttyUSB0 (CP2102 USB to UART)".to_string(),
                    PortChoice::Serial("/dev/ttyUSB0".to_string())
                ),
                (
                    "/dev/ttyACM0 (n/a)".to_string(),
                    PortChoice::Serial("/dev/ttyACM0".to_string())
                ),
                ("Over The Air (livingroom.local)".to_string(), PortChoice::Ota),
            ]
        );
    }

    #[test]
    fn non_usb_ports_are_skipped() {
        let info = SerialPortInfo {
            port_name: "/dev/ttyS0".to_string(),
            port_type: SerialPortType::Unknown,
        };
        assert_eq!(SerialCandidate::from_info(info), None);
    }
}

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "esphomeyaml",
    version,
    about = "Turn a YAML device description into ESP8266/ESP32 firmware",
    after_help = "Examples:\n  esphomeyaml livingroom.yaml wizard\n  esphomeyaml livingroom.yaml compile\n  esphomeyaml livingroom.yaml run --upload-port /dev/ttyUSB0\n  esphomeyaml livingroom.yaml logs"
)]
pub struct Cli {
    /// Enable debug logging.
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Only print warnings and errors.
    #[arg(long, short, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Your YAML configuration file.
    pub configuration: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

/// Options selecting how firmware reaches the device.
#[derive(Debug, Clone, Default, Args)]
pub struct UploadArgs {
    /// Serial port to upload to. Uploads over the air when omitted.
    #[arg(long)]
    pub upload_port: Option<String>,

    /// Local port the legacy OTA protocol listens on.
    #[arg(long)]
    pub host_port: Option<u16>,

    /// Use esptool.py instead of platformio for serial uploads (ESP8266 only).
    #[arg(long)]
    pub use_esptoolpy: bool,
}

/// Broker overrides shared by the MQTT commands.
#[derive(Debug, Clone, Default, Args)]
pub struct MqttArgs {
    /// MQTT topic to use instead of the configured one.
    #[arg(long)]
    pub topic: Option<String>,

    /// MQTT username.
    #[arg(long)]
    pub username: Option<String>,

    /// MQTT password.
    #[arg(long)]
    pub password: Option<String>,

    /// MQTT client id.
    #[arg(long)]
    pub client_id: Option<String>,
}

#[derive(Debug, Clone, Default, Args)]
pub struct LogsArgs {
    #[command(flatten)]
    pub mqtt: MqttArgs,

    /// Read logs from this serial port instead of MQTT.
    #[arg(long)]
    pub serial_port: Option<String>,

    /// Escape ANSI color codes for embedding in a web page.
    #[arg(long)]
    pub escape: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Validate the configuration and print the result.
    Config,
    /// Generate the platformio project and build the firmware.
    Compile {
        /// Only write the project files, do not invoke platformio.
        #[arg(long)]
        only_generate: bool,
    },
    /// Upload the last built firmware.
    Upload(UploadArgs),
    /// Print the device's log output.
    Logs(LogsArgs),
    /// Compile, upload and show logs.
    Run {
        #[command(flatten)]
        upload: UploadArgs,
        #[command(flatten)]
        logs: LogsArgs,
        /// Stop after the upload.
        #[arg(long)]
        no_logs: bool,
    },
    /// Remove retained discovery and state messages from the broker.
    CleanMqtt(MqttArgs),
    /// Create a starter configuration file interactively.
    Wizard,
    /// Print the SHA1 fingerprint of the broker's TLS certificate.
    MqttFingerprint,
    /// Print the esphomeyaml version.
    Version,
    /// Delete the platformio build caches of this node.
    Clean,
    /// Start the web dashboard.
    Dashboard {
        /// HTTP port to listen on.
        #[arg(long, default_value_t = 6052)]
        port: u16,
        /// Password protecting the dashboard.
        #[arg(long, default_value = "")]
        password: String,
        /// Open the dashboard in a browser.
        #[arg(long)]
        open_ui: bool,
    },
}

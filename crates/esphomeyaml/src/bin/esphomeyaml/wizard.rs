//! Interactive starter configuration.

use std::fs;
use std::io::IsTerminal;
use std::path::Path;

use esphomeyaml_config::pins::{board_names, is_known_board};
use esphomeyaml_config::EspPlatform;

use crate::prompt::{prompt_choice, prompt_secret, prompt_string, prompt_yes_no};
use crate::style::{self, Tone};

/// Answers collected by the wizard.
#[derive(Debug, Clone, Default)]
pub struct WizardAnswers {
    pub name: String,
    pub platform: String,
    pub board: String,
    pub ssid: String,
    pub psk: String,
    pub broker: Option<String>,
    pub mqtt_username: String,
    pub mqtt_password: String,
    pub ota_password: String,
}

/// Turn free text into a valid node name: lowercase, spaces and dashes
/// become underscores, anything else outside `[a-z0-9_]` is dropped.
pub fn sanitize_name(text: &str) -> String {
    text.trim()
        .to_lowercase()
        .chars()
        .filter_map(|ch| match ch {
            ' ' | '-' => Some('_'),
            'a'..='z' | '0'..='9' | '_' => Some(ch),
            _ => None,
        })
        .collect()
}

fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// Render the configuration file for `answers`.
pub fn wizard_file(answers: &WizardAnswers) -> String {
    let mut out = format!(
        "esphomeyaml:\n  name: {}\n  platform: {}\n  board: {}\n\nwifi:\n  ssid: {}\n  password: {}\n\n",
        answers.name,
        answers.platform,
        answers.board,
        quote(&answers.ssid),
        quote(&answers.psk),
    );
    if let Some(broker) = &answers.broker {
        out.push_str(&format!("mqtt:\n  broker: {}\n", quote(broker)));
        if !answers.mqtt_username.is_empty() {
            out.push_str(&format!(
                "  username: {}\n  password: {}\n",
                quote(&answers.mqtt_username),
                quote(&answers.mqtt_password)
            ));
        }
        out.push('\n');
    }
    out.push_str("# Enable logging\nlogger:\n\n");
    if answers.ota_password.is_empty() {
        out.push_str("ota:\n");
    } else {
        out.push_str(&format!("ota:\n  password: {}\n", quote(&answers.ota_password)));
    }
    out
}

fn ask_name() -> anyhow::Result<String> {
    loop {
        let raw = prompt_string("Name of the node", "livingroom")?;
        let name = sanitize_name(&raw);
        if name.is_empty() {
            style::complain(Tone::Error, "The name must contain at least one letter or digit.");
            continue;
        }
        if name != raw.trim() {
            style::say(Tone::Warning, format!("Using the name '{name}'."));
        }
        return Ok(name);
    }
}

fn ask_board(platform: EspPlatform) -> anyhow::Result<String> {
    let default = match platform {
        EspPlatform::Esp8266 => "nodemcuv2",
        EspPlatform::Esp32 => "nodemcu-32s",
    };
    loop {
        let board = prompt_string("Board type", default)?;
        if is_known_board(platform, &board) {
            return Ok(board);
        }
        let mut known: Vec<&str> = board_names(platform).collect();
        known.sort_unstable();
        style::complain(
            Tone::Error,
            format!("Unknown board '{board}'. Known boards: {}", known.join(", ")),
        );
    }
}

fn ask_psk() -> anyhow::Result<String> {
    loop {
        let psk = prompt_secret("WiFi password")?;
        if psk.is_empty() || psk.len() >= 8 {
            return Ok(psk);
        }
        style::complain(Tone::Error, "WPA passwords need at least 8 characters.");
    }
}

/// Ask for every answer and write the configuration to `path`.
pub fn run_wizard(path: &Path) -> anyhow::Result<()> {
    if path.exists() {
        anyhow::bail!(
            "{} already exists, refusing to overwrite it. Pick another file name.",
            path.display()
        );
    }
    if !std::io::stdin().is_terminal() {
        anyhow::bail!("wizard requires an interactive terminal");
    }

    style::say(Tone::Accent, "esphomeyaml setup wizard");
    println!("This creates {} for a new node.", path.display());
    println!();

    let name = ask_name()?;
    let platform = prompt_choice("Platform", &["ESP8266", "ESP32"], "ESP8266")?;
    let esp = EspPlatform::parse(&platform).unwrap_or(EspPlatform::Esp8266);
    let board = ask_board(esp)?;
    let ssid = prompt_string("WiFi SSID", "")?;
    let psk = ask_psk()?;

    let mut answers = WizardAnswers {
        name,
        platform,
        board,
        ssid,
        psk,
        ..WizardAnswers::default()
    };
    if prompt_yes_no("Use an MQTT broker?", true)? {
        let broker = prompt_string("MQTT broker address", "")?;
        if !broker.is_empty() {
            answers.mqtt_username = prompt_string("MQTT username (empty for none)", "")?;
            if !answers.mqtt_username.is_empty() {
                answers.mqtt_password = prompt_secret("MQTT password")?;
            }
            answers.broker = Some(broker);
        }
    }
    answers.ota_password = prompt_secret("OTA password (empty for none)")?;

    if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, wizard_file(&answers))?;
    println!();
    style::say(Tone::Success, format!("Wrote {}", path.display()));
    println!(
        "Next: {}",
        style::stdout(Tone::Accent, format!("esphomeyaml {} run", path.display()))
    );
    Ok(())
}

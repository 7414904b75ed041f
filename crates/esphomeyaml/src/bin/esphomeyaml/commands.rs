//! Command implementations working on a loaded project.

use std::io::{self, Write};
use std::time::Duration;

use anyhow::{bail, Context};
use esphomeyaml::mqtt::{self, MqttOverrides, MqttSession};
use esphomeyaml::ota::{self, Firmware, OtaTarget, Protocol};
use esphomeyaml::{build, logs, storage, writer, Project};
use esphomeyaml_config::components::mqtt::MqttSettings;
use esphomeyaml_config::{dump, generate, ComponentRegistry};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::cli::{LogsArgs, MqttArgs, UploadArgs};
use crate::ports::PortChoice;
use crate::style::{self, Tone};

pub fn load(path: &std::path::Path, components: &ComponentRegistry) -> anyhow::Result<Project> {
    Ok(Project::load(path, components)?)
}

pub fn show_config(project: &Project) {
    info!("Configuration is valid!");
    print!("{}", dump(project.config()));
}

/// Generate code and write the platformio project.
pub fn write_cpp(project: &Project, components: &ComponentRegistry) -> anyhow::Result<()> {
    info!("Generating C++ source...");
    let generated = generate(&project.validated, components, false)?;
    let report = writer::write_project(project, &generated)?;
    for path in &report.changed {
        info!("Wrote {}", path.display());
    }
    if report.changed.is_empty() {
        info!("Project files are up to date");
    }
    Ok(())
}

pub fn compile(project: &Project) -> anyhow::Result<()> {
    info!("Compiling app...");
    build::compile(project)?;
    style::say(Tone::Success, format!("Successfully compiled {}.", project.name()));
    Ok(())
}

pub fn upload(project: &Project, port: &PortChoice, args: &UploadArgs) -> anyhow::Result<()> {
    match port {
        PortChoice::Serial(port) if args.use_esptoolpy => build::upload_esptool(project, port)?,
        PortChoice::Serial(port) => build::upload_serial(project, port)?,
        PortChoice::Ota => upload_ota(project, args.host_port)?,
    }
    style::say(Tone::Success, "Successfully uploaded program.");
    Ok(())
}

fn upload_ota(project: &Project, host_port: Option<u16>) -> anyhow::Result<()> {
    let Some(port) = project.ota_port() else {
        bail!("No serial port found and OTA not enabled. Can't upload!");
    };
    let Some(host) = project.upload_address() else {
        bail!("Can't determine the address of {}, is wifi configured?", project.name());
    };
    let firmware_path = project.firmware_bin();
    if !firmware_path.is_file() {
        return Err(build::BuildError::MissingFirmware(firmware_path.display().to_string()).into());
    }
    let firmware = Firmware::read(&firmware_path)?;
    let target = OtaTarget {
        host,
        port,
        password: project.ota_password(),
        host_port: ota::host_port(host_port),
    };

    let total = firmware.data.len() as u64;
    let bar = ProgressBar::new(total);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("Uploading: [{bar:60}] {percent:>3}% {bytes}/{total_bytes}")?
            .progress_chars("=> "),
    );
    let result = ota::upload(&target, &firmware, &mut |sent, _| bar.set_position(sent as u64));
    bar.finish_and_clear();

    if result? == Protocol::Native {
        if let Err(err) = storage::mark_native_ota(&project.storage_path()) {
            warn!("Could not update {}: {err}", project.storage_path().display());
        }
    }
    Ok(())
}

fn mqtt_settings(project: &Project) -> anyhow::Result<MqttSettings> {
    Ok(project.mqtt().ok_or(mqtt::MqttError::NotConfigured)?)
}

fn overrides(args: &MqttArgs) -> MqttOverrides {
    MqttOverrides {
        username: args.username.clone(),
        password: args.password.clone(),
        client_id: args.client_id.clone(),
    }
}

pub fn show_logs(project: &Project, port: &PortChoice, args: &LogsArgs) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    if let PortChoice::Serial(port) = port {
        logs::tail_serial(port, project.logger_baud_rate(), args.escape, &mut out)?;
        return Ok(());
    }
    let Some(settings) = project.mqtt() else {
        bail!(
            "No serial port found and MQTT is not configured for {}. Pass --serial-port to read logs.",
            project.name()
        );
    };
    let topic = args
        .mqtt
        .topic
        .clone()
        .or_else(|| settings.log_topic.clone())
        .ok_or(logs::LogTailError::NoLogTopic)?;
    let mut session = MqttSession::connect(&settings, &overrides(&args.mqtt));
    logs::tail_mqtt(&mut session, &topic, args.escape, &mut out)?;
    Ok(())
}

pub fn clean_mqtt(project: &Project, args: &MqttArgs) -> anyhow::Result<()> {
    let settings = mqtt_settings(project)?;
    let topics = match &args.topic {
        Some(topic) => vec![topic.clone()],
        None => mqtt::default_clean_topics(&settings),
    };
    let mut session = MqttSession::connect(&settings, &overrides(args));
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let cleared = mqtt::clear_retained(&mut session, &topics, &mut out)?;
    out.flush()?;
    style::say(Tone::Success, format!("Cleared {cleared} retained message(s)."));
    Ok(())
}

pub fn mqtt_fingerprint(project: &Project) -> anyhow::Result<()> {
    let settings = mqtt_settings(project)?;
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner} {msg}")?);
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner.set_message(format!("Connecting to {}...", settings.broker));
    let fingerprint = mqtt::fingerprint(&settings);
    spinner.finish_and_clear();
    let fingerprint = fingerprint
        .with_context(|| format!("Could not read the certificate of {}", settings.broker))?;
    println!("SHA1 Fingerprint: {}", style::stdout(Tone::Accent, &fingerprint));
    println!(
        "Copy the above value into mqtt.ssl_fingerprints section of {}",
        project.config_filename()
    );
    Ok(())
}

pub fn clean(project: &Project) -> anyhow::Result<()> {
    writer::clean_build(&project.build_dir)?;
    style::say(Tone::Success, "Done!");
    Ok(())
}


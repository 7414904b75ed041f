//! `esphomeyaml` command line entrypoint.

#[path = "esphomeyaml/cli.rs"]
mod cli;
#[path = "esphomeyaml/commands.rs"]
mod commands;
#[path = "esphomeyaml/ports.rs"]
mod ports;
#[path = "esphomeyaml/prompt.rs"]
mod prompt;
#[path = "esphomeyaml/style.rs"]
mod style;
#[path = "esphomeyaml/wizard.rs"]
mod wizard;

use clap::Parser;
use esphomeyaml::{interrupt, BuildError, VERSION};
use esphomeyaml_config::ComponentRegistry;
use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};
use style::Tone;

fn main() {
    if let Err(err) = run() {
        style::complain(Tone::Error, format!("Error: {err:#}"));
        std::process::exit(exit_code(&err));
    }
}

/// Build failures keep the toolchain's exit code, everything else is `1`.
fn exit_code(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<BuildError>()
        .map_or(1, BuildError::exit_code)
}

fn init_logging(verbose: bool, quiet: bool) {
    let level = if verbose {
        Level::DEBUG
    } else if quiet {
        Level::WARN
    } else {
        Level::INFO
    };
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);
    interrupt::install();

    let path = cli.configuration.as_path();
    match &cli.command {
        Command::Version => {
            println!("Version: {VERSION}");
            return Ok(());
        }
        Command::Wizard => return wizard::run_wizard(path),
        Command::Dashboard {
            port,
            password,
            open_ui,
        } => {
            tracing::debug!(
                port = *port,
                open_ui = *open_ui,
                password_set = !password.is_empty(),
                "dashboard requested"
            );
            anyhow::bail!(
                "The dashboard is a separate tool and not part of this binary. \
                 Serve {} with it on port {port}.",
                path.display()
            );
        }
        _ => {}
    }

    let components = ComponentRegistry::builtin();
    let project = commands::load(path, &components)?;
    match cli.command {
        Command::Config => commands::show_config(&project),
        Command::Compile { only_generate } => {
            commands::write_cpp(&project, &components)?;
            if !only_generate {
                commands::compile(&project)?;
            }
        }
        Command::Upload(args) => {
            let port = ports::choose(&project, args.upload_port.as_deref())?;
            commands::upload(&project, &port, &args)?;
        }
        Command::Logs(args) => {
            let port = ports::choose(&project, args.serial_port.as_deref())?;
            commands::show_logs(&project, &port, &args)?;
        }
        Command::Run {
            upload,
            logs,
            no_logs,
        } => {
            commands::write_cpp(&project, &components)?;
            commands::compile(&project)?;
            let port = ports::choose(&project, upload.upload_port.as_deref())?;
            commands::upload(&project, &port, &upload)?;
            if no_logs || interrupt::interrupted() {
                return Ok(());
            }
            let port = match &logs.serial_port {
                Some(serial) => ports::PortChoice::Serial(serial.clone()),
                None => port,
            };
            commands::show_logs(&project, &port, &logs)?;
        }
        Command::CleanMqtt(args) => commands::clean_mqtt(&project, &args)?,
        Command::MqttFingerprint => commands::mqtt_fingerprint(&project)?,
        Command::Clean => commands::clean(&project)?,
        Command::Version | Command::Wizard | Command::Dashboard { .. } => {}
    }
    Ok(())
}

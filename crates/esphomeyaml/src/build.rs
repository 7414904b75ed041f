//! Runs the external toolchain: platformio for compiling and serial
//! uploads, `esptool.py` for raw ESP8266 flashing.

use std::ffi::{OsStr, OsString};
use std::path::Path;
use std::process::{Child, Command, ExitStatus};
use std::thread;
use std::time::Duration;

use esphomeyaml_config::EspPlatform;
use thiserror::Error;
use tracing::{debug, info};

use crate::interrupt;
use crate::project::Project;

/// Overrides the platformio executable.
pub const PLATFORMIO_ENV: &str = "ESPHOMEYAML_PLATFORMIO";

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Could not start {program}: {source}. Is it installed and on the PATH?")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} failed with exit code {code}")]
    Failed { program: String, code: i32 },
    #[error("{program} was interrupted")]
    Interrupted { program: String },
    #[error("Firmware binary {0} does not exist, compile the project first")]
    MissingFirmware(String),
    #[error("esptool.py uploads are only supported on ESP8266")]
    EsptoolPlatform,
}

impl BuildError {
    /// Exit code the process should end with.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            BuildError::Failed { code, .. } => *code,
            _ => 1,
        }
    }
}

/// platformio executable, honoring [`PLATFORMIO_ENV`].
#[must_use]
pub fn platformio_program() -> String {
    std::env::var(PLATFORMIO_ENV)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| "platformio".to_string())
}

/// Run `program` with inherited stdio until it exits or Ctrl-C is
/// pressed, in which case the child is killed.
pub fn run_external<I, S>(program: &str, args: I) -> Result<(), BuildError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let args: Vec<OsString> = args.into_iter().map(|arg| arg.as_ref().to_os_string()).collect();
    info!(
        "Running: {program} {}",
        args.iter().map(|arg| arg.to_string_lossy()).collect::<Vec<_>>().join(" ")
    );
    let child = Command::new(program)
        .args(&args)
        .spawn()
        .map_err(|source| BuildError::Spawn {
            program: program.to_string(),
            source,
        })?;
    let status = wait(child, program)?;
    debug!("{program} exited with {status}");
    if status.success() {
        return Ok(());
    }
    Err(BuildError::Failed {
        program: program.to_string(),
        code: status.code().unwrap_or(1),
    })
}

fn wait(mut child: Child, program: &str) -> Result<ExitStatus, BuildError> {
    let spawn_error = |source| BuildError::Spawn {
        program: program.to_string(),
        source,
    };
    loop {
        if let Some(status) = child.try_wait().map_err(spawn_error)? {
            return Ok(status);
        }
        if interrupt::interrupted() {
            let _ = child.kill();
            let _ = child.wait();
            return Err(BuildError::Interrupted {
                program: program.to_string(),
            });
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn run_platformio(build_dir: &Path, extra: &[&str]) -> Result<(), BuildError> {
    let mut args: Vec<OsString> = vec!["run".into(), "-d".into(), build_dir.into()];
    args.extend(extra.iter().map(OsString::from));
    run_external(&platformio_program(), args)
}

/// `platformio run -d <build dir>`.
pub fn compile(project: &Project) -> Result<(), BuildError> {
    run_platformio(&project.build_dir, &[])
}

/// Flash over a serial port through platformio.
pub fn upload_serial(project: &Project, port: &str) -> Result<(), BuildError> {
    run_platformio(&project.build_dir, &["-t", "upload", "--upload-port", port])
}

/// Flash the compiled binary with `esptool.py`.
pub fn upload_esptool(project: &Project, port: &str) -> Result<(), BuildError> {
    if project.platform() != EspPlatform::Esp8266 {
        return Err(BuildError::EsptoolPlatform);
    }
    let firmware = project.firmware_bin();
    if !firmware.is_file() {
        return Err(BuildError::MissingFirmware(firmware.display().to_string()));
    }
    let args: Vec<OsString> = vec![
        "--before".into(),
        "default_reset".into(),
        "--after".into(),
        "hard_reset".into(),
        "--chip".into(),
        "esp8266".into(),
        "--port".into(),
        port.into(),
        "write_flash".into(),
        "0x0".into(),
        firmware.into(),
    ];
    run_external("esptool.py", args)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_program_is_a_spawn_error() {
        let err = run_external("esphomeyaml-no-such-program", ["--version"]).unwrap_err();
        assert!(matches!(err, BuildError::Spawn { .. }), "{err}");
        assert_eq!(err.exit_code(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn exit_code_passes_through() {
        let err = run_external("sh", ["-c", "exit 3"]).unwrap_err();
        assert_eq!(err.exit_code(), 3);
        assert!(run_external("sh", ["-c", "exit 0"]).is_ok());
    }
}

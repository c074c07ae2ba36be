use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

use crate::exit::{io_error, CliError, CliResult, INTERNAL, USAGE};
use crate::logging::LogLevel;
use crate::output::OutputFormat;

#[cfg(unix)]
pub mod child;
#[cfg(unix)]
pub mod parent;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the Example service, launch a child against it and report what it printed.
    Parent(ParentArgs),
    /// Connect to a parent's Example service and call every method once.
    Child(ChildArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        #[cfg(unix)]
        Command::Parent(args) => parent::run(args, format),
        #[cfg(unix)]
        Command::Child(args) => child::run(args),
        #[cfg(not(unix))]
        Command::Parent(_) | Command::Child(_) => Err(CliError::new(
            USAGE,
            "socket-pair bridges are only available on unix platforms",
        )),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ParentArgs {
    /// Executable to launch as the child. Default: this executable.
    #[arg(long, value_name = "PATH")]
    pub child_exe: Option<PathBuf>,
    /// Minimum log level passed to the child.
    #[arg(long, value_name = "LEVEL", default_value = "warn")]
    pub child_log_level: LogLevel,
    /// Time the child has to connect (e.g. 2s, 500ms).
    #[arg(long, default_value = "2s")]
    pub connect_timeout: String,
    /// Time the child has to finish once connected.
    #[arg(long, default_value = "60s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct ChildArgs {
    /// Connection descriptor printed by the parent.
    pub descriptor: String,
    /// Per-call reply timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "60s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

pub(crate) fn build_runtime() -> CliResult<Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| io_error("failed to start async runtime", err))
}

/// Cancel `token` on Ctrl-C.
pub(crate) fn install_ctrlc_handler(token: CancellationToken) -> CliResult<()> {
    ctrlc::set_handler(move || token.cancel())
        .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration(" 3 ").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert_eq!(parse_duration("0ms").unwrap_err().code, USAGE);
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("").is_err());
    }
}

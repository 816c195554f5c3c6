use clap::{Args, Subcommand};
use std::path::{Path, PathBuf};

use bondtun_session::HostConfig;

use crate::exit::{config_error, io_error, CliResult};
use crate::output::OutputFormat;

pub mod check;
pub mod run;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run every session in a configuration file until shutdown.
    Run(RunArgs),
    /// Validate a configuration file and print its sessions.
    Check(CheckArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Run(args) => run::run(args, format),
        Command::Check(args) => check::run(args, format),
        Command::Version(args) => version::run(args, format),
    }
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the JSON session configuration.
    pub config: PathBuf,
    /// Override kernel send and receive buffer sizes for every socket.
    #[arg(long, value_name = "BYTES")]
    pub socket_buffer_size: Option<u32>,
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Path to the JSON session configuration.
    pub config: PathBuf,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Read, parse and validate a host configuration file.
pub fn load_config(path: &Path) -> CliResult<HostConfig> {
    let text = std::fs::read_to_string(path)
        .map_err(|err| io_error(&format!("cannot read {}", path.display()), err))?;
    HostConfig::from_json(&text)
        .map_err(|err| config_error(&format!("invalid config {}", path.display()), err))
}

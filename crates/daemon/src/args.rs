// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `brimd [OPTIONS] [COMMAND]` - the command surface.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// The conf files read when none are given with -c.
pub const DEFAULT_CONF_FILES: &[&str] = &["/etc/brim/brimd.conf", "~/.brimd.conf"];

#[derive(Debug, Parser)]
#[command(
    name = "brimd",
    about = "brimd - multi-protocol network service container",
    disable_version_flag = true
)]
pub struct BrimdArgs {
    /// Read configuration from PATH instead of the defaults
    /// (/etc/brim/brimd.conf, ~/.brimd.conf). May be given more than once;
    /// files are read in order with later values winning.
    #[arg(short = 'c', long = "conf", value_name = "PATH")]
    pub conf_files: Vec<PathBuf>,

    /// Where to store the PID of the running main brimd process.
    #[arg(
        short = 'p',
        long = "pid-file",
        value_name = "PATH",
        default_value = "/var/run/brimd.pid"
    )]
    pub pid_file: PathBuf,

    /// Keep stdout/stderr open when running as a daemon; normally they are
    /// pointed at /dev/null. Useful for debugging.
    #[arg(short = 'o', long = "output")]
    pub output: bool,

    /// Print the brimd version and exit.
    #[arg(short = 'v', long = "version")]
    pub version: bool,

    /// Internal: this process is the spawned daemon child.
    #[arg(long, hide = true)]
    pub daemonized: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Run in the foreground with no workers forked; PID files are ignored
    /// and output goes to stdout/stderr. The default command.
    #[command(name = "no-daemon")]
    NoDaemon,
    /// Start brimd if it isn't already running.
    Start,
    /// Start a new brimd that waits for any existing one to release the
    /// listening ports, then tells the old one to shut down.
    #[command(aliases = ["reload", "force-reload"])]
    Restart,
    /// Release the listening ports and exit; workers finish serving their
    /// existing connections first.
    Shutdown,
    /// Terminate immediately, severing existing connections.
    Stop,
    /// Report whether brimd is currently running.
    Status,
}

impl BrimdArgs {
    /// The configured conf file paths, falling back to the defaults.
    pub fn conf_paths(&self) -> Vec<PathBuf> {
        if self.conf_files.is_empty() {
            DEFAULT_CONF_FILES.iter().map(PathBuf::from).collect()
        } else {
            self.conf_files.clone()
        }
    }

    pub fn command(&self) -> Command {
        self.command.unwrap_or(Command::NoDaemon)
    }
}

#[cfg(test)]
#[path = "args_tests.rs"]
mod tests;

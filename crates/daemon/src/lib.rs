// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! brim-daemon: the brimd supervisor, subservers, and HTTP pipeline.
//!
//! The `brimd` binary is a thin wrapper over [`run`], which dispatches the
//! command surface: foreground serving, daemonized start with zero-downtime
//! restart handoff, and PID-file control of a running instance.

pub mod args;
pub mod capture;
pub mod control;
pub mod http;
pub mod net;
pub mod registry;
pub mod service;
pub mod subserver;
pub mod supervisor;

use std::path::Path;
use std::time::{Duration, Instant};

use nix::sys::signal::Signal;
use thiserror::Error;

use brim_core::{read_conf, Clock, Conf, ConfError, SystemClock};

use args::{BrimdArgs, Command};
use control::ControlError;
use service::Shutdown;
use supervisor::{ServerError, ServerOpts};

#[derive(Debug, Error)]
pub enum BrimdError {
    #[error(transparent)]
    Conf(#[from] ConfError),

    #[error(transparent)]
    Control(#[from] ControlError),

    #[error(transparent)]
    Server(#[from] ServerError),

    #[error("{0}")]
    Startup(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Dispatch a brimd invocation. Prints command output to stdout; the caller
/// maps errors to a single stderr line and exit code 1.
pub fn run(args: BrimdArgs) -> Result<(), BrimdError> {
    if args.version {
        println!("brimd {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }
    let clock = SystemClock;
    match args.command() {
        Command::Status => {
            println!("{}", control::status_line(&args.pid_file)?);
            Ok(())
        }
        Command::Shutdown => {
            control::send_pid_sig(&args.pid_file, Some(Signal::SIGHUP), true, None, &clock)?;
            Ok(())
        }
        Command::Stop => {
            control::send_pid_sig(&args.pid_file, Some(Signal::SIGTERM), true, None, &clock)?;
            Ok(())
        }
        Command::NoDaemon => {
            let conf = load_conf(&args)?;
            let opts =
                ServerOpts { pid_file: args.pid_file.clone(), no_daemon: true, daemonized: false };
            supervisor::run_server(conf, opts, &registry::builtin_registry(), Shutdown::new())?;
            Ok(())
        }
        Command::Start | Command::Restart if args.daemonized => {
            let conf = load_conf(&args)?;
            let opts =
                ServerOpts { pid_file: args.pid_file.clone(), no_daemon: false, daemonized: true };
            supervisor::run_server(conf, opts, &registry::builtin_registry(), Shutdown::new())?;
            Ok(())
        }
        Command::Start => {
            let (running, pid) = control::send_pid_sig(&args.pid_file, None, false, None, &clock)?;
            if running {
                println!("{pid} already running");
                return Ok(());
            }
            let conf = load_conf(&args)?;
            supervisor::validate(&conf, &registry::builtin_registry())?;
            let child = spawn_daemonized(&args)?;
            wait_for_daemon(child, &args.pid_file, startup_grace(&conf)?)
        }
        Command::Restart => {
            let conf = load_conf(&args)?;
            supervisor::validate(&conf, &registry::builtin_registry())?;
            let (running, old_pid) =
                control::send_pid_sig(&args.pid_file, None, false, None, &clock)?;
            // The new instance starts binding immediately; its listen retry
            // rides out the window until the old one lets go.
            let child = spawn_daemonized(&args)?;
            if running {
                clock.sleep(Duration::from_secs(1));
                control::send_pid_sig(
                    &args.pid_file,
                    Some(Signal::SIGHUP),
                    true,
                    Some(old_pid),
                    &clock,
                )?;
            }
            wait_for_daemon(child, &args.pid_file, startup_grace(&conf)?)
        }
    }
}

/// Read configuration for a command that needs it.
fn load_conf(args: &BrimdArgs) -> Result<Conf, BrimdError> {
    let conf = read_conf(&args.conf_paths())?;
    if conf.files().is_empty() {
        return Err(ConfError::NoConfiguration.into());
    }
    Ok(conf)
}

/// Spawn the daemonized child: this same binary, same options, with the
/// internal flag set. Stdio goes to /dev/null unless `-o` keeps it open.
fn spawn_daemonized(args: &BrimdArgs) -> Result<std::process::Child, BrimdError> {
    use std::process::Stdio;

    let exe = std::env::current_exe()?;
    let mut command = std::process::Command::new(exe);
    for path in &args.conf_files {
        command.arg("-c").arg(path);
    }
    command.arg("-p").arg(&args.pid_file);
    command.stdin(Stdio::null());
    if args.output {
        command.arg("-o");
        command.stdout(Stdio::inherit()).stderr(Stdio::inherit());
    } else {
        command.stdout(Stdio::null()).stderr(Stdio::null());
    }
    command.arg("--daemonized").arg("start");
    Ok(command.spawn()?)
}

/// How long to allow the child to come up: its bind retry window, plus the
/// grace an old instance gets to exit during a handoff, plus slack.
fn startup_grace(conf: &Conf) -> Result<Duration, BrimdError> {
    let listen_retry = conf.get_int("brim", "listen_retry", 30)?.max(0) as u64;
    Ok(Duration::from_secs(listen_retry + control::PID_WAIT_TIME + 5))
}

/// Wait until the child has written the PID file (it does so once its
/// listeners are bound) or has exited in failure.
fn wait_for_daemon(
    mut child: std::process::Child,
    pid_file: &Path,
    grace: Duration,
) -> Result<(), BrimdError> {
    let child_pid = child.id() as i32;
    let deadline = Instant::now() + grace;
    loop {
        if let Some(status) = child.try_wait()? {
            return Err(BrimdError::Startup(format!(
                "brimd failed to start ({status}); run with -o or no-daemon for diagnostics"
            )));
        }
        if control::read_pid(pid_file)? == Some(child_pid) {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(BrimdError::Startup(
                "brimd did not come up within the startup grace period".to_string(),
            ));
        }
        std::thread::sleep(Duration::from_millis(100));
    }
}

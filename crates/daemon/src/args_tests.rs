// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use clap::Parser;

#[test]
fn defaults_to_no_daemon_and_standard_paths() {
    let args = BrimdArgs::parse_from(["brimd"]);
    assert_eq!(args.command(), Command::NoDaemon);
    assert_eq!(args.pid_file, PathBuf::from("/var/run/brimd.pid"));
    assert!(!args.output);
    assert!(!args.version);
    assert!(!args.daemonized);
    assert_eq!(
        args.conf_paths(),
        vec![PathBuf::from("/etc/brim/brimd.conf"), PathBuf::from("~/.brimd.conf")]
    );
}

#[test]
fn conf_option_repeats_in_order() {
    let args = BrimdArgs::parse_from(["brimd", "-c", "a.conf", "-c", "b.conf", "start"]);
    assert_eq!(args.conf_paths(), vec![PathBuf::from("a.conf"), PathBuf::from("b.conf")]);
    assert_eq!(args.command(), Command::Start);
}

#[test]
fn restart_aliases() {
    for alias in ["restart", "reload", "force-reload"] {
        let args = BrimdArgs::parse_from(["brimd", alias]);
        assert_eq!(args.command(), Command::Restart, "alias {alias}");
    }
}

#[test]
fn all_commands_parse() {
    for (word, expected) in [
        ("no-daemon", Command::NoDaemon),
        ("start", Command::Start),
        ("shutdown", Command::Shutdown),
        ("stop", Command::Stop),
        ("status", Command::Status),
    ] {
        let args = BrimdArgs::parse_from(["brimd", word]);
        assert_eq!(args.command(), expected, "command {word}");
    }
}

#[test]
fn version_and_output_flags() {
    let args = BrimdArgs::parse_from(["brimd", "-v"]);
    assert!(args.version);
    let args = BrimdArgs::parse_from(["brimd", "-o", "-p", "/tmp/x.pid", "start"]);
    assert!(args.output);
    assert_eq!(args.pid_file, PathBuf::from("/tmp/x.pid"));
}

#[test]
fn unknown_command_is_rejected() {
    assert!(BrimdArgs::try_parse_from(["brimd", "bounce"]).is_err());
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! brimd entry point.

use std::process::ExitCode;

use clap::Parser;

use brim_daemon::args::BrimdArgs;

fn main() -> ExitCode {
    // Exit 1 on any error, including usage errors (clap's default is 2).
    let args = match BrimdArgs::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let _ = err.print();
            return if err.use_stderr() { ExitCode::FAILURE } else { ExitCode::SUCCESS };
        }
    };
    match brim_daemon::run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

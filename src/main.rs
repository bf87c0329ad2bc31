mod adapter;
mod config;
mod error;
mod logging;
mod path;
mod remote;
mod services;
mod util;

use std::{io, process::ExitCode};

use clap::Parser;

use crate::{
    config::{Cli, SyncSettings},
    services::run_sync::run_sync,
};

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.quiet);

    let result = SyncSettings::resolve(&cli).and_then(|settings| {
        let stdout = io::stdout();
        run_sync(&settings, &mut stdout.lock())
    });

    match result {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

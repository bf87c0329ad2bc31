//! Diagnostics go to stderr so stdout stays reserved for the upload listing.

use std::io;

use tracing_subscriber::EnvFilter;

/// Installs the global subscriber. `RUST_LOG` takes precedence over the flags.
pub fn init(verbosity: u8, quiet: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity, quiet)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn default_directive(verbosity: u8, quiet: bool) -> String {
    if quiet {
        return "error".to_owned();
    }

    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    format!("warn,{}={}", env!("CARGO_CRATE_NAME"), level)
}

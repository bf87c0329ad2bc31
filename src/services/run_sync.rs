use std::{fs, io, io::Write, path::Path, time::Instant};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::{
    adapter::{
        self,
        fs::{IgnoreRules, LocalWalker},
        remote::RemoteClient,
    },
    config::SyncSettings,
    error::SyncError,
    path::SyncRoots,
    services::sync_tree::{sync_tree, SyncReport},
};

/// Connects with `settings` and brings the remote tree up to date.
pub fn run_sync(settings: &SyncSettings, out: &mut dyn Write) -> Result<SyncReport> {
    check_source(&settings.source)?;

    let rules = if settings.ignore.is_empty() {
        IgnoreRules::none()
    } else {
        IgnoreRules::parse(
            &settings.source,
            settings.ignore_origin.as_deref(),
            settings.ignore.iter().map(String::as_str),
        )
        .context("invalid ignore pattern")?
    };

    let client = adapter::connect(settings)?;

    sync_with_session(client, settings, rules, out)
}

/// Runs the sync over an already logged-in session, quitting it afterwards
/// whatever the outcome.
pub fn sync_with_session(
    client: Box<dyn RemoteClient>,
    settings: &SyncSettings,
    rules: IgnoreRules,
    out: &mut dyn Write,
) -> Result<SyncReport> {
    let started = Instant::now();
    let mut client = scopeguard::guard(client, |mut client| {
        if let Err(err) = client.quit() {
            warn!("failed to close the session cleanly: {err}");
        }
    });

    let mut roots = SyncRoots::new(&settings.source, &settings.dest);
    if !roots.is_dest_absolute() {
        let base = client
            .working_dir()
            .map_err(|source| SyncError::RemoteScan {
                path: roots.dest_root().to_owned(),
                source,
            })?;
        roots = roots.anchored_at(&base);
    }
    info!(
        "syncing {} into {}",
        roots.source_root().display(),
        roots.dest_root()
    );

    let walker = LocalWalker::new(roots.source_root(), rules);
    let report = sync_tree(&mut **client, &roots, walker, settings.dry_run, out)?;

    info!(
        "done in {:.2?}: {} uploaded ({} bytes), {} already present{}",
        started.elapsed(),
        report.uploaded.len(),
        report.bytes,
        report.skipped,
        if report.dry_run { ", dry run" } else { "" }
    );

    Ok(report)
}

fn check_source(source: &Path) -> Result<(), SyncError> {
    let walk_error = |source_err| SyncError::LocalWalk {
        path: source.to_path_buf(),
        source: source_err,
    };

    let metadata = fs::metadata(source).map_err(walk_error)?;
    if !metadata.is_dir() {
        return Err(walk_error(io::Error::new(
            io::ErrorKind::Other,
            "not a directory",
        )));
    }

    Ok(())
}

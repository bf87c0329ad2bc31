use std::io::Write;

use tracing::{debug, info, trace};

use crate::{
    adapter::{fs::LocalWalker, remote::RemoteClient},
    error::SyncError,
    path::{remote_parent, SyncRoots},
    remote::{scan_remote, Uploader},
};

/// What one run did.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub uploaded: Vec<String>,
    pub skipped: usize,
    pub bytes: u64,
    pub dry_run: bool,
}

/// Pushes every local file that is missing on the remote side.
///
/// Progress goes to `out`: `scanning...` first, then one line per uploaded
/// remote path, then `no changes` if nothing had to be sent. With `dry_run`
/// nothing is created or stored and each line reads `would upload <path>`.
pub fn sync_tree(
    client: &mut dyn RemoteClient,
    roots: &SyncRoots,
    walker: LocalWalker,
    dry_run: bool,
    out: &mut dyn Write,
) -> Result<SyncReport, SyncError> {
    writeln!(out, "scanning...")?;
    let snapshot = scan_remote(client, roots.dest_root())?;
    if snapshot.is_empty() {
        debug!("{} holds no files yet", roots.dest_root());
    }

    let mut uploader = Uploader::new(client, roots.dest_root()).with_known_dirs(snapshot.dirs());
    let mut report = SyncReport {
        dry_run,
        ..Default::default()
    };

    for file in walker {
        let file = file?;
        let remote = roots.remote_path_for(&file.path)?;
        trace!("{} -> {}", file.relative.display(), remote);

        if snapshot.contains(&remote) {
            debug!("{} already present", remote);
            report.skipped += 1;
            continue;
        }

        if dry_run {
            debug!("would create {} for {}", remote_parent(&remote), remote);
            writeln!(out, "would upload {remote}")?;
        } else {
            report.bytes += uploader.upload(&file.path, &remote)?;
            writeln!(out, "{remote}")?;
        }

        report.uploaded.push(remote);
    }

    if report.uploaded.is_empty() {
        writeln!(out, "no changes")?;
    }

    info!(
        "{} uploaded, {} already present",
        report.uploaded.len(),
        report.skipped
    );

    Ok(report)
}

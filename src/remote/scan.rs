use std::collections::HashSet;

use tracing::{debug, info, trace};

use crate::{
    adapter::remote::{EntryKind, RemoteClient},
    error::SyncError,
    path::{join_remote, join_remote_dir, trim_dir},
};

/// Every file path that existed below the destination root when the scan ran.
#[derive(Clone, Debug, Default)]
pub struct RemoteSnapshot {
    files: HashSet<String>,
    dirs: HashSet<String>,
}

impl RemoteSnapshot {
    pub fn contains(&self, remote_path: &str) -> bool {
        self.files.contains(remote_path)
    }

    /// Directories seen during the scan, each with a trailing `/`.
    pub fn dirs(&self) -> impl Iterator<Item = &str> {
        self.dirs.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Lists everything below `root` (which must end with `/`), depth first.
///
/// Each directory is entered by its absolute path before it is listed, so the
/// session cursor left behind by a finished subtree never affects the
/// listing of its siblings. Any failure aborts the scan.
pub fn scan_remote(client: &mut dyn RemoteClient, root: &str) -> Result<RemoteSnapshot, SyncError> {
    let mut snapshot = RemoteSnapshot::default();
    visit(client, root, &mut snapshot)?;

    info!(
        "remote scan found {} files in {} directories",
        snapshot.len(),
        snapshot.dirs.len()
    );

    Ok(snapshot)
}

fn visit(
    client: &mut dyn RemoteClient,
    dir: &str,
    snapshot: &mut RemoteSnapshot,
) -> Result<(), SyncError> {
    let scan_error = |source| SyncError::RemoteScan {
        path: dir.to_owned(),
        source,
    };

    debug!("listing {dir}");
    client.change_dir(trim_dir(dir)).map_err(scan_error)?;
    let entries = client.list_current().map_err(scan_error)?;
    snapshot.dirs.insert(dir.to_owned());

    for entry in entries {
        if entry.is_pseudo() {
            continue;
        }

        match entry.kind {
            EntryKind::File => {
                snapshot.files.insert(join_remote(dir, &entry.name));
            }
            EntryKind::Directory => {
                visit(client, &join_remote_dir(dir, &entry.name), snapshot)?;
            }
            EntryKind::Other => {
                trace!("ignoring {}{} of unknown kind", dir, entry.name);
            }
        }
    }

    Ok(())
}

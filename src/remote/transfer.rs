use std::{
    collections::HashSet,
    fs::File,
    io::BufReader,
    path::Path,
};

use tracing::debug;

use crate::{
    adapter::remote::{RemoteClient, RemoteErrorKind},
    error::{SyncError, TransferFailure},
    path::{remote_parent, trim_dir},
};

/// Puts files onto the remote side, creating missing directories on the way.
pub struct Uploader<'c> {
    client: &'c mut dyn RemoteClient,
    dest_root: String,
    known_dirs: HashSet<String>,
}

impl<'c> Uploader<'c> {
    pub fn new(client: &'c mut dyn RemoteClient, dest_root: &str) -> Self {
        Self {
            client,
            dest_root: dest_root.to_owned(),
            known_dirs: HashSet::from([dest_root.to_owned()]),
        }
    }

    /// Marks directories (with trailing `/`) as already present, typically the
    /// ones the scan walked through, so no creation is requested for them.
    pub fn with_known_dirs<'a>(mut self, dirs: impl IntoIterator<Item = &'a str>) -> Self {
        self.known_dirs.extend(dirs.into_iter().map(str::to_owned));
        self
    }

    /// Makes sure `dir` (with trailing `/`) exists, creating each missing
    /// level below the destination root in order. A directory that turns out
    /// to exist already is fine. Moves the session cursor; later calls must
    /// use absolute paths.
    pub fn ensure_dir(&mut self, dir: &str) -> Result<(), SyncError> {
        if self.known_dirs.contains(dir) {
            return Ok(());
        }

        for level in dir_chain(&self.dest_root, dir) {
            if self.known_dirs.contains(level) {
                continue;
            }

            match self.client.make_dir(trim_dir(level)) {
                Ok(()) => debug!("created {level}"),
                Err(err) if err.kind() == RemoteErrorKind::AlreadyExists => {
                    debug!("{level} already exists");
                }
                // Some servers answer a generic failure for a directory that
                // is already there; entering it settles the question.
                Err(source) => match self.client.change_dir(trim_dir(level)) {
                    Ok(()) => debug!("{level} already exists ({source})"),
                    Err(_) => {
                        return Err(SyncError::DirectoryCreate {
                            path: level.to_owned(),
                            source,
                        })
                    }
                },
            }

            self.known_dirs.insert(level.to_owned());
        }

        Ok(())
    }

    /// Uploads one local file to `remote`, returning the number of bytes stored.
    pub fn upload(&mut self, local: &Path, remote: &str) -> Result<u64, SyncError> {
        self.ensure_dir(remote_parent(remote))?;

        let transfer_error = |source| SyncError::Transfer {
            local: local.to_path_buf(),
            remote: remote.to_owned(),
            source,
        };

        let file = File::open(local).map_err(|err| transfer_error(TransferFailure::Open(err)))?;
        let mut reader = BufReader::new(file);

        let written = self
            .client
            .store(remote, &mut reader)
            .map_err(|err| transfer_error(TransferFailure::Store(err)))?;

        debug!("stored {} ({} bytes)", remote, written);
        Ok(written)
    }
}

/// Every directory from just below `root` down to `dir`, outermost first.
/// Both arguments end with `/`. A `dir` outside `root` yields only itself.
fn dir_chain<'d>(root: &str, dir: &'d str) -> Vec<&'d str> {
    let Some(rest) = dir.strip_prefix(root) else {
        return vec![dir];
    };

    rest.match_indices('/')
        .map(|(index, _)| &dir[..root.len() + index + 1])
        .collect()
}

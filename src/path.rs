use std::path::{Component, Path, PathBuf};

use crate::error::SyncError;

/// The pair of roots a run synchronizes between.
///
/// `dest_root` always ends with `/`. Every remote path in a run, whether it
/// comes from a listing or from mapping a local file, is produced by
/// [`join_remote`] or [`SyncRoots::remote_path_for`], so both sides of the
/// snapshot lookup share one separator convention.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncRoots {
    source_root: PathBuf,
    dest_root: String,
}

impl SyncRoots {
    pub fn new(source_root: impl Into<PathBuf>, dest_root: &str) -> Self {
        Self {
            source_root: source_root.into(),
            dest_root: normalize_dest(dest_root),
        }
    }

    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    pub fn dest_root(&self) -> &str {
        &self.dest_root
    }

    pub fn is_dest_absolute(&self) -> bool {
        self.dest_root.starts_with('/')
    }

    /// Re-roots a relative destination under `base` (usually the session's
    /// working directory). Absolute destinations are left alone.
    pub fn anchored_at(mut self, base: &str) -> Self {
        if !self.is_dest_absolute() {
            let relative = self.dest_root.trim_start_matches("./");
            self.dest_root = normalize_dest(&format!("{}/{}", base, relative));
        }

        self
    }

    /// Maps a local file below `source_root` to the remote path it would occupy.
    pub fn remote_path_for(&self, local: &Path) -> Result<String, SyncError> {
        let resolution_error = |reason| SyncError::PathResolution {
            path: local.to_path_buf(),
            root: self.source_root.clone(),
            reason,
        };

        let relative = local
            .strip_prefix(&self.source_root)
            .map_err(|_| resolution_error("not a descendant of the source root"))?;

        let mut remote = self.dest_root.clone();
        let mut first = true;

        for component in relative.components() {
            let Component::Normal(part) = component else {
                return Err(resolution_error("relative path leaves the source root"));
            };
            let part = part
                .to_str()
                .ok_or_else(|| resolution_error("path is not valid UTF-8"))?;

            if !first {
                remote.push('/');
            }
            remote.push_str(part);
            first = false;
        }

        if first {
            return Err(resolution_error("path is the source root itself"));
        }

        Ok(remote)
    }
}

/// Normalizes a remote directory path: `/` separated, no empty or `.`
/// segments, trailing `/`. A leading `/` is kept; a relative path that
/// normalizes to nothing becomes `./`.
pub fn normalize_dest(dest: &str) -> String {
    let absolute = dest.starts_with('/');
    let segments: Vec<_> = dest
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect();

    match (absolute, segments.is_empty()) {
        (true, true) => "/".to_owned(),
        (true, false) => format!("/{}/", segments.join("/")),
        (false, true) => "./".to_owned(),
        (false, false) => format!("{}/", segments.join("/")),
    }
}

/// Joins a directory path (ending in `/`) and an entry name.
pub fn join_remote(dir: &str, name: &str) -> String {
    if dir.ends_with('/') {
        format!("{dir}{name}")
    } else {
        format!("{dir}/{name}")
    }
}

/// Same as [`join_remote`] but yields a directory path, with the trailing `/`.
pub fn join_remote_dir(dir: &str, name: &str) -> String {
    let mut joined = join_remote(dir, name);
    joined.push('/');
    joined
}

/// The directory containing a remote file, with the trailing `/`.
pub fn remote_parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(index) => &path[..=index],
        None => "./",
    }
}

/// Drops the trailing `/` for protocol commands, keeping `/` itself intact.
pub fn trim_dir(dir: &str) -> &str {
    match dir.trim_end_matches('/') {
        "" if dir.starts_with('/') => "/",
        trimmed => trimmed,
    }
}

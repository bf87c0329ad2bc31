use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use crate::error::SyncError;

/// A regular file found under the source root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalFileRef {
    pub path: PathBuf,
    pub relative: PathBuf,
}

/// Compiled exclusion rules, gitignore syntax, evaluated relative to the source root.
pub struct IgnoreRules {
    matcher: Gitignore,
}

impl IgnoreRules {
    pub fn none() -> Self {
        Self {
            matcher: Gitignore::empty(),
        }
    }

    /// `origin` is only used to attribute rules in error messages.
    pub fn parse<'a>(
        root: &Path,
        origin: Option<&Path>,
        lines: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self> {
        let mut builder = GitignoreBuilder::new(root);

        for line in lines {
            builder
                .add_line(origin.map(Path::to_path_buf), line)
                .with_context(|| format!("invalid ignore rule {line:?}"))?;
        }

        Ok(Self {
            matcher: builder.build().context("failed to compile ignore rules")?,
        })
    }

    fn excludes(&self, path: &Path, is_dir: bool) -> bool {
        self.matcher.matched(path, is_dir).is_ignore()
    }
}

/// Depth-first walk over every regular file below `root`.
///
/// Entries are visited in file-name order. The first read error is yielded as
/// [`SyncError::LocalWalk`]; callers are expected to stop there.
pub struct LocalWalker {
    root: PathBuf,
    inner: walkdir::IntoIter,
    rules: IgnoreRules,
}

impl LocalWalker {
    pub fn new(root: &Path, rules: IgnoreRules) -> Self {
        let inner = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();

        Self {
            root: root.to_path_buf(),
            inner,
            rules,
        }
    }

    fn file_ref(&self, entry: &DirEntry) -> Option<LocalFileRef> {
        let relative = entry.path().strip_prefix(&self.root).ok()?.to_path_buf();

        Some(LocalFileRef {
            path: entry.path().to_path_buf(),
            relative,
        })
    }

    fn walk_error(&self, err: walkdir::Error) -> SyncError {
        let path = err
            .path()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());

        SyncError::LocalWalk {
            path,
            source: err.into(),
        }
    }
}

impl Iterator for LocalWalker {
    type Item = Result<LocalFileRef, SyncError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.inner.next()? {
                Ok(entry) => entry,
                Err(err) => return Some(Err(self.walk_error(err))),
            };

            let file_type = entry.file_type();

            if entry.depth() > 0 && self.rules.excludes(entry.path(), file_type.is_dir()) {
                debug!("excluded {}", entry.path().display());
                if file_type.is_dir() {
                    self.inner.skip_current_dir();
                }
                continue;
            }

            if file_type.is_dir() {
                continue;
            }

            if file_type.is_symlink() {
                // A link counts as whatever it points at; links to directories are not descended into.
                match entry.path().metadata() {
                    Ok(meta) if meta.is_file() => {}
                    Ok(_) => {
                        debug!("skipping non-file link {}", entry.path().display());
                        continue;
                    }
                    Err(err) => {
                        return Some(Err(SyncError::LocalWalk {
                            path: entry.path().to_path_buf(),
                            source: err,
                        }));
                    }
                }
            } else if !file_type.is_file() {
                debug!("skipping special file {}", entry.path().display());
                continue;
            }

            match self.file_ref(&entry) {
                Some(file) => return Some(Ok(file)),
                None => continue,
            }
        }
    }
}

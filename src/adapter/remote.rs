use std::{fmt::Display, io::Read};

use thiserror::Error;

/// What a single line of a remote directory listing turned out to be.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    /// Symlinks and anything the protocol could not classify.
    Other,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    pub kind: EntryKind,
}

impl RemoteEntry {
    pub fn new(name: impl Into<String>, kind: EntryKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn is_pseudo(&self) -> bool {
        self.name == "." || self.name == ".."
    }
}

/// Protocol failures, reduced to the handful of outcomes the sync logic cares about.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemoteErrorKind {
    AlreadyExists,
    NotFound,
    PermissionDenied,
    Other,
}

impl Display for RemoteErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            RemoteErrorKind::AlreadyExists => "already exists",
            RemoteErrorKind::NotFound => "not found",
            RemoteErrorKind::PermissionDenied => "permission denied",
            RemoteErrorKind::Other => "remote error",
        };

        f.write_str(text)
    }
}

#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct RemoteError {
    kind: RemoteErrorKind,
    message: String,
}

impl RemoteError {
    pub fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Other, message)
    }

    pub fn kind(&self) -> RemoteErrorKind {
        self.kind
    }
}

impl From<std::io::Error> for RemoteError {
    fn from(err: std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::NotFound => RemoteErrorKind::NotFound,
            std::io::ErrorKind::PermissionDenied => RemoteErrorKind::PermissionDenied,
            std::io::ErrorKind::AlreadyExists => RemoteErrorKind::AlreadyExists,
            _ => RemoteErrorKind::Other,
        };

        Self::new(kind, err.to_string())
    }
}

/// One logged-in file-transfer session.
///
/// The session owns exactly one current-directory cursor. Calls are blocking
/// and must never overlap.
pub trait RemoteClient {
    /// The directory the session was placed in after login.
    fn working_dir(&mut self) -> Result<String, RemoteError>;

    /// Moves the cursor to `path`. Callers pass absolute paths.
    fn change_dir(&mut self, path: &str) -> Result<(), RemoteError>;

    /// Lists the directory under the cursor.
    fn list_current(&mut self) -> Result<Vec<RemoteEntry>, RemoteError>;

    /// Creates one directory. The parent has to exist already.
    fn make_dir(&mut self, path: &str) -> Result<(), RemoteError>;

    /// Streams `reader` into the file at `path`, returning the bytes written.
    fn store(&mut self, path: &str, reader: &mut dyn Read) -> Result<u64, RemoteError>;

    fn quit(&mut self) -> Result<(), RemoteError>;
}

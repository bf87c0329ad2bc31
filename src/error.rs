use std::{io, path::PathBuf};

use thiserror::Error;

use crate::adapter::remote::RemoteError;

/// Every way a sync run can fail. All of them are fatal.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("failed to connect to {address}")]
    Connection {
        address: String,
        #[source]
        source: RemoteError,
    },

    #[error("failed to scan remote directory {path}")]
    RemoteScan {
        path: String,
        #[source]
        source: RemoteError,
    },

    #[error("failed to walk local directory {}", path.display())]
    LocalWalk {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to create remote directory {path}")]
    DirectoryCreate {
        path: String,
        #[source]
        source: RemoteError,
    },

    #[error("failed to transfer {} to {remote}", local.display())]
    Transfer {
        local: PathBuf,
        remote: String,
        #[source]
        source: TransferFailure,
    },

    #[error("cannot map {} under {}: {reason}", path.display(), root.display())]
    PathResolution {
        path: PathBuf,
        root: PathBuf,
        reason: &'static str,
    },

    #[error("failed to write output")]
    Output(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum TransferFailure {
    #[error("could not open local file")]
    Open(#[source] io::Error),

    #[error("remote store failed")]
    Store(#[source] RemoteError),
}

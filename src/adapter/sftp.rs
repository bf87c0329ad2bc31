use std::{
    fs::File,
    io::{self, BufReader, Read},
    net::TcpStream,
    path::{Path, PathBuf},
    time::Duration,
};

use ssh2::{ErrorCode, MethodType, Session, Sftp};
use ssh2_config::{HostParams, ParseRule, SshConfig};
use tracing::{debug, info};

use super::{
    remote::{EntryKind, RemoteClient, RemoteEntry, RemoteError, RemoteErrorKind},
    resolve,
};
use crate::check;

pub const DEFAULT_PORT: u16 = 22;

// SSH_FX_* status codes from the SFTP draft.
const FX_FAILURE: i32 = 4;
const FX_NO_SUCH_FILE: i32 = 2;
const FX_PERMISSION_DENIED: i32 = 3;
const FX_NO_SUCH_PATH: i32 = 10;
const FX_FILE_ALREADY_EXISTS: i32 = 11;

/// Reads the `~/.ssh/config` entry for `hostname`, if the file exists.
pub fn host_params(hostname: &str) -> anyhow::Result<HostParams> {
    let Some(home) = std::env::var_os("HOME") else {
        return Ok(SshConfig::default().query(hostname));
    };
    let path = PathBuf::from(home).join(".ssh").join("config");

    if !path.exists() {
        return Ok(SshConfig::default().query(hostname));
    }

    let mut reader = BufReader::new(File::open(&path)?);
    let config = SshConfig::default().parse(&mut reader, ParseRule::ALLOW_UNKNOWN_FIELDS)?;

    Ok(config.query(hostname))
}

/// An SFTP subsystem channel on a password-authenticated SSH session.
///
/// SFTP has no server-side working directory, so the cursor required by
/// [`RemoteClient`] is tracked here.
pub struct SftpClient {
    session: Session,
    sftp: Sftp,
    cwd: PathBuf,
}

impl SftpClient {
    pub fn connect(
        address: &str,
        timeout: Duration,
        params: &HostParams,
        user: &str,
        password: &str,
    ) -> Result<Self, RemoteError> {
        let stream = try_connection(address, timeout)?;
        info!(
            "connected to {}",
            stream
                .peer_addr()
                .map(|addr| addr.to_string())
                .unwrap_or_else(|_| address.to_string())
        );

        let mut session = Session::new().map_err(classify)?;
        if let Some(compress) = params.compression {
            session.set_compress(compress);
        }
        if let (Some(true), Some(interval)) = (params.tcp_keep_alive, params.server_alive_interval)
        {
            session.set_keepalive(true, interval.as_secs() as u32);
        }

        // Algorithm lists from ~/.ssh/config; the libssh2 defaults stay for anything unset.
        let preferences = [
            ("key exchange", MethodType::Kex, &params.kex_algorithms),
            ("host key", MethodType::HostKey, &params.host_key_algorithms),
            ("cipher (client to server)", MethodType::CryptCs, &params.ciphers),
            ("cipher (server to client)", MethodType::CryptSc, &params.ciphers),
            ("MAC (client to server)", MethodType::MacCs, &params.mac),
            ("MAC (server to client)", MethodType::MacSc, &params.mac),
        ];
        for (label, method, algorithms) in preferences {
            if let Some(algorithms) = algorithms {
                let applied = session.method_pref(method, &algorithms.join(","));
                check!(
                    applied.is_ok(),
                    "ignoring {} preference {:?}: {:?}",
                    label,
                    algorithms,
                    applied.err()
                );
            }
        }

        session.set_tcp_stream(stream);
        session.handshake().map_err(classify)?;

        session.userauth_password(user, password).map_err(|err| {
            RemoteError::new(
                RemoteErrorKind::PermissionDenied,
                format!("authentication as {user} failed: {err}"),
            )
        })?;

        if let Some(banner) = session.banner() {
            debug!("server banner: {banner}");
        }

        let sftp = session.sftp().map_err(classify)?;
        let cwd = sftp.realpath(Path::new(".")).map_err(classify)?;

        Ok(Self { session, sftp, cwd })
    }
}

fn try_connection(address: &str, timeout: Duration) -> Result<TcpStream, RemoteError> {
    let mut last_error: Option<RemoteError> = None;

    for addr in resolve(address)? {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(err) => {
                debug!("could not reach {addr}: {err}");
                last_error = Some(err.into());
            }
        }
    }

    Err(last_error
        .unwrap_or_else(|| RemoteError::other(format!("{address} did not resolve to any address"))))
}

impl RemoteClient for SftpClient {
    fn working_dir(&mut self) -> Result<String, RemoteError> {
        Ok(self.cwd.to_string_lossy().into_owned())
    }

    fn change_dir(&mut self, path: &str) -> Result<(), RemoteError> {
        let target = self.cwd.join(path);
        let stat = self.sftp.stat(&target).map_err(classify)?;

        if !stat.is_dir() {
            return Err(RemoteError::new(
                RemoteErrorKind::NotFound,
                format!("{path} is not a directory"),
            ));
        }

        self.cwd = target;
        Ok(())
    }

    fn list_current(&mut self) -> Result<Vec<RemoteEntry>, RemoteError> {
        let entries = self.sftp.readdir(&self.cwd).map_err(classify)?;

        Ok(entries
            .into_iter()
            .filter_map(|(path, stat)| {
                let name = path.file_name()?.to_string_lossy().into_owned();
                let file_type = stat.file_type();
                let kind = if file_type.is_dir() {
                    EntryKind::Directory
                } else if file_type.is_file() {
                    EntryKind::File
                } else {
                    EntryKind::Other
                };

                Some(RemoteEntry::new(name, kind))
            })
            .collect())
    }

    fn make_dir(&mut self, path: &str) -> Result<(), RemoteError> {
        let target = self.cwd.join(path);

        match self.sftp.mkdir(&target, 0o755) {
            Ok(()) => Ok(()),
            // OpenSSH answers a plain failure when the directory is already there.
            Err(err) if sftp_status(&err) == Some(FX_FAILURE) => {
                match self.sftp.stat(&target) {
                    Ok(stat) if stat.is_dir() => Err(RemoteError::new(
                        RemoteErrorKind::AlreadyExists,
                        format!("{path}: {err}"),
                    )),
                    _ => Err(classify(err)),
                }
            }
            Err(err) => Err(classify(err)),
        }
    }

    fn store(&mut self, path: &str, reader: &mut dyn Read) -> Result<u64, RemoteError> {
        let mut file = self.sftp.create(&self.cwd.join(path)).map_err(classify)?;
        let written = io::copy(reader, &mut file)?;

        Ok(written)
    }

    fn quit(&mut self) -> Result<(), RemoteError> {
        self.session
            .disconnect(None, "sync finished", None)
            .map_err(classify)
    }
}

fn sftp_status(err: &ssh2::Error) -> Option<i32> {
    match err.code() {
        ErrorCode::SFTP(code) => Some(code),
        ErrorCode::Session(_) => None,
    }
}

fn classify(err: ssh2::Error) -> RemoteError {
    let kind = sftp_status(&err)
        .map(classify_status)
        .unwrap_or(RemoteErrorKind::Other);

    RemoteError::new(kind, err.message())
}

fn classify_status(code: i32) -> RemoteErrorKind {
    match code {
        FX_NO_SUCH_FILE | FX_NO_SUCH_PATH => RemoteErrorKind::NotFound,
        FX_PERMISSION_DENIED => RemoteErrorKind::PermissionDenied,
        FX_FILE_ALREADY_EXISTS => RemoteErrorKind::AlreadyExists,
        _ => RemoteErrorKind::Other,
    }
}

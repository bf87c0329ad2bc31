pub mod fs;
pub mod ftp;
#[cfg(test)]
pub mod memory;
pub mod remote;
pub mod sftp;

use std::net::{SocketAddr, ToSocketAddrs};

use anyhow::{Context, Result};
use tracing::info;

use self::{
    ftp::FtpClient,
    remote::{RemoteClient, RemoteError},
    sftp::SftpClient,
};
use crate::{
    config::{Protocol, SyncSettings},
    error::SyncError,
    util::read_from_stdin,
};

/// Opens a logged-in session for the configured protocol.
pub fn connect(settings: &SyncSettings) -> Result<Box<dyn RemoteClient>> {
    let (hostname, port) = split_host_port(&settings.host);

    let client: Box<dyn RemoteClient> = match settings.protocol {
        Protocol::Ftp => {
            let address = with_port(hostname, port.unwrap_or(ftp::DEFAULT_PORT));
            let user = settings.user.as_deref().unwrap_or("anonymous");
            let password = password(settings, user)?;

            info!("connecting to ftp://{user}@{address}");
            let client = FtpClient::connect(&address, settings.timeout, user, &password)
                .map_err(|source| SyncError::Connection { address, source })?;
            Box::new(client)
        }
        Protocol::Sftp => {
            let params = sftp::host_params(hostname)
                .context("failed to read the ssh client configuration")?;
            let hostname = params.host_name.as_deref().unwrap_or(hostname);
            let address = with_port(
                hostname,
                port.or(params.port).unwrap_or(sftp::DEFAULT_PORT),
            );

            let user = match settings.user.clone().or_else(|| params.user.clone()) {
                Some(user) => user,
                None => read_from_stdin(false, "Username: ")?,
            };
            let password = password(settings, &user)?;

            info!("connecting to sftp://{user}@{address}");
            let client = SftpClient::connect(&address, settings.timeout, &params, &user, &password)
                .map_err(|source| SyncError::Connection { address, source })?;
            Box::new(client)
        }
    };

    Ok(client)
}

/// FTP falls back to an empty password; SFTP prompts when none was given.
fn password(settings: &SyncSettings, user: &str) -> Result<String> {
    let prompt = settings.ask_password
        || (settings.password.is_none() && settings.protocol == Protocol::Sftp);

    if prompt {
        return read_from_stdin(true, &format!("[{}] Password: ", user))
            .context("failed to read the password");
    }

    Ok(settings.password.clone().unwrap_or_default())
}

/// Splits `host:port`; bracketed IPv6 literals are understood.
pub fn split_host_port(host: &str) -> (&str, Option<u16>) {
    if let Some(rest) = host.strip_prefix('[') {
        if let Some((addr, tail)) = rest.split_once(']') {
            let port = tail.strip_prefix(':').and_then(|port| port.parse().ok());
            return (addr, port);
        }
    }

    match host.rsplit_once(':') {
        Some((name, port)) if !name.contains(':') => match port.parse() {
            Ok(port) => (name, Some(port)),
            Err(_) => (host, None),
        },
        _ => (host, None),
    }
}

fn with_port(hostname: &str, port: u16) -> String {
    if hostname.contains(':') {
        format!("[{hostname}]:{port}")
    } else {
        format!("{hostname}:{port}")
    }
}

fn resolve(address: &str) -> Result<Vec<SocketAddr>, RemoteError> {
    Ok(address.to_socket_addrs()?.collect())
}

use std::{io::Read, time::Duration};

use suppaftp::{
    list::File as ListedFile,
    types::{Features, FileType},
    FtpError, FtpStream,
};
use tracing::{debug, warn};

use super::{
    remote::{EntryKind, RemoteClient, RemoteEntry, RemoteError, RemoteErrorKind},
    resolve,
};

pub const DEFAULT_PORT: u16 = 21;

/// How a directory is listed. Plain `LIST` hides dot files on common
/// servers, so it is the last resort.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Listing {
    Mlsd,
    ListAll,
    List,
}

impl Listing {
    fn for_features(features: &Features) -> Self {
        if features.keys().any(|name| name.eq_ignore_ascii_case("MLST")) {
            Listing::Mlsd
        } else {
            Listing::ListAll
        }
    }
}

/// A logged-in FTP control connection in binary transfer mode.
pub struct FtpClient {
    stream: FtpStream,
    listing: Listing,
}

impl FtpClient {
    pub fn connect(
        address: &str,
        timeout: Duration,
        user: &str,
        password: &str,
    ) -> Result<Self, RemoteError> {
        let mut stream = try_connection(address, timeout)?;

        if let Some(welcome) = stream.get_welcome_msg() {
            debug!("server says: {}", welcome.trim_end());
        }

        let ready = stream
            .login(user, password)
            .and_then(|()| stream.transfer_type(FileType::Binary));
        if let Err(err) = ready {
            let _ = stream.quit();
            return Err(classify(err));
        }

        let listing = match stream.feat() {
            Ok(features) => Listing::for_features(&features),
            Err(err) => {
                debug!("FEAT failed, falling back to LIST: {err}");
                Listing::ListAll
            }
        };
        debug!("listing directories with {listing:?}");

        Ok(Self { stream, listing })
    }

    fn list_lines(&mut self) -> Result<Vec<RemoteEntry>, RemoteError> {
        match self.listing {
            Listing::Mlsd => {
                let lines = self.stream.mlsd(None).map_err(classify)?;
                Ok(parse_lines(&lines, parse_mlsd_line))
            }
            Listing::ListAll => match self.stream.list(Some("-a")) {
                // `ls -a` style output always carries `.`; without it the
                // server took `-a` for a path name.
                Ok(lines) => {
                    let entries = parse_lines(&lines, parse_list_line);
                    if entries.iter().any(|entry| entry.name == ".") {
                        return Ok(entries);
                    }
                    self.downgrade_listing();
                    self.list_lines()
                }
                Err(err) => {
                    debug!("LIST -a rejected: {err}");
                    self.downgrade_listing();
                    self.list_lines()
                }
            },
            Listing::List => {
                let lines = self.stream.list(None).map_err(classify)?;
                Ok(parse_lines(&lines, parse_list_line))
            }
        }
    }

    fn downgrade_listing(&mut self) {
        warn!("server does not support LIST -a; dot files may be uploaded again");
        self.listing = Listing::List;
    }
}

fn try_connection(address: &str, timeout: Duration) -> Result<FtpStream, RemoteError> {
    let mut last_error = None;

    for addr in resolve(address)? {
        match FtpStream::connect_timeout(addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(err) => {
                debug!("could not reach {addr}: {err}");
                last_error = Some(classify(err));
            }
        }
    }

    Err(last_error
        .unwrap_or_else(|| RemoteError::other(format!("{address} did not resolve to any address"))))
}

impl RemoteClient for FtpClient {
    fn working_dir(&mut self) -> Result<String, RemoteError> {
        self.stream.pwd().map_err(classify)
    }

    fn change_dir(&mut self, path: &str) -> Result<(), RemoteError> {
        self.stream.cwd(path).map_err(classify)
    }

    fn list_current(&mut self) -> Result<Vec<RemoteEntry>, RemoteError> {
        self.list_lines()
    }

    fn make_dir(&mut self, path: &str) -> Result<(), RemoteError> {
        self.stream.mkdir(path).map_err(classify)
    }

    fn store(&mut self, path: &str, mut reader: &mut dyn Read) -> Result<u64, RemoteError> {
        self.stream.put_file(path, &mut reader).map_err(classify)
    }

    fn quit(&mut self) -> Result<(), RemoteError> {
        self.stream.quit().map_err(classify)
    }
}

fn parse_lines(lines: &[String], parse: fn(&str) -> Option<RemoteEntry>) -> Vec<RemoteEntry> {
    lines
        .iter()
        .filter_map(|line| {
            let entry = parse(line);
            if entry.is_none() && !line.trim().is_empty() {
                warn!("could not parse listing line {line:?}");
            }
            entry
        })
        .collect()
}

/// Parses one `LIST` line (POSIX or DOS style).
fn parse_list_line(line: &str) -> Option<RemoteEntry> {
    let file = line.parse::<ListedFile>().ok()?;
    Some(RemoteEntry::new(file.name(), entry_kind(&file)))
}

/// Parses one `MLSD` fact line, e.g. `type=file;size=12; .htaccess`.
fn parse_mlsd_line(line: &str) -> Option<RemoteEntry> {
    let facts = line.split_once(' ').map_or(line, |(facts, _)| facts);
    let entry_type = facts.split(';').find_map(|fact| {
        let (name, value) = fact.split_once('=')?;
        name.eq_ignore_ascii_case("type").then(|| value.to_ascii_lowercase())
    });

    match entry_type.as_deref() {
        Some("cdir") => return Some(RemoteEntry::new(".", EntryKind::Directory)),
        Some("pdir") => return Some(RemoteEntry::new("..", EntryKind::Directory)),
        _ => {}
    }

    let file = ListedFile::from_mlsx_line(line).ok()?;
    Some(RemoteEntry::new(file.name(), entry_kind(&file)))
}

fn entry_kind(file: &ListedFile) -> EntryKind {
    if file.is_symlink() {
        EntryKind::Other
    } else if file.is_directory() {
        EntryKind::Directory
    } else if file.is_file() {
        EntryKind::File
    } else {
        EntryKind::Other
    }
}

fn classify(err: FtpError) -> RemoteError {
    match err {
        FtpError::ConnectionError(err) => err.into(),
        FtpError::UnexpectedResponse(response) => {
            let text = String::from_utf8_lossy(&response.body);
            let text = text.trim_end();

            RemoteError::new(classify_reply(response.status.code(), text), text)
        }
        other => RemoteError::other(other.to_string()),
    }
}

/// Maps an FTP reply to an error kind. Servers disagree on codes for the same
/// condition, so the reply text is consulted for the ambiguous ones.
fn classify_reply(code: u32, text: &str) -> RemoteErrorKind {
    let text = text.to_ascii_lowercase();
    let mentions = |needles: &[&str]| needles.iter().any(|needle| text.contains(needle));

    match code {
        521 => RemoteErrorKind::AlreadyExists,
        530 | 532 => RemoteErrorKind::PermissionDenied,
        450 | 550 | 553 if mentions(&["permission", "denied", "not allowed"]) => {
            RemoteErrorKind::PermissionDenied
        }
        450 | 550 | 553 if mentions(&["no such", "not exist", "not found"]) => {
            RemoteErrorKind::NotFound
        }
        550 | 553 if mentions(&["exist"]) => RemoteErrorKind::AlreadyExists,
        550 => RemoteErrorKind::NotFound,
        _ => RemoteErrorKind::Other,
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::{BufRead, BufReader, Write},
        net::TcpListener,
        thread,
    };

    use super::*;

    #[test]
    fn already_exists_replies() {
        assert_eq!(
            classify_reply(550, "550 Already exists"),
            RemoteErrorKind::AlreadyExists
        );
        assert_eq!(
            classify_reply(550, "550 /www/sub: File exists"),
            RemoteErrorKind::AlreadyExists
        );
        assert_eq!(
            classify_reply(521, "521 \"/www/sub\" directory already exists"),
            RemoteErrorKind::AlreadyExists
        );
    }

    #[test]
    fn missing_and_forbidden_replies() {
        assert_eq!(
            classify_reply(550, "550 /www/nope: No such file or directory"),
            RemoteErrorKind::NotFound
        );
        assert_eq!(
            classify_reply(550, "550 Directory does not exist"),
            RemoteErrorKind::NotFound
        );
        assert_eq!(
            classify_reply(550, "550 Permission denied"),
            RemoteErrorKind::PermissionDenied
        );
        assert_eq!(
            classify_reply(530, "530 Login incorrect."),
            RemoteErrorKind::PermissionDenied
        );
        assert_eq!(
            classify_reply(550, "550 Requested action not taken"),
            RemoteErrorKind::NotFound
        );
        assert_eq!(
            classify_reply(425, "425 Can't open data connection"),
            RemoteErrorKind::Other
        );
    }

    #[test]
    fn posix_listing_lines() {
        assert_eq!(
            parse_list_line("drwxr-xr-x 2 ftp ftp 4096 Jan 01 12:00 assets"),
            Some(RemoteEntry::new("assets", EntryKind::Directory))
        );
        assert_eq!(
            parse_list_line("-rw-r--r-- 1 ftp ftp 1024 Mar 15 2021 index.html"),
            Some(RemoteEntry::new("index.html", EntryKind::File))
        );
        assert_eq!(
            parse_list_line("lrwxrwxrwx 1 ftp ftp 9 Jan 01 12:00 current -> release-2"),
            Some(RemoteEntry::new("current", EntryKind::Other))
        );
    }

    #[test]
    fn garbage_listing_line_is_skipped() {
        assert_eq!(parse_list_line("total 12"), None);
    }

    #[test]
    fn mlsd_lines_keep_dot_files() {
        let lines: Vec<String> = [
            "type=cdir;modify=20240101120000;perm=flcdmpe; .",
            "type=pdir;modify=20240101120000;perm=flcdmpe; ..",
            "type=file;size=118;modify=20240101120000;perm=adfrw; .htaccess",
            "type=dir;modify=20240101120000;perm=flcdmpe; .well-known",
            "type=file;size=5;modify=20240101120000;perm=adfrw; index.html",
            "type=OS.unix=slink:/srv;modify=20240101120000; current",
        ]
        .iter()
        .map(|line| line.to_string())
        .collect();

        let entries = parse_lines(&lines, parse_mlsd_line);

        assert_eq!(
            entries,
            vec![
                RemoteEntry::new(".", EntryKind::Directory),
                RemoteEntry::new("..", EntryKind::Directory),
                RemoteEntry::new(".htaccess", EntryKind::File),
                RemoteEntry::new(".well-known", EntryKind::Directory),
                RemoteEntry::new("index.html", EntryKind::File),
            ]
        );
    }

    #[test]
    fn listing_mode_follows_feat() {
        let mut features = Features::new();
        features.insert("SIZE".to_owned(), None);
        assert_eq!(Listing::for_features(&features), Listing::ListAll);

        features.insert(
            "MLST".to_owned(),
            Some("type*;size*;modify*;".to_owned()),
        );
        assert_eq!(Listing::for_features(&features), Listing::Mlsd);
    }

    #[test]
    fn rejected_login_still_quits() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();

        let server = thread::spawn(move || {
            let (socket, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(socket.try_clone().unwrap());
            let mut writer = socket;
            writer.write_all(b"220 ready\r\n").unwrap();

            let mut commands = Vec::new();
            let mut line = String::new();
            while reader.read_line(&mut line).unwrap() > 0 {
                let command = line.trim_end().to_owned();
                line.clear();

                let reply: &[u8] = match command.split(' ').next().unwrap_or_default() {
                    "USER" => b"331 Password required\r\n",
                    "PASS" => b"530 Login incorrect.\r\n",
                    "QUIT" => b"221 Goodbye.\r\n",
                    _ => b"502 Command not implemented.\r\n",
                };
                writer.write_all(reply).unwrap();

                let done = command == "QUIT";
                commands.push(command);
                if done {
                    break;
                }
            }
            commands
        });

        match FtpClient::connect(&address, Duration::from_secs(5), "deploy", "wrong") {
            Ok(_) => panic!("login should have been refused"),
            Err(err) => assert_eq!(err.kind(), RemoteErrorKind::PermissionDenied),
        }
        assert_eq!(
            server.join().unwrap(),
            vec!["USER deploy", "PASS wrong", "QUIT"]
        );
    }
}

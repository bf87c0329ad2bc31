//! In-memory stand-in for a remote server, used by the sync tests.

use std::{
    collections::{BTreeMap, BTreeSet, HashSet},
    io::Read,
};

use super::remote::{EntryKind, RemoteClient, RemoteEntry, RemoteError, RemoteErrorKind};

/// Every protocol call the fake received, in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Op {
    Cwd(String),
    List(String),
    Mkdir(String),
    Store(String),
    Quit,
}

/// A remote filesystem with a single current-directory cursor.
///
/// Paths are absolute and `/` separated. Directories are stored without a
/// trailing separator (except `/`).
pub struct MemoryRemote {
    cwd: String,
    home: String,
    dirs: BTreeSet<String>,
    files: BTreeMap<String, Vec<u8>>,
    links: BTreeSet<String>,
    fail_list: HashSet<String>,
    fail_mkdir: HashSet<String>,
    always_exists: bool,
    vague_exists: bool,
    pub ops: Vec<Op>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self {
            cwd: "/".to_owned(),
            home: "/".to_owned(),
            dirs: BTreeSet::from(["/".to_owned()]),
            files: BTreeMap::new(),
            links: BTreeSet::new(),
            fail_list: HashSet::new(),
            fail_mkdir: HashSet::new(),
            always_exists: false,
            vague_exists: false,
            ops: Vec::new(),
        }
    }

    pub fn with_home(mut self, home: &str) -> Self {
        self.add_dir(home);
        self.home = home.to_owned();
        self.cwd = home.to_owned();
        self
    }

    /// Adds a directory and all of its ancestors.
    pub fn add_dir(&mut self, path: &str) {
        let mut current = String::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current.push('/');
            current.push_str(segment);
            self.dirs.insert(current.clone());
        }
    }

    pub fn add_file(&mut self, path: &str, content: &[u8]) {
        if let Some((parent, _)) = path.rsplit_once('/') {
            self.add_dir(parent);
        }
        self.files.insert(path.to_owned(), content.to_vec());
    }

    /// Lists `path` as a link. If it is also a directory it stays enterable,
    /// like a symlink to a directory.
    pub fn add_link(&mut self, path: &str) {
        self.links.insert(path.to_owned());
    }

    /// Listing this directory fails with a permission error.
    pub fn fail_listing(&mut self, dir: &str) {
        self.fail_list.insert(dir.to_owned());
    }

    /// Creating this directory fails with a permission error.
    pub fn fail_mkdir(&mut self, dir: &str) {
        self.fail_mkdir.insert(dir.to_owned());
    }

    /// Every `make_dir` answers "already exists", even for new directories,
    /// and then creates it anyway. Mimics a racing second client.
    pub fn mkdir_always_reports_existing(&mut self) {
        self.always_exists = true;
    }

    /// `make_dir` on an existing directory fails without saying why, the
    /// way vsftpd answers `550 Create directory operation failed.`
    pub fn mkdir_fails_vaguely_on_existing(&mut self) {
        self.vague_exists = true;
    }

    pub fn file(&self, path: &str) -> Option<&[u8]> {
        self.files.get(path).map(Vec::as_slice)
    }

    pub fn file_paths(&self) -> Vec<&str> {
        self.files.keys().map(String::as_str).collect()
    }

    pub fn has_dir(&self, path: &str) -> bool {
        self.dirs.contains(path)
    }

    pub fn stores(&self) -> Vec<&str> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                Op::Store(path) => Some(path.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn mkdirs(&self) -> Vec<&str> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                Op::Mkdir(path) => Some(path.as_str()),
                _ => None,
            })
            .collect()
    }

    fn resolve(&self, path: &str) -> String {
        let joined = if path.starts_with('/') {
            path.to_owned()
        } else {
            format!("{}/{}", self.cwd, path)
        };

        let mut segments: Vec<&str> = Vec::new();
        for segment in joined.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    segments.pop();
                }
                segment => segments.push(segment),
            }
        }

        format!("/{}", segments.join("/"))
    }

    fn parent_of(path: &str) -> String {
        match path.rsplit_once('/') {
            Some(("", _)) | None => "/".to_owned(),
            Some((parent, _)) => parent.to_owned(),
        }
    }

    fn name_in<'a>(dir: &str, path: &'a str) -> Option<&'a str> {
        let rest = if dir == "/" {
            path.strip_prefix('/')?
        } else {
            path.strip_prefix(dir)?.strip_prefix('/')?
        };

        (!rest.is_empty() && !rest.contains('/')).then_some(rest)
    }
}

impl RemoteClient for MemoryRemote {
    fn working_dir(&mut self) -> Result<String, RemoteError> {
        Ok(self.home.clone())
    }

    fn change_dir(&mut self, path: &str) -> Result<(), RemoteError> {
        self.ops.push(Op::Cwd(path.to_owned()));
        let target = self.resolve(path);

        if !self.dirs.contains(&target) {
            return Err(RemoteError::new(
                RemoteErrorKind::NotFound,
                format!("550 {path}: No such directory"),
            ));
        }

        self.cwd = target;
        Ok(())
    }

    fn list_current(&mut self) -> Result<Vec<RemoteEntry>, RemoteError> {
        let cwd = self.cwd.clone();
        self.ops.push(Op::List(cwd.clone()));

        if self.fail_list.contains(&cwd) {
            return Err(RemoteError::new(
                RemoteErrorKind::PermissionDenied,
                format!("550 {cwd}: Permission denied"),
            ));
        }

        let mut entries = vec![
            RemoteEntry::new(".", EntryKind::Directory),
            RemoteEntry::new("..", EntryKind::Directory),
        ];
        let dirs = self
            .dirs
            .iter()
            .filter(|dir| !self.links.contains(*dir))
            .filter_map(|dir| Self::name_in(&cwd, dir))
            .map(|name| RemoteEntry::new(name, EntryKind::Directory));
        let files = self
            .files
            .keys()
            .filter_map(|file| Self::name_in(&cwd, file))
            .map(|name| RemoteEntry::new(name, EntryKind::File));
        let links = self
            .links
            .iter()
            .filter_map(|link| Self::name_in(&cwd, link))
            .map(|name| RemoteEntry::new(name, EntryKind::Other));

        entries.extend(dirs.chain(files).chain(links));
        Ok(entries)
    }

    fn make_dir(&mut self, path: &str) -> Result<(), RemoteError> {
        self.ops.push(Op::Mkdir(path.to_owned()));
        let target = self.resolve(path);

        if self.fail_mkdir.contains(&target) {
            return Err(RemoteError::new(
                RemoteErrorKind::PermissionDenied,
                format!("550 {path}: Permission denied"),
            ));
        }
        if self.always_exists {
            self.add_dir(&target);
            return Err(RemoteError::new(
                RemoteErrorKind::AlreadyExists,
                "550 Already exists",
            ));
        }
        if self.dirs.contains(&target) && self.vague_exists {
            return Err(RemoteError::new(
                RemoteErrorKind::NotFound,
                "550 Create directory operation failed.",
            ));
        }
        if self.dirs.contains(&target) {
            return Err(RemoteError::new(
                RemoteErrorKind::AlreadyExists,
                "550 Already exists",
            ));
        }
        if !self.dirs.contains(&Self::parent_of(&target)) {
            return Err(RemoteError::new(
                RemoteErrorKind::NotFound,
                format!("550 {path}: No such file or directory"),
            ));
        }

        self.dirs.insert(target);
        Ok(())
    }

    fn store(&mut self, path: &str, reader: &mut dyn Read) -> Result<u64, RemoteError> {
        self.ops.push(Op::Store(path.to_owned()));
        let target = self.resolve(path);

        if !self.dirs.contains(&Self::parent_of(&target)) {
            return Err(RemoteError::new(
                RemoteErrorKind::NotFound,
                format!("553 {path}: No such directory"),
            ));
        }

        let mut content = Vec::new();
        reader.read_to_end(&mut content)?;
        let written = content.len() as u64;
        self.files.insert(target, content);

        Ok(written)
    }

    fn quit(&mut self) -> Result<(), RemoteError> {
        self.ops.push(Op::Quit);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_resolves_relative_paths() {
        let mut remote = MemoryRemote::new();
        remote.add_file("/a/b/c.txt", b"c");

        remote.change_dir("/a").unwrap();
        remote.change_dir("b").unwrap();
        let names: Vec<_> = remote
            .list_current()
            .unwrap()
            .into_iter()
            .map(|entry| entry.name)
            .collect();

        assert_eq!(names, vec![".", "..", "c.txt"]);
        assert_eq!(
            remote.change_dir("b").unwrap_err().kind(),
            RemoteErrorKind::NotFound
        );
    }
}

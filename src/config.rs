use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{bail, ensure, Context, Result};
use clap::{ArgAction, Parser, ValueEnum};
use serde::{Deserialize, Serialize};

pub const DEFAULT_TIMEOUT_SECS: u64 = 5;

/// Upload every local file that does not exist yet on the remote side.
#[derive(Debug, Parser)]
#[command(name = "ftpsync", version)]
pub struct Cli {
    /// Server address, `host` or `host:port`
    pub host: Option<String>,

    /// Local directory to upload from
    pub source: Option<PathBuf>,

    /// Remote directory to upload into
    pub dest: Option<String>,

    /// Login name [default: anonymous for FTP]
    #[arg(short, long)]
    pub user: Option<String>,

    /// Login password [default: empty for FTP]
    #[arg(short, long, env = "FTPSYNC_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Prompt for the password instead
    #[arg(long)]
    pub ask_password: bool,

    /// Transfer protocol [default: ftp]
    #[arg(long, value_enum)]
    pub protocol: Option<Protocol>,

    /// Connection timeout in seconds [default: 5]
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Gitignore-style pattern of local paths to leave out (repeatable)
    #[arg(long = "ignore", value_name = "PATTERN")]
    pub ignore: Vec<String>,

    /// YAML file providing any of the settings above
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Only show what would be uploaded
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// More logging on stderr (repeatable)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Log errors only
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    #[default]
    Ftp,
    Sftp,
}

pub fn read_config(path: &Path) -> Result<ConfigContext> {
    let file =
        File::open(path).with_context(|| format!("cannot open config file {}", path.display()))?;
    let reader = BufReader::new(file);

    Ok(ConfigContext {
        config: serde_yaml::from_reader(reader)
            .with_context(|| format!("invalid config file {}", path.display()))?,
        config_file: path.to_owned(),
    })
}

pub struct ConfigContext {
    pub config_file: PathBuf,
    pub config: FileConfig,
}

/// Settings that can live in the YAML config file. Everything is optional;
/// command-line values win.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub host: Option<String>,
    pub protocol: Option<Protocol>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub source: Option<PathBuf>,
    pub dest: Option<String>,
    pub timeout_secs: Option<u64>,
    /// Gitignore-style rules, one per line.
    pub ignore: Option<String>,
    #[serde(default)]
    pub dry_run: bool,
}

/// Everything one run needs, after merging the config file and the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    pub host: String,
    pub protocol: Protocol,
    pub user: Option<String>,
    pub password: Option<String>,
    pub ask_password: bool,
    pub source: PathBuf,
    pub dest: String,
    pub timeout: Duration,
    pub ignore: Vec<String>,
    pub ignore_origin: Option<PathBuf>,
    pub dry_run: bool,
}

impl SyncSettings {
    pub fn resolve(cli: &Cli) -> Result<Self> {
        let context = cli.config.as_deref().map(read_config).transpose()?;

        Self::merge(cli, context)
    }

    fn merge(cli: &Cli, context: Option<ConfigContext>) -> Result<Self> {
        let (file, config_file) = match context {
            Some(ctx) => (ctx.config, Some(ctx.config_file)),
            None => (FileConfig::default(), None),
        };
        let config_dir = config_file
            .as_deref()
            .and_then(Path::parent)
            .map(Path::to_path_buf);

        let Some(host) = cli.host.clone().or(file.host) else {
            bail!("missing server address: pass <HOST> or set `host` in the config file");
        };

        let source = match (&cli.source, file.source) {
            (Some(source), _) => source.clone(),
            // Config file paths are relative to the file itself.
            (None, Some(source)) => match &config_dir {
                Some(dir) if source.is_relative() => dir.join(source),
                _ => source,
            },
            (None, None) => {
                bail!("missing source directory: pass <SOURCE> or set `source` in the config file")
            }
        };

        let Some(dest) = cli.dest.clone().or(file.dest) else {
            bail!("missing destination: pass <DEST> or set `dest` in the config file");
        };
        ensure!(!dest.trim().is_empty(), "destination must not be empty");

        let timeout_secs = cli
            .timeout
            .or(file.timeout_secs)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        ensure!(timeout_secs > 0, "timeout must be at least one second");

        let mut ignore: Vec<String> = file
            .ignore
            .as_deref()
            .unwrap_or_default()
            .lines()
            .map(str::to_owned)
            .collect();
        ignore.extend(cli.ignore.iter().cloned());

        Ok(Self {
            host,
            protocol: cli.protocol.or(file.protocol).unwrap_or_default(),
            user: cli.user.clone().or(file.user),
            password: cli.password.clone().or(file.password),
            ask_password: cli.ask_password,
            source,
            dest,
            timeout: Duration::from_secs(timeout_secs),
            ignore,
            ignore_origin: config_file,
            dry_run: cli.dry_run || file.dry_run,
        })
    }
}

//! Validated run configuration built once from the command line.
//!
//! Everything that can be checked without touching the network is checked
//! here, so a bad invocation fails before any connection is attempted.

use crate::cli::{Command, SendSource};
use crate::error::{Error, Result};
use crate::limit::Limit;
use crate::progress::Output;
use std::fs;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};

pub const DEFAULT_SAVE_DIR: &str = "folan_dest";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSpec {
    Files(Vec<PathBuf>),
    Dir(PathBuf),
    Archive(PathBuf),
}

#[derive(Debug, Clone)]
pub struct SenderConfig {
    pub addr: SocketAddr,
    pub source: SourceSpec,
    pub recursive: bool,
    pub stay_alive: bool,
    pub limit: Option<Limit>,
    pub output: Output,
}

#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    pub bind: String,
    pub save_dir: PathBuf,
    pub recursive: bool,
    pub stay_alive: bool,
    pub limit: Option<Limit>,
    pub extract: bool,
    pub output: Output,
}

#[derive(Debug, Clone)]
pub enum RunConfig {
    Send(SenderConfig),
    Listen(ReceiverConfig),
}

impl RunConfig {
    pub fn from_command(command: &Command, output: Output) -> Result<Self> {
        match command {
            Command::Listen {
                addr,
                save_path,
                recursive,
                stay_alive,
                limit,
                extract,
            } => Ok(RunConfig::Listen(ReceiverConfig::new(
                addr,
                save_path,
                *recursive,
                *stay_alive,
                limit.as_deref(),
                *extract,
                output,
            )?)),
            Command::Send {
                addr,
                recursive,
                stay_alive,
                limit,
                source,
            } => {
                let source = match source {
                    SendSource::Files { paths } => SourceSpec::Files(paths.clone()),
                    SendSource::Dir { path } => SourceSpec::Dir(path.clone()),
                    SendSource::Archive { path } => SourceSpec::Archive(path.clone()),
                };
                Ok(RunConfig::Send(SenderConfig::new(
                    addr,
                    source,
                    *recursive,
                    *stay_alive,
                    limit.as_deref(),
                    output,
                )?))
            }
        }
    }
}

fn parse_limit(limit: Option<&str>) -> Result<Option<Limit>> {
    limit.map(str::parse::<Limit>).transpose()
}

/// Resolve `host:port`, preferring IPv4 like most LAN peers expect
pub fn resolve_addr(addr: &str) -> Result<SocketAddr> {
    let candidates: Vec<SocketAddr> = addr
        .to_socket_addrs()
        .map_err(|e| Error::config(format!("cannot resolve {:?}: {}", addr, e)))?
        .collect();
    candidates
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| candidates.first())
        .copied()
        .ok_or_else(|| Error::config(format!("{:?} resolved to no addresses", addr)))
}

impl SenderConfig {
    pub fn new(
        addr: &str,
        source: SourceSpec,
        recursive: bool,
        stay_alive: bool,
        limit: Option<&str>,
        output: Output,
    ) -> Result<Self> {
        let addr = resolve_addr(addr)?;
        let limit = parse_limit(limit)?;
        validate_source(&source)?;
        Ok(Self {
            addr,
            source,
            recursive,
            stay_alive,
            limit,
            output,
        })
    }
}

fn validate_source(source: &SourceSpec) -> Result<()> {
    match source {
        SourceSpec::Files(paths) => {
            if paths.is_empty() {
                return Err(Error::config("no files given"));
            }
            for p in paths {
                if !p.is_file() {
                    return Err(Error::config(format!("{} is not a file", p.display())));
                }
            }
        }
        SourceSpec::Dir(dir) | SourceSpec::Archive(dir) => {
            if !dir.is_dir() {
                return Err(Error::config(format!("{} is not a directory", dir.display())));
            }
        }
    }
    Ok(())
}

impl ReceiverConfig {
    pub fn new(
        bind: &str,
        save_dir: &Path,
        recursive: bool,
        stay_alive: bool,
        limit: Option<&str>,
        extract: bool,
        output: Output,
    ) -> Result<Self> {
        if bind.parse::<SocketAddr>().is_err() {
            resolve_addr(bind)?;
        }
        let limit = parse_limit(limit)?;
        fs::create_dir_all(save_dir).map_err(|e| {
            Error::config(format!("cannot create {}: {}", save_dir.display(), e))
        })?;
        if !save_dir.is_dir() {
            return Err(Error::config(format!("{} is not a directory", save_dir.display())));
        }
        Ok(Self {
            bind: bind.to_string(),
            save_dir: save_dir.to_path_buf(),
            recursive,
            stay_alive,
            limit,
            extract,
            output,
        })
    }
}

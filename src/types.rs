//! Public and internal types shared by the backends, the store and the crawl engine.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Protocol tag of a document identifier (and of the active backend).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Nfs,
    Smb,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Nfs => "nfs",
            Protocol::Smb => "smb",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = String;

    /// Case-insensitive: `NFS`, `nfs`, `Smb` all parse.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nfs" => Ok(Protocol::Nfs),
            "smb" => Ok(Protocol::Smb),
            other => Err(format!("unknown protocol '{other}'")),
        }
    }
}

/// Document status as seen by the downstream pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Ko,
    /// Directory processed; children carry their own status.
    Aux,
    Deleted,
    /// End of life, set by downstream consumers.
    Eol,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::Ko => "KO",
            Status::Aux => "AUX",
            Status::Deleted => "DELETED",
            Status::Eol => "EOL",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OK" => Ok(Status::Ok),
            "KO" => Ok(Status::Ko),
            "AUX" => Ok(Status::Aux),
            "DELETED" => Ok(Status::Deleted),
            "EOL" => Ok(Status::Eol),
            other => Err(format!("unknown status '{other}'")),
        }
    }
}

/// Type of a path as reported by a backend probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    /// Exists but is neither a regular file nor a directory (socket, device, dangling link target...).
    Other,
}

/// Counters accumulated over one run and reported once at teardown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlStats {
    pub directories: u32,
    pub new_files: u32,
    pub updated_files: u32,
    pub deleted_files: u32,
}

/// Crawl behaviour switches (from config file and CLI).
#[derive(Debug, Clone)]
pub struct CrawlOpts {
    /// Compute ACL and SAR layers.
    pub secured: bool,
    /// Drop unreadable files instead of emitting them as KO.
    pub skip_non_readable_files: bool,
    /// Show a document counter while crawling.
    pub verbose: bool,
}

impl Default for CrawlOpts {
    fn default() -> Self {
        Self {
            secured: false,
            skip_non_readable_files: true,
            verbose: false,
        }
    }
}

/// Full options for the CLI run. Use [`CrawlOpts`] when driving the engine from the lib.
#[derive(Debug, Clone, Default)]
pub struct Opts {
    /// Config file path. When None, uses `fsload.toml` in the working directory.
    pub config_path: Option<PathBuf>,
    /// Document store path. Overrides the config file.
    pub db_path: Option<PathBuf>,
    /// Root CIDs to crawl. Empty means the configured root.
    pub roots: Vec<String>,
    /// Secured mode. `None` leaves the config value in place.
    pub secured: Option<bool>,
    /// Share is already attached: skip connect/disconnect.
    pub no_connect: bool,
    /// Prompt for the SMB password when nothing else provides it.
    pub ask_password: bool,
    /// Debug logs and the document counter. `None` leaves the config value in place.
    pub verbose: Option<bool>,
}

//! Configuration and the persisted state document.
//!
//! A single TOML file carries both the global `API` section (credentials,
//! delays) and one section per watched potfile, keyed by the potfile's base
//! name. The watcher only ever receives a resolved [`Settings`]; nothing in
//! the core reads this file behind its back.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{RelayError, Result};

/// Where finds are submitted unless overridden on the command line.
pub const DEFAULT_ENDPOINT: &str = "https://hashmob.net/api/v2/submit";

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

const STATE_DIR_NAME: &str = "potfile-relay";
const STATE_FILE_NAME: &str = "config.toml";

/// Default location of the state file: the platform config directory, or
/// the working directory when the platform has none.
pub fn default_state_path() -> PathBuf {
    let dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    dir.join(STATE_DIR_NAME).join(STATE_FILE_NAME)
}

/// Global credentials and timing, stored under `[API]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiSection {
    pub api_key: String,
    /// Seconds between polls and between failed-upload retries.
    pub resubmission_delay: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<u64>,
}

/// Per-potfile record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PotfileRecord {
    pub full_path: PathBuf,
    pub previous_size: u64,
}

/// The whole state file as it sits on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateFile {
    #[serde(rename = "API", default, skip_serializing_if = "Option::is_none")]
    pub api: Option<ApiSection>,
    #[serde(flatten)]
    pub potfiles: BTreeMap<String, PotfileRecord>,
}

impl StateFile {
    /// Read the document at `path`. A missing file is an empty document.
    pub fn load(path: &Path) -> Result<Self> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(StateFile::default())
            }
            Err(err) => return Err(RelayError::Io(err)),
        };
        toml::from_str(&text).map_err(|source| RelayError::StateParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Replace the document at `path` with this one.
    ///
    /// Written to `<path>.tmp`, synced, then renamed into place and the
    /// parent directory synced, so a crash leaves either the old or the new
    /// document and never a torn one.
    pub fn save_atomic(&self, path: &Path) -> Result<()> {
        let encoded = toml::to_string_pretty(self)?;
        let persist_err = |source| RelayError::Persistence {
            path: path.to_path_buf(),
            source,
        };

        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent).map_err(persist_err)?;

        let tmp_path = tmp_path_for(path);
        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp_path)
                .map_err(persist_err)?;
            file.write_all(encoded.as_bytes()).map_err(persist_err)?;
            file.sync_all().map_err(persist_err)?;
        }

        fs::rename(&tmp_path, path).map_err(persist_err)?;
        sync_dir(&parent).map_err(persist_err)?;
        Ok(())
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> std::io::Result<()> {
    File::open(dir)?.sync_all()
}

// Directories cannot be opened as files on Windows; rename is the best we get.
#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Section name a potfile is recorded under.
pub fn section_key(potfile: &Path) -> String {
    potfile
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| potfile.to_string_lossy().into_owned())
}

/// Fully resolved runtime configuration, built once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub endpoint: String,
    pub api_key: String,
    pub resubmission_delay: Duration,
    pub request_timeout: Duration,
    /// Algorithm label sent with every batch.
    pub algorithm: String,
}

impl Settings {
    pub fn new(api: &ApiSection, endpoint: impl Into<String>, algorithm: impl Into<String>) -> Self {
        Settings {
            endpoint: endpoint.into(),
            api_key: api.api_key.clone(),
            resubmission_delay: Duration::from_secs(api.resubmission_delay),
            request_timeout: Duration::from_secs(
                api.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            ),
            algorithm: algorithm.into(),
        }
    }
}

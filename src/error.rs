// Error types shared by the relay core.
//
// Upload failures are deliberately absent here: a rejected or failed POST
// is an `UploadOutcome` that the watcher retries. Everything in this enum is
// structural and stops the loop.

use std::path::PathBuf;
use thiserror::Error;

/// Crate-wide result type
pub type Result<T> = std::result::Result<T, RelayError>;

#[derive(Error, Debug)]
pub enum RelayError {
    /// The watched potfile disappeared between polls or before a read.
    #[error("potfile {} is no longer readable (moved or deleted)", path.display())]
    FileVanished { path: PathBuf },

    /// The potfile is smaller than the confirmed offset.
    #[error(
        "potfile {} shrank from {previous_size} to {current_size} bytes; refusing to guess a new offset",
        path.display()
    )]
    FileShrank {
        path: PathBuf,
        previous_size: u64,
        current_size: u64,
    },

    #[error("{} is not a regular file", path.display())]
    NotAFile { path: PathBuf },

    /// The state file could not be written.
    #[error("failed to persist state to {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("state file {} is malformed: {source}", path.display())]
    StateParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to encode state: {0}")]
    StateEncode(#[from] toml::ser::Error),

    #[error(
        "refusing to move offset for {} backwards from {committed} to {requested}",
        path.display()
    )]
    OffsetRegression {
        path: PathBuf,
        committed: u64,
        requested: u64,
    },

    #[error("API key contains characters that cannot be sent in an HTTP header")]
    InvalidApiKey,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

impl RelayError {
    /// Map an IO error from touching the potfile, turning `NotFound` into
    /// `FileVanished` so callers never mistake a deleted file for "no data".
    pub(crate) fn from_potfile_io(path: &std::path::Path, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            RelayError::FileVanished {
                path: path.to_path_buf(),
            }
        } else {
            RelayError::Io(err)
        }
    }
}

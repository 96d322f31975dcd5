//! Extraction of newly appended potfile lines.
//!
//! Stateless: callers pass the offset in and track sizes themselves.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use tracing::{debug, warn};

use crate::error::{RelayError, Result};

/// Current size of the potfile in bytes.
pub fn file_size(path: &Path) -> Result<u64> {
    let meta = fs::metadata(path).map_err(|err| RelayError::from_potfile_io(path, err))?;
    Ok(meta.len())
}

/// Every line from byte `from` to end of file.
pub fn read(path: &Path, from: u64) -> Result<Vec<String>> {
    read_lines(path, from, None)
}

/// Lines in the byte range `[from, to)`.
///
/// Bytes appended after `to` are left for a later read even if they are
/// already on disk.
pub fn read_range(path: &Path, from: u64, to: u64) -> Result<Vec<String>> {
    read_lines(path, from, Some(to.saturating_sub(from)))
}

fn read_lines(path: &Path, from: u64, limit: Option<u64>) -> Result<Vec<String>> {
    debug!(path = %path.display(), "opening potfile");
    let mut file = File::open(path).map_err(|err| RelayError::from_potfile_io(path, err))?;

    debug!(offset = from, "seeking");
    file.seek(SeekFrom::Start(from))?;

    let reader = BufReader::new(file.take(limit.unwrap_or(u64::MAX)));
    let mut lines = Vec::new();
    for chunk in reader.split(b'\n') {
        let mut bytes = chunk?;
        // `split` already dropped the '\n'; CRLF files leave a '\r' behind.
        while bytes.last() == Some(&b'\r') {
            bytes.pop();
        }
        lines.push(decode_line(bytes));
    }
    Ok(lines)
}

fn decode_line(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(line) => line,
        Err(err) => {
            warn!("potfile line is not valid UTF-8, replacing invalid bytes");
            String::from_utf8_lossy(err.as_bytes()).into_owned()
        }
    }
}

//! Durable record of how much of each potfile has been uploaded.
//!
//! The store is the only thing that writes `previous_size`. Every write goes
//! through [`StateFile::save_atomic`], so the offset seen on the next start is
//! always one that was fully committed.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::{section_key, PotfileRecord, StateFile};
use crate::error::{RelayError, Result};

pub struct OffsetStore {
    state_path: PathBuf,
    state: StateFile,
}

impl OffsetStore {
    /// Wrap an already loaded document that lives at `state_path`.
    pub fn new(state_path: impl Into<PathBuf>, state: StateFile) -> Self {
        Self {
            state_path: state_path.into(),
            state,
        }
    }

    /// Load the document at `state_path` (empty if it does not exist yet).
    pub fn open(state_path: impl Into<PathBuf>) -> Result<Self> {
        let state_path = state_path.into();
        let state = StateFile::load(&state_path)?;
        Ok(Self::new(state_path, state))
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    pub fn state(&self) -> &StateFile {
        &self.state
    }

    /// Offset last confirmed for `potfile`, or 0 on first sight.
    ///
    /// On first sight a record holding the resolved absolute path and a zero
    /// offset is written before returning.
    pub fn load(&mut self, potfile: &Path) -> Result<u64> {
        let key = section_key(potfile);
        let full_path = potfile
            .canonicalize()
            .map_err(|err| RelayError::from_potfile_io(potfile, err))?;

        if let Some(record) = self.state.potfiles.get(&key) {
            if record.full_path != full_path {
                warn!(
                    section = %key,
                    recorded = %record.full_path.display(),
                    actual = %full_path.display(),
                    "state section was recorded for a different path with the same name"
                );
            }
            debug!(section = %key, offset = record.previous_size, "loaded offset");
            return Ok(record.previous_size);
        }

        debug!(section = %key, path = %full_path.display(), "no record yet, starting at 0");
        self.state.potfiles.insert(
            key,
            PotfileRecord {
                full_path,
                previous_size: 0,
            },
        );
        self.state.save_atomic(&self.state_path)?;
        Ok(0)
    }

    /// Persist `offset` as the confirmed value for `potfile`.
    ///
    /// Returns only once the write is durable. On failure the in-memory value
    /// is left at the last committed offset.
    pub fn commit(&mut self, potfile: &Path, offset: u64) -> Result<()> {
        let key = section_key(potfile);
        if !self.state.potfiles.contains_key(&key) {
            let full_path = potfile
                .canonicalize()
                .map_err(|err| RelayError::from_potfile_io(potfile, err))?;
            self.state.potfiles.insert(
                key.clone(),
                PotfileRecord {
                    full_path,
                    previous_size: 0,
                },
            );
        }

        let committed = self.state.potfiles[&key].previous_size;
        if offset < committed {
            return Err(RelayError::OffsetRegression {
                path: potfile.to_path_buf(),
                committed,
                requested: offset,
            });
        }

        self.set_offset(&key, offset);
        if let Err(err) = self.state.save_atomic(&self.state_path) {
            self.set_offset(&key, committed);
            return Err(err);
        }
        debug!(section = %key, offset, "committed offset");
        Ok(())
    }

    fn set_offset(&mut self, key: &str, offset: u64) {
        if let Some(record) = self.state.potfiles.get_mut(key) {
            record.previous_size = offset;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn first_load_creates_zero_record() {
        let dir = tempdir().unwrap();
        let potfile = dir.path().join("hashcat.potfile");
        fs::write(&potfile, "").unwrap();
        let state_path = dir.path().join("config.toml");

        let mut store = OffsetStore::open(&state_path).unwrap();
        assert_eq!(store.load(&potfile).unwrap(), 0);

        let on_disk = StateFile::load(&state_path).unwrap();
        let record = &on_disk.potfiles["hashcat.potfile"];
        assert_eq!(record.previous_size, 0);
        assert_eq!(record.full_path, potfile.canonicalize().unwrap());
    }

    #[test]
    fn committed_offset_survives_reopen() {
        let dir = tempdir().unwrap();
        let potfile = dir.path().join("hashcat.potfile");
        fs::write(&potfile, "a\nb\n").unwrap();
        let state_path = dir.path().join("config.toml");

        let mut store = OffsetStore::open(&state_path).unwrap();
        store.load(&potfile).unwrap();
        store.commit(&potfile, 4).unwrap();

        let mut reopened = OffsetStore::open(&state_path).unwrap();
        assert_eq!(reopened.load(&potfile).unwrap(), 4);
    }

    #[test]
    fn recommitting_the_same_offset_is_allowed() {
        let dir = tempdir().unwrap();
        let potfile = dir.path().join("p");
        fs::write(&potfile, "x\n").unwrap();

        let mut store = OffsetStore::open(dir.path().join("config.toml")).unwrap();
        store.load(&potfile).unwrap();
        store.commit(&potfile, 2).unwrap();
        store.commit(&potfile, 2).unwrap();
        assert_eq!(store.state().potfiles["p"].previous_size, 2);
    }

    #[test]
    fn offset_never_moves_backwards() {
        let dir = tempdir().unwrap();
        let potfile = dir.path().join("p");
        fs::write(&potfile, "abcdef\n").unwrap();

        let mut store = OffsetStore::open(dir.path().join("config.toml")).unwrap();
        store.load(&potfile).unwrap();
        store.commit(&potfile, 7).unwrap();

        let err = store.commit(&potfile, 3).unwrap_err();
        assert!(matches!(
            err,
            RelayError::OffsetRegression {
                committed: 7,
                requested: 3,
                ..
            }
        ));
        assert_eq!(store.state().potfiles["p"].previous_size, 7);
    }

    #[test]
    fn failed_write_keeps_previous_offset() {
        let dir = tempdir().unwrap();
        let potfile = dir.path().join("p");
        fs::write(&potfile, "abc\n").unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "").unwrap();

        let mut state = StateFile::default();
        state.potfiles.insert(
            "p".into(),
            PotfileRecord {
                full_path: potfile.clone(),
                previous_size: 1,
            },
        );
        let mut store = OffsetStore::new(blocker.join("config.toml"), state);

        let err = store.commit(&potfile, 4).unwrap_err();
        assert!(matches!(err, RelayError::Persistence { .. }));
        assert_eq!(store.state().potfiles["p"].previous_size, 1);
    }

    #[test]
    fn load_of_missing_potfile_is_file_vanished() {
        let dir = tempdir().unwrap();
        let mut store = OffsetStore::open(dir.path().join("config.toml")).unwrap();
        let err = store.load(&dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, RelayError::FileVanished { .. }));
    }
}

//! The resubmission loop.
//!
//! One [`Watcher`] tails one potfile. Each cycle polls the size, and when the
//! file has grown it checkpoints the current offset, extracts the new lines,
//! submits them and only then advances the offset. Failed submissions leave
//! the offset alone, so the same range is re-read and re-sent next time.
//! Delivery is at-least-once: the endpoint has to tolerate duplicates.

use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::api::{Submit, UploadOutcome, UploadPayload};
use crate::config::Settings;
use crate::delta;
use crate::error::{RelayError, Result};
use crate::offsets::OffsetStore;

/// Where the loop currently is. Exposed for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Checkpointing,
    Extracting,
    Uploading,
    Confirmed,
    Backoff,
}

/// Result of one pass through the loop.
#[derive(Debug)]
pub enum Cycle {
    /// No growth; waited one resubmission delay.
    Waited,
    /// Lines in `[from, to)` were accepted and the offset now sits at `to`.
    Confirmed { from: u64, to: u64, lines: usize },
    /// Submission failed; waited one resubmission delay without advancing.
    BackedOff(UploadOutcome),
}

/// Blocking wait between polls and after failures.
pub trait Pause {
    fn pause(&mut self, delay: Duration);
}

/// Production [`Pause`]: puts the thread to sleep.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleep;

impl Pause for ThreadSleep {
    fn pause(&mut self, delay: Duration) {
        thread::sleep(delay);
    }
}

pub struct Watcher<S, P> {
    potfile: PathBuf,
    algorithm: String,
    delay: Duration,
    store: OffsetStore,
    submitter: S,
    pauser: P,
    previous_size: u64,
    state: LoopState,
}

impl<S: Submit, P: Pause> Watcher<S, P> {
    /// Set up a watcher for `potfile`, resuming from the offset recorded in
    /// `store` (0 if this potfile has never been seen).
    pub fn new(
        potfile: impl Into<PathBuf>,
        settings: &Settings,
        mut store: OffsetStore,
        submitter: S,
        pauser: P,
    ) -> Result<Self> {
        let potfile = potfile.into();
        let previous_size = store.load(&potfile)?;
        info!(
            path = %potfile.display(),
            offset = previous_size,
            "watching potfile"
        );
        Ok(Self {
            potfile,
            algorithm: settings.algorithm.clone(),
            delay: settings.resubmission_delay,
            store,
            submitter,
            pauser,
            previous_size,
            state: LoopState::Idle,
        })
    }

    /// Bytes confirmed uploaded so far.
    pub fn previous_size(&self) -> u64 {
        self.previous_size
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Run cycles until something fatal happens. Never returns `Ok`.
    pub fn run(&mut self) -> Result<()> {
        loop {
            if let Err(err) = self.run_cycle() {
                error!(path = %self.potfile.display(), error = %err, "stopping watcher");
                return Err(err);
            }
        }
    }

    /// One pass: poll, and if there is growth, checkpoint, extract, upload
    /// and either confirm or back off.
    pub fn run_cycle(&mut self) -> Result<Cycle> {
        self.state = LoopState::Idle;
        let current_size = delta::file_size(&self.potfile)?;

        if current_size < self.previous_size {
            return Err(RelayError::FileShrank {
                path: self.potfile.clone(),
                previous_size: self.previous_size,
                current_size,
            });
        }
        if current_size == self.previous_size {
            debug!(delay_secs = self.delay.as_secs(), "no new finds, waiting");
            self.pauser.pause(self.delay);
            return Ok(Cycle::Waited);
        }

        // Re-persist what is already known before touching the file.
        self.state = LoopState::Checkpointing;
        debug!(offset = self.previous_size, "checkpointing offset before read");
        self.store.commit(&self.potfile, self.previous_size)?;

        self.state = LoopState::Extracting;
        let founds = delta::read_range(&self.potfile, self.previous_size, current_size)?;
        let lines = founds.len();
        debug!(
            from = self.previous_size,
            to = current_size,
            lines,
            "extracted new finds"
        );

        self.state = LoopState::Uploading;
        let payload = UploadPayload::new(self.algorithm.clone(), founds);
        match self.submitter.submit(&payload) {
            UploadOutcome::Success => {
                self.state = LoopState::Confirmed;
                let from = self.previous_size;
                // Advance to the size seen before the read; anything appended
                // since is picked up by the next cycle.
                self.store.commit(&self.potfile, current_size)?;
                self.previous_size = current_size;
                info!(lines, "successfully sent new finds");
                debug!(offset = current_size, "updated previous size");
                Ok(Cycle::Confirmed {
                    from,
                    to: current_size,
                    lines,
                })
            }
            failure => {
                self.state = LoopState::Backoff;
                match &failure {
                    UploadOutcome::ServerRejected(status) => error!(
                        status,
                        delay_secs = self.delay.as_secs(),
                        "failed to send new finds, retrying after resubmission delay"
                    ),
                    UploadOutcome::TransportError(cause) => error!(
                        error = %cause,
                        delay_secs = self.delay.as_secs(),
                        "error encountered when trying to send new finds, retrying after resubmission delay"
                    ),
                    UploadOutcome::Success => {}
                }
                self.pauser.pause(self.delay);
                Ok(Cycle::BackedOff(failure))
            }
        }
    }
}

// Library root
// -----------
// Tails a hashcat-style potfile and forwards newly appended lines to a
// submission endpoint, remembering how far it got so restarts do not
// resend everything.
//
// Module responsibilities:
// - `config`: the persisted state document and the resolved `Settings`.
// - `offsets`: durable per-potfile upload offsets.
// - `delta`: reading the lines appended since an offset.
// - `api`: the HTTP submission client.
// - `watcher`: the poll / upload / confirm loop tying the above together.
// - `ui`: first-run prompts used by the binary only.
pub mod api;
pub mod config;
pub mod delta;
pub mod error;
pub mod offsets;
pub mod ui;
pub mod watcher;

pub use error::{RelayError, Result};

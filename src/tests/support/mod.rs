// Shared test support code for scenario tests.
// Builds a fully wired cache over counting in-memory storages.

pub mod harness;
pub mod recording;

pub use harness::{wait_until, Harness};
pub use recording::{Calls, RecordingStorage};

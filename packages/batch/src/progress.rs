//! Stage progress as seen by the libraries.
//!
//! The fire stage reports bytes consumed from its input file and the AQI
//! stage reports years finished. Rendering lives in `smoke_cli_utils`.

/// Receives progress updates from a running stage.
pub trait ProgressCallback: Send + Sync {
    /// Units of work in the stage: file bytes or years.
    fn set_total(&self, total: u64);

    /// Adds `delta` completed units.
    fn inc(&self, delta: u64);

    /// Names the unit currently being worked on.
    fn set_message(&self, msg: String);

    /// Ends the stage, leaving `msg` on screen.
    fn finish(&self, msg: String);

    /// Ends the stage without leaving anything on screen.
    fn finish_and_clear(&self);
}

/// Discards every update. Used where nobody is watching, such as tests.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
    fn finish_and_clear(&self) {}
}

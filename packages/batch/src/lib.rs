#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared plumbing for the smoke pipeline batch stages.
//!
//! Both stages (fire perimeter reduction and AQI aggregation) are
//! best-effort batch transforms: a bad record or an unreachable year is
//! skipped and reported, never fatal. [`BatchSummary`] carries that
//! accounting, [`progress`] decouples progress reporting from rendering,
//! and [`output`] writes the final CSV once the stage is done.

pub mod output;
pub mod progress;

use thiserror::Error;

/// Maximum number of individual skip reasons logged at `warn` level.
/// The remainder are only logged at `debug`.
const MAX_LOGGED_SKIPS: usize = 20;

/// Errors that can occur while writing batch output.
#[derive(Debug, Error)]
pub enum BatchError {
    /// I/O error (file create/rename).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV serialization failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// A single item that was skipped during a batch run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedItem {
    /// Identifier of the skipped item (record id, year, ordinal).
    pub key: String,
    /// Human-readable reason it was skipped.
    pub reason: String,
}

/// Success/skip accounting for one batch stage.
///
/// Every input item is counted exactly once, either as a success or as a
/// skip, so `succeeded + skipped == total` always holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    label: String,
    succeeded: u64,
    skipped: Vec<SkippedItem>,
}

impl BatchSummary {
    /// Creates an empty summary for the stage named `label`.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            succeeded: 0,
            skipped: Vec::new(),
        }
    }

    /// Counts one successfully processed item.
    pub const fn record_success(&mut self) {
        self.succeeded += 1;
    }

    /// Counts one skipped item and remembers why.
    pub fn record_skip(&mut self, key: impl Into<String>, reason: impl Into<String>) {
        let item = SkippedItem {
            key: key.into(),
            reason: reason.into(),
        };
        log::debug!("{}: skipped {}: {}", self.label, item.key, item.reason);
        self.skipped.push(item);
    }

    /// Stage label used in log lines.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Number of items processed successfully.
    #[must_use]
    pub const fn succeeded(&self) -> u64 {
        self.succeeded
    }

    /// Number of items skipped.
    #[must_use]
    pub fn skipped_count(&self) -> u64 {
        u64::try_from(self.skipped.len()).unwrap_or(u64::MAX)
    }

    /// The skipped items, in the order they were encountered.
    #[must_use]
    pub fn skipped(&self) -> &[SkippedItem] {
        &self.skipped
    }

    /// Total number of items seen.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.succeeded + self.skipped_count()
    }

    /// Logs the summary: one `info` line with counts, followed by the
    /// first few skip reasons as warnings.
    pub fn log(&self) {
        log::info!(
            "{}: {} total, {} succeeded, {} skipped",
            self.label,
            self.total(),
            self.succeeded,
            self.skipped.len()
        );

        for item in self.skipped.iter().take(MAX_LOGGED_SKIPS) {
            log::warn!("{}: skipped {}: {}", self.label, item.key, item.reason);
        }
        if self.skipped.len() > MAX_LOGGED_SKIPS {
            log::warn!(
                "{}: ... and {} more skipped (RUST_LOG=debug for all)",
                self.label,
                self.skipped.len() - MAX_LOGGED_SKIPS
            );
        }
    }
}

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Terminal plumbing for the `smoke` binary.
//!
//! [`IndicatifProgress`] renders the stage progress reported through
//! [`ProgressCallback`], and [`init_logger`] routes `log` output through
//! `indicatif-log-bridge` so log lines print cleanly above the bars.

use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};
use smoke_batch::progress::ProgressCallback;

pub use indicatif::MultiProgress;

/// What a bar counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unit {
    /// Bytes of an input file; shows throughput.
    Bytes,
    /// Discrete steps such as years.
    Steps,
}

impl Unit {
    fn style(self) -> ProgressStyle {
        let template = match self {
            Self::Bytes => {
                "{msg} {wide_bar:.cyan/dim} {bytes}/{total_bytes} ({binary_bytes_per_sec}, {eta})"
            }
            Self::Steps => "{msg} {wide_bar:.green/dim} {pos}/{len} [{elapsed_precise}]",
        };
        ProgressStyle::with_template(template)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-")
    }
}

/// A stage progress bar rendered with `indicatif`.
pub struct IndicatifProgress {
    bar: ProgressBar,
    label: String,
}

impl IndicatifProgress {
    /// A bar for streaming an input file, measured in bytes.
    #[must_use]
    pub fn bytes_bar(multi: &MultiProgress, label: &str) -> Arc<dyn ProgressCallback> {
        Arc::new(Self::new(multi.add(ProgressBar::new(0)), Unit::Bytes, label))
    }

    /// A bar for a known number of steps (e.g. years 1963..=2023).
    #[must_use]
    pub fn steps_bar(multi: &MultiProgress, label: &str) -> Arc<dyn ProgressCallback> {
        Arc::new(Self::new(multi.add(ProgressBar::new(0)), Unit::Steps, label))
    }

    fn new(bar: ProgressBar, unit: Unit, label: &str) -> Self {
        bar.set_style(unit.style());
        bar.set_message(label.to_string());
        Self {
            bar,
            label: label.to_string(),
        }
    }
}

impl ProgressCallback for IndicatifProgress {
    fn set_total(&self, total: u64) {
        self.bar.set_length(total);
    }

    fn inc(&self, delta: u64) {
        self.bar.inc(delta);
    }

    /// Shows `msg` after the stage label (e.g. "Aggregating AQI 2017").
    fn set_message(&self, msg: String) {
        self.bar.set_message(format!("{} {msg}", self.label));
    }

    fn finish(&self, msg: String) {
        self.bar.finish_with_message(format!("{}: {msg}", self.label));
    }

    fn finish_and_clear(&self) {
        self.bar.finish_and_clear();
    }
}

/// Initializes the global logger (`info` unless `RUST_LOG` says
/// otherwise) wrapped in `indicatif-log-bridge`.
///
/// Returns the [`MultiProgress`] that all progress bars must be added to.
#[must_use]
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();

    let logger = pretty_env_logger::formatted_builder()
        .filter_level(log::LevelFilter::Info)
        .parse_env("RUST_LOG")
        .build();
    let level = logger.filter();

    // Already set in tests.
    indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .ok();

    log::set_max_level(level);

    multi
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_length_position_and_label() {
        let progress = IndicatifProgress::new(ProgressBar::hidden(), Unit::Steps, "Aggregating AQI");

        progress.set_total(61);
        progress.inc(1);
        progress.inc(2);
        progress.set_message("1966".to_string());

        assert_eq!(progress.bar.length(), Some(61));
        assert_eq!(progress.bar.position(), 3);
        assert_eq!(progress.bar.message(), "Aggregating AQI 1966");

        progress.finish("61 of 61 years".to_string());
        assert!(progress.bar.is_finished());
        assert_eq!(progress.bar.message(), "Aggregating AQI: 61 of 61 years");
    }
}

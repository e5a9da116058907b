//! Named-fire extracts of a large export.
//!
//! Pulls a handful of well-known fires out of the full dataset into a
//! small file with the same header, so the rest of the pipeline can be
//! exercised without streaming gigabytes.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

use serde::Serialize;
use serde_json::{Map, Value};
use smoke_batch::progress::ProgressCallback;
use smoke_fire_models::FireType;

use crate::FireError;
use crate::reader::{self, Header, Layout};
use crate::record::{NAME_FIELD, TYPE_FIELD, YEAR_FIELD};

/// A fire to look for: a case-insensitive name fragment and, optionally,
/// the year it burned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FireTarget {
    name: String,
    year: Option<i32>,
}

impl FireTarget {
    /// Creates a target. The name is matched case-insensitively.
    #[must_use]
    pub fn new(name: &str, year: Option<i32>) -> Self {
        Self {
            name: name.trim().to_lowercase(),
            year,
        }
    }

    /// Parses `NAME` or `NAME:YEAR` (e.g. `"mendocino complex:2018"`).
    ///
    /// # Errors
    ///
    /// Returns [`FireError::InvalidTarget`] for an empty name or a
    /// non-numeric year.
    pub fn parse(target: &str) -> Result<Self, FireError> {
        let invalid = |message: String| FireError::InvalidTarget { message };

        let (name, year) = match target.rsplit_once(':') {
            Some((name, year)) => {
                let year = year
                    .trim()
                    .parse()
                    .map_err(|_| invalid(format!("{target:?}: year {year:?} is not a number")))?;
                (name, Some(year))
            }
            None => (target, None),
        };

        if name.trim().is_empty() {
            return Err(invalid(format!("{target:?}: empty fire name")));
        }

        Ok(Self::new(name, year))
    }

    /// The lowercased name fragment.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The required year, if any.
    #[must_use]
    pub const fn year(&self) -> Option<i32> {
        self.year
    }

    fn matches(&self, listed_names: &str, year: Option<i64>) -> bool {
        listed_names.contains(&self.name)
            && self
                .year
                .is_none_or(|wanted| year == Some(i64::from(wanted)))
    }
}

impl FromStr for FireTarget {
    type Err = FireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Features selected from an input, with the input's header.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    /// Layout of the input, reused for the output.
    pub layout: Layout,
    /// Header of the input.
    pub header: Header,
    /// Matching features, in input order, unmodified.
    pub features: Vec<Value>,
    /// Number of features scanned.
    pub scanned: u64,
}

/// Scans `input` for features matching any of `targets`.
///
/// A feature matches when its `Listed_Fire_Names` contains a target's
/// name, its `Fire_Year` equals the target's year (when given), and, if
/// `wildfire_only`, its `Assigned_Fire_Type` is a wildfire or likely
/// wildfire.
///
/// # Errors
///
/// Returns [`FireError`] if the input cannot be read or parsed.
pub fn extract_matching(
    input: &Path,
    targets: &[FireTarget],
    wildfire_only: bool,
    progress: &dyn ProgressCallback,
) -> Result<Extraction, FireError> {
    let mut features = Vec::new();

    let document = reader::read_features(input, progress, |_, feature| {
        let Some(attributes) = attributes(&feature) else {
            return;
        };

        let listed_names = attributes
            .get(NAME_FIELD)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_lowercase();
        let year = attributes.get(YEAR_FIELD).and_then(Value::as_i64);

        if !targets.iter().any(|t| t.matches(&listed_names, year)) {
            return;
        }
        if wildfire_only {
            let fire_type = attributes
                .get(TYPE_FIELD)
                .and_then(Value::as_str)
                .map_or(FireType::Unknown, FireType::from_label);
            if !fire_type.is_wildfire() {
                return;
            }
        }

        log::info!("Found {listed_names:?} ({})", year.unwrap_or_default());
        features.push(feature);
    })?;

    progress.finish(format!("{} of {} features", features.len(), document.feature_count));
    log::info!(
        "Matched {} of {} features in {}",
        features.len(),
        document.feature_count,
        input.display()
    );

    Ok(Extraction {
        layout: document.layout,
        header: document.header,
        features,
        scanned: document.feature_count,
    })
}

#[derive(Serialize)]
struct FeatureSet<'a> {
    #[serde(flatten)]
    header: &'a Header,
    features: &'a [Value],
}

/// Writes an extraction in the layout it was read from. A `FeatureSet`
/// keeps its header keys, followed by `features`.
///
/// # Errors
///
/// Returns [`FireError`] if the file cannot be written.
pub fn write_extraction(path: &Path, extraction: &Extraction) -> Result<(), FireError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }

    let mut writer = BufWriter::new(File::create(path)?);
    match extraction.layout {
        Layout::RecordArray => serde_json::to_writer(&mut writer, &extraction.features)?,
        Layout::FeatureSet => serde_json::to_writer(
            &mut writer,
            &FeatureSet {
                header: &extraction.header,
                features: &extraction.features,
            },
        )?,
    }
    writer.flush()?;

    log::info!(
        "Wrote {} features to {}",
        extraction.features.len(),
        path.display()
    );
    Ok(())
}

fn attributes(feature: &Value) -> Option<&Map<String, Value>> {
    let object = feature.as_object()?;
    match object.get("attributes") {
        Some(attributes) => attributes.as_object(),
        None => Some(object),
    }
}

//! Streaming reader for fire datasets.
//!
//! The USGS combined wildland fire export is a single multi-gigabyte
//! Esri-JSON `FeatureSet`, so it is never parsed into memory whole.
//! Instead a serde visitor walks the top-level document, keeps every key
//! other than `features` as the *header*, and hands each feature to a
//! callback as soon as it has been parsed. Memory use is bounded by the
//! largest single feature.
//!
//! Two layouts are accepted:
//!
//! * a JSON array of flat fire records ([`Layout::RecordArray`]);
//! * an Esri `FeatureSet` object with a `features` array
//!   ([`Layout::FeatureSet`]).

use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use serde::de::{self, DeserializeSeed, Deserializer, MapAccess, SeqAccess, Visitor};
use serde_json::{Map, Value};
use smoke_batch::progress::ProgressCallback;
use smoke_geodesy::{Crs, GeodesyError};

use crate::FireError;

/// Key of the feature array in an Esri `FeatureSet`.
pub const FEATURES_KEY: &str = "features";

const READ_BUFFER_BYTES: usize = 1 << 20;

/// Top-level keys of a `FeatureSet` other than `features`, in file order.
pub type Header = Map<String, Value>;

/// Top-level shape of an input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// A JSON array of flat fire records.
    RecordArray,
    /// An Esri-JSON `FeatureSet` object.
    FeatureSet,
}

/// What was learned about a file after streaming it end to end.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Top-level shape.
    pub layout: Layout,
    /// The complete header (empty for [`Layout::RecordArray`]).
    pub header: Header,
    /// Number of features handed to the callback.
    pub feature_count: u64,
}

impl Document {
    /// The CRS declared by the header, if any.
    ///
    /// # Errors
    ///
    /// See [`header_crs`].
    pub fn crs(&self) -> Result<Option<Crs>, GeodesyError> {
        header_crs(&self.header)
    }
}

/// Streams the file at `path`, calling `on_feature(&header_so_far,
/// feature)` once per feature.
///
/// `header_so_far` holds the header keys that precede the feature array.
/// Byte progress is reported through `progress` (total = file size).
///
/// # Errors
///
/// Returns [`FireError::Io`] if the file cannot be read and
/// [`FireError::Json`] if it is not valid JSON of either layout.
pub fn read_features<F>(
    path: &Path,
    progress: &dyn ProgressCallback,
    on_feature: F,
) -> Result<Document, FireError>
where
    F: FnMut(&Header, Value),
{
    let file = File::open(path)?;
    progress.set_total(file.metadata()?.len());

    let reader = BufReader::with_capacity(
        READ_BUFFER_BYTES,
        CountingReader {
            inner: file,
            progress,
        },
    );
    read_features_from(reader, on_feature)
}

/// Like [`read_features`] but over any reader.
///
/// # Errors
///
/// Returns [`FireError::Json`] if the input is not valid JSON of either
/// layout.
pub fn read_features_from<R, F>(reader: R, mut on_feature: F) -> Result<Document, FireError>
where
    R: Read,
    F: FnMut(&Header, Value),
{
    let mut deserializer = serde_json::Deserializer::from_reader(reader);
    let document = DocumentVisitor {
        on_feature: &mut on_feature,
    }
    .deserialize(&mut deserializer)?;
    deserializer.end()?;
    Ok(document)
}

/// Streams a file without processing its features, returning its layout,
/// header, and feature count.
///
/// An unsupported `spatialReference` is logged, not returned, so the
/// header that declares it can still be shown.
///
/// # Errors
///
/// Returns [`FireError`] if the file cannot be read or parsed.
pub fn inspect(path: &Path, progress: &dyn ProgressCallback) -> Result<Document, FireError> {
    let document = read_features(path, progress, |_, _| {})?;
    match document.crs() {
        Ok(Some(crs)) => log::info!("{} declares {crs}", path.display()),
        Ok(None) => log::info!("{} declares no CRS", path.display()),
        Err(e) => log::warn!("{}: {e}", path.display()),
    }
    Ok(document)
}

/// Resolves the CRS declared by a header's `spatialReference`.
///
/// `latestWkid` is preferred over `wkid`. Returns `Ok(None)` when the
/// header has no `spatialReference`.
///
/// # Errors
///
/// Returns [`GeodesyError::UnsupportedCrs`] when the `spatialReference`
/// names an unknown wkid or carries no wkid at all.
pub fn header_crs(header: &Header) -> Result<Option<Crs>, GeodesyError> {
    let Some(reference) = header.get("spatialReference") else {
        return Ok(None);
    };

    let wkid = ["latestWkid", "wkid"]
        .iter()
        .find_map(|key| reference.get(*key).and_then(Value::as_i64));

    match wkid {
        Some(wkid) => Crs::from_wkid(wkid).map(Some),
        None => Err(GeodesyError::UnsupportedCrs {
            code: format!("spatialReference without wkid: {reference}"),
        }),
    }
}

struct CountingReader<'a, R> {
    inner: R,
    progress: &'a dyn ProgressCallback,
}

impl<R: Read> Read for CountingReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.progress.inc(u64::try_from(n).unwrap_or(u64::MAX));
        Ok(n)
    }
}

struct DocumentVisitor<'a, F> {
    on_feature: &'a mut F,
}

impl<'de, F> DeserializeSeed<'de> for DocumentVisitor<'_, F>
where
    F: FnMut(&Header, Value),
{
    type Value = Document;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Document, D::Error> {
        deserializer.deserialize_any(self)
    }
}

impl<'de, F> Visitor<'de> for DocumentVisitor<'_, F>
where
    F: FnMut(&Header, Value),
{
    type Value = Document;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a JSON array of fire records or an Esri FeatureSet object")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, seq: A) -> Result<Document, A::Error> {
        let header = Header::new();
        let feature_count = FeatureArray {
            header: &header,
            on_feature: self.on_feature,
        }
        .visit_seq(seq)?;

        Ok(Document {
            layout: Layout::RecordArray,
            header,
            feature_count,
        })
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Document, A::Error> {
        let on_feature = self.on_feature;
        let mut header = Header::new();
        let mut feature_count = None;

        while let Some(key) = map.next_key::<String>()? {
            if key == FEATURES_KEY {
                let count = map.next_value_seed(FeatureArray {
                    header: &header,
                    on_feature: &mut *on_feature,
                })?;
                *feature_count.get_or_insert(0) += count;
            } else {
                let value = map.next_value::<Value>()?;
                header.insert(key, value);
            }
        }

        let feature_count = feature_count
            .ok_or_else(|| <A::Error as de::Error>::missing_field(FEATURES_KEY))?;

        Ok(Document {
            layout: Layout::FeatureSet,
            header,
            feature_count,
        })
    }
}

struct FeatureArray<'a, F> {
    header: &'a Header,
    on_feature: &'a mut F,
}

impl<'de, F> DeserializeSeed<'de> for FeatureArray<'_, F>
where
    F: FnMut(&Header, Value),
{
    type Value = u64;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<u64, D::Error> {
        deserializer.deserialize_seq(self)
    }
}

impl<'de, F> Visitor<'de> for FeatureArray<'_, F>
where
    F: FnMut(&Header, Value),
{
    type Value = u64;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("an array of features")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<u64, A::Error> {
        let on_feature = self.on_feature;
        let mut count = 0;
        while let Some(feature) = seq.next_element::<Value>()? {
            on_feature(self.header, feature);
            count += 1;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};

    use smoke_batch::progress::NullProgress;

    use super::*;

    fn collect(input: &str) -> (Document, Vec<(usize, Value)>) {
        let mut seen = Vec::new();
        let document = read_features_from(input.as_bytes(), |header, feature| {
            seen.push((header.len(), feature));
        })
        .unwrap();
        (document, seen)
    }

    #[test]
    fn reads_record_array() {
        let (document, seen) = collect(r#"[{"Fire_Year": 2019}, {"Fire_Year": 2020}]"#);

        assert_eq!(document.layout, Layout::RecordArray);
        assert_eq!(document.feature_count, 2);
        assert!(document.header.is_empty());
        assert_eq!(seen[1].1["Fire_Year"], 2020);
    }

    #[test]
    fn reads_feature_set_with_header_before_features() {
        let input = r#"{
            "displayFieldName": "",
            "geometryType": "esriGeometryPolygon",
            "spatialReference": { "wkid": 102008 },
            "features": [
                { "attributes": { "OBJECTID": 1 }, "geometry": { "rings": [] } },
                { "attributes": { "OBJECTID": 2 }, "geometry": { "rings": [] } }
            ],
            "exceededTransferLimit": false
        }"#;
        let (document, seen) = collect(input);

        assert_eq!(document.layout, Layout::FeatureSet);
        assert_eq!(document.feature_count, 2);
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(|(header_len, _)| *header_len == 3));
        assert_eq!(
            document.header.keys().collect::<Vec<_>>(),
            vec![
                "displayFieldName",
                "geometryType",
                "spatialReference",
                "exceededTransferLimit"
            ]
        );
        assert_eq!(document.crs().unwrap(), Some(Crs::NorthAmericaAlbers));
    }

    #[test]
    fn empty_feature_set() {
        let (document, seen) = collect(r#"{"features": []}"#);
        assert_eq!(document.feature_count, 0);
        assert!(seen.is_empty());
    }

    #[test]
    fn rejects_bad_documents() {
        for input in [
            r#"{"geometryType": "esriGeometryPolygon"}"#,
            r#"{"features": 5}"#,
            r#"[{"Fire_Year": 2019},"#,
            "42",
            "[] trailing",
        ] {
            let result = read_features_from(input.as_bytes(), |_, _| {});
            assert!(matches!(result, Err(FireError::Json(_))), "{input}");
        }
    }

    #[test]
    fn latest_wkid_wins() {
        let header: Header =
            serde_json::from_str(r#"{"spatialReference": {"wkid": 102100, "latestWkid": 4326}}"#)
                .unwrap();
        assert_eq!(header_crs(&header).unwrap(), Some(Crs::Wgs84));
        assert_eq!(header_crs(&Header::new()).unwrap(), None);
    }

    #[test]
    fn unsupported_spatial_reference() {
        for input in [
            r#"{"spatialReference": {"wkid": 2163}}"#,
            r#"{"spatialReference": {"wkt": "PROJCS[...]"}}"#,
        ] {
            let header: Header = serde_json::from_str(input).unwrap();
            assert!(matches!(
                header_crs(&header),
                Err(GeodesyError::UnsupportedCrs { .. })
            ));
        }
    }

    struct ByteCounter(AtomicU64, AtomicU64);

    impl ProgressCallback for ByteCounter {
        fn set_total(&self, total: u64) {
            self.0.store(total, Ordering::Relaxed);
        }
        fn inc(&self, delta: u64) {
            self.1.fetch_add(delta, Ordering::Relaxed);
        }
        fn set_message(&self, _msg: String) {}
        fn finish(&self, _msg: String) {}
        fn finish_and_clear(&self) {}
    }

    #[test]
    fn inspect_reports_bytes_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fires.json");
        let contents = r#"{"spatialReference": {"wkid": 4326}, "features": [{}, {}, {}]}"#;
        std::fs::write(&path, contents).unwrap();

        let counter = ByteCounter(AtomicU64::new(0), AtomicU64::new(0));
        let document = inspect(&path, &counter).unwrap();

        assert_eq!(document.feature_count, 3);
        assert_eq!(document.crs().unwrap(), Some(Crs::Wgs84));
        assert_eq!(counter.0.load(Ordering::Relaxed), contents.len() as u64);
        assert_eq!(counter.1.load(Ordering::Relaxed), contents.len() as u64);
    }

    #[test]
    fn inspect_keeps_header_with_unsupported_crs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fires.json");
        std::fs::write(
            &path,
            r#"{"displayFieldName": "", "spatialReference": {"wkid": 2163}, "features": [{}]}"#,
        )
        .unwrap();

        let document = inspect(&path, &NullProgress).unwrap();

        assert_eq!(document.feature_count, 1);
        assert_eq!(document.header["spatialReference"]["wkid"], 2163);
        assert!(matches!(
            document.crs(),
            Err(GeodesyError::UnsupportedCrs { .. })
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        let result = inspect(Path::new("/nonexistent/fires.json"), &NullProgress);
        assert!(matches!(result, Err(FireError::Io(_))));
    }
}

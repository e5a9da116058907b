//! Stage runners behind the `smoke` subcommands.
//!
//! Each runner wires configuration, a progress bar, and the library call
//! together, then writes the stage output.

use std::path::Path;
use std::time::Instant;

use smoke_aqi::{AqsClient, aggregate_years};
use smoke_aqi_models::AqiYearRecord;
use smoke_batch::output::write_csv;
use smoke_cli_utils::{IndicatifProgress, MultiProgress};
use smoke_fire::extract::{self, FireTarget};
use smoke_fire::{PerimeterReducer, reduce_file};
use smoke_fire_models::ReducedFireRecord;
use smoke_geodesy::CountyBoundary;

use crate::config::SmokeConfig;

type StageResult = Result<(), Box<dyn std::error::Error>>;

/// Reduces the fire dataset to `wf_data.csv`.
pub fn reduce(config: &SmokeConfig, multi: &MultiProgress) -> StageResult {
    let start = Instant::now();
    let reducer = PerimeterReducer::new(config.reference.clone(), config.fire.input_crs);
    let progress = IndicatifProgress::bytes_bar(multi, "Reducing fire perimeters");

    let outcome = reduce_file(&config.fire.input, &reducer, progress.as_ref())?;
    write_csv(
        &config.fire.output,
        ReducedFireRecord::CSV_COLUMNS,
        &outcome.records,
    )?;

    log::info!(
        "Fire stage complete: {} rows, {} skipped, {:.1}s",
        outcome.records.len(),
        outcome.summary.skipped_count(),
        start.elapsed().as_secs_f64()
    );
    Ok(())
}

/// Aggregates yearly AQI to `aqi_data.csv`.
pub async fn aqi(config: &SmokeConfig, multi: &MultiProgress) -> StageResult {
    let start = Instant::now();
    let settings = &config.aqi;

    let boundary = settings
        .county_boundary
        .as_deref()
        .map(CountyBoundary::load)
        .transpose()?;
    let client = AqsClient::from_settings(settings)?;
    let progress = IndicatifProgress::steps_bar(multi, "Aggregating AQI");

    let outcome = aggregate_years(&client, settings, boundary.as_ref(), progress.as_ref()).await?;
    for coverage in &outcome.coverage {
        log::debug!(
            "{}: {} sensor(s), {} reading(s) from {}",
            coverage.year,
            coverage.sensors,
            coverage.readings,
            coverage.source
        );
    }
    write_csv(&settings.output, AqiYearRecord::CSV_COLUMNS, &outcome.records)?;

    log::info!(
        "AQI stage complete: {} years, {} skipped, {:.1}s",
        outcome.records.len(),
        outcome.summary.skipped_count(),
        start.elapsed().as_secs_f64()
    );
    Ok(())
}

/// Streams a dataset and prints what it contains.
pub fn inspect(input: &Path, multi: &MultiProgress) -> StageResult {
    let progress = IndicatifProgress::bytes_bar(multi, "Scanning");
    let document = smoke_fire::inspect(input, progress.as_ref())?;
    progress.finish_and_clear();

    println!("File:     {}", input.display());
    println!("Layout:   {:?}", document.layout);
    println!("Features: {}", document.feature_count);
    match document.crs() {
        Ok(Some(crs)) => println!("CRS:      {crs}"),
        Ok(None) => println!("CRS:      (not declared)"),
        Err(e) => println!("CRS:      {e}"),
    }
    if !document.header.is_empty() {
        println!();
        println!("{}", serde_json::to_string_pretty(&document.header)?);
    }
    Ok(())
}

/// Writes the features matching `targets` to a smaller dataset.
pub fn extract(
    input: &Path,
    output: &Path,
    targets: &[FireTarget],
    wildfire_only: bool,
    multi: &MultiProgress,
) -> StageResult {
    let progress = IndicatifProgress::bytes_bar(multi, "Extracting");
    let extraction = extract::extract_matching(input, targets, wildfire_only, progress.as_ref())?;
    extract::write_extraction(output, &extraction)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reduce_writes_wf_data() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("fires.json");
        std::fs::write(
            &input,
            r#"[
                { "Fire_Year": 2020, "USGS_Assigned_ID": 7, "Listed_Fire_Names": "NEAR",
                  "GIS_Acres": 12.5, "Assigned_Fire_Type": "Wildfire",
                  "rings": [[[-113.0, 36.0], [-114.0, 35.0], [-113.0, 36.0]]] },
                { "Fire_Year": 2020, "USGS_Assigned_ID": 8, "GIS_Acres": 1.0, "rings": [] }
            ]"#,
        )
        .unwrap();

        let mut config = SmokeConfig::default();
        config.fire.input = input;
        config.fire.output = dir.path().join("out/wf_data.csv");

        reduce(&config, &MultiProgress::new()).unwrap();

        let contents = std::fs::read_to_string(&config.fire.output).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], ReducedFireRecord::CSV_COLUMNS.join(","));
        assert!(lines[1].starts_with("2020,7,NEAR,12.5,Wildfire,35.0,-114.0,"));
    }

    #[test]
    fn reduce_with_every_record_skipped_still_writes_header() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("fires.json");
        std::fs::write(&input, r#"[{ "Fire_Year": 2020, "rings": [] }]"#).unwrap();

        let mut config = SmokeConfig::default();
        config.fire.input = input;
        config.fire.output = dir.path().join("wf_data.csv");

        reduce(&config, &MultiProgress::new()).unwrap();

        assert_eq!(
            std::fs::read_to_string(&config.fire.output).unwrap(),
            "year,id,name,size,type,close_lat,close_lon,distance\n"
        );
    }
}

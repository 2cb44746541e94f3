//! The module responsible for writing output data to disk.
use crate::region::RegionID;
use crate::simulation::SkippedRegion;
use crate::simulation::diagnostics::RunDiagnostics;
use crate::simulation::region::ForecastRow;
use anyhow::{Context, Result, ensure};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fs;
use std::fs::File;
use std::path::{Path, PathBuf};

pub mod metadata;

/// The root folder in which model-specific output folders will be created
const OUTPUT_DIRECTORY_ROOT: &str = "disruption_results";

/// The output file name for forecasts
const FORECAST_FILE_NAME: &str = "forecast.csv";

/// The output file name for per-region diagnostics
const DIAGNOSTICS_FILE_NAME: &str = "diagnostics.csv";

/// The output file name for validation results
const VALIDATION_FILE_NAME: &str = "validation.csv";

/// The status written for regions which could not be forecast
const SKIPPED_STATUS: &str = "skipped";

/// Get the model name from the specified directory path
pub fn get_output_dir(model_dir: &Path) -> Result<PathBuf> {
    // Get the model name from the dir path. This ends up being convoluted because we need to check
    // for all possible errors. Ugh.
    let model_dir = model_dir
        .canonicalize() // canonicalise in case the user has specified "."
        .context("Could not resolve path to model")?;

    let model_name = model_dir
        .file_name()
        .context("Model cannot be in root folder")?
        .to_str()
        .context("Invalid chars in model dir name")?;

    // Construct path
    Ok([OUTPUT_DIRECTORY_ROOT, model_name].iter().collect())
}

/// Create a new output directory for the model specified at `model_dir`.
///
/// # Returns
///
/// Whether an existing directory is being overwritten. An error is returned if the directory
/// already exists and `allow_overwrite` is false.
pub fn create_output_directory(output_dir: &Path, allow_overwrite: bool) -> Result<bool> {
    let overwrite = output_dir.is_dir();
    if overwrite {
        ensure!(
            allow_overwrite,
            "Output folder already exists. Use --overwrite or change the overwrite setting to \
            replace it."
        );

        // Clear out old results
        fs::remove_dir_all(output_dir)?;
    }

    // Try to create the directory, with parents
    fs::create_dir_all(output_dir)?;

    Ok(overwrite)
}

/// Join labels into a single CSV field
fn join_labels<T: ToString>(labels: impl IntoIterator<Item = T>) -> String {
    labels.into_iter().map(|label| label.to_string()).join(";")
}

/// Represents a row in the forecast CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct ForecastRecord {
    region_id: RegionID,
    year: u32,
    is_historical: bool,
    market: f64,
    disruptor_demand: f64,
    chimera_demand: f64,
    incumbent_demand: f64,
    disruptor_share: f64,
    chimera_share: f64,
    incumbent_share: f64,
    disruptor_installed_base: f64,
    chimera_installed_base: f64,
    incumbent_installed_base: f64,
    new_build: f64,
    replacement: f64,
    contestable_market: f64,
    flags: String,
}

impl From<&ForecastRow> for ForecastRecord {
    fn from(row: &ForecastRow) -> Self {
        Self {
            region_id: row.region_id.clone(),
            year: row.year,
            is_historical: row.is_historical,
            market: row.market.value(),
            disruptor_demand: row.disruptor_demand.value(),
            chimera_demand: row.chimera_demand.value(),
            incumbent_demand: row.incumbent_demand.value(),
            disruptor_share: row.disruptor_share.value(),
            chimera_share: row.chimera_share.value(),
            incumbent_share: row.incumbent_share.value(),
            disruptor_installed_base: row.disruptor_installed_base.value(),
            chimera_installed_base: row.chimera_installed_base.value(),
            incumbent_installed_base: row.incumbent_installed_base.value(),
            new_build: row.new_build.value(),
            replacement: row.replacement.value(),
            contestable_market: row.contestable_market.value(),
            flags: join_labels(&row.flags),
        }
    }
}

/// Represents a row in the diagnostics CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct DiagnosticsRecord {
    region_id: RegionID,
    status: String,
    tipping_year: Option<u32>,
    persistence_years: Option<u32>,
    method: Option<String>,
    ceiling: Option<f64>,
    steepness: Option<f64>,
    inflection: Option<f64>,
    cost_sensitivity: Option<f64>,
    degradations: String,
}

impl From<&RunDiagnostics> for DiagnosticsRecord {
    fn from(diagnostics: &RunDiagnostics) -> Self {
        let params = diagnostics.params.as_ref();
        Self {
            region_id: diagnostics.region_id.clone(),
            status: diagnostics.status().to_string(),
            tipping_year: diagnostics.tipping_point.year,
            persistence_years: Some(diagnostics.tipping_point.persistence_years),
            method: Some(diagnostics.method.to_string()),
            ceiling: params.map(|params| params.ceiling),
            steepness: params.map(|params| params.steepness),
            inflection: params.map(|params| params.inflection),
            cost_sensitivity: params.map(|params| params.cost_sensitivity),
            degradations: join_labels(
                diagnostics
                    .degradations
                    .iter()
                    .map(|degradation| degradation.label()),
            ),
        }
    }
}

impl From<&SkippedRegion> for DiagnosticsRecord {
    fn from(skipped: &SkippedRegion) -> Self {
        Self {
            region_id: skipped.region_id.clone(),
            status: SKIPPED_STATUS.to_string(),
            tipping_year: None,
            persistence_years: None,
            method: None,
            ceiling: None,
            steepness: None,
            inflection: None,
            cost_sensitivity: None,
            degradations: skipped.reason.clone(),
        }
    }
}

/// Represents a row in the validation CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct ValidationRecord {
    region_id: RegionID,
    check: String,
    status: String,
    magnitude: f64,
    message: String,
    years: String,
}

/// An object for writing forecasts and diagnostics to file
pub struct DataWriter {
    forecast_writer: csv::Writer<File>,
    diagnostics_writer: csv::Writer<File>,
    validation_writer: csv::Writer<File>,
}

impl DataWriter {
    /// Open CSV files to write output data to
    ///
    /// # Arguments
    ///
    /// * `output_path` - Folder where files will be saved
    pub fn create(output_path: &Path) -> Result<Self> {
        let new_writer = |file_name| {
            let file_path = output_path.join(file_name);
            csv::Writer::from_path(file_path)
        };

        Ok(Self {
            forecast_writer: new_writer(FORECAST_FILE_NAME)?,
            diagnostics_writer: new_writer(DIAGNOSTICS_FILE_NAME)?,
            validation_writer: new_writer(VALIDATION_FILE_NAME)?,
        })
    }

    /// Write forecast rows to a CSV file
    pub fn write_forecast(&mut self, rows: &[ForecastRow]) -> Result<()> {
        for row in rows {
            self.forecast_writer.serialize(ForecastRecord::from(row))?;
        }

        Ok(())
    }

    /// Write a region's diagnostics to a CSV file
    pub fn write_diagnostics(&mut self, diagnostics: &RunDiagnostics) -> Result<()> {
        self.diagnostics_writer
            .serialize(DiagnosticsRecord::from(diagnostics))?;

        Ok(())
    }

    /// Record a region which could not be forecast in the diagnostics CSV file
    pub fn write_skipped(&mut self, skipped: &SkippedRegion) -> Result<()> {
        self.diagnostics_writer
            .serialize(DiagnosticsRecord::from(skipped))?;

        Ok(())
    }

    /// Write a region's validation results to a CSV file
    pub fn write_validation(&mut self, diagnostics: &RunDiagnostics) -> Result<()> {
        for result in &diagnostics.validation.results {
            let record = ValidationRecord {
                region_id: diagnostics.region_id.clone(),
                check: result.check.to_string(),
                status: result.status.to_string(),
                magnitude: result.magnitude,
                message: result.message.clone(),
                years: join_labels(&result.years),
            };
            self.validation_writer.serialize(record)?;
        }

        Ok(())
    }

    /// Flush the underlying streams
    pub fn flush(&mut self) -> Result<()> {
        self.forecast_writer.flush()?;
        self.diagnostics_writer.flush()?;
        self.validation_writer.flush()?;

        Ok(())
    }
}

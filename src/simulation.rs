//! Functionality for running the forecast.
use crate::model::Model;
use crate::output::DataWriter;
use crate::output::metadata::write_metadata;
use crate::region::RegionID;
use anyhow::{Result, ensure};
use itertools::Itertools;
use log::{error, info, warn};
use rayon::prelude::*;
use std::path::Path;

pub mod adoption;
pub mod aggregate;
use aggregate::aggregate_regions;
pub mod cost;
pub mod decomposition;
pub mod diagnostics;
use diagnostics::Degradation;
pub mod installed_base;
pub mod market;
pub mod optimiser;
use optimiser::DifferentialEvolution;
pub mod region;
use region::{ForecastRow, RegionForecast, forecast_region};
pub mod split;
pub mod trend;
pub mod validation;
use validation::RunStatus;

/// A region for which no forecast could be produced
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedRegion {
    /// The region
    pub region_id: RegionID,
    /// Why the region was skipped
    pub reason: String,
}

/// The forecasts for every region of a model
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastResults {
    /// Forecasts for each region, in the order the regions were defined
    pub regions: Vec<RegionForecast>,
    /// Regions for which no forecast could be produced
    pub skipped: Vec<SkippedRegion>,
    /// The sum of all regional forecasts
    pub global: Vec<ForecastRow>,
}

/// Forecast every region of the model under a scenario.
///
/// Regions are forecast in parallel. A region which cannot be forecast is skipped and does not
/// prevent the other regions from being forecast.
pub fn forecast_all(model: &Model, scenario_name: &str) -> Result<ForecastResults> {
    let scenario = model.parameters.get_scenario(scenario_name)?;
    let optimiser = DifferentialEvolution::from_parameters(&model.parameters.optimiser);

    let outcomes = model
        .regions
        .values()
        .collect_vec()
        .into_par_iter()
        .map(|region| {
            let outcome = forecast_region(model, region, scenario, &optimiser);
            (region.id.clone(), outcome)
        })
        .collect::<Vec<_>>();

    let mut regions = Vec::new();
    let mut skipped = Vec::new();
    for (region_id, outcome) in outcomes {
        match outcome {
            Ok(Some(forecast)) => regions.push(forecast),
            Ok(None) => {
                let reason = Degradation::MissingRegionalData.to_string();
                warn!("Skipping region {region_id}: {reason}");
                skipped.push(SkippedRegion { region_id, reason });
            }
            Err(err) => {
                error!("Failed to forecast region {region_id}: {err:?}");
                skipped.push(SkippedRegion {
                    region_id,
                    reason: format!("{err:#}"),
                });
            }
        }
    }

    let global = aggregate_regions(&regions);

    Ok(ForecastResults {
        regions,
        skipped,
        global,
    })
}

/// Run the forecast and write the results to disk.
///
/// # Arguments:
///
/// * `model` - The model to run
/// * `scenario_name` - The name of the scenario to run
/// * `output_path` - The folder to which output files will be written
pub fn run(model: &Model, scenario_name: &str, output_path: &Path) -> Result<()> {
    info!("Running scenario: {scenario_name}");
    let results = forecast_all(model, scenario_name)?;

    let mut writer = DataWriter::create(output_path)?;
    for forecast in &results.regions {
        writer.write_forecast(&forecast.rows)?;
        writer.write_diagnostics(&forecast.diagnostics)?;
        writer.write_validation(&forecast.diagnostics)?;
    }
    writer.write_forecast(&results.global)?;
    for skipped in &results.skipped {
        writer.write_skipped(skipped)?;
    }
    writer.flush()?;
    write_metadata(output_path, &model.model_path, scenario_name)?;

    let invalid = results
        .regions
        .iter()
        .filter(|forecast| forecast.diagnostics.status() == RunStatus::Invalid)
        .count();
    info!(
        "Forecast {} region(s): {} valid, {invalid} invalid, {} skipped",
        results.regions.len(),
        results.regions.len() - invalid,
        results.skipped.len()
    );
    ensure!(
        !results.regions.is_empty(),
        "No region could be forecast"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Metric;
    use crate::fixture::model;
    use crate::region::GLOBAL_REGION_ID;
    use crate::technology::TechnologyRole;
    use crate::time_series::TimeSeries;
    use rstest::rstest;

    #[rstest]
    fn test_forecast_all(model: Model) {
        let results = forecast_all(&model, "baseline").unwrap();
        assert_eq!(results.regions.len(), 1);
        assert_eq!(results.regions[0].diagnostics.region_id, "GBR".into());
        assert_eq!(
            results.skipped,
            [SkippedRegion {
                region_id: "USA".into(),
                reason: Degradation::MissingRegionalData.to_string(),
            }]
        );

        // With only one region, the global forecast matches it
        assert_eq!(results.global.len(), results.regions[0].rows.len());
        assert_eq!(results.global[0].region_id, GLOBAL_REGION_ID.into());
        assert_eq!(results.global[0].market, results.regions[0].rows[0].market);
    }

    #[rstest]
    fn test_forecast_all_region_error(mut model: Model) {
        // USA market data starts after the horizon year
        model.historical_data.insert(
            TechnologyRole::Market,
            Metric::Demand,
            TimeSeries::from_fn("USA".into(), 2040..=2045, |_| 500.0),
        );

        let results = forecast_all(&model, "baseline").unwrap();
        assert_eq!(results.skipped.len(), 1);
        let skipped = &results.skipped[0];
        assert_eq!(skipped.region_id, "USA".into());
        assert!(
            skipped
                .reason
                .contains("Horizon year 2035 is before the first year of market data (2040)"),
            "{}",
            skipped.reason
        );

        // GBR is still forecast and makes up the global forecast
        assert_eq!(results.regions.len(), 1);
        assert_eq!(results.regions[0].diagnostics.region_id, "GBR".into());
        assert_eq!(results.global.len(), results.regions[0].rows.len());
        assert_eq!(results.global[0].market, results.regions[0].rows[0].market);
    }

    #[rstest]
    fn test_forecast_all_unknown_scenario(model: Model) {
        assert!(forecast_all(&model, "made_up").is_err());
    }
}

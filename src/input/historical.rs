//! Code for reading historical cost, demand and installed base data.
use super::*;
use crate::dataset::{HistoricalData, Metric};
use crate::id::IDCollection;
use crate::region::{RegionID, RegionMap};
use crate::technology::{TechnologyMap, TechnologyRole};
use crate::time_series::TimeSeries;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

const HISTORICAL_DATA_FILE_NAME: &str = "historical_data.csv";

/// Represents a row of the historical data CSV file
#[derive(Debug, Clone, Deserialize, PartialEq)]
struct HistoricalDataRaw {
    region_id: String,
    technology_id: String,
    metric: Metric,
    year: u32,
    value: f64,
}

/// Read the historical data CSV file.
///
/// # Arguments
///
/// * `model_dir` - Folder containing model configuration files
/// * `regions` - All regions in the model
/// * `technologies` - All technologies in the model
///
/// # Returns
///
/// One [`TimeSeries`] for each combination of region, technology and metric found in the file.
pub fn read_historical_data(
    model_dir: &Path,
    regions: &RegionMap,
    technologies: &TechnologyMap,
) -> Result<HistoricalData> {
    let file_path = model_dir.join(HISTORICAL_DATA_FILE_NAME);
    let iter = read_csv(&file_path)?;
    read_historical_data_from_iter(iter, regions, technologies)
        .with_context(|| input_err_msg(&file_path))
}

fn read_historical_data_from_iter<I>(
    iter: I,
    regions: &RegionMap,
    technologies: &TechnologyMap,
) -> Result<HistoricalData>
where
    I: Iterator<Item = HistoricalDataRaw>,
{
    let mut grouped: HashMap<(RegionID, TechnologyRole, Metric), BTreeMap<u32, f64>> =
        HashMap::new();
    for row in iter {
        let region_id = regions.get_id(&row.region_id)?;
        let technology_id = technologies.get_id(&row.technology_id)?;
        let role = technologies[&technology_id].role;

        ensure!(
            row.value.is_finite() && row.value >= 0.0,
            "Invalid value {} for technology {technology_id} in region {region_id} ({}): values \
            must be finite and non-negative",
            row.value,
            row.year
        );
        ensure!(
            role != TechnologyRole::Market || row.metric == Metric::Demand,
            "Only demand data can be provided for the market technology {technology_id}"
        );

        let values = grouped.entry((region_id, role, row.metric)).or_default();
        ensure!(
            values.insert(row.year, row.value).is_none(),
            "Multiple {} entries for technology {technology_id} in region {} and year {}",
            row.metric,
            row.region_id,
            row.year
        );
    }

    let mut data = HistoricalData::new();
    for ((region_id, role, metric), values) in grouped {
        let (years, values) = values.into_iter().unzip();
        data.insert(role, metric, TimeSeries::new(region_id, years, values)?);
    }

    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::DatasetProvider;
    use crate::fixture::{regions, technologies};
    use rstest::rstest;

    fn row(
        region_id: &str,
        technology_id: &str,
        metric: Metric,
        year: u32,
        value: f64,
    ) -> HistoricalDataRaw {
        HistoricalDataRaw {
            region_id: region_id.into(),
            technology_id: technology_id.into(),
            metric,
            year,
            value,
        }
    }

    #[rstest]
    fn test_read_historical_data_from_iter(regions: RegionMap, technologies: TechnologyMap) {
        // NB: rows are deliberately out of year order
        let rows = [
            row("GBR", "BEV", Metric::Cost, 2021, 35000.0),
            row("GBR", "BEV", Metric::Cost, 2020, 40000.0),
            row("GBR", "CARS", Metric::Demand, 2020, 100.0),
        ];
        let data = read_historical_data_from_iter(rows.into_iter(), &regions, &technologies)
            .unwrap();
        assert_eq!(data.len(), 2);

        let series = data
            .get_series(&"GBR".into(), TechnologyRole::Disruptor, Metric::Cost)
            .unwrap();
        assert_eq!(series.years(), [2020, 2021]);
        assert_eq!(series.values(), [40000.0, 35000.0]);
    }

    #[rstest]
    #[case(row("FRA", "BEV", Metric::Cost, 2020, 1.0))] // Unknown region
    #[case(row("GBR", "FCEV", Metric::Cost, 2020, 1.0))] // Unknown technology
    #[case(row("GBR", "BEV", Metric::Cost, 2020, -1.0))] // Negative value
    #[case(row("GBR", "BEV", Metric::Cost, 2020, f64::NAN))] // Invalid value
    #[case(row("GBR", "CARS", Metric::Cost, 2020, 1.0))] // Market cost
    fn test_read_historical_data_from_iter_bad_row(
        regions: RegionMap,
        technologies: TechnologyMap,
        #[case] bad_row: HistoricalDataRaw,
    ) {
        assert!(
            read_historical_data_from_iter(std::iter::once(bad_row), &regions, &technologies)
                .is_err()
        );
    }

    #[rstest]
    fn test_read_historical_data_from_iter_duplicate(
        regions: RegionMap,
        technologies: TechnologyMap,
    ) {
        let rows = [
            row("GBR", "ICE", Metric::Demand, 2020, 1.0),
            row("GBR", "ICE", Metric::Demand, 2020, 2.0),
        ];
        assert!(read_historical_data_from_iter(rows.into_iter(), &regions, &technologies).is_err());
    }
}

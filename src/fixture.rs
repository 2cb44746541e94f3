//! Fixtures for tests

use crate::dataset::{HistoricalData, Metric};
use crate::model::{BASELINE_SCENARIO, Model, ModelParameters};
use crate::region::{Region, RegionID, RegionMap};
use crate::simulation::optimiser::DifferentialEvolution;
use crate::simulation::region::{ForecastRow, RegionForecast, forecast_region};
use crate::technology::{Technology, TechnologyMap, TechnologyRole};
use crate::time_series::TimeSeries;
use crate::units::{Dimensionless, Flow, Stock, Year};
use indexmap::indexmap;
use rstest::fixture;
use std::path::PathBuf;

/// Assert that an error with the given message occurs
macro_rules! assert_error {
    ($result:expr, $msg:expr) => {
        assert_eq!(
            $result.unwrap_err().chain().next().unwrap().to_string(),
            $msg
        );
    };
}
pub(crate) use assert_error;

/// Market demand in GBR, which is flat
const MARKET_DEMAND: f64 = 1000.0;

#[fixture]
pub fn regions() -> RegionMap {
    indexmap! {
        "GBR".into() => Region {
            id: "GBR".into(),
            description: "United Kingdom".into(),
            adoption_ceiling: None,
        },
        "USA".into() => Region {
            id: "USA".into(),
            description: "United States".into(),
            adoption_ceiling: Some(Dimensionless(0.9)),
        },
    }
}

fn technology(id: &str, role: TechnologyRole, lifetime: Option<f64>) -> Technology {
    Technology {
        id: id.into(),
        description: format!("{id} description"),
        role,
        lifetime: lifetime.map(Year),
    }
}

#[fixture]
pub fn technologies() -> TechnologyMap {
    [
        technology("BEV", TechnologyRole::Disruptor, Some(15.0)),
        technology("ICE", TechnologyRole::Incumbent, Some(15.0)),
        technology("PHEV", TechnologyRole::Chimera, Some(12.0)),
        technology("CARS", TechnologyRole::Market, None),
    ]
    .into_iter()
    .map(|tech| (tech.id.clone(), tech))
    .collect()
}

#[fixture]
pub fn model_parameters() -> ModelParameters {
    let mut params: ModelParameters = toml::from_str("horizon_year = 2035").unwrap();
    params
        .scenarios
        .entry(BASELINE_SCENARIO.to_string())
        .or_default();
    params
}

/// The disruptor's historical share of the GBR market
pub fn disruptor_share(year: u32) -> f64 {
    0.8 / (1.0 + (-0.35 * (f64::from(year) - 2022.0)).exp())
}

/// Historical data for GBR, covering 2010 to 2020. There is no data for USA.
///
/// The disruptor becomes cheaper than the incumbent in 2015.
#[fixture]
pub fn historical_data() -> HistoricalData {
    let years = 2010..=2020;
    let series = |f: &dyn Fn(u32) -> f64| TimeSeries::from_fn("GBR".into(), years.clone(), f);

    let mut data = HistoricalData::new();
    data.insert(
        TechnologyRole::Disruptor,
        Metric::Cost,
        series(&|year| 40000.0 * 0.9_f64.powf(f64::from(year - 2010))),
    );
    data.insert(
        TechnologyRole::Incumbent,
        Metric::Cost,
        series(&|_| 25000.0),
    );
    data.insert(
        TechnologyRole::Market,
        Metric::Demand,
        series(&|_| MARKET_DEMAND),
    );
    data.insert(
        TechnologyRole::Disruptor,
        Metric::Demand,
        series(&|year| MARKET_DEMAND * disruptor_share(year)),
    );
    data.insert(
        TechnologyRole::Incumbent,
        Metric::Demand,
        series(&|year| MARKET_DEMAND * (1.0 - disruptor_share(year))),
    );

    data
}

#[fixture]
pub fn model(
    regions: RegionMap,
    technologies: TechnologyMap,
    model_parameters: ModelParameters,
    historical_data: HistoricalData,
) -> Model {
    Model {
        model_path: PathBuf::from("model"),
        parameters: model_parameters,
        regions,
        technologies,
        historical_data,
    }
}

/// Forecast a region of the model under the baseline scenario
pub fn region_forecast(model: &Model, region_id: &str) -> Option<RegionForecast> {
    let region = &model.regions[&RegionID::from(region_id)];
    let scenario = model.parameters.get_scenario(BASELINE_SCENARIO).unwrap();
    let optimiser = DifferentialEvolution::from_parameters(&model.parameters.optimiser);
    forecast_region(model, region, scenario, &optimiser).unwrap()
}

/// A self-consistent forecast row for GBR, with the incumbent taking the rest of the market
pub fn forecast_row(year: u32, market: f64, disruptor_share: f64, chimera_share: f64) -> ForecastRow {
    let incumbent_share = 1.0 - disruptor_share - chimera_share;
    let installed_base = |share: f64| Stock(share * market * 10.0);

    ForecastRow {
        region_id: "GBR".into(),
        year,
        is_historical: false,
        market: Flow(market),
        disruptor_demand: Flow(disruptor_share * market),
        chimera_demand: Flow(chimera_share * market),
        incumbent_demand: Flow(incumbent_share * market),
        disruptor_share: Dimensionless(disruptor_share),
        chimera_share: Dimensionless(chimera_share),
        incumbent_share: Dimensionless(incumbent_share),
        disruptor_installed_base: installed_base(disruptor_share),
        chimera_installed_base: installed_base(chimera_share),
        incumbent_installed_base: installed_base(incumbent_share),
        new_build: Flow(0.0),
        replacement: Flow(market),
        contestable_market: Flow(incumbent_share * market / 10.0),
        flags: Vec::new(),
    }
}

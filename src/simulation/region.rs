//! The forecasting pipeline for a single region.
use super::adoption::{AdoptionContext, forecast_adoption, historical_shares};
use super::cost::{CostForecastOptions, forecast_costs};
use super::decomposition::decompose_market;
use super::diagnostics::{Degradation, RunDiagnostics, push_unique};
use super::installed_base::{StockRecord, track_installed_base};
use super::market::forecast_market;
use super::optimiser::Optimiser;
use super::split::{ChimeraProfile, DemandSplit, split_market};
use super::validation::{ActualDemand, CheckStatus, ValidationCheck, validate_forecast};
use crate::dataset::{DatasetProvider, Metric};
use crate::model::{Model, Scenario};
use crate::region::{Region, RegionID};
use crate::technology::TechnologyRole;
use crate::time_series::TimeSeries;
use crate::units::{Dimensionless, Flow, Stock};
use anyhow::{Context, Result};
use itertools::Itertools;
use log::{debug, info, warn};

/// The forecast for one region in one year
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastRow {
    /// The region
    pub region_id: RegionID,
    /// The year
    pub year: u32,
    /// Whether the year is covered by historical market data
    pub is_historical: bool,
    /// Total market demand
    pub market: Flow,
    /// Demand for the disruptor
    pub disruptor_demand: Flow,
    /// Demand for the chimera
    pub chimera_demand: Flow,
    /// Demand for the incumbent
    pub incumbent_demand: Flow,
    /// The disruptor's share of the market
    pub disruptor_share: Dimensionless,
    /// The chimera's share of the market
    pub chimera_share: Dimensionless,
    /// The incumbent's share of the market
    pub incumbent_share: Dimensionless,
    /// Installed base of the disruptor at the start of the year
    pub disruptor_installed_base: Stock,
    /// Installed base of the chimera at the start of the year
    pub chimera_installed_base: Stock,
    /// Installed base of the incumbent at the start of the year
    pub incumbent_installed_base: Stock,
    /// Demand due to market growth
    pub new_build: Flow,
    /// Demand due to units reaching end of life
    pub replacement: Flow,
    /// Incumbent units reaching end of life, which the disruptor can compete for
    pub contestable_market: Flow,
    /// Validation checks which failed in this year
    pub flags: Vec<ValidationCheck>,
}

impl ForecastRow {
    /// Demand for the technology with the given role
    pub fn demand(&self, role: TechnologyRole) -> Flow {
        match role {
            TechnologyRole::Disruptor => self.disruptor_demand,
            TechnologyRole::Chimera => self.chimera_demand,
            TechnologyRole::Incumbent => self.incumbent_demand,
            TechnologyRole::Market => self.market,
        }
    }
}

/// The complete forecast for a region
#[derive(Debug, Clone, PartialEq)]
pub struct RegionForecast {
    /// One row per year of the timeline
    pub rows: Vec<ForecastRow>,
    /// How the forecast was produced and whether it is valid
    pub diagnostics: RunDiagnostics,
}

impl RegionForecast {
    /// The row for the given year, if there is one
    pub fn row(&self, year: u32) -> Option<&ForecastRow> {
        self.rows.iter().find(|row| row.year == year)
    }
}

/// Installed base records for the technologies present in the model
struct InstalledBase {
    disruptor: Vec<StockRecord>,
    chimera: Option<Vec<StockRecord>>,
    incumbent: Vec<StockRecord>,
}

impl InstalledBase {
    fn iter(&self) -> impl Iterator<Item = &Vec<StockRecord>> {
        [&self.disruptor, &self.incumbent]
            .into_iter()
            .chain(self.chimera.as_ref())
    }

    /// Total retirements across technologies for each year
    fn total_retirements(&self) -> Vec<Flow> {
        (0..self.disruptor.len())
            .map(|i| self.iter().map(|records| records[i].retirements).sum())
            .collect()
    }

    /// The largest mass balance residual across technologies for each year
    fn max_residuals(&self) -> Vec<f64> {
        (0..self.disruptor.len())
            .map(|i| {
                self.iter()
                    .map(|records| records[i].residual)
                    .fold(0.0, f64::max)
            })
            .collect()
    }
}

/// Get the demand for one technology from the market split
fn demand_for(splits: &[(u32, DemandSplit)], role: TechnologyRole) -> Vec<(u32, Flow)> {
    splits
        .iter()
        .map(|(year, split)| {
            let demand = match role {
                TechnologyRole::Disruptor => split.disruptor,
                TechnologyRole::Chimera => split.chimera,
                _ => split.incumbent,
            };
            (*year, demand)
        })
        .collect()
}

/// Track the installed base for the technology with the given role, if the model has one.
///
/// The tracker starts from the latest historical installed base at or before the first year of
/// the split. If installed base data only exists for later years, it cannot be used and a
/// degradation is recorded.
fn track_role(
    model: &Model,
    region_id: &RegionID,
    role: TechnologyRole,
    splits: &[(u32, DemandSplit)],
    degradations: &mut Vec<Degradation>,
) -> Result<Option<Vec<StockRecord>>> {
    let Some(technology) = model.technology(role) else {
        return Ok(None);
    };
    let lifetime = technology
        .lifetime
        .with_context(|| format!("No lifetime given for technology {}", technology.id))?;

    let history = model
        .historical_data
        .get_series(region_id, role, Metric::InstalledBase);
    let mut initial_stock = None;
    if let (Some(history), Some((start_year, _))) = (history, splits.first()) {
        match history.latest_at_or_before(*start_year) {
            Some((year, stock)) => {
                if year < *start_year {
                    debug!(
                        "Using {year} installed base of {} as {start_year} stock for {region_id}",
                        technology.id
                    );
                }
                initial_stock = Some(Stock(stock));
            }
            None => {
                warn!(
                    "Region {region_id}: {} (ignoring installed base of {} from {} onwards)",
                    Degradation::InstalledBaseDataTooLate,
                    technology.id,
                    history.first_year().unwrap_or(*start_year)
                );
                push_unique(degradations, Degradation::InstalledBaseDataTooLate);
            }
        }
    }

    let records = track_installed_base(
        technology.id.clone(),
        lifetime,
        model.parameters.validation.mass_balance_tolerance,
        initial_stock,
        &demand_for(splits, role),
    )?;

    Ok(Some(records))
}

/// A technology's share of the market
fn share_of(demand: Flow, market: Flow) -> Dimensionless {
    if market > Flow(0.0) {
        demand / market
    } else {
        Dimensionless(0.0)
    }
}

/// Forecast a single region.
///
/// # Arguments
///
/// * `model` - The model
/// * `region` - The region to forecast
/// * `scenario` - The scenario to run
/// * `optimiser` - Optimiser used to fit the adoption curve
///
/// # Returns
///
/// The forecast, or `None` if the region has no market data. An error indicates that the
/// region's data is malformed.
pub fn forecast_region(
    model: &Model,
    region: &Region,
    scenario: &Scenario,
    optimiser: &dyn Optimiser,
) -> Result<Option<RegionForecast>> {
    let params = &model.parameters;
    let data = &model.historical_data;
    let region_id = &region.id;

    let Some(market_history) = data.get_series(region_id, TechnologyRole::Market, Metric::Demand)
    else {
        return Ok(None);
    };
    info!("Forecasting region {region_id}");

    let market = forecast_market(market_history, params.horizon_year, params.max_market_cagr)?;
    let (Some(start_year), Some(end_year)) =
        (market.demand.first_year(), market.demand.last_year())
    else {
        // Market forecasts always contain at least one year
        return Ok(None);
    };

    let costs = forecast_costs(
        data.get_series(region_id, TechnologyRole::Disruptor, Metric::Cost),
        data.get_series(region_id, TechnologyRole::Incumbent, Metric::Cost),
        &CostForecastOptions {
            smoothing_window: params.smoothing_window,
            horizon_year: params.horizon_year,
            persistence_years: params.persistence_years,
            cost_decline_rate_override: scenario.cost_decline_rate_override,
        },
    );

    let shares = data
        .get_series(region_id, TechnologyRole::Disruptor, Metric::Demand)
        .map_or_else(
            || TimeSeries::from_pairs(region_id.clone(), []),
            |demand| historical_shares(demand, market_history),
        );
    let adoption = forecast_adoption(&AdoptionContext {
        region_id,
        timeline: start_year..=end_year,
        historical_shares: &shares,
        costs: &costs,
        ceiling: model.adoption_ceiling(region).value(),
        parameters: params,
        acceleration: scenario.acceleration_multiplier,
        optimiser,
    });
    if let Some(logistic) = &adoption.curve.params {
        debug!("Adoption curve parameters for region {region_id}: {logistic:?}");
    }

    let mut degradations = Vec::new();
    for degradation in costs
        .degradations
        .iter()
        .chain(&market.degradations)
        .chain(&adoption.degradations)
    {
        push_unique(&mut degradations, *degradation);
    }
    for degradation in &degradations {
        warn!("Region {region_id}: {degradation}");
    }

    let chimera = model
        .technology(TechnologyRole::Chimera)
        .map(|_| ChimeraProfile {
            peak_share: params.chimera_peak_share,
            half_life: params.chimera_half_life,
            start_year,
            tipping_year: costs.tipping_point.year,
            horizon_year: end_year,
        });
    let splits = split_market(
        &market.demand,
        &adoption.curve.shares,
        chimera.as_ref(),
        params.validation.sum_tolerance,
    );
    for (year, _) in splits.iter().filter(|(_, split)| split.rescaled) {
        debug!("Rescaled disruptor and chimera demand to fit market for {region_id} in {year}");
    }

    let installed_base = InstalledBase {
        disruptor: track_role(
            model,
            region_id,
            TechnologyRole::Disruptor,
            &splits,
            &mut degradations,
        )?
        .context("Model has no disruptor technology")?,
        chimera: track_role(
            model,
            region_id,
            TechnologyRole::Chimera,
            &splits,
            &mut degradations,
        )?,
        incumbent: track_role(
            model,
            region_id,
            TechnologyRole::Incumbent,
            &splits,
            &mut degradations,
        )?
        .context("Model has no incumbent technology")?,
    };
    let decomposition = decompose_market(&market.demand, &installed_base.total_retirements());

    let mut rows = splits
        .iter()
        .zip(&decomposition)
        .enumerate()
        .map(|(i, ((year, split), decomposed))| {
            let market_demand = Flow(market.demand.values()[i]);
            let chimera_records = installed_base.chimera.as_ref().map(|records| &records[i]);
            ForecastRow {
                region_id: region_id.clone(),
                year: *year,
                is_historical: market.is_historical(*year),
                market: market_demand,
                disruptor_demand: split.disruptor,
                chimera_demand: split.chimera,
                incumbent_demand: split.incumbent,
                disruptor_share: share_of(split.disruptor, market_demand),
                chimera_share: share_of(split.chimera, market_demand),
                incumbent_share: share_of(split.incumbent, market_demand),
                disruptor_installed_base: installed_base.disruptor[i].stock,
                chimera_installed_base: chimera_records.map_or(Stock(0.0), |record| record.stock),
                incumbent_installed_base: installed_base.incumbent[i].stock,
                new_build: decomposed.new_build,
                replacement: decomposed.replacement,
                contestable_market: installed_base.incumbent[i].retirements,
                flags: Vec::new(),
            }
        })
        .collect_vec();

    let actuals = [
        TechnologyRole::Disruptor,
        TechnologyRole::Incumbent,
        TechnologyRole::Chimera,
    ]
    .into_iter()
    .filter_map(|role| {
        data.get_series(region_id, role, Metric::Demand)
            .map(|demand| ActualDemand { role, demand })
    })
    .collect_vec();
    let validation = validate_forecast(
        &rows,
        &installed_base.max_residuals(),
        &actuals,
        &params.validation,
    );
    validation.apply_flags(&mut rows);
    for result in validation
        .results
        .iter()
        .filter(|result| result.status != CheckStatus::Pass)
    {
        warn!(
            "Region {region_id}: {} check {}: {}",
            result.check, result.status, result.message
        );
    }

    let diagnostics = RunDiagnostics {
        region_id: region_id.clone(),
        tipping_point: costs.tipping_point,
        method: adoption.curve.method,
        params: adoption.curve.params,
        degradations,
        validation,
    };
    info!(
        "Region {region_id}: tipping point {}, method {}, status {}",
        diagnostics
            .tipping_point
            .year
            .map_or("none".to_string(), |year| year.to_string()),
        diagnostics.method,
        diagnostics.status()
    );

    Ok(Some(RegionForecast { rows, diagnostics }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{model, region_forecast};
    use crate::model::BASELINE_SCENARIO;
    use crate::simulation::adoption::AdoptionMethod;
    use crate::simulation::optimiser::DifferentialEvolution;
    use crate::units::Year;
    use float_cmp::assert_approx_eq;
    use rstest::rstest;

    #[rstest]
    fn test_forecast_region(model: Model) {
        let forecast = region_forecast(&model, "GBR").unwrap();
        let diagnostics = &forecast.diagnostics;
        assert_eq!(diagnostics.region_id, "GBR".into());
        assert_eq!(diagnostics.tipping_point.year, Some(2015));
        assert_eq!(diagnostics.method, AdoptionMethod::Logistic);
        assert!(diagnostics.params.is_some());

        // Structural checks never fail outright
        for check in [
            ValidationCheck::NonNegativity,
            ValidationCheck::ShareBounds,
            ValidationCheck::SumConsistency,
            ValidationCheck::MonotonicAdoption,
            ValidationCheck::MassBalance,
        ] {
            let result = diagnostics.validation.get(check).unwrap();
            assert_ne!(result.status, CheckStatus::Error, "{check} failed");
        }

        // Timeline runs from the first market year to the horizon
        assert_eq!(forecast.rows.len(), 26);
        assert_eq!(forecast.rows.first().unwrap().year, 2010);
        assert_eq!(forecast.rows.last().unwrap().year, 2035);
        assert!(forecast.row(2020).unwrap().is_historical);
        assert!(!forecast.row(2021).unwrap().is_historical);

        for row in &forecast.rows {
            assert!(row.disruptor_demand <= row.market);
            assert_approx_eq!(
                Flow,
                row.disruptor_demand + row.chimera_demand + row.incumbent_demand,
                row.market,
                epsilon = 1e-6
            );
            assert_approx_eq!(
                Stock,
                row.contestable_market * Year(15.0),
                row.incumbent_installed_base,
                epsilon = 1e-6
            );
        }

        // No new-build demand in the first year
        assert_eq!(forecast.rows[0].new_build, Flow(0.0));
    }

    #[rstest]
    #[case(vec![2010], 2010)]
    #[case(vec![2005, 2008], 2008)]
    fn test_forecast_region_installed_base_history(
        mut model: Model,
        #[case] years: Vec<u32>,
        #[case] used_year: u32,
    ) {
        let stocks = years.iter().map(|year| f64::from(*year) * 10.0).collect();
        model.historical_data.insert(
            TechnologyRole::Disruptor,
            Metric::InstalledBase,
            TimeSeries::new("GBR".into(), years, stocks).unwrap(),
        );

        let forecast = region_forecast(&model, "GBR").unwrap();
        assert_eq!(
            forecast.rows[0].disruptor_installed_base,
            Stock(f64::from(used_year) * 10.0)
        );
        assert!(
            !forecast
                .diagnostics
                .degradations
                .contains(&Degradation::InstalledBaseDataTooLate)
        );
    }

    #[rstest]
    fn test_forecast_region_installed_base_too_late(mut model: Model) {
        let without_history = region_forecast(&model, "GBR").unwrap();
        model.historical_data.insert(
            TechnologyRole::Disruptor,
            Metric::InstalledBase,
            TimeSeries::new("GBR".into(), vec![2015, 2016], vec![50000.0, 60000.0]).unwrap(),
        );

        let forecast = region_forecast(&model, "GBR").unwrap();
        assert!(
            forecast
                .diagnostics
                .degradations
                .contains(&Degradation::InstalledBaseDataTooLate)
        );
        assert_eq!(
            forecast.row(2015).unwrap().disruptor_installed_base,
            without_history.row(2015).unwrap().disruptor_installed_base
        );
    }

    #[rstest]
    fn test_forecast_region_deterministic(model: Model) {
        assert_eq!(
            region_forecast(&model, "GBR").unwrap(),
            region_forecast(&model, "GBR").unwrap()
        );
    }

    #[rstest]
    fn test_forecast_region_missing_market(model: Model) {
        // There is no data at all for USA
        assert!(region_forecast(&model, "USA").is_none());
    }

    #[rstest]
    fn test_forecast_region_no_chimera(mut model: Model) {
        model.technologies.shift_remove("PHEV");
        let forecast = region_forecast(&model, "GBR").unwrap();
        for row in &forecast.rows {
            assert_eq!(row.chimera_demand, Flow(0.0));
            assert_eq!(row.chimera_installed_base, Stock(0.0));
        }
    }

    #[rstest]
    fn test_forecast_region_accelerated(model: Model) {
        let region = &model.regions["GBR"];
        let optimiser = DifferentialEvolution::from_parameters(&model.parameters.optimiser);
        let baseline = model.parameters.get_scenario(BASELINE_SCENARIO).unwrap();
        let accelerated = Scenario {
            acceleration_multiplier: 2.0,
            cost_decline_rate_override: None,
        };

        let baseline = forecast_region(&model, region, baseline, &optimiser)
            .unwrap()
            .unwrap();
        let accelerated = forecast_region(&model, region, &accelerated, &optimiser)
            .unwrap()
            .unwrap();
        let share = |forecast: &RegionForecast| forecast.row(2030).unwrap().disruptor_share;
        assert!(share(&accelerated) >= share(&baseline));
    }
}

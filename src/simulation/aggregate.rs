//! Aggregation of regional forecasts into a global forecast.
use super::region::{ForecastRow, RegionForecast};
use crate::region::{GLOBAL_REGION_ID, RegionID};
use crate::units::{Dimensionless, Flow};
use itertools::Itertools;
use std::collections::BTreeSet;

/// Years covered by every one of the given forecasts
fn common_years(forecasts: &[RegionForecast]) -> BTreeSet<u32> {
    let mut forecasts = forecasts.iter();
    let Some(first) = forecasts.next() else {
        return BTreeSet::new();
    };

    let mut years: BTreeSet<u32> = first.rows.iter().map(|row| row.year).collect();
    for forecast in forecasts {
        years.retain(|year| forecast.row(*year).is_some());
    }

    years
}

/// Sum a quantity over rows
fn total<T: std::iter::Sum<T>>(rows: &[&ForecastRow], f: impl Fn(&ForecastRow) -> T) -> T {
    rows.iter().copied().map(f).sum()
}

/// Sum regional forecasts into a single global forecast.
///
/// Only years forecast for every region are included. Demands and installed bases are summed and
/// shares are recomputed from the summed demands. Validation flags are not carried over.
pub fn aggregate_regions(forecasts: &[RegionForecast]) -> Vec<ForecastRow> {
    let region_id = RegionID::new(GLOBAL_REGION_ID);

    common_years(forecasts)
        .into_iter()
        .map(|year| {
            let rows = forecasts
                .iter()
                .filter_map(|forecast| forecast.row(year))
                .collect_vec();
            let market: Flow = total(&rows, |row| row.market);
            let disruptor_demand: Flow = total(&rows, |row| row.disruptor_demand);
            let chimera_demand: Flow = total(&rows, |row| row.chimera_demand);
            let incumbent_demand: Flow = total(&rows, |row| row.incumbent_demand);
            let share = |demand: Flow| {
                if market > Flow(0.0) {
                    demand / market
                } else {
                    Dimensionless(0.0)
                }
            };

            ForecastRow {
                region_id: region_id.clone(),
                year,
                is_historical: rows.iter().all(|row| row.is_historical),
                market,
                disruptor_demand,
                chimera_demand,
                incumbent_demand,
                disruptor_share: share(disruptor_demand),
                chimera_share: share(chimera_demand),
                incumbent_share: share(incumbent_demand),
                disruptor_installed_base: total(&rows, |row| {
                    row.disruptor_installed_base
                }),
                chimera_installed_base: total(&rows, |row| row.chimera_installed_base),
                incumbent_installed_base: total(&rows, |row| {
                    row.incumbent_installed_base
                }),
                new_build: total(&rows, |row| row.new_build),
                replacement: total(&rows, |row| row.replacement),
                contestable_market: total(&rows, |row| row.contestable_market),
                flags: Vec::new(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::forecast_row;
    use crate::simulation::adoption::AdoptionMethod;
    use crate::simulation::cost::TippingPoint;
    use crate::simulation::diagnostics::RunDiagnostics;
    use crate::simulation::validation::{ValidationCheck, ValidationReport};
    use crate::units::Stock;
    use float_cmp::assert_approx_eq;

    fn forecast(
        region_id: &str,
        years: std::ops::RangeInclusive<u32>,
        market: f64,
    ) -> RegionForecast {
        let rows = years
            .map(|year| {
                let mut row = forecast_row(year, market, 0.2, 0.1);
                row.region_id = region_id.into();
                row.is_historical = year <= 2020;
                row.flags = vec![ValidationCheck::MassBalance];
                row
            })
            .collect();
        RegionForecast {
            rows,
            diagnostics: RunDiagnostics {
                region_id: region_id.into(),
                tipping_point: TippingPoint {
                    year: None,
                    persistence_years: 3,
                },
                method: AdoptionMethod::Baseline,
                params: None,
                degradations: Vec::new(),
                validation: ValidationReport::default(),
            },
        }
    }

    #[test]
    fn test_aggregate_regions() {
        let forecasts = [
            forecast("GBR", 2018..=2025, 100.0),
            forecast("USA", 2020..=2025, 300.0),
        ];
        let global = aggregate_regions(&forecasts);

        // Only years common to both regions
        assert_eq!(global.len(), 6);
        assert_eq!(global[0].year, 2020);
        assert_eq!(global[0].region_id, GLOBAL_REGION_ID.into());
        assert!(global[0].is_historical);
        assert!(!global[1].is_historical);

        let row = &global[0];
        assert_approx_eq!(Flow, row.market, Flow(400.0), epsilon = 1e-9);
        assert_approx_eq!(Flow, row.disruptor_demand, Flow(80.0), epsilon = 1e-9);
        assert_approx_eq!(Dimensionless, row.disruptor_share, Dimensionless(0.2), epsilon = 1e-9);
        assert_approx_eq!(Dimensionless, row.incumbent_share, Dimensionless(0.7), epsilon = 1e-9);
        assert_approx_eq!(Stock, row.incumbent_installed_base, Stock(2800.0), epsilon = 1e-9);
        assert!(row.flags.is_empty());
    }

    #[test]
    fn test_aggregate_regions_empty() {
        assert!(aggregate_regions(&[]).is_empty());
    }
}

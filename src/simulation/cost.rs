//! Forecasting of unit costs and detection of the cost-parity tipping point.
use super::diagnostics::{Degradation, push_unique};
use super::trend::{rolling_median, theil_sen};
use crate::time_series::TimeSeries;
use itertools::Itertools;
use log::debug;

/// The year from which the disruptor is persistently at least as cheap as the incumbent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TippingPoint {
    /// The tipping year, if there is one before the horizon
    pub year: Option<u32>,
    /// How many consecutive years of cost advantage were required
    pub persistence_years: u32,
}

/// Cost forecasts for the disruptor and incumbent in a region
#[derive(Debug, Clone, PartialEq)]
pub struct CostForecast {
    /// Smoothed and extrapolated disruptor cost
    pub disruptor: Option<TimeSeries>,
    /// Smoothed and extrapolated incumbent cost
    pub incumbent: Option<TimeSeries>,
    /// Incumbent cost minus disruptor cost, for years covered by both forecasts
    pub advantage: Option<TimeSeries>,
    /// When the disruptor became persistently cheaper
    pub tipping_point: TippingPoint,
    /// Problems encountered while forecasting
    pub degradations: Vec<Degradation>,
}

impl CostForecast {
    /// The disruptor's cost advantage in a given year, as a percentage of the incumbent's cost.
    ///
    /// Returns zero for years without a forecast or where the incumbent's cost is zero.
    pub fn advantage_percent(&self, year: u32) -> f64 {
        let (Some(advantage), Some(incumbent)) = (&self.advantage, &self.incumbent) else {
            return 0.0;
        };

        match (advantage.get(year), incumbent.get(year)) {
            (Some(advantage), Some(cost)) if cost > 0.0 => 100.0 * advantage / cost,
            _ => 0.0,
        }
    }
}

/// Options controlling how costs are forecast
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostForecastOptions {
    /// Width of the rolling median window (odd)
    pub smoothing_window: usize,
    /// The last year to forecast
    pub horizon_year: u32,
    /// Number of consecutive years of cost advantage required for a tipping point
    pub persistence_years: u32,
    /// If set, the disruptor's cost falls by this fraction per year
    pub cost_decline_rate_override: Option<f64>,
}

/// A single smoothed and extrapolated cost series
struct ExtrapolatedCost {
    series: TimeSeries,
    insufficient_data: bool,
}

/// Smooth a cost series, then extrapolate it exponentially to the horizon.
///
/// The log-linear slope is estimated with Theil-Sen unless `slope_override` is given.
/// Extrapolation starts from the last smoothed point.
fn extrapolate_cost(
    history: &TimeSeries,
    smoothing_window: usize,
    horizon_year: u32,
    slope_override: Option<f64>,
) -> ExtrapolatedCost {
    let smoothed = rolling_median(history.values(), smoothing_window);

    // Zero costs cannot be log-transformed, so leave them out of the fit
    let (xs, ys): (Vec<f64>, Vec<f64>) = history
        .years()
        .iter()
        .zip(&smoothed)
        .filter(|(_, cost)| **cost > 0.0)
        .map(|(year, cost)| (f64::from(*year), cost.ln()))
        .unzip();
    let fitted_slope = theil_sen(&xs, &ys).map(|trend| trend.slope);
    let insufficient_data = fitted_slope.is_none();
    let slope = slope_override.or(fitted_slope).unwrap_or(0.0);

    let mut years = history.years().to_vec();
    let last_value = smoothed.last().copied();
    let mut values = smoothed;
    if let (Some(last_year), Some(last_value)) = (history.last_year(), last_value) {
        for year in (last_year + 1)..=horizon_year {
            years.push(year);
            values.push(last_value * (slope * f64::from(year - last_year)).exp());
        }
    }

    let series = TimeSeries::from_pairs(
        history.region_id().clone(),
        years.into_iter().zip(values).filter(|(year, _)| *year <= horizon_year),
    );

    ExtrapolatedCost {
        series,
        insufficient_data,
    }
}

/// Incumbent cost minus disruptor cost for every year both series cover
fn cost_advantage(disruptor: &TimeSeries, incumbent: &TimeSeries) -> TimeSeries {
    TimeSeries::from_pairs(
        disruptor.region_id().clone(),
        disruptor.iter().filter_map(|(year, disruptor_cost)| {
            incumbent
                .get(year)
                .map(|incumbent_cost| (year, incumbent_cost - disruptor_cost))
        }),
    )
}

/// Find the tipping point from the cost advantage.
///
/// If the disruptor was at least as cheap in every year of overlapping history, the first
/// historical year is the tipping point. Otherwise it is the first year which begins a run of
/// `persistence_years` consecutive years of non-negative advantage, all within the forecast.
fn find_tipping_point(
    advantage: &TimeSeries,
    last_historical_year: u32,
    persistence_years: u32,
) -> Option<u32> {
    let historical = advantage
        .iter()
        .take_while(|(year, _)| *year <= last_historical_year)
        .collect_vec();
    if !historical.is_empty() && historical.iter().all(|(_, value)| *value >= 0.0) {
        return Some(historical[0].0);
    }

    let window = persistence_years as usize;
    advantage
        .years()
        .windows(window)
        .zip(advantage.values().windows(window))
        .find(|(years, values)| {
            let consecutive = years[window - 1] - years[0] == persistence_years - 1;
            consecutive && values.iter().all(|value| *value >= 0.0)
        })
        .map(|(years, _)| years[0])
}

/// Forecast disruptor and incumbent costs and find the tipping point.
///
/// # Arguments
///
/// * `disruptor` - Historical disruptor costs, if any
/// * `incumbent` - Historical incumbent costs, if any
/// * `options` - Options controlling the forecast
pub fn forecast_costs(
    disruptor: Option<&TimeSeries>,
    incumbent: Option<&TimeSeries>,
    options: &CostForecastOptions,
) -> CostForecast {
    let mut degradations = Vec::new();
    let tipping_point = |year| TippingPoint {
        year,
        persistence_years: options.persistence_years,
    };

    let (Some(disruptor), Some(incumbent)) = (
        disruptor.filter(|series| !series.is_empty()),
        incumbent.filter(|series| !series.is_empty()),
    ) else {
        degradations.push(Degradation::InsufficientCostData);
        degradations.push(Degradation::NoTippingPointFound);
        return CostForecast {
            disruptor: None,
            incumbent: None,
            advantage: None,
            tipping_point: tipping_point(None),
            degradations,
        };
    };

    let slope_override = options
        .cost_decline_rate_override
        .map(|rate| (1.0 - rate).ln());
    let disruptor_forecast = extrapolate_cost(
        disruptor,
        options.smoothing_window,
        options.horizon_year,
        slope_override,
    );
    let incumbent_forecast = extrapolate_cost(
        incumbent,
        options.smoothing_window,
        options.horizon_year,
        None,
    );
    if disruptor_forecast.insufficient_data || incumbent_forecast.insufficient_data {
        push_unique(&mut degradations, Degradation::InsufficientCostData);
    }

    let advantage = cost_advantage(&disruptor_forecast.series, &incumbent_forecast.series);

    // Both series are non-empty, so these years exist
    let last_historical_year = disruptor
        .last_year()
        .zip(incumbent.last_year())
        .map_or(0, |(d, i)| d.min(i));
    let year = find_tipping_point(&advantage, last_historical_year, options.persistence_years);
    match year {
        Some(year) => debug!(
            "Tipping point for region {} found in {year}",
            disruptor.region_id()
        ),
        None => push_unique(&mut degradations, Degradation::NoTippingPointFound),
    }

    CostForecast {
        disruptor: Some(disruptor_forecast.series),
        incumbent: Some(incumbent_forecast.series),
        advantage: Some(advantage),
        tipping_point: tipping_point(year),
        degradations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;
    use rstest::{fixture, rstest};

    #[fixture]
    fn options() -> CostForecastOptions {
        CostForecastOptions {
            smoothing_window: 3,
            horizon_year: 2030,
            persistence_years: 3,
            cost_decline_rate_override: None,
        }
    }

    fn series(years: std::ops::RangeInclusive<u32>, f: impl FnMut(u32) -> f64) -> TimeSeries {
        TimeSeries::from_fn("GBR".into(), years, f)
    }

    #[rstest]
    fn test_forecast_costs_tipping_point(options: CostForecastOptions) {
        // Disruptor starts at 40k and falls 10% per year; incumbent is flat at 25k
        let disruptor = series(2010..=2024, |year| {
            40_000.0 * 0.9_f64.powi((year - 2010) as i32)
        });
        let incumbent = series(2010..=2024, |_| 25_000.0);
        let forecast = forecast_costs(Some(&disruptor), Some(&incumbent), &options);

        // First year the disruptor costs less than 25k is 2015 (n = 5)
        assert_eq!(forecast.tipping_point.year, Some(2015));
        assert_eq!(forecast.tipping_point.persistence_years, 3);
        assert!(forecast.degradations.is_empty());

        // Forecasts extend to the horizon
        let disruptor = forecast.disruptor.unwrap();
        assert_eq!(disruptor.last_year(), Some(2030));
        assert!(disruptor.get(2030).unwrap() < disruptor.get(2024).unwrap());
    }

    #[rstest]
    fn test_forecast_costs_no_tipping_point(options: CostForecastOptions) {
        let disruptor = series(2010..=2020, |_| 50_000.0);
        let incumbent = series(2010..=2020, |_| 10_000.0);
        let forecast = forecast_costs(Some(&disruptor), Some(&incumbent), &options);
        assert_eq!(forecast.tipping_point.year, None);
        assert_eq!(forecast.degradations, [Degradation::NoTippingPointFound]);
    }

    #[rstest]
    fn test_forecast_costs_always_cheaper(options: CostForecastOptions) {
        let disruptor = series(2012..=2020, |_| 5.0);
        let incumbent = series(2010..=2020, |_| 10.0);
        let forecast = forecast_costs(Some(&disruptor), Some(&incumbent), &options);
        assert_eq!(forecast.tipping_point.year, Some(2012));
    }

    #[rstest]
    fn test_forecast_costs_window_must_fit(mut options: CostForecastOptions) {
        // Parity is only reached in the last two years before the horizon
        options.horizon_year = 2020;
        let disruptor = series(2010..=2020, |year| if year >= 2019 { 5.0 } else { 20.0 });
        let incumbent = series(2010..=2020, |_| 10.0);
        let forecast = forecast_costs(Some(&disruptor), Some(&incumbent), &options);
        assert_eq!(forecast.tipping_point.year, None);
    }

    #[rstest]
    fn test_forecast_costs_single_point(options: CostForecastOptions) {
        let disruptor = series(2020..=2020, |_| 30.0);
        let incumbent = series(2010..=2020, |_| 20.0);
        let forecast = forecast_costs(Some(&disruptor), Some(&incumbent), &options);
        assert!(
            forecast
                .degradations
                .contains(&Degradation::InsufficientCostData)
        );

        // Single point is extrapolated flat
        let disruptor = forecast.disruptor.unwrap();
        assert_eq!(disruptor.get(2030), Some(30.0));
    }

    #[rstest]
    fn test_forecast_costs_missing(options: CostForecastOptions) {
        let incumbent = series(2010..=2020, |_| 20.0);
        let forecast = forecast_costs(None, Some(&incumbent), &options);
        assert!(forecast.advantage.is_none());
        assert_eq!(forecast.tipping_point.year, None);
        assert_eq!(
            forecast.degradations,
            [
                Degradation::InsufficientCostData,
                Degradation::NoTippingPointFound
            ]
        );
        assert_eq!(forecast.advantage_percent(2020), 0.0);
    }

    #[rstest]
    fn test_forecast_costs_decline_override(mut options: CostForecastOptions) {
        options.cost_decline_rate_override = Some(0.2);
        let disruptor = series(2010..=2020, |_| 100.0);
        let incumbent = series(2010..=2020, |_| 50.0);
        let forecast = forecast_costs(Some(&disruptor), Some(&incumbent), &options);

        let disruptor = forecast.disruptor.as_ref().unwrap();
        assert_approx_eq!(f64, disruptor.get(2021).unwrap(), 80.0, epsilon = 1e-9);
        assert_approx_eq!(f64, disruptor.get(2022).unwrap(), 64.0, epsilon = 1e-9);

        // 100 * 0.8^4 = 40.96 < 50 from 2024 onwards
        assert_eq!(forecast.tipping_point.year, Some(2024));
        assert_approx_eq!(
            f64,
            forecast.advantage_percent(2024),
            100.0 * (50.0 - 40.96) / 50.0,
            epsilon = 1e-9
        );
    }
}

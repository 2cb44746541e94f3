//! Forecasting of total market demand.
use super::diagnostics::Degradation;
use super::trend::theil_sen;
use crate::time_series::TimeSeries;
use anyhow::{Result, bail, ensure};
use itertools::Itertools;

/// Forecast total market demand for a region
#[derive(Debug, Clone, PartialEq)]
pub struct MarketForecast {
    /// Market demand for every year from the first historical year to the horizon
    pub demand: TimeSeries,
    /// The last year for which there is historical data
    pub last_historical_year: u32,
    /// Problems encountered while forecasting
    pub degradations: Vec<Degradation>,
}

impl MarketForecast {
    /// Whether the given year is covered by historical data
    pub fn is_historical(&self, year: u32) -> bool {
        year <= self.last_historical_year
    }
}

/// Linearly interpolate between historical points so that every year has a value
fn fill_gaps(history: &TimeSeries) -> Vec<(u32, f64)> {
    let mut filled = Vec::with_capacity(history.len());
    for ((year1, value1), (year2, value2)) in history.iter().tuple_windows() {
        filled.push((year1, value1));
        let gradient = (value2 - value1) / f64::from(year2 - year1);
        for year in (year1 + 1)..year2 {
            filled.push((year, value1 + gradient * f64::from(year - year1)));
        }
    }
    filled.extend(history.iter().last());

    filled
}

/// Forecast market demand to the horizon year.
///
/// The trend is a Theil-Sen line through the historical data, extrapolated from the last
/// historical point. Year-on-year growth is limited to `max_cagr` in either direction and demand
/// can never be negative.
///
/// # Arguments
///
/// * `history` - Historical market demand (must not be empty)
/// * `horizon_year` - The last year to forecast
/// * `max_cagr` - Maximum year-on-year change as a proportion of the previous year's demand
pub fn forecast_market(
    history: &TimeSeries,
    horizon_year: u32,
    max_cagr: f64,
) -> Result<MarketForecast> {
    let (Some(first_year), Some(last_year), Some(last_value)) = (
        history.first_year(),
        history.last_year(),
        history.last_value(),
    ) else {
        bail!(
            "No market demand data for region {}",
            history.region_id()
        );
    };
    ensure!(
        horizon_year >= first_year,
        "Horizon year {horizon_year} is before the first year of market data ({first_year}) \
        for region {}",
        history.region_id()
    );

    let mut degradations = Vec::new();
    let xs = history.years().iter().copied().map(f64::from).collect_vec();
    let slope = match theil_sen(&xs, history.values()) {
        Some(trend) => trend.slope,
        None => {
            degradations.push(Degradation::InsufficientDemandData);
            0.0
        }
    };

    let mut points = fill_gaps(history);
    let mut previous = last_value;
    for year in (last_year + 1)..=horizon_year {
        let next = (previous + slope)
            .clamp(previous * (1.0 - max_cagr), previous * (1.0 + max_cagr))
            .max(0.0);
        points.push((year, next));
        previous = next;
    }

    let demand = TimeSeries::from_pairs(
        history.region_id().clone(),
        points.into_iter().filter(|(year, _)| *year <= horizon_year),
    );

    Ok(MarketForecast {
        demand,
        last_historical_year: last_year,
        degradations,
    })
}

//! Decomposition of market demand into new-build and replacement demand.
use crate::time_series::TimeSeries;
use crate::units::Flow;

/// New-build and replacement demand for a single year
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecompositionYear {
    /// The year
    pub year: u32,
    /// Demand arising from growth of the market
    pub new_build: Flow,
    /// Demand arising from units reaching end of life
    pub replacement: Flow,
    /// `|new_build + replacement - market| / market`
    pub variance: f64,
}

/// Decompose market demand using the retirements from installed base tracking.
///
/// New-build demand is the year-on-year growth of the market (never negative and zero in the
/// first year). Replacement demand is the total retirements across technologies.
///
/// # Arguments
///
/// * `market` - Market demand for every year of the timeline
/// * `retirements` - Total retirements for each year of `market`
pub fn decompose_market(market: &TimeSeries, retirements: &[Flow]) -> Vec<DecompositionYear> {
    assert_eq!(
        market.len(),
        retirements.len(),
        "Need retirements for every year of the market"
    );

    let mut previous = None;
    market
        .iter()
        .zip(retirements)
        .map(|((year, demand), &replacement)| {
            let new_build = previous.map_or(Flow(0.0), |previous: f64| {
                Flow((demand - previous).max(0.0))
            });
            previous = Some(demand);

            let variance = if demand > 0.0 {
                ((new_build + replacement).value() - demand).abs() / demand
            } else {
                0.0
            };

            DecompositionYear {
                year,
                new_build,
                replacement,
                variance,
            }
        })
        .collect()
}

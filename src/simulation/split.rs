//! Splitting of market demand between the disruptor, chimera and incumbent.
use crate::time_series::TimeSeries;
use crate::units::{Dimensionless, Flow};

/// The share of the market taken by the chimera technology over time.
///
/// The share rises linearly to a peak at the tipping point, then halves every `half_life` years.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChimeraProfile {
    /// The highest share the chimera reaches
    pub peak_share: f64,
    /// How many years it takes the share to halve after the tipping point
    pub half_life: f64,
    /// The first year of the timeline, at which the chimera's share is zero
    pub start_year: u32,
    /// The tipping year, if there is one
    pub tipping_year: Option<u32>,
    /// The last year of the timeline
    pub horizon_year: u32,
}

impl ChimeraProfile {
    /// The chimera's share of the market in a year
    pub fn share(&self, year: u32) -> Dimensionless {
        let share = match self.tipping_year {
            Some(tipping_year) if year > tipping_year => {
                let years_since = f64::from(year - tipping_year);
                self.peak_share * 2.0_f64.powf(-years_since / self.half_life)
            }
            Some(tipping_year) => self.ramp(year, tipping_year),
            // Without a tipping point the chimera is still on the rise at the horizon
            None => self.ramp(year, self.horizon_year),
        };

        Dimensionless(share)
    }

    /// Linear ramp from zero at the start year to the peak at `peak_year`
    fn ramp(&self, year: u32, peak_year: u32) -> f64 {
        if peak_year <= self.start_year {
            return self.peak_share;
        }

        let progress =
            f64::from(year.saturating_sub(self.start_year)) / f64::from(peak_year - self.start_year);
        self.peak_share * progress.min(1.0)
    }
}

/// Demand for each technology in a single year
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DemandSplit {
    /// Demand for the disruptor
    pub disruptor: Flow,
    /// Demand for the chimera (zero if there is none)
    pub chimera: Flow,
    /// Demand for the incumbent, which takes whatever is left
    pub incumbent: Flow,
    /// Whether the disruptor and chimera had to be scaled down to fit in the market
    pub rescaled: bool,
}

/// Split market demand for a single year.
///
/// Disruptor and chimera demand are their shares of the market, clamped to `[0, market]`. If
/// together they exceed the market by more than `tolerance` (relative), both are scaled down
/// proportionally so that they fit. The incumbent gets whatever is left.
pub fn split_demand(
    market: Flow,
    disruptor_share: Dimensionless,
    chimera_share: Dimensionless,
    tolerance: f64,
) -> DemandSplit {
    let clamp = |demand: Flow| demand.max(Flow(0.0)).min(market);
    let mut disruptor = clamp(disruptor_share * market);
    let mut chimera = clamp(chimera_share * market);

    let combined = disruptor + chimera;
    if combined > market * Dimensionless(1.0 + tolerance) {
        let factor = market / combined;
        disruptor = disruptor * factor;
        chimera = chimera * factor;
        return DemandSplit {
            disruptor,
            chimera,
            incumbent: Flow(0.0),
            rescaled: true,
        };
    }

    DemandSplit {
        disruptor,
        chimera,
        incumbent: (market - disruptor - chimera).max(Flow(0.0)),
        rescaled: false,
    }
}

/// Split market demand for every year of the market forecast.
///
/// # Arguments
///
/// * `market` - Market demand for every year of the timeline
/// * `disruptor_shares` - The disruptor's share of the market (zero for missing years)
/// * `chimera` - How the chimera's share evolves, if the model has a chimera
/// * `tolerance` - Relative tolerance before disruptor and chimera demand are rescaled
pub fn split_market(
    market: &TimeSeries,
    disruptor_shares: &TimeSeries,
    chimera: Option<&ChimeraProfile>,
    tolerance: f64,
) -> Vec<(u32, DemandSplit)> {
    market
        .iter()
        .map(|(year, demand)| {
            let disruptor_share = Dimensionless(disruptor_shares.get(year).unwrap_or(0.0));
            let chimera_share = chimera.map_or(Dimensionless(0.0), |profile| profile.share(year));
            let split = split_demand(Flow(demand), disruptor_share, chimera_share, tolerance);
            (year, split)
        })
        .collect()
}

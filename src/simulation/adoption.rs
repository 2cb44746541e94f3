//! Fitting of the disruptor's market share over time.
//!
//! The preferred curve is a logistic whose steepness increases with the disruptor's cost
//! advantage. When there is not enough information to fit one, simpler curves are used instead:
//! each method is tried in turn and the reasons for rejecting earlier methods are recorded.
use super::cost::CostForecast;
use super::diagnostics::{Degradation, push_unique};
use super::optimiser::Optimiser;
use super::trend::{LinearTrend, theil_sen};
use crate::model::ModelParameters;
use crate::region::RegionID;
use crate::time_series::TimeSeries;
use itertools::Itertools;
use log::debug;
use std::ops::RangeInclusive;
use strum::Display;

/// The minimum number of historical shares needed to fit a logistic curve
const MIN_POINTS_FOR_FIT: usize = 3;

/// The number of most recent historical shares used for the linear fallback
const RECENT_TREND_POINTS: usize = 5;

/// How disruptor shares were forecast
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum AdoptionMethod {
    /// A logistic curve, either fitted or seeded with default parameters
    Logistic,
    /// A linear extrapolation of the recent share trend
    LinearFallback,
    /// A fixed linear ramp over the forecast period
    Baseline,
}

/// Parameters of a logistic adoption curve
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogisticParams {
    /// The maximum share the disruptor approaches
    pub ceiling: f64,
    /// Base steepness of the curve
    pub steepness: f64,
    /// The year of fastest growth
    pub inflection: f64,
    /// Additional steepness per percentage point of cost advantage
    pub cost_sensitivity: f64,
}

impl LogisticParams {
    /// Create parameters from the optimiser's parameter vector
    fn from_slice(params: &[f64]) -> Self {
        Self {
            ceiling: params[0],
            steepness: params[1],
            inflection: params[2],
            cost_sensitivity: params[3],
        }
    }

    /// The disruptor's share in a year.
    ///
    /// # Arguments
    ///
    /// * `year` - The year
    /// * `advantage_percent` - Cost advantage in the year, as a percentage of incumbent cost
    /// * `acceleration` - Multiplier applied to the steepness
    pub fn share(&self, year: u32, advantage_percent: f64, acceleration: f64) -> f64 {
        let steepness =
            (self.steepness + self.cost_sensitivity * advantage_percent.max(0.0)) * acceleration;
        self.ceiling / (1.0 + (-steepness * (f64::from(year) - self.inflection)).exp())
    }
}

/// Forecast disruptor shares
#[derive(Debug, Clone, PartialEq)]
pub struct AdoptionCurve {
    /// How the shares were forecast
    pub method: AdoptionMethod,
    /// Parameters of the logistic curve, if one was used
    pub params: Option<LogisticParams>,
    /// The disruptor's share for every year of the timeline
    pub shares: TimeSeries,
}

/// The result of forecasting disruptor shares
#[derive(Debug, Clone, PartialEq)]
pub struct AdoptionOutcome {
    /// The forecast shares
    pub curve: AdoptionCurve,
    /// The reasons preferred methods could not be used
    pub degradations: Vec<Degradation>,
}

/// Everything needed to forecast disruptor shares for a region
pub struct AdoptionContext<'a> {
    /// The region being forecast
    pub region_id: &'a RegionID,
    /// The years to forecast
    pub timeline: RangeInclusive<u32>,
    /// Historical disruptor shares of the market
    pub historical_shares: &'a TimeSeries,
    /// Cost forecasts and the tipping point
    pub costs: &'a CostForecast,
    /// The maximum share the disruptor can reach in this region
    pub ceiling: f64,
    /// Model parameters
    pub parameters: &'a ModelParameters,
    /// Multiplier applied to the steepness of the curve
    pub acceleration: f64,
    /// Optimiser used to fit the curve
    pub optimiser: &'a dyn Optimiser,
}

/// A method for forecasting disruptor shares, which may be unable to produce a forecast
type AdoptionStrategy = fn(&AdoptionContext) -> Result<AdoptionCurve, Degradation>;

/// Methods for forecasting shares, in order of preference. The baseline is used if all fail.
const STRATEGIES: [AdoptionStrategy; 2] = [logistic_curve, linear_fallback];

/// Calculate the disruptor's share of the market for years where both demands are known
pub fn historical_shares(disruptor_demand: &TimeSeries, market_demand: &TimeSeries) -> TimeSeries {
    TimeSeries::from_pairs(
        market_demand.region_id().clone(),
        market_demand
            .iter()
            .filter(|(_, market)| *market > 0.0)
            .filter_map(|(year, market)| {
                disruptor_demand
                    .get(year)
                    .map(|demand| (year, demand / market))
            }),
    )
}

/// Clamp any value lower than its predecessor to the predecessor
pub fn enforce_monotonic(values: &mut [f64]) {
    for i in 1..values.len() {
        values[i] = values[i].max(values[i - 1]);
    }
}

/// Build a share series over the timeline, clamped to `[0, ceiling]` and non-decreasing
fn build_shares<F>(context: &AdoptionContext, mut share: F) -> TimeSeries
where
    F: FnMut(u32) -> f64,
{
    let mut shares = context
        .timeline
        .clone()
        .map(|year| share(year).clamp(0.0, context.ceiling))
        .collect_vec();
    enforce_monotonic(&mut shares);

    TimeSeries::from_pairs(
        context.region_id.clone(),
        context.timeline.clone().zip(shares),
    )
}

/// Robust linear trend through historical shares
fn share_trend(shares: &TimeSeries) -> Option<LinearTrend> {
    let xs = shares.years().iter().copied().map(f64::from).collect_vec();
    theil_sen(&xs, shares.values())
}

/// Fit logistic parameters to historical shares with the optimiser
fn fit_logistic_params(
    context: &AdoptionContext,
    tipping_year: u32,
) -> Result<LogisticParams, Degradation> {
    let params = context.parameters;
    let tipping_year = f64::from(tipping_year);
    let bounds = [
        (params.ceiling_min.min(context.ceiling), context.ceiling),
        (params.k0_min, params.k0_max),
        (
            tipping_year - f64::from(params.inflection_years_before),
            tipping_year + f64::from(params.inflection_years_after),
        ),
        (0.0, params.cost_sensitivity_max),
    ];

    // Fit against history without any scenario acceleration
    let history = context
        .historical_shares
        .iter()
        .map(|(year, share)| (year, share, context.costs.advantage_percent(year)))
        .collect_vec();
    let objective = |x: &[f64]| {
        let candidate = LogisticParams::from_slice(x);
        history
            .iter()
            .map(|(year, share, advantage)| {
                (candidate.share(*year, *advantage, 1.0) - share).powi(2)
            })
            .sum::<f64>()
    };

    let solution = context.optimiser.minimise(&objective, &bounds);
    if !solution.converged {
        return Err(Degradation::OptimisationConvergenceFailure);
    }

    let fitted = LogisticParams::from_slice(&solution.params);
    debug!(
        "Fitted adoption curve for region {} after {} iterations: {fitted:?} (SSE {})",
        context.region_id, solution.iterations, solution.objective
    );

    Ok(fitted)
}

/// A logistic curve anchored on the tipping point.
///
/// With too few historical shares the curve is seeded with default parameters instead of being
/// fitted. If the tipping point lies beyond the historical shares, shares up to the tipping year
/// follow the linear trend of history.
fn logistic_curve(context: &AdoptionContext) -> Result<AdoptionCurve, Degradation> {
    let tipping_year = context
        .costs
        .tipping_point
        .year
        .ok_or(Degradation::NoTippingPointFound)?;

    let params = if context.historical_shares.len() < MIN_POINTS_FOR_FIT {
        LogisticParams {
            ceiling: context.ceiling,
            steepness: context.parameters.seed_steepness,
            inflection: f64::from(tipping_year),
            cost_sensitivity: 0.0,
        }
    } else {
        fit_logistic_params(context, tipping_year)?
    };

    let pre_tipping_trend = context
        .historical_shares
        .last_year()
        .filter(|last_year| tipping_year > *last_year)
        .and_then(|_| share_trend(context.historical_shares));

    let shares = build_shares(context, |year| match pre_tipping_trend {
        Some(trend) if year <= tipping_year => trend.value_at(f64::from(year)).clamp(0.0, 1.0),
        _ => params.share(
            year,
            context.costs.advantage_percent(year),
            context.acceleration,
        ),
    });

    Ok(AdoptionCurve {
        method: AdoptionMethod::Logistic,
        params: Some(params),
        shares,
    })
}

/// Linear extrapolation of the most recent historical shares
fn linear_fallback(context: &AdoptionContext) -> Result<AdoptionCurve, Degradation> {
    context
        .costs
        .tipping_point
        .year
        .ok_or(Degradation::NoTippingPointFound)?;

    let history = context.historical_shares;
    let recent = history.restrict(
        history
            .years()
            .iter()
            .rev()
            .nth(RECENT_TREND_POINTS - 1)
            .or(history.years().first())
            .copied()
            .unwrap_or_default()..=u32::MAX,
    );
    let trend = share_trend(&recent).ok_or(Degradation::InsufficientDemandData)?;
    let shares = build_shares(context, |year| trend.value_at(f64::from(year)));

    Ok(AdoptionCurve {
        method: AdoptionMethod::LinearFallback,
        params: None,
        shares,
    })
}

/// A linear ramp between two fixed shares over the timeline
fn baseline_curve(context: &AdoptionContext) -> AdoptionCurve {
    let params = context.parameters;
    let (start, end) = (*context.timeline.start(), *context.timeline.end());
    let shares = build_shares(context, |year| {
        if end == start {
            return params.baseline_start_share;
        }
        let progress = f64::from(year - start) / f64::from(end - start);
        params.baseline_start_share
            + (params.baseline_end_share - params.baseline_start_share) * progress
    });

    AdoptionCurve {
        method: AdoptionMethod::Baseline,
        params: None,
        shares,
    }
}

/// Forecast the disruptor's share of the market.
///
/// Methods are tried in order of preference: logistic, linear fallback, then baseline. Every
/// reason a method could not be used is returned alongside the forecast.
pub fn forecast_adoption(context: &AdoptionContext) -> AdoptionOutcome {
    let mut degradations = Vec::new();
    if context.historical_shares.len() < MIN_POINTS_FOR_FIT {
        push_unique(&mut degradations, Degradation::InsufficientDemandData);
    }

    for strategy in STRATEGIES {
        match strategy(context) {
            Ok(curve) => {
                return AdoptionOutcome {
                    curve,
                    degradations,
                };
            }
            Err(reason) => {
                debug!("Region {}: {reason}", context.region_id);
                push_unique(&mut degradations, reason);
            }
        }
    }

    AdoptionOutcome {
        curve: baseline_curve(context),
        degradations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::model_parameters;
    use crate::simulation::cost::TippingPoint;
    use crate::simulation::optimiser::{DifferentialEvolution, OptimiserSolution};
    use float_cmp::assert_approx_eq;
    use rstest::rstest;

    /// An optimiser which never converges
    struct FailingOptimiser;

    impl Optimiser for FailingOptimiser {
        fn minimise(
            &self,
            _objective: &dyn Fn(&[f64]) -> f64,
            bounds: &[(f64, f64)],
        ) -> OptimiserSolution {
            OptimiserSolution {
                params: bounds.iter().map(|(lower, _)| *lower).collect(),
                objective: f64::INFINITY,
                iterations: 1,
                converged: false,
            }
        }
    }

    fn costs_with_tipping_year(year: Option<u32>) -> CostForecast {
        CostForecast {
            disruptor: None,
            incumbent: None,
            advantage: None,
            tipping_point: TippingPoint {
                year,
                persistence_years: 3,
            },
            degradations: Vec::new(),
        }
    }

    fn forecast(
        parameters: &ModelParameters,
        shares: &TimeSeries,
        costs: &CostForecast,
        optimiser: &dyn Optimiser,
    ) -> AdoptionOutcome {
        let region_id = RegionID::new("GBR");
        let context = AdoptionContext {
            region_id: &region_id,
            timeline: 2010..=2040,
            historical_shares: shares,
            costs,
            ceiling: parameters.ceiling,
            parameters,
            acceleration: 1.0,
            optimiser,
        };
        forecast_adoption(&context)
    }

    #[test]
    fn test_logistic_share() {
        let params = LogisticParams {
            ceiling: 0.8,
            steepness: 0.5,
            inflection: 2025.0,
            cost_sensitivity: 0.01,
        };
        assert_approx_eq!(f64, params.share(2025, 0.0, 1.0), 0.4);

        // Cost advantage and acceleration both steepen the curve
        let base = params.share(2030, 0.0, 1.0);
        assert!(params.share(2030, 20.0, 1.0) > base);
        assert!(params.share(2030, 0.0, 2.0) > base);

        // Negative advantage has no effect
        assert_approx_eq!(f64, params.share(2030, -50.0, 1.0), base);
    }

    #[test]
    fn test_enforce_monotonic() {
        let mut values = [0.1, 0.3, 0.2, 0.4, 0.35];
        enforce_monotonic(&mut values);
        assert_eq!(values, [0.1, 0.3, 0.3, 0.4, 0.4]);
    }

    #[test]
    fn test_historical_shares() {
        let disruptor = TimeSeries::new("GBR".into(), vec![2010, 2011, 2012], vec![1.0, 2.0, 3.0])
            .unwrap();
        let market =
            TimeSeries::new("GBR".into(), vec![2011, 2012, 2013], vec![0.0, 10.0, 10.0]).unwrap();
        let shares = historical_shares(&disruptor, &market);
        assert_eq!(shares.years(), [2012]);
        assert_eq!(shares.values(), [0.3]);
    }

    #[rstest]
    fn test_forecast_adoption_round_trip(model_parameters: ModelParameters) {
        // Generate shares from a known logistic and check they can be recovered
        let truth = LogisticParams {
            ceiling: 0.8,
            steepness: 0.35,
            inflection: 2025.0,
            cost_sensitivity: 0.0,
        };
        let shares = TimeSeries::from_fn("GBR".into(), 2010..=2030, |year| {
            truth.share(year, 0.0, 1.0)
        });
        let costs = costs_with_tipping_year(Some(2025));
        let optimiser = DifferentialEvolution::from_parameters(&model_parameters.optimiser);

        let outcome = forecast(&model_parameters, &shares, &costs, &optimiser);
        assert_eq!(outcome.curve.method, AdoptionMethod::Logistic);
        assert!(outcome.degradations.is_empty());

        let fitted = outcome.curve.params.unwrap();
        assert!((fitted.ceiling - 0.8).abs() <= 0.08);
        assert!((fitted.steepness - 0.35).abs() <= 0.035);
        assert!((fitted.inflection - 2025.0).abs() <= 2.0);
    }

    #[rstest]
    fn test_forecast_adoption_deterministic(model_parameters: ModelParameters) {
        let shares = TimeSeries::new(
            "GBR".into(),
            vec![2015, 2016, 2017, 2018, 2019],
            vec![0.01, 0.02, 0.035, 0.05, 0.08],
        )
        .unwrap();
        let costs = costs_with_tipping_year(Some(2020));
        let optimiser = DifferentialEvolution::from_parameters(&model_parameters.optimiser);
        assert_eq!(
            forecast(&model_parameters, &shares, &costs, &optimiser),
            forecast(&model_parameters, &shares, &costs, &optimiser)
        );
    }

    #[rstest]
    fn test_forecast_adoption_seeded(model_parameters: ModelParameters) {
        let shares = TimeSeries::new("GBR".into(), vec![2019, 2020], vec![0.02, 0.03]).unwrap();
        let costs = costs_with_tipping_year(Some(2020));
        let outcome = forecast(&model_parameters, &shares, &costs, &FailingOptimiser);

        // No optimisation is needed, so the failing optimiser is never used
        assert_eq!(outcome.curve.method, AdoptionMethod::Logistic);
        assert_eq!(
            outcome.curve.params,
            Some(LogisticParams {
                ceiling: 1.0,
                steepness: 0.4,
                inflection: 2020.0,
                cost_sensitivity: 0.0,
            })
        );
        assert_eq!(
            outcome.degradations,
            [Degradation::InsufficientDemandData]
        );
    }

    #[rstest]
    fn test_forecast_adoption_linear_fallback(model_parameters: ModelParameters) {
        let shares = TimeSeries::new(
            "GBR".into(),
            vec![2016, 2017, 2018, 2019, 2020],
            vec![0.05, 0.06, 0.07, 0.08, 0.09],
        )
        .unwrap();
        let costs = costs_with_tipping_year(Some(2018));
        let outcome = forecast(&model_parameters, &shares, &costs, &FailingOptimiser);

        assert_eq!(outcome.curve.method, AdoptionMethod::LinearFallback);
        assert_eq!(
            outcome.degradations,
            [Degradation::OptimisationConvergenceFailure]
        );
        assert_approx_eq!(
            f64,
            outcome.curve.shares.get(2030).unwrap(),
            0.19,
            epsilon = 1e-9
        );

        // Shares before the trend crosses zero are clamped
        assert_eq!(outcome.curve.shares.get(2010), Some(0.0));
    }

    #[rstest]
    fn test_forecast_adoption_baseline(model_parameters: ModelParameters) {
        let shares = TimeSeries::new("GBR".into(), vec![2010, 2011], vec![0.0, 0.01]).unwrap();
        let costs = costs_with_tipping_year(None);
        let outcome = forecast(&model_parameters, &shares, &costs, &FailingOptimiser);

        assert_eq!(outcome.curve.method, AdoptionMethod::Baseline);
        assert_eq!(outcome.curve.params, None);
        assert_eq!(
            outcome.degradations,
            [
                Degradation::InsufficientDemandData,
                Degradation::NoTippingPointFound
            ]
        );
        assert_approx_eq!(f64, outcome.curve.shares.get(2010).unwrap(), 0.01);
        assert_approx_eq!(f64, outcome.curve.shares.get(2040).unwrap(), 0.2);
    }

    #[rstest]
    fn test_forecast_adoption_pre_tipping_trend(model_parameters: ModelParameters) {
        let shares = TimeSeries::from_fn("GBR".into(), 2010..=2014, |year| {
            0.01 + 0.01 * f64::from(year - 2010)
        });
        let costs = costs_with_tipping_year(Some(2020));
        let optimiser = DifferentialEvolution::from_parameters(&model_parameters.optimiser);
        let outcome = forecast(&model_parameters, &shares, &costs, &optimiser);

        // Years up to the tipping point follow the historical trend
        assert_approx_eq!(
            f64,
            outcome.curve.shares.get(2018).unwrap(),
            0.09,
            epsilon = 1e-9
        );
        assert!(
            outcome
                .curve
                .shares
                .values()
                .iter()
                .tuple_windows()
                .all(|(a, b)| a <= b)
        );
    }
}

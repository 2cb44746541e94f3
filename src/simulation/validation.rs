//! Checks that a regional forecast is internally consistent and matches history.
use super::region::ForecastRow;
use crate::model::ValidationParameters;
use crate::technology::TechnologyRole;
use crate::time_series::TimeSeries;
use crate::units::Flow;
use itertools::Itertools;
use strum::{Display, EnumIter};

/// A validation check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum ValidationCheck {
    /// All demands and stocks are non-negative
    NonNegativity,
    /// All shares lie within `[0, 1]`
    ShareBounds,
    /// Technology demands sum to the market
    SumConsistency,
    /// The disruptor's share never falls
    MonotonicAdoption,
    /// Installed base changes by additions minus retirements
    MassBalance,
    /// Forecast demand matches historical demand
    HistoricalBacktest,
    /// New-build plus replacement demand matches the market
    DecompositionReconciliation,
}

impl ValidationCheck {
    /// The tolerance and severity threshold for this check
    fn thresholds(self, params: &ValidationParameters) -> (f64, f64) {
        let severity = &params.severity;
        match self {
            Self::NonNegativity => (0.0, severity.non_negativity),
            Self::ShareBounds => (params.sum_tolerance, severity.share_bounds),
            Self::SumConsistency => (params.sum_tolerance, severity.sum_consistency),
            Self::MonotonicAdoption => (params.monotonicity_tolerance, severity.monotonicity),
            Self::MassBalance => (params.mass_balance_tolerance, severity.mass_balance),
            Self::HistoricalBacktest => (params.backtest_tolerance, severity.backtest),
            // Reconciliation problems are only ever reported
            Self::DecompositionReconciliation => (params.decomposition_tolerance, f64::INFINITY),
        }
    }
}

/// The outcome of a validation check
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display)]
#[strum(serialize_all = "snake_case")]
pub enum CheckStatus {
    /// Within tolerance
    Pass,
    /// Outside tolerance, but below the severity threshold
    Warning,
    /// Above the severity threshold
    Error,
}

/// Whether a forecast passed validation overall
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum RunStatus {
    /// No check failed with an error
    Valid,
    /// At least one check failed with an error
    Invalid,
}

/// The result of a single validation check
#[derive(Debug, Clone, PartialEq)]
pub struct CheckResult {
    /// The check performed
    pub check: ValidationCheck,
    /// The outcome
    pub status: CheckStatus,
    /// The size of the largest violation
    pub magnitude: f64,
    /// A description of the outcome
    pub message: String,
    /// Years in which the check did not pass
    pub years: Vec<u32>,
}

/// The results of all validation checks for a region
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    /// One result per check, in the order the checks were run
    pub results: Vec<CheckResult>,
}

impl ValidationReport {
    /// The overall status of the forecast
    pub fn status(&self) -> RunStatus {
        if self
            .results
            .iter()
            .any(|result| result.status == CheckStatus::Error)
        {
            RunStatus::Invalid
        } else {
            RunStatus::Valid
        }
    }

    /// Get the result for a particular check
    pub fn get(&self, check: ValidationCheck) -> Option<&CheckResult> {
        self.results.iter().find(|result| result.check == check)
    }

    /// The checks which did not pass in the given year
    pub fn flags_for(&self, year: u32) -> Vec<ValidationCheck> {
        self.results
            .iter()
            .filter(|result| result.status != CheckStatus::Pass && result.years.contains(&year))
            .map(|result| result.check)
            .collect()
    }

    /// Attach flags for failing checks to each row
    pub fn apply_flags(&self, rows: &mut [ForecastRow]) {
        for row in rows {
            row.flags = self.flags_for(row.year);
        }
    }
}

/// Historical demand for a technology, to compare the forecast against
pub struct ActualDemand<'a> {
    /// The role of the technology
    pub role: TechnologyRole,
    /// Historical demand
    pub demand: &'a TimeSeries,
}

/// Classify the size of a violation
fn classify(magnitude: f64, tolerance: f64, severity: f64) -> CheckStatus {
    if magnitude <= tolerance {
        CheckStatus::Pass
    } else if magnitude <= severity {
        CheckStatus::Warning
    } else {
        CheckStatus::Error
    }
}

/// Build the result for a check from the size of the violation in each year
fn evaluate(
    check: ValidationCheck,
    violations: impl IntoIterator<Item = (u32, f64)>,
    params: &ValidationParameters,
) -> CheckResult {
    let (tolerance, severity) = check.thresholds(params);
    let violations = violations.into_iter().collect_vec();
    let magnitude = violations
        .iter()
        .map(|(_, violation)| *violation)
        .fold(0.0, f64::max);
    let status = classify(magnitude, tolerance, severity);
    let years = if status == CheckStatus::Pass {
        Vec::new()
    } else {
        violations
            .iter()
            .filter(|(_, violation)| *violation > tolerance)
            .map(|(year, _)| *year)
            .collect()
    };

    let message = match status {
        CheckStatus::Pass => "Passed".to_string(),
        _ => format!(
            "Largest violation of {magnitude:.6} exceeds tolerance of {tolerance} in {} year(s)",
            years.len()
        ),
    };

    CheckResult {
        check,
        status,
        magnitude,
        message,
        years,
    }
}

/// How far a row's demands and stocks fall below zero
fn negativity(row: &ForecastRow) -> f64 {
    let flows = [
        row.market,
        row.disruptor_demand,
        row.chimera_demand,
        row.incumbent_demand,
        row.new_build,
        row.replacement,
        row.contestable_market,
    ];
    let stocks = [
        row.disruptor_installed_base,
        row.chimera_installed_base,
        row.incumbent_installed_base,
    ];

    flows
        .iter()
        .map(|flow| flow.value())
        .chain(stocks.iter().map(|stock| stock.value()))
        .map(|value| -value)
        .fold(0.0, f64::max)
}

/// How far a row's shares fall outside `[0, 1]`
fn share_excursion(row: &ForecastRow) -> f64 {
    let shares = [row.disruptor_share, row.chimera_share, row.incumbent_share];
    let total: f64 = shares.iter().map(|share| share.value()).sum();

    shares
        .iter()
        .map(|share| share.value())
        .flat_map(|share| [-share, share - 1.0])
        .chain([total - 1.0])
        .fold(0.0, f64::max)
}

/// Relative difference between the sum of technology demands and the market
fn sum_inconsistency(row: &ForecastRow) -> f64 {
    let total = row.disruptor_demand + row.chimera_demand + row.incumbent_demand;
    if row.market > Flow(0.0) {
        (total - row.market).abs().value() / row.market.value()
    } else {
        total.value().abs()
    }
}

/// Relative difference between new-build plus replacement demand and the market
fn decomposition_variance(row: &ForecastRow) -> f64 {
    if row.market > Flow(0.0) {
        (row.new_build + row.replacement - row.market).abs().value() / row.market.value()
    } else {
        0.0
    }
}

/// Mean absolute percentage error of forecast demand against history, for each technology.
///
/// Also returns the years in which the absolute percentage error exceeded `tolerance`.
fn backtest(rows: &[ForecastRow], actuals: &[ActualDemand], tolerance: f64) -> (f64, Vec<u32>) {
    let mut worst = 0.0;
    let mut years = Vec::new();
    for actual in actuals {
        let errors = actual
            .demand
            .iter()
            .filter(|(_, value)| *value > 0.0)
            .filter_map(|(year, value)| {
                let row = rows.iter().find(|row| row.year == year)?;
                let error = (row.demand(actual.role).value() - value).abs() / value;
                Some((year, error))
            })
            .collect_vec();
        if errors.is_empty() {
            continue;
        }

        let mape = errors.iter().map(|(_, error)| error).sum::<f64>() / errors.len() as f64;
        worst = f64::max(worst, mape);
        years.extend(
            errors
                .iter()
                .filter(|(_, error)| *error > tolerance)
                .map(|(year, _)| *year),
        );
    }
    years.sort_unstable();
    years.dedup();

    (worst, years)
}

/// Run all validation checks on a regional forecast.
///
/// # Arguments
///
/// * `rows` - The forecast, one row per year in order
/// * `mass_balance_residuals` - The largest relative mass balance residual across technologies,
///   for each row
/// * `actuals` - Historical demand to compare the forecast against
/// * `params` - Tolerances and severity thresholds
pub fn validate_forecast(
    rows: &[ForecastRow],
    mass_balance_residuals: &[f64],
    actuals: &[ActualDemand],
    params: &ValidationParameters,
) -> ValidationReport {
    let per_row = |f: fn(&ForecastRow) -> f64| rows.iter().map(move |row| (row.year, f(row)));

    let mut results = vec![
        evaluate(ValidationCheck::NonNegativity, per_row(negativity), params),
        evaluate(ValidationCheck::ShareBounds, per_row(share_excursion), params),
        evaluate(
            ValidationCheck::SumConsistency,
            per_row(sum_inconsistency),
            params,
        ),
        evaluate(
            ValidationCheck::MonotonicAdoption,
            rows.iter().tuple_windows().map(|(previous, row)| {
                let drop = previous.disruptor_share - row.disruptor_share;
                (row.year, drop.value().max(0.0))
            }),
            params,
        ),
        evaluate(
            ValidationCheck::MassBalance,
            rows.iter()
                .map(|row| row.year)
                .zip(mass_balance_residuals.iter().copied()),
            params,
        ),
    ];

    // The backtest summarises errors over all years, so it doesn't fit the per-year pattern
    let (tolerance, severity) = ValidationCheck::HistoricalBacktest.thresholds(params);
    let (magnitude, years) = backtest(rows, actuals, tolerance);
    let status = classify(magnitude, tolerance, severity);
    results.push(CheckResult {
        check: ValidationCheck::HistoricalBacktest,
        status,
        magnitude,
        message: if actuals.is_empty() {
            "No historical demand to compare against".to_string()
        } else {
            format!("Largest mean absolute percentage error is {magnitude:.4}")
        },
        years: if status == CheckStatus::Pass {
            Vec::new()
        } else {
            years
        },
    });

    results.push(evaluate(
        ValidationCheck::DecompositionReconciliation,
        per_row(decomposition_variance),
        params,
    ));

    ValidationReport { results }
}

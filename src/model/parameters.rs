//! Defines the `ModelParameters` struct, which represents the contents of `model.toml`.
use crate::input::{deserialise_proportion, input_err_msg, read_toml};
use anyhow::{Context, Result, ensure};
use indexmap::IndexMap;
use serde::Deserialize;
use std::path::Path;

const MODEL_PARAMETERS_FILE_NAME: &str = "model.toml";

/// The name of the scenario which is always available
pub const BASELINE_SCENARIO: &str = "baseline";

macro_rules! define_param_default {
    ($name:ident, $type: ty, $value: expr) => {
        fn $name() -> $type {
            $value
        }
    };
}

define_param_default!(default_smoothing_window, usize, 3);
define_param_default!(default_persistence_years, u32, 3);
define_param_default!(default_max_market_cagr, f64, 0.05);
define_param_default!(default_ceiling_min, f64, 0.5);
define_param_default!(default_ceiling, f64, 1.0);
define_param_default!(default_k0_min, f64, 0.05);
define_param_default!(default_k0_max, f64, 1.5);
define_param_default!(default_cost_sensitivity_max, f64, 0.01);
define_param_default!(default_inflection_years_before, u32, 5);
define_param_default!(default_inflection_years_after, u32, 10);
define_param_default!(default_seed_steepness, f64, 0.4);
define_param_default!(default_baseline_start_share, f64, 0.01);
define_param_default!(default_baseline_end_share, f64, 0.2);
define_param_default!(default_chimera_peak_share, f64, 0.15);
define_param_default!(default_chimera_half_life, f64, 3.0);
define_param_default!(default_scenarios, IndexMap<String, Scenario>, IndexMap::new());

/// Represents the contents of the entire model file.
#[derive(Debug, Deserialize, PartialEq)]
pub struct ModelParameters {
    /// The last year to forecast
    pub horizon_year: u32,
    /// The width of the rolling median window used to smooth cost data (must be odd)
    #[serde(default = "default_smoothing_window")]
    pub smoothing_window: usize,
    /// The number of consecutive years the disruptor must stay cheaper for cost parity to count
    #[serde(default = "default_persistence_years")]
    pub persistence_years: u32,
    /// The maximum year-on-year growth (or decline) of the total market
    #[serde(default = "default_max_market_cagr")]
    #[serde(deserialize_with = "deserialise_proportion")]
    pub max_market_cagr: f64,
    /// Lower bound for the fitted adoption ceiling
    #[serde(default = "default_ceiling_min")]
    pub ceiling_min: f64,
    /// The maximum market share the disruptor can reach.
    ///
    /// Can be overridden for individual regions.
    #[serde(default = "default_ceiling")]
    pub ceiling: f64,
    /// Lower bound for the base steepness of the adoption curve
    #[serde(default = "default_k0_min")]
    pub k0_min: f64,
    /// Upper bound for the base steepness of the adoption curve
    #[serde(default = "default_k0_max")]
    pub k0_max: f64,
    /// Upper bound for the sensitivity of steepness to cost advantage
    #[serde(default = "default_cost_sensitivity_max")]
    pub cost_sensitivity_max: f64,
    /// How many years before the tipping point the inflection point may fall
    #[serde(default = "default_inflection_years_before")]
    pub inflection_years_before: u32,
    /// How many years after the tipping point the inflection point may fall
    #[serde(default = "default_inflection_years_after")]
    pub inflection_years_after: u32,
    /// The base steepness used when there is too little data to fit an adoption curve
    #[serde(default = "default_seed_steepness")]
    pub seed_steepness: f64,
    /// Disruptor share at the start of the baseline adoption ramp
    #[serde(default = "default_baseline_start_share")]
    pub baseline_start_share: f64,
    /// Disruptor share at the end of the baseline adoption ramp
    #[serde(default = "default_baseline_end_share")]
    pub baseline_end_share: f64,
    /// The peak market share reached by the chimera technology
    #[serde(default = "default_chimera_peak_share")]
    #[serde(deserialize_with = "deserialise_proportion")]
    pub chimera_peak_share: f64,
    /// How many years it takes the chimera's share to halve after the tipping point
    #[serde(default = "default_chimera_half_life")]
    pub chimera_half_life: f64,
    /// Settings for the optimiser used to fit adoption curves
    #[serde(default)]
    pub optimiser: OptimiserParameters,
    /// Tolerances and severity thresholds for validation checks
    #[serde(default)]
    pub validation: ValidationParameters,
    /// Scenarios which adjust the pace of the transition
    #[serde(default = "default_scenarios")]
    pub scenarios: IndexMap<String, Scenario>,
}

/// Settings for the differential evolution optimiser
#[derive(Debug, Deserialize, PartialEq, Clone)]
#[serde(default)]
pub struct OptimiserParameters {
    /// Seed for the random number generator, for reproducible results
    pub seed: u64,
    /// The number of population members per parameter being fitted
    pub population_size: usize,
    /// The maximum number of generations before giving up
    pub max_iterations: u32,
    /// Relative tolerance for convergence of the population's objective values
    pub tolerance: f64,
}

impl Default for OptimiserParameters {
    fn default() -> Self {
        Self {
            seed: 42,
            population_size: 15,
            max_iterations: 1000,
            tolerance: 0.01,
        }
    }
}

/// Tolerances for validation checks.
///
/// A check whose violation is within tolerance passes. Violations above tolerance but within the
/// severity threshold are warnings; those above the severity threshold mark the run as invalid.
#[derive(Debug, Deserialize, PartialEq, Clone)]
#[serde(default)]
pub struct ValidationParameters {
    /// Relative tolerance for technologies' demand summing to the market
    pub sum_tolerance: f64,
    /// Relative tolerance for installed base mass balance
    pub mass_balance_tolerance: f64,
    /// Relative tolerance for new-build plus replacement demand matching the market
    pub decomposition_tolerance: f64,
    /// Tolerance for the mean absolute percentage error against historical data
    pub backtest_tolerance: f64,
    /// Tolerance for year-on-year decreases in the disruptor's share
    pub monotonicity_tolerance: f64,
    /// Severity thresholds for each check
    pub severity: SeverityThresholds,
}

impl Default for ValidationParameters {
    fn default() -> Self {
        Self {
            sum_tolerance: 0.001,
            mass_balance_tolerance: 0.001,
            decomposition_tolerance: 0.15,
            backtest_tolerance: 0.2,
            monotonicity_tolerance: 1e-9,
            severity: SeverityThresholds::default(),
        }
    }
}

/// Violations above these magnitudes mark a run as invalid
#[derive(Debug, Deserialize, PartialEq, Clone)]
#[serde(default)]
pub struct SeverityThresholds {
    /// Largest tolerated negative demand or stock value
    pub non_negativity: f64,
    /// Largest tolerated excursion of a share outside `[0, 1]`
    pub share_bounds: f64,
    /// Largest tolerated relative gap between summed demand and the market
    pub sum_consistency: f64,
    /// Largest tolerated year-on-year drop in disruptor share
    pub monotonicity: f64,
    /// Largest tolerated relative mass balance residual
    pub mass_balance: f64,
    /// Largest tolerated mean absolute percentage error against history
    pub backtest: f64,
}

impl Default for SeverityThresholds {
    fn default() -> Self {
        Self {
            non_negativity: 1e-6,
            share_bounds: 0.01,
            sum_consistency: 0.05,
            monotonicity: 0.01,
            mass_balance: 0.01,
            backtest: 0.5,
        }
    }
}

/// Adjustments to the pace of the transition
#[derive(Debug, Deserialize, PartialEq, Clone)]
#[serde(default)]
pub struct Scenario {
    /// Multiplier applied to the steepness of the adoption curve
    pub acceleration_multiplier: f64,
    /// If set, the disruptor's cost falls by this fraction every year instead of following its
    /// historical trend
    pub cost_decline_rate_override: Option<f64>,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            acceleration_multiplier: 1.0,
            cost_decline_rate_override: None,
        }
    }
}

/// Check that a value is a finite number greater than zero
fn check_positive(name: &str, value: f64) -> Result<()> {
    ensure!(
        value.is_finite() && value > 0.0,
        "{name} must be a finite number greater than zero"
    );

    Ok(())
}

/// Check that a value is a finite, non-negative number
fn check_non_negative(name: &str, value: f64) -> Result<()> {
    ensure!(
        value.is_finite() && value >= 0.0,
        "{name} must be a finite number greater than or equal to zero"
    );

    Ok(())
}

/// Check that the `smoothing_window` parameter is valid
fn check_smoothing_window(value: usize) -> Result<()> {
    ensure!(
        value % 2 == 1,
        "smoothing_window must be an odd number greater than zero"
    );

    Ok(())
}

/// Check that the adoption ceiling bounds are valid
fn check_ceiling(ceiling_min: f64, ceiling: f64) -> Result<()> {
    ensure!(
        ceiling_min > 0.0 && ceiling_min <= ceiling && ceiling <= 1.0,
        "Adoption ceilings must satisfy 0 < ceiling_min <= ceiling <= 1"
    );

    Ok(())
}

/// Check that the baseline adoption ramp is valid
fn check_baseline_shares(start: f64, end: f64) -> Result<()> {
    ensure!(
        (0.0..=1.0).contains(&start) && (start..=1.0).contains(&end),
        "Baseline shares must satisfy 0 <= baseline_start_share <= baseline_end_share <= 1"
    );

    Ok(())
}

impl OptimiserParameters {
    fn validate(&self) -> Result<()> {
        ensure!(
            self.population_size >= 2,
            "optimiser.population_size must be at least 2"
        );
        ensure!(
            self.max_iterations > 0,
            "optimiser.max_iterations cannot be zero"
        );
        check_positive("optimiser.tolerance", self.tolerance)?;

        Ok(())
    }
}

impl ValidationParameters {
    fn validate(&self) -> Result<()> {
        let severity = &self.severity;
        for (name, tolerance, threshold) in [
            ("share_bounds", self.sum_tolerance, severity.share_bounds),
            ("sum_consistency", self.sum_tolerance, severity.sum_consistency),
            (
                "monotonicity",
                self.monotonicity_tolerance,
                severity.monotonicity,
            ),
            (
                "mass_balance",
                self.mass_balance_tolerance,
                severity.mass_balance,
            ),
            ("backtest", self.backtest_tolerance, severity.backtest),
            ("non_negativity", 0.0, severity.non_negativity),
        ] {
            check_non_negative(name, tolerance)?;
            ensure!(
                threshold >= tolerance,
                "Severity threshold for {name} cannot be less than its tolerance"
            );
        }
        check_non_negative("decomposition_tolerance", self.decomposition_tolerance)?;

        Ok(())
    }
}

impl Scenario {
    fn validate(&self) -> Result<()> {
        check_positive("acceleration_multiplier", self.acceleration_multiplier)?;
        if let Some(rate) = self.cost_decline_rate_override {
            ensure!(
                (0.0..1.0).contains(&rate),
                "cost_decline_rate_override must be at least 0 and less than 1"
            );
        }

        Ok(())
    }
}

impl ModelParameters {
    /// Read a model file from the specified directory.
    ///
    /// # Arguments
    ///
    /// * `model_dir` - Folder containing model configuration files
    ///
    /// # Returns
    ///
    /// The model file contents as a [`ModelParameters`] struct or an error if the file is invalid
    pub fn from_path<P: AsRef<Path>>(model_dir: P) -> Result<ModelParameters> {
        let file_path = model_dir.as_ref().join(MODEL_PARAMETERS_FILE_NAME);
        let mut model_params: ModelParameters = read_toml(&file_path)?;

        // The baseline scenario is always available, though users can redefine it
        model_params
            .scenarios
            .entry(BASELINE_SCENARIO.to_string())
            .or_default();

        model_params
            .validate()
            .with_context(|| input_err_msg(file_path))?;

        Ok(model_params)
    }

    /// Get the scenario with the given name
    pub fn get_scenario(&self, name: &str) -> Result<&Scenario> {
        self.scenarios
            .get(name)
            .with_context(|| format!("Unknown scenario: {name}"))
    }

    /// Validate parameters after reading in file
    fn validate(&self) -> Result<()> {
        // max_market_cagr and chimera_peak_share already validated with deserialise_proportion

        check_smoothing_window(self.smoothing_window)?;
        ensure!(
            self.persistence_years > 0,
            "persistence_years cannot be zero"
        );
        check_ceiling(self.ceiling_min, self.ceiling)?;

        check_positive("k0_min", self.k0_min)?;
        ensure!(
            self.k0_max.is_finite() && self.k0_max >= self.k0_min,
            "k0_max must be a finite number no less than k0_min"
        );
        check_non_negative("cost_sensitivity_max", self.cost_sensitivity_max)?;
        check_positive("seed_steepness", self.seed_steepness)?;
        check_baseline_shares(self.baseline_start_share, self.baseline_end_share)?;
        check_positive("chimera_half_life", self.chimera_half_life)?;

        self.optimiser.validate()?;
        self.validation.validate()?;
        for (name, scenario) in &self.scenarios {
            scenario
                .validate()
                .with_context(|| format!("Invalid scenario: {name}"))?;
        }

        Ok(())
    }
}

//! Non-fatal problems encountered while forecasting a region, and per-region run diagnostics.
use super::adoption::{AdoptionMethod, LogisticParams};
use super::cost::TippingPoint;
use super::validation::{RunStatus, ValidationReport};
use crate::region::RegionID;
use strum::IntoStaticStr;

/// A reason why a forecast had to fall back to a simpler method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Degradation {
    /// Too few cost data points to fit a trend
    #[display("Insufficient cost data to fit a trend")]
    InsufficientCostData,
    /// Too few demand data points to fit a trend or adoption curve
    #[display("Insufficient demand data to fit a trend")]
    InsufficientDemandData,
    /// The disruptor never becomes persistently cheaper than the incumbent
    #[display("No tipping point found before the horizon year")]
    NoTippingPointFound,
    /// The optimiser did not converge when fitting the adoption curve
    #[display("Optimiser failed to converge when fitting adoption curve")]
    OptimisationConvergenceFailure,
    /// Historical installed base data only begins after the start of the forecast
    #[display("Installed base data starts after the first market year")]
    InstalledBaseDataTooLate,
    /// The region has no market data
    #[display("No market demand data for region")]
    MissingRegionalData,
}

impl Degradation {
    /// A short machine-readable label for this degradation
    pub fn label(self) -> &'static str {
        self.into()
    }
}

/// Add a degradation to a list, unless it is already there
pub fn push_unique(degradations: &mut Vec<Degradation>, degradation: Degradation) {
    if !degradations.contains(&degradation) {
        degradations.push(degradation);
    }
}

/// Summary of how the forecast for a region was produced
#[derive(Debug, Clone, PartialEq)]
pub struct RunDiagnostics {
    /// The region forecast
    pub region_id: RegionID,
    /// When the disruptor became persistently cheaper than the incumbent
    pub tipping_point: TippingPoint,
    /// How disruptor shares were forecast
    pub method: AdoptionMethod,
    /// Parameters of the adoption curve, if a logistic curve was used
    pub params: Option<LogisticParams>,
    /// Every reason the forecast had to fall back to a simpler method
    pub degradations: Vec<Degradation>,
    /// Results of the validation checks
    pub validation: ValidationReport,
}

impl RunDiagnostics {
    /// Whether the forecast passed validation
    pub fn status(&self) -> RunStatus {
        self.validation.status()
    }
}

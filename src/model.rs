//! The model represents the static input data provided by the user.
use crate::dataset::HistoricalData;
use crate::region::{Region, RegionMap};
use crate::technology::{Technology, TechnologyMap, TechnologyRole, find_technology_by_role};
use crate::units::Dimensionless;
use std::path::PathBuf;

pub mod parameters;
pub use parameters::*;

/// Model definition
pub struct Model {
    /// Path to model folder
    pub model_path: PathBuf,
    /// Parameters from the model TOML file
    pub parameters: ModelParameters,
    /// Regions for which forecasts are made
    pub regions: RegionMap,
    /// Technologies competing in each region's market
    pub technologies: TechnologyMap,
    /// Historical cost, demand and installed base data
    pub historical_data: HistoricalData,
}

impl Model {
    /// Get the technology with the given role, if the model defines one
    pub fn technology(&self, role: TechnologyRole) -> Option<&Technology> {
        find_technology_by_role(&self.technologies, role)
    }

    /// The maximum share the disruptor can reach in the given region
    pub fn adoption_ceiling(&self, region: &Region) -> Dimensionless {
        region
            .adoption_ceiling
            .unwrap_or(Dimensionless(self.parameters.ceiling))
    }
}

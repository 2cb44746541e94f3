//! Regions represent different geographical areas for which forecasts are made.
use crate::id::{define_id_getter, define_id_type};
use crate::units::Dimensionless;
use indexmap::IndexMap;
use serde::Deserialize;

define_id_type! {RegionID}

/// The ID of the pseudo-region formed by summing all the other regions
pub const GLOBAL_REGION_ID: &str = "GLOBAL";

/// A map of [`Region`]s, keyed by region ID
pub type RegionMap = IndexMap<RegionID, Region>;

/// Represents a region with an ID and a longer description.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct Region {
    /// A unique identifier for a region (e.g. "CHN").
    pub id: RegionID,
    /// A text description of the region (e.g. "China").
    pub description: String,
    /// The maximum market share the disruptor can reach in this region.
    ///
    /// If not provided, the model-wide ceiling is used.
    #[serde(default)]
    pub adoption_ceiling: Option<Dimensionless>,
}
define_id_getter! {Region, RegionID}

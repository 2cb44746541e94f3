//! Technologies compete for a share of a region's market.
use crate::id::{define_id_getter, define_id_type};
use crate::units::Year;
use indexmap::IndexMap;
use serde_string_enum::DeserializeLabeledStringEnum;
use strum::{Display, EnumIter};

define_id_type! {TechnologyID}

/// A map of [`Technology`]s, keyed by technology ID
pub type TechnologyMap = IndexMap<TechnologyID, Technology>;

/// The part a technology plays in the transition
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    DeserializeLabeledStringEnum,
    Display,
    EnumIter,
)]
#[strum(serialize_all = "snake_case")]
pub enum TechnologyRole {
    /// The technology whose falling costs drive the transition (e.g. battery electric vehicles)
    #[string = "disruptor"]
    Disruptor,
    /// The technology being displaced (e.g. internal combustion engine vehicles)
    #[string = "incumbent"]
    Incumbent,
    /// A transitional technology which rises before cost parity and decays afterwards
    #[string = "chimera"]
    Chimera,
    /// The total market, equal to the sum of all the other technologies
    #[string = "market"]
    Market,
}

/// A technology competing in the market
#[derive(Debug, Clone, PartialEq)]
pub struct Technology {
    /// A unique identifier for the technology (e.g. "BEV")
    pub id: TechnologyID,
    /// A text description of the technology
    pub description: String,
    /// The role of this technology in the transition
    pub role: TechnologyRole,
    /// The average service life of a unit.
    ///
    /// Always present for technologies other than the market.
    pub lifetime: Option<Year>,
}
define_id_getter! {Technology, TechnologyID}

/// Find the technology with the given role, if there is one
pub fn find_technology_by_role(
    technologies: &TechnologyMap,
    role: TechnologyRole,
) -> Option<&Technology> {
    technologies.values().find(|tech| tech.role == role)
}

//! Code for reading the technologies CSV file.
use super::*;
use crate::technology::{Technology, TechnologyID, TechnologyMap, TechnologyRole};
use crate::units::Year;
use anyhow::bail;
use serde::Deserialize;
use std::path::Path;
use strum::IntoEnumIterator;

const TECHNOLOGIES_FILE_NAME: &str = "technologies.csv";

/// Represents a row of the technologies CSV file
#[derive(Debug, Deserialize)]
struct TechnologyRaw {
    id: TechnologyID,
    description: String,
    role: TechnologyRole,
    lifetime: Option<f64>,
}

impl TechnologyRaw {
    /// Check the row is valid and convert it to a [`Technology`]
    fn into_technology(self) -> Result<Technology> {
        let lifetime = match (self.role, self.lifetime) {
            (TechnologyRole::Market, _) => None,
            (_, None) => bail!("A lifetime must be provided for technology {}", self.id),
            (_, Some(lifetime)) => {
                ensure!(
                    lifetime.is_finite() && lifetime > 0.0,
                    "Lifetime for technology {} must be a finite number greater than zero",
                    self.id
                );
                Some(Year(lifetime))
            }
        };

        Ok(Technology {
            id: self.id,
            description: self.description,
            role: self.role,
            lifetime,
        })
    }
}

/// Reads technologies from a CSV file.
///
/// # Arguments
///
/// * `model_dir` - Folder containing model configuration files
///
/// # Returns
///
/// A [`TechnologyMap`] or an error
pub fn read_technologies(model_dir: &Path) -> Result<TechnologyMap> {
    let file_path = model_dir.join(TECHNOLOGIES_FILE_NAME);
    let iter = read_csv::<TechnologyRaw>(&file_path)?;
    read_technologies_from_iter(iter).with_context(|| input_err_msg(&file_path))
}

fn read_technologies_from_iter<I>(iter: I) -> Result<TechnologyMap>
where
    I: Iterator<Item = TechnologyRaw>,
{
    let mut technologies = TechnologyMap::new();
    for raw in iter {
        let technology = raw.into_technology()?;
        let id = technology.id.clone();
        ensure!(
            technologies.insert(id.clone(), technology).is_none(),
            "Duplicate ID found: {id}"
        );
    }

    check_roles(&technologies)?;

    Ok(technologies)
}

/// Check that there is exactly one disruptor, incumbent and market and at most one chimera
fn check_roles(technologies: &TechnologyMap) -> Result<()> {
    for role in TechnologyRole::iter() {
        let count = technologies
            .values()
            .filter(|tech| tech.role == role)
            .count();
        match role {
            TechnologyRole::Chimera => ensure!(
                count <= 1,
                "At most one technology can have the role {role}"
            ),
            _ => ensure!(
                count == 1,
                "Exactly one technology must have the role {role}, but found {count}"
            ),
        }
    }

    Ok(())
}

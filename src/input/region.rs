//! Code for reading region-related information from CSV files.
use super::*;
use crate::region::RegionMap;
use crate::units::Dimensionless;
use std::path::Path;

const REGIONS_FILE_NAME: &str = "regions.csv";

/// Reads regions from a CSV file.
///
/// # Arguments
///
/// * `model_dir` - Folder containing model configuration files
///
/// # Returns
///
/// A [`RegionMap`] with the parsed regions data or an error
pub fn read_regions(model_dir: &Path) -> Result<RegionMap> {
    let file_path = model_dir.join(REGIONS_FILE_NAME);
    let regions = read_csv_id_file(&file_path)?;
    validate_regions(&regions).with_context(|| input_err_msg(&file_path))?;

    Ok(regions)
}

/// Check that any region-specific adoption ceilings are valid
fn validate_regions(regions: &RegionMap) -> Result<()> {
    for region in regions.values() {
        if let Some(ceiling) = region.adoption_ceiling {
            ensure!(
                ceiling > Dimensionless(0.0) && ceiling <= Dimensionless(1.0),
                "Adoption ceiling for region {} must be greater than 0 and no more than 1",
                region.id
            );
        }
    }

    Ok(())
}

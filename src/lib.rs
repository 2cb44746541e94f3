//! Common functionality for the technology disruption forecasting engine.
#![warn(missing_docs)]
use std::path::PathBuf;

pub mod cli;
pub mod dataset;
pub mod id;
pub mod input;
pub mod log;
pub mod model;
pub mod output;
pub mod region;
pub mod settings;
pub mod simulation;
pub mod technology;
pub mod time_series;
pub mod units;

#[cfg(test)]
mod fixture;

/// Get config dir for program.
///
/// On Linux this is `~/.config/disruption`.
pub fn get_disruption_config_dir() -> PathBuf {
    let Some(mut config_dir) = dirs::config_dir() else {
        // No config dir on this platform, so use the current directory instead
        return PathBuf::default();
    };

    config_dir.push("disruption");
    config_dir
}

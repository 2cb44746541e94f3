//! Integration tests for the `example run` command.
use disruption::cli::RunOpts;
use disruption::cli::example::handle_example_run_command;
use disruption::settings::Settings;
use tempfile::tempdir;

/// An integration test for the `example run` command.
#[test]
fn test_handle_example_run_command() {
    unsafe { std::env::set_var("DISRUPTION_LOG_LEVEL", "off") };

    let tempdir = tempdir().unwrap();
    let opts = RunOpts {
        output_dir: Some(tempdir.path().join("results")),
        ..RunOpts::default()
    };
    handle_example_run_command("ev_transition", &opts, Some(Settings::default())).unwrap();
    assert!(tempdir.path().join("results").join("forecast.csv").is_file());
}

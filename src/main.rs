//! Provides the main entry point to the program.
use disruption::cli::run_cli;
use disruption::log;
use human_panic::{metadata, setup_panic};

fn main() {
    setup_panic!(metadata!().support(
        "Open an issue describing what you were doing when the crash occurred, attaching the \
        crash report above."
    ));

    if let Err(err) = run_cli() {
        if log::is_logger_initialised() {
            ::log::error!("{err:?}");
        } else {
            eprintln!("Error: {err:?}");
        }

        // Terminate program, signalling an error
        std::process::exit(1);
    }
}

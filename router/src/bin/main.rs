//! Router entry point: sets up logging, installs the shutdown signal
//! handler, runs the dispatcher, and maps failures to the documented exit
//! codes.

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn init_logging() {
    tracing_subscriber::fmt()
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

/// Worker count hint: one worker per available core, minus the master.
/// Either choice (master participates or not) is acceptable per the design;
/// this binary keeps the master dedicated to orchestration.
fn worker_count() -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1)
}

fn main() {
    init_logging();
    info!("starting router");

    match router::dispatcher::run_with_signal_handling(worker_count()) {
        Ok(()) => {
            info!("shut down cleanly");
            std::process::exit(0);
        }
        Err(e) => {
            error!("router aborted: {e}");
            std::process::exit(-1);
        }
    }
}

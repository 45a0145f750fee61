//! caddie - batch discounted line items into a remote basket.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use caddie::CaddieError;
use caddie::cli::{Cli, execute};

/// Exit code for a run that could not start (identity, arguments, inputs).
const EXIT_NOT_STARTED: i32 = 2;

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "caddie=debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("error: failed to start runtime: {e}");
            std::process::exit(1);
        }
    };

    let code = match runtime.block_on(execute(cli)) {
        Ok(code) => code,
        Err(e @ CaddieError::IdentityMissing(_)) => {
            eprintln!("error: {e}. Capture device and workstation ids first.");
            EXIT_NOT_STARTED
        }
        Err(e) => {
            eprintln!("error: {e}");
            EXIT_NOT_STARTED
        }
    };
    std::process::exit(code);
}

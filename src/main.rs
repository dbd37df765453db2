//! This file defines the equipstat binary entry point.

use equipstat::app;
use equipstat::cli;
use equipstat::metrics;
use equipstat::server;
use equipstat::tracing;

use std::process::ExitCode;

/// Application entry point
#[tokio::main]
async fn main() -> ExitCode {
    let args = cli::parse();
    tracing::init_tracing();
    if let Err(err) = metrics::register_metrics() {
        ::tracing::error!("failed to register metrics: {}", err);
        return ExitCode::FAILURE;
    }
    if args.use_rayon {
        if let Some(threads) = args.thread_limit {
            if let Err(err) = rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build_global()
            {
                ::tracing::error!("failed to configure the Rayon thread pool: {}", err);
                return ExitCode::FAILURE;
            }
        }
    }
    let service = match app::init(&args) {
        Ok(service) => service,
        Err(err) => {
            ::tracing::error!("failed to initialise: {}", err);
            return ExitCode::FAILURE;
        }
    };
    match server::serve(&args, service).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            ::tracing::error!("server failed: {}", err);
            ExitCode::FAILURE
        }
    }
}

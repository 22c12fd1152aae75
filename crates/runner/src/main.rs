//! Benchmark runner binary.
//!
//! Serves the control stream, waits for a controller to deliver the
//! configuration, runs the benchmark, and exits once shutdown is
//! coordinated. A local signal drops in-flight work; every other shutdown
//! source lets the current step drain first.
//!
//! # Usage
//!
//! ```bash
//! kvbench-runner --port 50051
//! RUST_LOG=kvbench=debug kvbench-runner
//! ```

use std::{net::SocketAddr, path::PathBuf, process::ExitCode};

use clap::Parser;
use kvbench_proto::proto::benchmark_service_server::BenchmarkServiceServer;
use kvbench_runner::{
    control::BenchmarkControl,
    driver::{self, DriverOptions},
    shutdown::{ShutdownCoordinator, StopMode},
};
use kvbench_types::constants;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Benchmark runner: applies load to the target cluster under the
/// direction of a controller.
#[derive(Debug, Parser)]
#[command(name = "kvbench-runner", version, about)]
struct Args {
    /// Port the control-stream server listens on.
    #[arg(short = 'p', long, default_value_t = constants::DEFAULT_GRPC_SERVER_PORT)]
    port: u16,

    /// File the generated keys are persisted to.
    #[arg(long, default_value = constants::DEFAULT_KEY_FILE)]
    key_file: PathBuf,

    /// Metric rows buffered before a synchronous flush.
    #[arg(long, default_value_t = constants::DEFAULT_METRICS_BATCH_SIZE)]
    metrics_batch_size: usize,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let addr: SocketAddr = match format!("0.0.0.0:{}", args.port).parse() {
        Ok(addr) => addr,
        Err(err) => {
            error!(%err, port = args.port, "invalid listen address");
            return ExitCode::FAILURE;
        }
    };

    let coordinator = ShutdownCoordinator::new();
    let (service, handle) = BenchmarkControl::new(coordinator.clone());

    let signal_coordinator = coordinator.clone();
    tokio::spawn(async move {
        signal_coordinator.wait_for_signal().await;
    });

    let driver = tokio::spawn(driver::run(
        handle,
        coordinator.clone(),
        driver::etcd_connector_factory(),
        DriverOptions {
            key_file: args.key_file,
            metrics_batch_size: args.metrics_batch_size,
        },
    ));

    info!(%addr, "benchmark runner control server starting");
    let server = tonic::transport::Server::builder()
        .add_service(BenchmarkServiceServer::new(service))
        .serve_with_shutdown(addr, coordinator.stopped());

    if let Err(err) = server.await {
        error!(%err, "control server failed");
        coordinator.request(StopMode::Hard);
        driver.abort();
        return ExitCode::FAILURE;
    }
    info!("control server stopped");

    match coordinator.mode() {
        StopMode::Hard => {
            info!("hard stop requested, dropping in-flight work");
            driver.abort();
            ExitCode::SUCCESS
        }
        _ => match driver.await {
            Ok(Ok(())) => ExitCode::SUCCESS,
            Ok(Err(_)) => ExitCode::FAILURE,
            Err(err) => {
                error!(%err, "driver task failed");
                ExitCode::FAILURE
            }
        },
    }
}

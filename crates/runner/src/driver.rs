//! Run lifecycle orchestration.
//!
//! Once a configuration is accepted over the control stream the driver
//! executes the whole run: generate and load the synthetic data, persist
//! the key file, build the client/session pool, hand everything to the
//! step engine, recap the results, emit `BenchmarkFinished`, and request
//! graceful shutdown.

use std::{path::PathBuf, sync::Arc};

use kvbench_generator::Generator;
use kvbench_store::{ClientPool, Connector, EtcdConnector};
use kvbench_types::{BenchConfig, Scenario};
use snafu::ResultExt;
use tracing::{error, info, warn};

use crate::{
    control::ControlHandle,
    error::{GenerateSnafu, PoolSnafu, Result},
    loader,
    metrics::{MetricsSink, LOCK_HEADER, REQUEST_HEADER},
    shutdown::{ShutdownCoordinator, StopMode},
    step::StepEngine,
};

/// Builds the connector a run talks to the target cluster through.
///
/// The production factory dials etcd at the configured endpoints; tests
/// substitute a factory that hands out mock connectors.
pub type ConnectorFactory = Arc<dyn Fn(&BenchConfig) -> Arc<dyn Connector> + Send + Sync>;

/// The production connector factory.
#[must_use]
pub fn etcd_connector_factory() -> ConnectorFactory {
    Arc::new(|config: &BenchConfig| {
        Arc::new(EtcdConnector::new(config.endpoints.clone())) as Arc<dyn Connector>
    })
}

/// Fixed parameters of the runner process.
#[derive(Debug, Clone)]
pub struct DriverOptions {
    /// Where the generated keys are persisted.
    pub key_file: PathBuf,
    /// Rows buffered by the metrics sink before a flush.
    pub metrics_batch_size: usize,
}

/// Waits for a configuration, then executes the benchmark lifecycle.
///
/// Always leaves a shutdown request behind, so the serving loop winds down
/// whether the run finished, failed, or was interrupted.
pub async fn run(
    control: ControlHandle,
    coordinator: ShutdownCoordinator,
    factory: ConnectorFactory,
    options: DriverOptions,
) -> Result<()> {
    let result = execute(&control, &coordinator, factory, options).await;
    if let Err(err) = &result {
        error!(%err, "benchmark failed");
        control.report_status("Benchmark failed").await;
    }
    coordinator.request(StopMode::Graceful);
    result
}

async fn execute(
    control: &ControlHandle,
    coordinator: &ShutdownCoordinator,
    factory: ConnectorFactory,
    options: DriverOptions,
) -> Result<()> {
    info!("waiting for config to start running benchmarks");
    let config = tokio::select! {
        config = control.wait_for_config() => config,
        () = coordinator.stopped() => {
            info!("shutdown before any configuration arrived");
            return Ok(());
        }
    };

    let connector = factory(&config);

    // Generate and load the synthetic data set.
    control
        .report_status("Start generating and loading data into the database")
        .await;
    let mut generator = Generator::new(config.seed);
    let data = generator
        .generate_data(config.num_keys, config.key_size, config.value_size)
        .context(GenerateSnafu)?;
    info!(pairs = data.len(), "synthetic data generated");
    control
        .report_status(format!("Number of key-value pairs generated: {}", data.len()))
        .await;

    let keys: Arc<Vec<String>> = Arc::new(data.keys().cloned().collect());
    loader::load_store(&connector, data, coordinator).await?;
    loader::write_key_file(&options.key_file, &keys)?;
    control
        .report_status("Synthetic data generated and loaded successfully")
        .await;

    if coordinator.is_stopping() {
        return Ok(());
    }

    let header: &[&str] = match config.scenario {
        Scenario::KvStore => &REQUEST_HEADER,
        Scenario::LockService => &LOCK_HEADER,
    };
    let sink = Arc::new(MetricsSink::open(
        &config.metrics_file,
        options.metrics_batch_size,
        header,
    )?);

    // Build the pool; a dial failure here aborts the run.
    let with_sessions = config.scenario == Scenario::LockService;
    let mut pool = ClientPool::new(Arc::clone(&connector), with_sessions);
    if let Err(err) = pool.start(config.initial_clients).await {
        control.report_status("Failed to create benchmark runner").await;
        return Err(err).context(PoolSnafu);
    }

    control
        .report_status(format!("Start running {} benchmark", config.scenario))
        .await;
    let mut engine = StepEngine::new(
        Arc::clone(&config),
        pool,
        keys,
        sink,
        control.clone(),
        coordinator.clone(),
    );

    let run_result = engine.run().await;

    if run_result.is_ok() {
        control.report_status("Benchmark completed. Overall results:").await;
        for result in engine.results() {
            control
                .report_status(format!(
                    "Step with #Clients: {}, P99 Latency: {}ms, #Operations: {}, #Errors: {}",
                    result.num_clients,
                    result.p99_latency.map_or(0, |p| p.as_millis()),
                    result.operations,
                    result.errors
                ))
                .await;
        }
        if let Err(err) = control.send_finished().await {
            warn!(%err, "failed to send benchmark finished message");
        }
    }

    if let Err(err) = engine.close().await {
        warn!(%err, "failed to close the client pool cleanly");
    }

    run_result
}

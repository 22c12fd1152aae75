//! Step engine: warmup, then a ramp of load steps.
//!
//! Each step starts a fixed number of workers, lets them run the
//! dispatcher loop until the step deadline, and freezes a [`StepResult`]
//! with every latency observed in the step. A single collector task drains
//! the bounded latency channel so no worker appends to the result
//! directly.
//!
//! The ramp decrements the remaining budget by the configured step
//! duration even for a shortened final step, so a trailing partial step
//! consumes a full period from the budget. That matches the established
//! accounting of this harness and keeps run lengths comparable across
//! versions.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use kvbench_generator::Generator;
use kvbench_store::ClientPool;
use kvbench_types::{BenchConfig, RunPhase, Scenario};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use snafu::ResultExt;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::{
    control::ControlHandle,
    error::{PoolSnafu, Result},
    metrics::MetricsSink,
    shutdown::ShutdownCoordinator,
    workload::{self, WorkerContext},
};

/// Frozen outcome of one load step.
#[derive(Debug)]
pub struct StepResult {
    /// Worker count of the step.
    pub num_clients: usize,
    /// Wall-clock step start.
    pub start_time: DateTime<Utc>,
    /// Wall-clock step end.
    pub end_time: DateTime<Utc>,
    /// Operations completed in the step.
    pub operations: u64,
    /// Operations that failed in the step.
    pub errors: u64,
    /// Every latency observed in the step, in arrival order.
    pub latencies: Vec<Duration>,
    /// P99 over `latencies`; `None` for an empty step.
    pub p99_latency: Option<Duration>,
}

/// P99 as the value at `ceil(n * 0.99) - 1` of the ascending sort.
#[must_use]
pub fn p99_latency(latencies: &[Duration]) -> Option<Duration> {
    if latencies.is_empty() {
        return None;
    }
    let mut sorted = latencies.to_vec();
    sorted.sort_unstable();
    let index = ((sorted.len() as f64 * 0.99).ceil() as usize).saturating_sub(1);
    Some(sorted[index])
}

/// How many workers the next step gains.
///
/// Lock scenarios ramp unconditionally until the `max_clients` cap; the KV
/// scenario stops growing once saturated, with the same hard cap.
fn growth_increment(
    scenario: Scenario,
    saturated: bool,
    current: usize,
    max_clients: usize,
    step_size: usize,
) -> usize {
    let headroom = max_clients.saturating_sub(current);
    match scenario {
        Scenario::LockService => step_size.min(headroom),
        Scenario::KvStore => {
            if saturated {
                0
            } else {
                step_size.min(headroom)
            }
        }
    }
}

/// Executes the warmup and the ramp, owning the pool for the run.
pub struct StepEngine {
    config: Arc<BenchConfig>,
    pool: ClientPool,
    keys: Arc<Vec<String>>,
    lock_names: Arc<Vec<String>>,
    sink: Arc<MetricsSink>,
    control: ControlHandle,
    coordinator: ShutdownCoordinator,
    /// Master RNG; only touched on this single-threaded control path.
    rng: ChaCha8Rng,
    results: Vec<StepResult>,
}

impl StepEngine {
    /// Creates an engine over a started pool and loaded key space.
    #[must_use]
    pub fn new(
        config: Arc<BenchConfig>,
        pool: ClientPool,
        keys: Arc<Vec<String>>,
        sink: Arc<MetricsSink>,
        control: ControlHandle,
        coordinator: ShutdownCoordinator,
    ) -> Self {
        let lock_names = match config.scenario {
            Scenario::LockService => Arc::new(
                keys.iter()
                    .map(|key| kvbench_generator::lock_name(key))
                    .collect(),
            ),
            Scenario::KvStore => Arc::new(Vec::new()),
        };
        let rng = ChaCha8Rng::seed_from_u64(config.seed as u64);
        Self {
            config,
            pool,
            keys,
            lock_names,
            sink,
            control,
            coordinator,
            rng,
            results: Vec::new(),
        }
    }

    /// The frozen results of every completed step, warmup first.
    #[must_use]
    pub fn results(&self) -> &[StepResult] {
        &self.results
    }

    /// Runs the warmup and the ramp, then closes the metrics sink.
    pub async fn run(&mut self) -> Result<()> {
        let config = Arc::clone(&self.config);

        info!(
            clients = config.initial_clients,
            duration = ?config.warmup_duration,
            "starting warmup step"
        );
        self.control
            .report_status(format!(
                "Starting warmup step ({}s, {} clients)",
                config.warmup_duration.as_secs(),
                config.initial_clients
            ))
            .await;
        let warmup = self
            .run_step(config.initial_clients, config.warmup_duration, RunPhase::Warmup)
            .await;
        self.report_step("Warmup", &warmup).await;
        self.results.push(warmup);

        let mut current_clients = config.initial_clients;
        let mut remaining = config.total_duration;
        let mut saturated = false;
        let mut max_reached = false;

        while !remaining.is_zero() {
            if self.coordinator.is_stopping() {
                info!("shutdown requested, ending ramp early");
                break;
            }

            let actual = remaining.min(config.step_duration);
            info!(clients = current_clients, duration = ?actual, "starting step");
            let result = self
                .run_step(current_clients, actual, RunPhase::Main)
                .await;

            if !saturated
                && result
                    .p99_latency
                    .is_some_and(|p99| p99 > config.sla_latency)
            {
                saturated = true;
                let p99_ms = result.p99_latency.map_or(0, |p| p.as_millis());
                warn!(clients = current_clients, p99_ms, "throughput saturated, SLA violated");
                self.control
                    .report_status(format!(
                        "Throughput is saturated, SLA violated with {current_clients} clients \
                         (P99: {p99_ms}ms)"
                    ))
                    .await;
            }

            self.report_step("Step", &result).await;
            self.results.push(result);

            let increment = growth_increment(
                config.scenario,
                saturated,
                current_clients,
                config.max_clients,
                config.client_step_size,
            );
            if increment == 0
                && config.scenario == Scenario::LockService
                && current_clients >= config.max_clients
                && !max_reached
            {
                max_reached = true;
                info!(max_clients = config.max_clients, "client cap reached, holding steady");
            }
            if increment > 0 && !self.coordinator.is_stopping() {
                self.pool.grow(increment).await.context(PoolSnafu)?;
                current_clients += increment;
            }

            // The configured step duration is subtracted even when the
            // final step ran short.
            remaining = remaining.saturating_sub(config.step_duration);
        }

        self.sink.close()?;
        info!("all benchmark steps are completed");
        Ok(())
    }

    /// Closes the pool: every session first, then every client.
    pub async fn close(&mut self) -> Result<()> {
        self.sink.close()?;
        self.pool.close().await.context(PoolSnafu)
    }

    async fn report_step(&self, label: &str, result: &StepResult) {
        let p99_ms = result.p99_latency.map_or(0, |p| p.as_millis());
        info!(
            clients = result.num_clients,
            p99_ms,
            operations = result.operations,
            errors = result.errors,
            "{label} completed"
        );
        self.control
            .report_status(format!(
                "{label} completed with {} clients (P99: {p99_ms}ms), #Ops: {}, #Errors: {}",
                result.num_clients, result.operations, result.errors
            ))
            .await;
    }

    async fn run_step(
        &mut self,
        num_clients: usize,
        duration: Duration,
        phase: RunPhase,
    ) -> StepResult {
        let config = Arc::clone(&self.config);
        let contention_level = (num_clients / 2).max(1);
        let window_offset = if self.lock_names.is_empty() {
            0
        } else {
            self.rng.gen_range(0..self.lock_names.len())
        };

        let start_time = Utc::now();
        let deadline = Instant::now() + duration;

        // Sized to hold a second's worth of observations per client for
        // the configured step length.
        let capacity = (num_clients * config.step_duration.as_secs() as usize).max(1);
        let (latency_tx, mut latency_rx) = mpsc::channel::<Duration>(capacity);

        let collector = tokio::spawn(async move {
            let mut latencies = Vec::new();
            while let Some(latency) = latency_rx.recv().await {
                latencies.push(latency);
            }
            latencies
        });

        let operations = Arc::new(AtomicU64::new(0));
        let errors = Arc::new(AtomicU64::new(0));

        let mut workers = Vec::with_capacity(num_clients);
        for client_id in 0..num_clients {
            let entry = self.pool.get(client_id);
            let ctx = WorkerContext {
                config: Arc::clone(&config),
                client: Arc::clone(&entry.client),
                session: entry.session.clone(),
                keys: Arc::clone(&self.keys),
                lock_names: Arc::clone(&self.lock_names),
                rng: Generator::new_rand(config.seed, client_id as u64),
                deadline,
                stop: self.coordinator.subscribe(),
                latencies: latency_tx.clone(),
                sink: Arc::clone(&self.sink),
                operations: Arc::clone(&operations),
                errors: Arc::clone(&errors),
                num_clients,
                client_id,
                phase,
                contention_level,
                window_offset,
            };
            workers.push(tokio::spawn(workload::run_worker(ctx)));
        }
        drop(latency_tx);

        for worker in workers {
            if let Err(err) = worker.await {
                warn!(%err, "worker task failed");
            }
        }
        let latencies = collector.await.unwrap_or_default();
        let end_time = Utc::now();

        let p99 = p99_latency(&latencies);
        StepResult {
            num_clients,
            start_time,
            end_time,
            operations: operations.load(Ordering::Relaxed),
            errors: errors.load(Ordering::Relaxed),
            latencies,
            p99_latency: p99,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_p99_of_empty_is_undefined() {
        assert_eq!(p99_latency(&[]), None);
    }

    #[test]
    fn test_p99_of_single_observation_is_that_observation() {
        assert_eq!(p99_latency(&[ms(7)]), Some(ms(7)));
    }

    #[test]
    fn test_p99_matches_definition() {
        // 100 observations: index ceil(100 * 0.99) - 1 = 98.
        let latencies: Vec<_> = (1..=100).rev().map(ms).collect();
        assert_eq!(p99_latency(&latencies), Some(ms(99)));

        // 200 observations: index ceil(200 * 0.99) - 1 = 197.
        let latencies: Vec<_> = (1..=200).map(ms).collect();
        assert_eq!(p99_latency(&latencies), Some(ms(198)));
    }

    #[test]
    fn test_p99_ignores_arrival_order() {
        let ordered: Vec<_> = (1..=50).map(ms).collect();
        let mut shuffled = ordered.clone();
        shuffled.swap(0, 49);
        shuffled.swap(10, 20);
        assert_eq!(p99_latency(&ordered), p99_latency(&shuffled));
    }

    #[test]
    fn test_kv_growth_stops_when_saturated() {
        assert_eq!(growth_increment(Scenario::KvStore, false, 5, 100, 5), 5);
        assert_eq!(growth_increment(Scenario::KvStore, true, 5, 100, 5), 0);
    }

    #[test]
    fn test_growth_respects_hard_cap() {
        assert_eq!(growth_increment(Scenario::KvStore, false, 98, 100, 5), 2);
        assert_eq!(growth_increment(Scenario::KvStore, false, 100, 100, 5), 0);
    }

    #[test]
    fn test_lock_growth_ignores_saturation_until_cap() {
        assert_eq!(growth_increment(Scenario::LockService, true, 5, 100, 5), 5);
        assert_eq!(growth_increment(Scenario::LockService, true, 99, 100, 5), 1);
        assert_eq!(growth_increment(Scenario::LockService, true, 100, 100, 5), 0);
    }

    #[test]
    fn test_ramp_is_monotonic_and_bounded() {
        // Simulate the ramp arithmetic for both scenarios.
        for scenario in [Scenario::KvStore, Scenario::LockService] {
            let mut current = 5usize;
            let mut previous = current;
            for _ in 0..50 {
                current += growth_increment(scenario, false, current, 100, 7);
                assert!(current >= previous);
                assert!(current <= 100);
                previous = current;
            }
            assert_eq!(current, 100);
        }
    }
}

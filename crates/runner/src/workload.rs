//! Per-operation workload composition.
//!
//! One worker runs one dispatcher loop until its step deadline fires or
//! shutdown is requested, both observed at the loop head. KV operations
//! run under a deadline of `max_wait_time` clamped to the step deadline;
//! lock phases run under plain `max_wait_time` so an acquired lock is
//! always given its release attempt even when the step expires mid-cycle.
//!
//! Every completed operation submits its metric row after the outcome is
//! known, and appends its observed latencies to the step's collector
//! channel; for mixed lock workloads that is all three phases.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use kvbench_generator::Generator;
use kvbench_store::{with_deadline, LockSession, StoreClient, StoreError};
use kvbench_types::{BenchConfig, RunPhase, Scenario, WorkloadType};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::{
    metrics::{self, LockMetric, MetricRow, MetricsSink, RequestMetric, NOT_APPLICABLE},
    shutdown::StopMode,
};

/// Operation labels recorded in the `operation` column.
pub const OP_READ: &str = "read";
/// Write operation label.
pub const OP_WRITE: &str = "write";
/// Lock acquire phase label.
pub const OP_LOCK_ACQUIRE: &str = "lock-acquire";
/// Lock release phase label.
pub const OP_LOCK_RELEASE: &str = "lock-release";

/// Everything one worker needs for its step.
pub struct WorkerContext {
    /// The run configuration.
    pub config: Arc<BenchConfig>,
    /// Pool entry assigned to this worker.
    pub client: Arc<dyn StoreClient>,
    /// The entry's session; present for lock scenarios.
    pub session: Option<Arc<dyn LockSession>>,
    /// The loaded key space.
    pub keys: Arc<Vec<String>>,
    /// Lock names derived from the key space.
    pub lock_names: Arc<Vec<String>>,
    /// This worker's derived RNG stream.
    pub rng: ChaCha8Rng,
    /// Step deadline.
    pub deadline: Instant,
    /// Shutdown fan-in.
    pub stop: watch::Receiver<StopMode>,
    /// Latency observations flow to the step collector through here.
    pub latencies: mpsc::Sender<Duration>,
    /// Metric row sink.
    pub sink: Arc<MetricsSink>,
    /// Step-wide operation counter.
    pub operations: Arc<AtomicU64>,
    /// Step-wide error counter.
    pub errors: Arc<AtomicU64>,
    /// Worker count of this step.
    pub num_clients: usize,
    /// This worker's id.
    pub client_id: usize,
    /// Phase tag for the emitted rows.
    pub phase: RunPhase,
    /// Width of the contention window; meaningful for lock-contention.
    pub contention_level: usize,
    /// Start of the contention window within `lock_names`.
    pub window_offset: usize,
}

impl WorkerContext {
    fn should_stop(&self) -> bool {
        *self.stop.borrow() != StopMode::Running || Instant::now() >= self.deadline
    }

    /// Deadline for the next KV operation: `max_wait_time` clamped to the
    /// remaining step time. `None` once the step is over.
    fn kv_deadline(&self) -> Option<Duration> {
        let remaining = self.deadline.checked_duration_since(Instant::now())?;
        if remaining.is_zero() {
            return None;
        }
        Some(self.config.max_wait_time.min(remaining))
    }

    fn submit(&self, row: MetricRow) {
        if let Err(err) = self.sink.add(row) {
            warn!(%err, "failed to export metric");
        }
    }

    fn account(&self, had_error: bool) {
        if had_error {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
        self.operations.fetch_add(1, Ordering::Relaxed);
    }
}

/// Index of the next lock to contend for.
///
/// Contended workloads draw from a window of `contention_level`
/// consecutive names starting at the step's window offset, wrapping at the
/// end of the list; everything else draws uniformly from the full list.
fn pick_lock_index(
    rng: &mut ChaCha8Rng,
    contended: bool,
    len: usize,
    window_offset: usize,
    contention_level: usize,
) -> usize {
    if contended {
        (window_offset + rng.gen_range(0..contention_level)) % len
    } else {
        rng.gen_range(0..len)
    }
}

/// Runs one worker until its step ends.
pub async fn run_worker(ctx: WorkerContext) {
    match ctx.config.scenario {
        Scenario::KvStore => kv_loop(ctx).await,
        Scenario::LockService => lock_loop(ctx).await,
    }
}

async fn kv_loop(mut ctx: WorkerContext) {
    // Scenario agreement is validated at config time; a lock workload
    // cannot reach this loop.
    let read_percent = ctx.config.workload_type.read_percent().unwrap_or(100.0);

    loop {
        if ctx.should_stop() {
            return;
        }
        let Some(op_deadline) = ctx.kv_deadline() else {
            return;
        };

        let is_read = ctx.rng.gen_range(0.0..100.0) < read_percent;
        let key = ctx.keys[ctx.rng.gen_range(0..ctx.keys.len())].clone();

        let started = Instant::now();
        let result = if is_read {
            with_deadline(op_deadline, ctx.client.get(&key)).await.map(|_| ())
        } else {
            let value = Generator::value_with(ctx.config.value_size, &mut ctx.rng);
            with_deadline(op_deadline, ctx.client.put(&key, value)).await
        };
        let latency = started.elapsed();

        if ctx.latencies.send(latency).await.is_err() {
            return;
        }

        let operation = if is_read { OP_READ } else { OP_WRITE };
        let (status_code, status_text, success) = match &result {
            Ok(()) => (0, "success".to_owned(), true),
            Err(err) => {
                debug!(%err, operation, key, "kv operation failed");
                let (code, text) = err.status();
                (code, text, false)
            }
        };
        ctx.account(!success);

        ctx.submit(MetricRow::Request(RequestMetric {
            timestamp_nanos: metrics::now_nanos(),
            key,
            operation: operation.to_owned(),
            latency,
            success,
            status_code,
            status_text,
            num_clients: ctx.num_clients,
            client_id: ctx.client_id,
            run_phase: ctx.phase,
        }));
    }
}

async fn lock_loop(mut ctx: WorkerContext) {
    let Some(session) = ctx.session.clone() else {
        // Pool invariant: lock scenarios always carry sessions.
        warn!(client_id = ctx.client_id, "lock worker without a session");
        return;
    };
    let contended = ctx.config.workload_type == WorkloadType::LockContention;

    loop {
        if ctx.should_stop() {
            return;
        }

        let index = pick_lock_index(
            &mut ctx.rng,
            contended,
            ctx.lock_names.len(),
            ctx.window_offset,
            ctx.contention_level,
        );
        let lock_name = ctx.lock_names[index].clone();
        let mutex = session.new_mutex(&lock_name);

        let outcome = match ctx.config.workload_type {
            WorkloadType::LockOnly | WorkloadType::LockContention => {
                lock_only_cycle(&mut ctx, mutex).await
            }
            WorkloadType::LockMixedRead => {
                lock_mixed_cycle(&mut ctx, mutex, &lock_name, false).await
            }
            WorkloadType::LockMixedWrite => {
                lock_mixed_cycle(&mut ctx, mutex, &lock_name, true).await
            }
            _ => return,
        };

        match outcome {
            Some(had_error) => ctx.account(had_error),
            // The collector went away; the step is being torn down.
            None => return,
        }
    }
}

/// Acquire and immediately release. Returns whether the cycle errored, or
/// `None` when the latency channel closed under us.
async fn lock_only_cycle(ctx: &mut WorkerContext, mut mutex: Box<dyn kvbench_store::NamedLock>) -> Option<bool> {
    let max_wait = ctx.config.max_wait_time;
    let mut acquire_latency = Duration::ZERO;
    let mut release_latency = Duration::ZERO;
    let mut success = false;
    let mut had_error = false;
    let mut lock_op_status_code = 0;
    let mut lock_op_status_text = NOT_APPLICABLE.to_owned();

    let started = Instant::now();
    match with_deadline(max_wait, mutex.try_lock()).await {
        Ok(()) => {
            acquire_latency = started.elapsed();
            success = true;
            ctx.latencies.send(acquire_latency).await.ok()?;

            let release_started = Instant::now();
            let released = with_deadline(max_wait, mutex.unlock()).await;
            release_latency = release_started.elapsed();
            if let Err(err) = released {
                warn!(%err, lock = mutex.key(), "failed to release the lock");
                (lock_op_status_code, lock_op_status_text) = err.status();
                had_error = true;
            }
            ctx.latencies.send(release_latency).await.ok()?;
        }
        Err(err) => {
            log_acquire_failure(&err, &mutex.key());
            (lock_op_status_code, lock_op_status_text) = err.status();
            had_error = true;
        }
    }

    ctx.submit(MetricRow::Lock(LockMetric {
        request: RequestMetric {
            timestamp_nanos: metrics::now_nanos(),
            key: NOT_APPLICABLE.to_owned(),
            operation: format!("{OP_LOCK_ACQUIRE}+{OP_LOCK_RELEASE}"),
            latency: acquire_latency + release_latency,
            success,
            status_code: 0,
            status_text: NOT_APPLICABLE.to_owned(),
            num_clients: ctx.num_clients,
            client_id: ctx.client_id,
            run_phase: ctx.phase,
        },
        lock_name: mutex.key(),
        acquire_latency,
        release_latency,
        lock_op_status_code,
        lock_op_status_text,
        contention_level: ctx.contention_level,
    }));

    Some(had_error)
}

/// Acquire, touch the guarded key, release. `write` selects put over get.
async fn lock_mixed_cycle(
    ctx: &mut WorkerContext,
    mut mutex: Box<dyn kvbench_store::NamedLock>,
    lock_name: &str,
    write: bool,
) -> Option<bool> {
    let max_wait = ctx.config.max_wait_time;
    let key = kvbench_generator::lock_key(lock_name).to_owned();
    let kv_op = if write { OP_WRITE } else { OP_READ };

    let mut acquire_latency = Duration::ZERO;
    let mut kv_latency = Duration::ZERO;
    let mut release_latency = Duration::ZERO;
    let mut success = false;
    let mut status_code = 0;
    let mut status_text = NOT_APPLICABLE.to_owned();
    let mut lock_op_status_code = 0;
    let mut lock_op_status_text = NOT_APPLICABLE.to_owned();

    let started = Instant::now();
    match with_deadline(max_wait, mutex.try_lock()).await {
        Ok(()) => {
            acquire_latency = started.elapsed();
            success = true;
            ctx.latencies.send(acquire_latency).await.ok()?;

            let kv_started = Instant::now();
            let kv_result = if write {
                let value = Generator::value_with(ctx.config.value_size, &mut ctx.rng);
                with_deadline(max_wait, ctx.client.put(&key, value)).await
            } else {
                with_deadline(max_wait, ctx.client.get(&key)).await.map(|_| ())
            };
            kv_latency = kv_started.elapsed();
            if let Err(err) = kv_result {
                debug!(%err, operation = kv_op, key, "kv operation under lock failed");
                (status_code, status_text) = err.status();
                success = false;
            }
            ctx.latencies.send(kv_latency).await.ok()?;

            let release_started = Instant::now();
            let released = with_deadline(max_wait, mutex.unlock()).await;
            release_latency = release_started.elapsed();
            if let Err(err) = released {
                warn!(%err, lock = mutex.key(), "failed to release the lock");
                (lock_op_status_code, lock_op_status_text) = err.status();
                success = false;
            }
            ctx.latencies.send(release_latency).await.ok()?;
        }
        Err(err) => {
            log_acquire_failure(&err, &mutex.key());
            (lock_op_status_code, lock_op_status_text) = err.status();
        }
    }

    let had_error = !success;
    ctx.submit(MetricRow::Lock(LockMetric {
        request: RequestMetric {
            timestamp_nanos: metrics::now_nanos(),
            key,
            operation: format!("{OP_LOCK_ACQUIRE}+{kv_op}+{OP_LOCK_RELEASE}"),
            latency: acquire_latency + kv_latency + release_latency,
            success,
            status_code,
            status_text,
            num_clients: ctx.num_clients,
            client_id: ctx.client_id,
            run_phase: ctx.phase,
        },
        lock_name: mutex.key(),
        acquire_latency,
        release_latency,
        lock_op_status_code,
        lock_op_status_text,
        contention_level: ctx.contention_level,
    }));

    Some(had_error)
}

fn log_acquire_failure(err: &StoreError, lock: &str) {
    match err {
        StoreError::Locked => {
            debug!(lock, "failed to acquire the lock, held by another session");
        }
        StoreError::SessionExpired => {
            debug!(lock, "failed to acquire the lock, session expired");
        }
        other => {
            debug!(%other, lock, "failed to acquire the lock");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use kvbench_generator::Generator;
    use rand::Rng;

    use super::*;

    #[test]
    fn test_read_write_mix_converges() {
        // The dispatcher draws a uniform float in [0, 100) per operation;
        // over many draws the read fraction must converge on the
        // configured share.
        let mut rng = Generator::new_rand(42, 3);
        let draws = 10_000;
        for (share, tolerance) in [(95.0, 0.01), (50.0, 0.05), (100.0, 0.0)] {
            let reads = (0..draws)
                .filter(|_| rng.gen_range(0.0..100.0) < share)
                .count();
            let fraction = reads as f64 / f64::from(draws);
            assert!(
                (fraction - share / 100.0).abs() <= tolerance,
                "share {share}: observed {fraction}"
            );
        }
    }

    #[test]
    fn test_contended_picks_stay_inside_window() {
        let mut rng = Generator::new_rand(7, 0);
        let len = 100;
        let offset = 95;
        let level = 10;
        for _ in 0..1000 {
            let index = pick_lock_index(&mut rng, true, len, offset, level);
            let in_window = (95..100).contains(&index) || (0..5).contains(&index);
            assert!(in_window, "index {index} escaped the wrapped window");
        }
    }

    #[test]
    fn test_uncontended_picks_cover_the_full_range() {
        let mut rng = Generator::new_rand(7, 1);
        let len = 10;
        let mut seen = vec![false; len];
        for _ in 0..1000 {
            seen[pick_lock_index(&mut rng, false, len, 0, 1)] = true;
        }
        assert!(seen.iter().all(|s| *s), "uniform draw should cover all names");
    }

    #[test]
    fn test_single_client_contention_window_is_valid() {
        // contention_level floors at 1, so a 1-client step still draws.
        let mut rng = Generator::new_rand(1, 0);
        let index = pick_lock_index(&mut rng, true, 50, 10, 1);
        assert_eq!(index, 10);
    }
}

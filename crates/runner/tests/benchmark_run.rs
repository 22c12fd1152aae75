//! Step-engine integration tests against the in-memory mock store.
//!
//! These drive the engine end to end (pool, dispatcher, collector, sink)
//! with short step durations and an injected per-operation latency so the
//! loops are bounded.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{path::PathBuf, sync::Arc, time::Duration};

use kvbench_generator::Generator;
use kvbench_runner::{
    control::BenchmarkControl,
    metrics::{MetricsSink, LOCK_HEADER, REQUEST_HEADER},
    shutdown::{ShutdownCoordinator, StopMode},
    step::StepEngine,
};
use kvbench_store::{ClientPool, Connector, MockStore};
use kvbench_types::{BenchConfig, Scenario, WorkloadType};

fn test_config(
    scenario: Scenario,
    workload: WorkloadType,
    metrics_file: PathBuf,
) -> BenchConfig {
    BenchConfig {
        seed: 42,
        num_keys: 50,
        key_size: 16,
        value_size: 32,
        endpoints: vec!["127.0.0.1:2379".to_owned()],
        warmup_duration: Duration::from_millis(200),
        step_duration: Duration::from_millis(200),
        total_duration: Duration::from_millis(200),
        initial_clients: 2,
        client_step_size: 2,
        max_clients: 2,
        max_wait_time: Duration::from_millis(100),
        workload_type: workload,
        scenario,
        sla_latency: Duration::from_secs(1),
        sla_percentile: 0.99,
        metrics_file,
    }
}

struct Harness {
    store: MockStore,
    engine: StepEngine,
    coordinator: ShutdownCoordinator,
    metrics_file: PathBuf,
    _dir: tempfile::TempDir,
}

async fn harness(config: Arc<BenchConfig>, dir: tempfile::TempDir) -> Harness {
    let store = MockStore::new();

    let mut generator = Generator::new(config.seed);
    let data = generator
        .generate_data(config.num_keys, config.key_size, config.value_size)
        .unwrap();
    let keys: Arc<Vec<String>> = Arc::new(data.keys().cloned().collect());
    let client = store.connector().connect().await.unwrap();
    for (key, value) in data {
        client.put(&key, value).await.unwrap();
    }

    // Slow the mock down so worker loops stay bounded.
    store.set_latency(Duration::from_millis(1));

    let with_sessions = config.scenario == Scenario::LockService;
    let mut pool = ClientPool::new(Arc::new(store.connector()), with_sessions);
    pool.start(config.initial_clients).await.unwrap();

    let header: &[&str] = match config.scenario {
        Scenario::KvStore => &REQUEST_HEADER,
        Scenario::LockService => &LOCK_HEADER,
    };
    let metrics_file = config.metrics_file.clone();
    let sink = Arc::new(MetricsSink::open(&metrics_file, 10, header).unwrap());

    let coordinator = ShutdownCoordinator::new();
    let (_service, handle) = BenchmarkControl::new(coordinator.clone());
    let engine = StepEngine::new(
        config,
        pool,
        keys,
        sink,
        handle,
        coordinator.clone(),
    );

    Harness {
        store,
        engine,
        coordinator,
        metrics_file,
        _dir: dir,
    }
}

fn read_rows(path: &PathBuf) -> (Vec<String>, Vec<Vec<String>>) {
    let contents = std::fs::read_to_string(path).unwrap();
    let mut lines = contents.lines();
    let header: Vec<String> = lines
        .next()
        .expect("metrics file must have a header")
        .split(',')
        .map(str::to_owned)
        .collect();
    let rows = lines
        .map(|line| line.split(',').map(str::to_owned).collect())
        .collect();
    (header, rows)
}

#[tokio::test(flavor = "multi_thread")]
async fn warmup_then_single_read_only_step() {
    let dir = tempfile::tempdir().unwrap();
    let config = Arc::new(test_config(
        Scenario::KvStore,
        WorkloadType::ReadOnly,
        dir.path().join("metrics.csv"),
    ));
    let mut h = harness(config, dir).await;

    h.engine.run().await.unwrap();

    // Exactly one warmup and one main step.
    let results = h.engine.results();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].num_clients, 2);
    assert_eq!(results[1].num_clients, 2);
    assert!(results[1].operations > 0);
    assert_eq!(results[1].errors, 0);
    assert!(results[1].p99_latency.is_some());

    let (header, rows) = read_rows(&h.metrics_file);
    assert_eq!(header, REQUEST_HEADER.to_vec());
    assert!(!rows.is_empty());
    for row in &rows {
        assert_eq!(row[2], "read", "read-only workload must only read");
        assert!(row[9] == "warmup" || row[9] == "main");
    }
    assert!(rows.iter().any(|r| r[9] == "warmup"));
    assert!(rows.iter().any(|r| r[9] == "main"));

    // Operation counts match emitted rows per phase.
    let warmup_rows = rows.iter().filter(|r| r[9] == "warmup").count() as u64;
    let main_rows = rows.iter().filter(|r| r[9] == "main").count() as u64;
    assert_eq!(warmup_rows, results[0].operations);
    assert_eq!(main_rows, results[1].operations);
}

#[tokio::test(flavor = "multi_thread")]
async fn update_heavy_emits_both_operations() {
    let dir = tempfile::tempdir().unwrap();
    let config = Arc::new(test_config(
        Scenario::KvStore,
        WorkloadType::UpdateHeavy,
        dir.path().join("metrics.csv"),
    ));
    let mut h = harness(config, dir).await;

    h.engine.run().await.unwrap();

    let (_, rows) = read_rows(&h.metrics_file);
    assert!(rows.iter().any(|r| r[2] == "read"));
    assert!(rows.iter().any(|r| r[2] == "write"));
    // Writes land in the shared store.
    assert_eq!(h.store.len(), 50, "writes only touch loaded keys");
}

#[tokio::test(flavor = "multi_thread")]
async fn saturation_freezes_kv_ramp() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(
        Scenario::KvStore,
        WorkloadType::ReadOnly,
        dir.path().join("metrics.csv"),
    );
    // Three main steps, room to grow, and an SLA the mock always violates.
    config.total_duration = Duration::from_millis(600);
    config.max_clients = 10;
    config.sla_latency = Duration::from_micros(1);
    let mut h = harness(Arc::new(config), dir).await;

    h.engine.run().await.unwrap();

    let results = h.engine.results();
    assert_eq!(results.len(), 4, "warmup plus three main steps");
    for result in &results[1..] {
        assert_eq!(
            result.num_clients, 2,
            "saturated ramp must not grow past the first step's count"
        );
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn lock_only_rows_pair_acquire_and_release() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(
        Scenario::LockService,
        WorkloadType::LockOnly,
        dir.path().join("metrics.csv"),
    );
    config.initial_clients = 1;
    config.max_clients = 1;
    config.client_step_size = 1;
    let mut h = harness(Arc::new(config), dir).await;

    h.engine.run().await.unwrap();

    let (header, rows) = read_rows(&h.metrics_file);
    assert_eq!(header, LOCK_HEADER.to_vec());
    assert!(!rows.is_empty());
    for row in &rows {
        assert_eq!(row[2], "lock-acquire+lock-release");
        assert_eq!(row[1], "N/A");
        assert_eq!(row[4], "true", "single client never contends");
        let acquire_ms: u64 = row[11].parse().unwrap();
        let release_ms: u64 = row[12].parse().unwrap();
        assert!(acquire_ms < 1000);
        assert!(release_ms < 1000);
        assert!(!row[10].is_empty(), "lock_name must be populated");
    }
    assert_eq!(h.store.held_locks(), 0, "every acquired lock was released");
}

#[tokio::test(flavor = "multi_thread")]
async fn contended_locks_record_failures_without_release() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(
        Scenario::LockService,
        WorkloadType::LockOnly,
        dir.path().join("metrics.csv"),
    );
    config.num_keys = 3;
    config.initial_clients = 1;
    config.max_clients = 1;
    config.client_step_size = 1;
    let config = Arc::new(config);
    let mut h = harness(Arc::clone(&config), dir).await;

    // Every lock is held by a session the pool never sees.
    let keys = Generator::new(config.seed)
        .generate_data(config.num_keys, config.key_size, config.value_size)
        .unwrap();
    for key in keys.keys() {
        h.store.hold_lock_elsewhere(&kvbench_generator::lock_name(key));
    }

    h.engine.run().await.unwrap();

    let (_, rows) = read_rows(&h.metrics_file);
    assert!(!rows.is_empty());
    for row in &rows {
        assert_eq!(row[4], "false", "acquire can never succeed");
        assert_eq!(row[12], "0", "no release phase happened");
        let lock_code: i32 = row[13].parse().unwrap();
        assert_eq!(lock_code, -4, "held-elsewhere classifies as unclassified");
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn graceful_shutdown_ends_ramp_and_flushes() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(
        Scenario::KvStore,
        WorkloadType::ReadOnly,
        dir.path().join("metrics.csv"),
    );
    // Nominally a long run; shutdown cuts it short.
    config.total_duration = Duration::from_secs(60);
    let mut h = harness(Arc::new(config), dir).await;

    let coordinator = h.coordinator.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        coordinator.request(StopMode::Graceful);
    });

    tokio::time::timeout(Duration::from_secs(10), h.engine.run())
        .await
        .expect("run must end promptly after shutdown")
        .unwrap();

    let results = h.engine.results();
    assert!(results.len() < 10, "ramp ended early");

    // Close is idempotent; the terminal file state does not change.
    h.engine.close().await.unwrap();
    let after_first = std::fs::read_to_string(&h.metrics_file).unwrap();
    h.engine.close().await.unwrap();
    let after_second = std::fs::read_to_string(&h.metrics_file).unwrap();
    assert_eq!(after_first, after_second);
}

//! End-to-end control-stream tests: a real tonic server and client over
//! localhost, the driver running against the mock store.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{sync::Arc, time::Duration};

use kvbench_proto::proto::{
    benchmark_service_client::BenchmarkServiceClient,
    benchmark_service_server::BenchmarkServiceServer, ctrl_message::Payload, ConfigFile,
    CtrlMessage, Shutdown,
};
use kvbench_runner::{
    control::BenchmarkControl,
    driver::{self, ConnectorFactory, DriverOptions},
    shutdown::ShutdownCoordinator,
};
use kvbench_store::{Connector, MockStore};
use kvbench_types::{BenchConfig, Scenario, WorkloadType};
use tokio::sync::mpsc;
use tokio_stream::wrappers::{ReceiverStream, TcpListenerStream};
use tonic::transport::{Channel, Server};

struct TestRunner {
    store: MockStore,
    coordinator: ShutdownCoordinator,
    server: tokio::task::JoinHandle<()>,
    driver: tokio::task::JoinHandle<kvbench_runner::Result<()>>,
    endpoint: String,
    dir: tempfile::TempDir,
}

async fn spawn_runner() -> TestRunner {
    let dir = tempfile::tempdir().unwrap();
    let store = MockStore::new();
    store.set_latency(Duration::from_millis(1));

    let coordinator = ShutdownCoordinator::new();
    let (service, handle) = BenchmarkControl::new(coordinator.clone());

    let mock = store.clone();
    let factory: ConnectorFactory =
        Arc::new(move |_config: &BenchConfig| Arc::new(mock.connector()) as Arc<dyn Connector>);

    let driver = tokio::spawn(driver::run(
        handle,
        coordinator.clone(),
        factory,
        DriverOptions {
            key_file: dir.path().join("keys.txt"),
            metrics_batch_size: 10,
        },
    ));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let incoming = TcpListenerStream::new(listener);
    let shutdown = coordinator.clone();
    let server = tokio::spawn(async move {
        Server::builder()
            .add_service(BenchmarkServiceServer::new(service))
            .serve_with_incoming_shutdown(incoming, shutdown.stopped())
            .await
            .unwrap();
    });

    TestRunner {
        store,
        coordinator,
        server,
        driver,
        endpoint: format!("http://{addr}"),
        dir,
    }
}

async fn connect(endpoint: &str) -> BenchmarkServiceClient<Channel> {
    for _ in 0..50 {
        if let Ok(client) = BenchmarkServiceClient::connect(endpoint.to_owned()).await {
            return client;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("runner never became reachable at {endpoint}");
}

fn base_config(total: Duration) -> BenchConfig {
    BenchConfig {
        seed: 42,
        num_keys: 20,
        key_size: 16,
        value_size: 16,
        endpoints: vec!["127.0.0.1:2379".to_owned()],
        warmup_duration: Duration::from_millis(100),
        step_duration: Duration::from_millis(100),
        total_duration: total,
        initial_clients: 2,
        client_step_size: 2,
        max_clients: 2,
        max_wait_time: Duration::from_millis(100),
        workload_type: WorkloadType::ReadOnly,
        scenario: Scenario::KvStore,
        sla_latency: Duration::from_secs(1),
        sla_percentile: 0.99,
        metrics_file: std::path::PathBuf::from("metrics.csv"),
    }
}

fn config_frame(mut config: BenchConfig, dir: &tempfile::TempDir) -> CtrlMessage {
    config.metrics_file = dir.path().join("metrics.csv");
    CtrlMessage {
        payload: Some(Payload::ConfigFile(ConfigFile {
            content: serde_json::to_vec(&config).unwrap(),
        })),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn full_run_reports_and_finishes() {
    let runner = spawn_runner().await;
    let mut client = connect(&runner.endpoint).await;

    let (tx, rx) = mpsc::channel(16);
    let mut inbound = client
        .ctrl_stream(ReceiverStream::new(rx))
        .await
        .unwrap()
        .into_inner();

    let config = base_config(Duration::from_millis(100));
    tx.send(config_frame(config, &runner.dir)).await.unwrap();

    let mut saw_config_ack = false;
    let mut saw_status = false;
    let mut saw_finished = false;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(30);
    loop {
        let frame = tokio::time::timeout_at(deadline, inbound.message())
            .await
            .expect("runner went silent")
            .unwrap();
        let Some(frame) = frame else {
            break; // runner closed the stream after finishing
        };
        match frame.payload {
            Some(Payload::ConfigFileResponse(resp)) => {
                assert!(resp.success, "valid config must be accepted");
                saw_config_ack = true;
            }
            Some(Payload::BenchmarkStatus(status)) => {
                assert!(!status.status.is_empty());
                saw_status = true;
            }
            Some(Payload::BenchmarkFinished(_)) => {
                saw_finished = true;
            }
            _ => {}
        }
        if saw_finished {
            break;
        }
    }
    assert!(saw_config_ack);
    assert!(saw_status);
    assert!(saw_finished);

    // The driver completed and left the artifacts behind.
    tokio::time::timeout(Duration::from_secs(10), runner.driver)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(runner.dir.path().join("keys.txt").exists());
    let metrics = std::fs::read_to_string(runner.dir.path().join("metrics.csv")).unwrap();
    assert!(metrics.lines().count() > 1, "header plus data rows");
    assert_eq!(runner.store.len(), 20, "initial load reached the store");

    tokio::time::timeout(Duration::from_secs(10), runner.server)
        .await
        .expect("server must wind down")
        .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn invalid_config_is_rejected() {
    let runner = spawn_runner().await;
    let mut client = connect(&runner.endpoint).await;

    let (tx, rx) = mpsc::channel(16);
    let mut inbound = client
        .ctrl_stream(ReceiverStream::new(rx))
        .await
        .unwrap()
        .into_inner();

    let mut config = base_config(Duration::from_millis(100));
    config.initial_clients = 50; // exceeds max_clients
    tx.send(config_frame(config, &runner.dir)).await.unwrap();

    let frame = tokio::time::timeout(Duration::from_secs(10), inbound.message())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    match frame.payload {
        Some(Payload::ConfigFileResponse(resp)) => {
            assert!(!resp.success, "invalid config must be rejected");
        }
        other => panic!("expected a config response, got {other:?}"),
    }

    runner.coordinator.request(kvbench_runner::shutdown::StopMode::Graceful);
    let _ = tokio::time::timeout(Duration::from_secs(10), runner.server).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn peer_shutdown_stops_a_long_run_cleanly() {
    let runner = spawn_runner().await;
    let mut client = connect(&runner.endpoint).await;

    let (tx, rx) = mpsc::channel(16);
    let mut inbound = client
        .ctrl_stream(ReceiverStream::new(rx))
        .await
        .unwrap()
        .into_inner();

    // Nominally a one-minute run.
    let config = base_config(Duration::from_secs(60));
    tx.send(config_frame(config, &runner.dir)).await.unwrap();

    // Wait until the benchmark is actually under way.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(30);
    loop {
        let frame = tokio::time::timeout_at(deadline, inbound.message())
            .await
            .expect("runner went silent")
            .unwrap()
            .expect("stream must stay open while running");
        if let Some(Payload::BenchmarkStatus(status)) = frame.payload {
            if status.status.contains("Start running") {
                break;
            }
        }
    }

    tx.send(CtrlMessage {
        payload: Some(Payload::Shutdown(Shutdown {})),
    })
    .await
    .unwrap();

    // The runner drains the stream without a BenchmarkFinished frame.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(30);
    loop {
        let frame = tokio::time::timeout_at(deadline, inbound.message())
            .await
            .expect("runner must close the stream after shutdown")
            .unwrap();
        match frame {
            None => break,
            Some(frame) => {
                assert!(
                    !matches!(frame.payload, Some(Payload::BenchmarkFinished(_))),
                    "an interrupted run must not report completion"
                );
            }
        }
    }

    // Driver and server exit; the sink was flushed on the way down.
    tokio::time::timeout(Duration::from_secs(15), runner.driver)
        .await
        .expect("driver must stop")
        .unwrap()
        .unwrap();
    tokio::time::timeout(Duration::from_secs(15), runner.server)
        .await
        .expect("server must stop")
        .unwrap();

    let metrics = std::fs::read_to_string(runner.dir.path().join("metrics.csv")).unwrap();
    assert!(metrics.lines().count() >= 1, "header row survived the flush");
    assert_eq!(runner.store.held_locks(), 0);
}

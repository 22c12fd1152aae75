//! Control-stream service and server-push handle.
//!
//! The runner exposes `benchmarkpb.BenchmarkService/CTRLStream`, one
//! long-lived bidirectional stream per run. The stream task owns the
//! transport: inbound frames are handled by its receive loop, and every
//! server-initiated send goes through the outbound mailbox the task drains
//! into the response stream. [`ControlHandle`] is the push side handed to
//! the rest of the runner; it fails fast with "no active stream" when no
//! controller is attached.

use std::sync::Arc;

use kvbench_proto::proto::{
    benchmark_service_server::BenchmarkService, ctrl_message::Payload, BenchmarkFinished,
    BenchmarkStatus, ConfigFileResponse, CtrlMessage,
};
use kvbench_types::BenchConfig;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status, Streaming};
use tracing::{debug, error, info, warn};

use crate::{
    error::{NoActiveStreamSnafu, Result, StreamClosedSnafu},
    shutdown::{ShutdownCoordinator, StopMode},
};

/// Outbound frames buffered before the transport applies backpressure.
const OUTBOUND_MAILBOX: usize = 64;

struct ControlState {
    /// Mailbox of the currently attached stream task, if any.
    outbound: Mutex<Option<mpsc::Sender<std::result::Result<CtrlMessage, Status>>>>,
    /// The accepted configuration; set once per run.
    config: watch::Sender<Option<Arc<BenchConfig>>>,
}

/// The `BenchmarkService` implementation hosted by the runner.
pub struct BenchmarkControl {
    state: Arc<ControlState>,
    coordinator: ShutdownCoordinator,
}

impl BenchmarkControl {
    /// Creates the service and its push handle.
    #[must_use]
    pub fn new(coordinator: ShutdownCoordinator) -> (Self, ControlHandle) {
        let (config, _) = watch::channel(None);
        let state = Arc::new(ControlState {
            outbound: Mutex::new(None),
            config,
        });
        let handle = ControlHandle {
            state: Arc::clone(&state),
        };
        (Self { state, coordinator }, handle)
    }

    /// Handles one inbound frame; returns `false` when the loop should end.
    async fn handle_frame(
        state: &ControlState,
        coordinator: &ShutdownCoordinator,
        outbound: &mpsc::Sender<std::result::Result<CtrlMessage, Status>>,
        frame: CtrlMessage,
    ) -> bool {
        match frame.payload {
            Some(Payload::ConfigFile(file)) => {
                let success = match BenchConfig::from_slice(&file.content) {
                    Ok(config) => {
                        info!(
                            scenario = %config.scenario,
                            workload = %config.workload_type,
                            "configuration accepted"
                        );
                        state.config.send_if_modified(|slot| {
                            if slot.is_none() {
                                *slot = Some(Arc::new(config));
                                true
                            } else {
                                warn!("duplicate configuration ignored");
                                false
                            }
                        });
                        true
                    }
                    Err(err) => {
                        error!(%err, "configuration rejected");
                        false
                    }
                };
                let reply = CtrlMessage {
                    payload: Some(Payload::ConfigFileResponse(ConfigFileResponse { success })),
                };
                if outbound.send(Ok(reply)).await.is_err() {
                    return false;
                }
                true
            }
            Some(Payload::Shutdown(_)) => {
                info!("controller requested shutdown");
                coordinator.request(StopMode::Graceful);
                false
            }
            Some(other) => {
                debug!(?other, "ignoring unexpected control frame");
                true
            }
            None => true,
        }
    }
}

#[tonic::async_trait]
impl BenchmarkService for BenchmarkControl {
    type CTRLStreamStream = ReceiverStream<std::result::Result<CtrlMessage, Status>>;

    async fn ctrl_stream(
        &self,
        request: Request<Streaming<CtrlMessage>>,
    ) -> std::result::Result<Response<Self::CTRLStreamStream>, Status> {
        let mut inbound = request.into_inner();
        let (tx, rx) = mpsc::channel(OUTBOUND_MAILBOX);

        // The new stream becomes the current one; a previous stream's
        // mailbox is dropped and its sends fail over to "no active stream".
        *self.state.outbound.lock() = Some(tx.clone());
        info!("control stream attached");

        let state = Arc::clone(&self.state);
        let coordinator = self.coordinator.clone();
        tokio::spawn(async move {
            let mut stop = coordinator.subscribe();
            loop {
                tokio::select! {
                    _ = stop.changed() => {
                        if *stop.borrow() != StopMode::Running {
                            debug!("control stream task stopping");
                            break;
                        }
                    }
                    frame = inbound.message() => match frame {
                        Ok(Some(frame)) => {
                            if !Self::handle_frame(&state, &coordinator, &tx, frame).await {
                                break;
                            }
                        }
                        Ok(None) => {
                            info!("controller closed the control stream");
                            coordinator.request(StopMode::Graceful);
                            break;
                        }
                        Err(status) => {
                            error!(%status, "control stream receive error");
                            coordinator.request(StopMode::Graceful);
                            break;
                        }
                    }
                }
            }
            let mut slot = state.outbound.lock();
            if slot.as_ref().is_some_and(|current| current.same_channel(&tx)) {
                *slot = None;
            }
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }
}

/// Server-push side of the control stream.
#[derive(Clone)]
pub struct ControlHandle {
    state: Arc<ControlState>,
}

impl ControlHandle {
    /// Resolves once a configuration has been accepted.
    pub async fn wait_for_config(&self) -> Arc<BenchConfig> {
        let mut rx = self.state.config.subscribe();
        loop {
            let current = rx.borrow().clone();
            if let Some(config) = current {
                return config;
            }
            if rx.changed().await.is_err() {
                // The state outlives every handle; unreachable in practice.
                std::future::pending::<()>().await;
            }
        }
    }

    /// Sends one frame to the attached controller.
    pub async fn send(&self, payload: Payload) -> Result<()> {
        let sender = self.state.outbound.lock().clone();
        let Some(sender) = sender else {
            return NoActiveStreamSnafu.fail();
        };
        sender
            .send(Ok(CtrlMessage {
                payload: Some(payload),
            }))
            .await
            .map_err(|_| StreamClosedSnafu.build())
    }

    /// Sends a `BenchmarkStatus` frame.
    pub async fn send_status(&self, status: impl Into<String>) -> Result<()> {
        self.send(Payload::BenchmarkStatus(BenchmarkStatus {
            status: status.into(),
        }))
        .await
    }

    /// Sends a `BenchmarkStatus` frame, logging instead of failing.
    pub async fn report_status(&self, status: impl Into<String>) {
        let status = status.into();
        if let Err(err) = self.send_status(status.clone()).await {
            debug!(%err, status, "dropping status report");
        }
    }

    /// Sends the terminal `BenchmarkFinished` frame.
    pub async fn send_finished(&self) -> Result<()> {
        self.send(Payload::BenchmarkFinished(BenchmarkFinished {}))
            .await
    }
}

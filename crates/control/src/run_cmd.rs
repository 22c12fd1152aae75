//! `benchctl run <client_addr>`: drive one runner through a benchmark.
//!
//! Opens the control stream, ships the persisted configuration file as raw
//! bytes, then follows the runner's progress until `BenchmarkFinished` or
//! the stream ends. Ctrl-C forwards a `Shutdown` frame and keeps reading
//! so the runner can drain cleanly.

use std::time::Duration;

use kvbench_proto::proto::{
    benchmark_service_client::BenchmarkServiceClient, ctrl_message::Payload, ConfigFile,
    CtrlMessage, Shutdown,
};
use snafu::ResultExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::transport::Endpoint;
use tracing::{error, info, warn};

use crate::{
    config_cmd::ConfigStore,
    error::{ConfigRejectedSnafu, IoSnafu, Result, StreamClosedSnafu, StreamSnafu, TransportSnafu},
};

/// Keepalive pings are sent this often on an idle connection.
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// How long a keepalive ping may go unanswered.
const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(60);

/// Connection establishment budget.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs the benchmark against the runner at `client_addr`.
pub async fn run(store: &ConfigStore, client_addr: &str) -> Result<()> {
    // The persisted file must at least parse before it is shipped.
    let _ = store.load()?;
    let config_path = store.config_path();
    let content = std::fs::read(&config_path).context(IoSnafu {
        path: config_path.clone(),
    })?;

    let address = if client_addr.starts_with("http://") || client_addr.starts_with("https://") {
        client_addr.to_owned()
    } else {
        format!("http://{client_addr}")
    };
    let endpoint = Endpoint::from_shared(address)
        .context(TransportSnafu)?
        .connect_timeout(CONNECT_TIMEOUT)
        .http2_keep_alive_interval(KEEPALIVE_INTERVAL)
        .keep_alive_timeout(KEEPALIVE_TIMEOUT)
        .keep_alive_while_idle(true);

    info!(addr = client_addr, "connecting to the runner");
    let channel = endpoint.connect().await.context(TransportSnafu)?;
    let mut client = BenchmarkServiceClient::new(channel);

    let (tx, rx) = mpsc::channel(16);
    let mut inbound = client
        .ctrl_stream(ReceiverStream::new(rx))
        .await
        .context(StreamSnafu)?
        .into_inner();

    info!(config = %config_path.display(), "sending config file");
    tx.send(CtrlMessage {
        payload: Some(Payload::ConfigFile(ConfigFile { content })),
    })
    .await
    .map_err(|_| StreamClosedSnafu.build())?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut shutdown_sent = false;

    loop {
        tokio::select! {
            _ = &mut ctrl_c, if !shutdown_sent => {
                info!("interrupt received, asking the runner to shut down");
                shutdown_sent = true;
                if tx
                    .send(CtrlMessage { payload: Some(Payload::Shutdown(Shutdown {})) })
                    .await
                    .is_err()
                {
                    warn!("stream already closed, exiting");
                    return Ok(());
                }
            }
            frame = inbound.message() => match frame.context(StreamSnafu)? {
                None => {
                    info!("control stream closed by the runner");
                    return Ok(());
                }
                Some(frame) => match frame.payload {
                    Some(Payload::ConfigFileResponse(resp)) => {
                        if !resp.success {
                            error!("runner rejected the configuration");
                            return ConfigRejectedSnafu.fail();
                        }
                        info!("runner accepted the configuration");
                    }
                    Some(Payload::BenchmarkStatus(status)) => {
                        info!("Benchmark status: {}", status.status);
                    }
                    Some(Payload::BenchmarkFinished(_)) => {
                        info!("benchmark finished");
                        return Ok(());
                    }
                    Some(Payload::Shutdown(_)) => {
                        info!("runner requested shutdown");
                        return Ok(());
                    }
                    _ => {}
                },
            }
        }
    }
}

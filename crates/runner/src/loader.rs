//! Initial data load.
//!
//! Before the first step the runner writes the whole generated key space
//! into the target store through a bounded pool of loader connections,
//! then persists the keys to disk in generation-sorted order. Individual
//! write failures are logged and skipped; a benchmark against a store that
//! dropped a handful of seed keys is still meaningful, a benchmark that
//! never starts is not. Failing to dial the store at all is fatal.

use std::{collections::BTreeMap, path::Path, sync::Arc, time::Duration};

use futures::future::join_all;
use kvbench_store::{with_deadline, Connector};
use snafu::ResultExt;
use tracing::{debug, info};

use crate::{
    error::{KeyFileSnafu, PoolSnafu, Result},
    shutdown::ShutdownCoordinator,
};

/// Loader connections opened for the initial load.
const LOAD_WORKERS: usize = 100;

/// Per-write deadline during the initial load.
const LOAD_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Writes every generated pair to the store.
///
/// The data set is split across up to [`LOAD_WORKERS`] connections; the
/// load stops early when shutdown is requested.
pub async fn load_store(
    connector: &Arc<dyn Connector>,
    data: BTreeMap<String, Vec<u8>>,
    coordinator: &ShutdownCoordinator,
) -> Result<()> {
    let total = data.len();
    let workers = LOAD_WORKERS.min(total.max(1));
    info!(total, workers, "loading data into the store");

    let mut chunks: Vec<Vec<(String, Vec<u8>)>> = (0..workers).map(|_| Vec::new()).collect();
    for (index, pair) in data.into_iter().enumerate() {
        chunks[index % workers].push(pair);
    }

    let mut tasks = Vec::with_capacity(workers);
    for chunk in chunks {
        let client = connector.connect().await.context(PoolSnafu)?;
        let coordinator = coordinator.clone();
        tasks.push(tokio::spawn(async move {
            for (key, value) in chunk {
                if coordinator.is_stopping() {
                    return;
                }
                if let Err(err) =
                    with_deadline(LOAD_REQUEST_TIMEOUT, client.put(&key, value)).await
                {
                    debug!(%err, key, "failed to load key");
                }
            }
            let _ = client.close().await;
        }));
    }
    join_all(tasks).await;

    info!("data loaded");
    Ok(())
}

/// Persists the keys, newline-separated, in generation-sorted order.
pub fn write_key_file(path: &Path, keys: &[String]) -> Result<()> {
    std::fs::write(path, keys.join("\n")).context(KeyFileSnafu {
        path: path.to_path_buf(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use kvbench_generator::Generator;
    use kvbench_store::MockStore;

    use super::*;

    #[tokio::test]
    async fn test_load_writes_every_key() {
        let data = Generator::new(42).generate_data(500, 16, 32).unwrap();
        let expected: Vec<String> = data.keys().cloned().collect();

        let store = MockStore::new();
        let connector: Arc<dyn Connector> = Arc::new(store.connector());
        load_store(&connector, data, &ShutdownCoordinator::new())
            .await
            .unwrap();

        assert_eq!(store.len(), 500);
        for key in &expected {
            assert!(store.value_of(key).is_some(), "missing {key}");
        }
    }

    #[tokio::test]
    async fn test_put_failures_are_not_fatal() {
        let data = Generator::new(1).generate_data(100, 16, 8).unwrap();
        let store = MockStore::new();
        store.inject_failures(10);
        let connector: Arc<dyn Connector> = Arc::new(store.connector());

        load_store(&connector, data, &ShutdownCoordinator::new())
            .await
            .unwrap();
        assert_eq!(store.len(), 90, "failed writes are skipped, not retried");
    }

    #[test]
    fn test_key_file_is_newline_separated_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.txt");
        let keys = vec![
            "/app/aps/001AAAA".to_owned(),
            "/ord/euw/002BBBB".to_owned(),
            "/usr/use/003CCCC".to_owned(),
        ];
        write_key_file(&path, &keys).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, keys.join("\n"));
    }
}

//! Client capability set for the target KV/lock store.
//!
//! The benchmark core consumes the target cluster through a small set of
//! traits: [`StoreClient`] for KV access and session creation,
//! [`LockSession`] for lease-backed sessions, [`NamedLock`] for the
//! distributed-mutex primitive, and [`Connector`] for dialing. The
//! production implementation in [`etcd`] talks to an etcd cluster; the
//! [`mock`] implementation backs the test suites.
//!
//! [`ClientPool`] owns the per-worker connections (and, for lock
//! scenarios, one session per connection) and is only mutated between load
//! steps.

#![deny(unsafe_code)]

use std::{future::Future, sync::Arc, time::Duration};

use async_trait::async_trait;

pub mod error;
pub mod etcd;
pub mod mock;
pub mod pool;

pub use error::{Result, StoreError};
pub use etcd::EtcdConnector;
pub use mock::{MockConnector, MockStore};
pub use pool::{ClientPool, PoolEntry};

/// One persistent connection to the target cluster.
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Reads a key; `None` when the key does not exist.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Writes a key.
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()>;

    /// Opens a lease-backed session on this connection.
    async fn new_session(&self) -> Result<Arc<dyn LockSession>>;

    /// Releases the connection.
    async fn close(&self) -> Result<()>;
}

/// A lease-backed session enabling mutex lifetimes.
#[async_trait]
pub trait LockSession: Send + Sync {
    /// Creates a mutex handle for the given lock name. Cheap; no I/O.
    fn new_mutex(&self, name: &str) -> Box<dyn NamedLock>;

    /// Ends the session, releasing its lease and any held locks.
    async fn close(&self) -> Result<()>;
}

/// A named distributed lock owned by a session.
#[async_trait]
pub trait NamedLock: Send + Sync {
    /// Attempts to acquire the lock without waiting on the current holder.
    ///
    /// Fails with [`StoreError::Locked`] when another session holds it and
    /// [`StoreError::SessionExpired`] when the owning session's lease is
    /// gone.
    async fn try_lock(&mut self) -> Result<()>;

    /// Releases the lock.
    async fn unlock(&mut self) -> Result<()>;

    /// The store key this lock occupies while held.
    fn key(&self) -> String;
}

/// Dials new connections; the pool's only way to create entries.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Establishes one new connection.
    async fn connect(&self) -> Result<Arc<dyn StoreClient>>;
}

/// Runs `fut` under `deadline`, mapping expiry to
/// [`StoreError::DeadlineExceeded`].
pub async fn with_deadline<T, F>(deadline: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => error::DeadlineExceededSnafu.fail(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_with_deadline_passes_result_through() {
        let ok: Result<u32> = with_deadline(Duration::from_secs(1), async { Ok(7) }).await;
        assert_eq!(ok.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_with_deadline_maps_expiry() {
        let result: Result<()> = with_deadline(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(StoreError::DeadlineExceeded)));
    }
}

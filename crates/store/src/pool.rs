//! Client/session pool.
//!
//! The pool owns the persistent connections workers are assigned to. For
//! lock scenarios every connection additionally carries one lease-backed
//! session. The step engine is the pool's only writer and only touches it
//! between steps, so workers observe a stable slice for the duration of a
//! step; the pool only grows, never shrinks.

use std::sync::Arc;

use tracing::warn;

use crate::{error::Result, Connector, LockSession, StoreClient};

/// One pool slot: a connection and, for lock scenarios, its session.
pub struct PoolEntry {
    /// The persistent connection.
    pub client: Arc<dyn StoreClient>,
    /// The lease-backed session; `None` for KV scenarios.
    pub session: Option<Arc<dyn LockSession>>,
}

/// Pool of connections (and sessions) with deterministic worker assignment.
pub struct ClientPool {
    connector: Arc<dyn Connector>,
    with_sessions: bool,
    entries: Vec<PoolEntry>,
}

impl ClientPool {
    /// Creates an empty pool. `with_sessions` opens one session per
    /// connection, which lock scenarios require.
    #[must_use]
    pub fn new(connector: Arc<dyn Connector>, with_sessions: bool) -> Self {
        Self {
            connector,
            with_sessions,
            entries: Vec::new(),
        }
    }

    /// Creates exactly `initial_clients` entries.
    ///
    /// If any connection or session fails, everything created by this call
    /// is closed before the error is returned.
    pub async fn start(&mut self, initial_clients: usize) -> Result<()> {
        let entries = self.create(initial_clients).await?;
        self.entries = entries;
        Ok(())
    }

    /// Creates and appends `n` more entries.
    ///
    /// On failure the entries created by this call are closed and the pool
    /// is left exactly as it was.
    pub async fn grow(&mut self, n: usize) -> Result<()> {
        let entries = self.create(n).await?;
        self.entries.extend(entries);
        Ok(())
    }

    async fn create(&self, n: usize) -> Result<Vec<PoolEntry>> {
        let mut created = Vec::with_capacity(n);
        for _ in 0..n {
            let client = match self.connector.connect().await {
                Ok(client) => client,
                Err(err) => {
                    Self::teardown(&mut created).await;
                    return Err(err);
                }
            };
            let session = if self.with_sessions {
                match client.new_session().await {
                    Ok(session) => Some(session),
                    Err(err) => {
                        let _ = client.close().await;
                        Self::teardown(&mut created).await;
                        return Err(err);
                    }
                }
            } else {
                None
            };
            created.push(PoolEntry { client, session });
        }
        Ok(created)
    }

    async fn teardown(entries: &mut Vec<PoolEntry>) {
        for entry in entries.drain(..) {
            if let Some(session) = entry.session {
                if let Err(err) = session.close().await {
                    warn!(%err, "failed to close session during pool teardown");
                }
            }
            if let Err(err) = entry.client.close().await {
                warn!(%err, "failed to close client during pool teardown");
            }
        }
    }

    /// The entry assigned to `worker_id`: `pool[worker_id mod len]`.
    ///
    /// The pool must have been started; an empty pool has no assignment.
    #[must_use]
    pub fn get(&self, worker_id: usize) -> &PoolEntry {
        &self.entries[worker_id % self.entries.len()]
    }

    /// Number of entries in the pool.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True before `start` has run.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Closes every session, then every client.
    ///
    /// Errors are logged and accumulated; the last one is returned after
    /// every entry has been visited.
    pub async fn close(&mut self) -> Result<()> {
        let mut last_err = None;
        for entry in self.entries.drain(..) {
            if let Some(session) = entry.session {
                if let Err(err) = session.close().await {
                    warn!(%err, "failed to close session");
                    last_err = Some(err);
                }
            }
            if let Err(err) = entry.client.close().await {
                warn!(%err, "failed to close client");
                last_err = Some(err);
            }
        }
        match last_err {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }
}

//! Controllable in-memory implementation of the store capability set.
//!
//! Backs the dispatcher and step-engine test suites without a real
//! cluster. Every connection handed out by [`MockConnector`] shares one
//! [`MockStore`] state, the way every real connection shares one cluster.
//!
//! Knobs:
//! - **Latency injection**: every operation sleeps for a configurable
//!   duration before completing.
//! - **Failure injection**: the next N KV operations fail with an
//!   UNAVAILABLE-coded RPC error.
//! - **Session expiry**: flips every subsequent `try_lock` into
//!   [`StoreError::SessionExpired`].
//! - **Held locks**: a lock can be pre-seeded as held by a foreign
//!   session to exercise the contention path.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use crate::{
    error::{LockedSnafu, Result, SessionExpiredSnafu},
    Connector, LockSession, NamedLock, StoreClient, StoreError,
};

#[derive(Debug, Default)]
struct MockState {
    kv: RwLock<HashMap<String, Vec<u8>>>,
    /// Lock name to owning session id.
    locks: Mutex<HashMap<String, u64>>,
    next_session: AtomicU64,
    op_latency: RwLock<Option<Duration>>,
    fail_next: AtomicUsize,
    expire_sessions: AtomicBool,
    operations: AtomicU64,
}

impl MockState {
    async fn simulate(&self) -> Result<()> {
        self.operations.fetch_add(1, Ordering::Relaxed);
        let latency = *self.op_latency.read();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(StoreError::Rpc {
                code: tonic::Code::Unavailable as i32,
                message: "injected failure".to_owned(),
            });
        }
        Ok(())
    }
}

/// Shared in-memory target store.
#[derive(Debug, Clone, Default)]
pub struct MockStore {
    state: Arc<MockState>,
}

impl MockStore {
    /// Creates an empty mock store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a connector whose connections all share this store.
    #[must_use]
    pub fn connector(&self) -> MockConnector {
        MockConnector {
            state: Arc::clone(&self.state),
        }
    }

    /// Makes every operation take at least `latency`.
    pub fn set_latency(&self, latency: Duration) {
        *self.state.op_latency.write() = Some(latency);
    }

    /// Fails the next `n` KV operations with an UNAVAILABLE status.
    pub fn inject_failures(&self, n: usize) {
        self.state.fail_next.store(n, Ordering::SeqCst);
    }

    /// Makes every subsequent `try_lock` report an expired session.
    pub fn expire_sessions(&self) {
        self.state.expire_sessions.store(true, Ordering::SeqCst);
    }

    /// Marks `name` as held by a session no connector ever hands out.
    pub fn hold_lock_elsewhere(&self, name: &str) {
        self.state.locks.lock().insert(name.to_owned(), u64::MAX);
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.kv.read().len()
    }

    /// True when no keys are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.kv.read().is_empty()
    }

    /// Value currently stored under `key`.
    #[must_use]
    pub fn value_of(&self, key: &str) -> Option<Vec<u8>> {
        self.state.kv.read().get(key).cloned()
    }

    /// Total operations observed across all connections.
    #[must_use]
    pub fn operation_count(&self) -> u64 {
        self.state.operations.load(Ordering::Relaxed)
    }

    /// Number of locks currently held.
    #[must_use]
    pub fn held_locks(&self) -> usize {
        self.state.locks.lock().len()
    }
}

/// Hands out connections sharing one [`MockStore`].
#[derive(Debug, Clone)]
pub struct MockConnector {
    state: Arc<MockState>,
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self) -> Result<Arc<dyn StoreClient>> {
        Ok(Arc::new(MockClient {
            state: Arc::clone(&self.state),
        }))
    }
}

struct MockClient {
    state: Arc<MockState>,
}

#[async_trait]
impl StoreClient for MockClient {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.state.simulate().await?;
        Ok(self.state.kv.read().get(key).cloned())
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.state.simulate().await?;
        self.state.kv.write().insert(key.to_owned(), value);
        Ok(())
    }

    async fn new_session(&self) -> Result<Arc<dyn LockSession>> {
        let id = self.state.next_session.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockSession {
            state: Arc::clone(&self.state),
            id,
        }))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

struct MockSession {
    state: Arc<MockState>,
    id: u64,
}

#[async_trait]
impl LockSession for MockSession {
    fn new_mutex(&self, name: &str) -> Box<dyn NamedLock> {
        Box::new(MockMutex {
            state: Arc::clone(&self.state),
            session_id: self.id,
            name: name.to_owned(),
        })
    }

    async fn close(&self) -> Result<()> {
        // An ended session releases everything it held.
        self.state
            .locks
            .lock()
            .retain(|_, owner| *owner != self.id);
        Ok(())
    }
}

struct MockMutex {
    state: Arc<MockState>,
    session_id: u64,
    name: String,
}

#[async_trait]
impl NamedLock for MockMutex {
    async fn try_lock(&mut self) -> Result<()> {
        self.state.simulate().await?;
        if self.state.expire_sessions.load(Ordering::SeqCst) {
            return SessionExpiredSnafu.fail();
        }
        let mut locks = self.state.locks.lock();
        match locks.get(&self.name) {
            Some(owner) if *owner != self.session_id => LockedSnafu.fail(),
            _ => {
                locks.insert(self.name.clone(), self.session_id);
                Ok(())
            }
        }
    }

    async fn unlock(&mut self) -> Result<()> {
        self.state.simulate().await?;
        let mut locks = self.state.locks.lock();
        if locks.get(&self.name) == Some(&self.session_id) {
            locks.remove(&self.name);
        }
        Ok(())
    }

    fn key(&self) -> String {
        format!("{}/{:x}", self.name, self.session_id)
    }
}

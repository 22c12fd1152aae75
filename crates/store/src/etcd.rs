//! etcd-backed implementation of the store capability set.
//!
//! Sessions are etcd leases with a background keepalive task; the mutex is
//! the usual client-side recipe over the KV primitives: each acquirer puts
//! a lease-attached ownership key under `<name>/`, and the key with the
//! oldest create revision owns the lock. A losing acquirer removes its key
//! immediately and reports [`StoreError::Locked`] instead of waiting.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use etcd_client::{
    Client, Compare, CompareOp, ConnectOptions, GetOptions, PutOptions, SortOrder, SortTarget,
    Txn, TxnOp, TxnOpResponse,
};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::{
    error::{ConnectionSnafu, LockedSnafu, Result, SessionExpiredSnafu, StoreError},
    Connector, LockSession, NamedLock, StoreClient,
};

/// Connection establishment timeout.
const DIAL_TIMEOUT: Duration = Duration::from_secs(5);

/// HTTP/2 keep-alive interval for idle connections.
const HTTP2_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// HTTP/2 keep-alive timeout.
const HTTP2_KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(10);

/// Session lease TTL in seconds; refreshed at a third of this.
const SESSION_TTL: i64 = 60;

/// Maps an etcd client error into the store taxonomy.
fn classify(err: etcd_client::Error) -> StoreError {
    match err {
        etcd_client::Error::GRpcStatus(status) => StoreError::Rpc {
            code: status.code() as i32,
            message: status.message().to_owned(),
        },
        etcd_client::Error::TransportError(err) => StoreError::ConnectionClosed {
            message: err.to_string(),
        },
        other => StoreError::Other {
            message: other.to_string(),
        },
    }
}

/// Dials etcd connections for the pool.
#[derive(Debug, Clone)]
pub struct EtcdConnector {
    endpoints: Vec<String>,
}

impl EtcdConnector {
    /// Creates a connector for the given cluster endpoints.
    #[must_use]
    pub fn new(endpoints: Vec<String>) -> Self {
        Self { endpoints }
    }
}

#[async_trait]
impl Connector for EtcdConnector {
    async fn connect(&self) -> Result<Arc<dyn StoreClient>> {
        let options = ConnectOptions::new()
            .with_connect_timeout(DIAL_TIMEOUT)
            .with_keep_alive(HTTP2_KEEPALIVE_INTERVAL, HTTP2_KEEPALIVE_TIMEOUT)
            .with_keep_alive_while_idle(true);

        let client = Client::connect(&self.endpoints, Some(options))
            .await
            .map_err(|err| {
                ConnectionSnafu {
                    message: err.to_string(),
                }
                .build()
            })?;

        Ok(Arc::new(EtcdStore { client }))
    }
}

/// One etcd connection.
pub struct EtcdStore {
    client: Client,
}

#[async_trait]
impl StoreClient for EtcdStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut kv = self.client.kv_client();
        let resp = kv.get(key, None).await.map_err(classify)?;
        Ok(resp.kvs().first().map(|kv| kv.value().to_vec()))
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let mut kv = self.client.kv_client();
        kv.put(key, value, None).await.map_err(classify)?;
        Ok(())
    }

    async fn new_session(&self) -> Result<Arc<dyn LockSession>> {
        EtcdSession::open(self.client.clone()).await
    }

    async fn close(&self) -> Result<()> {
        // The underlying channel is reference-counted and closes on drop.
        Ok(())
    }
}

struct SessionInner {
    client: Client,
    lease_id: i64,
    /// Set by the keepalive task once the lease can no longer be refreshed.
    expired: AtomicBool,
    keepalive: Mutex<Option<JoinHandle<()>>>,
}

/// A lease-backed etcd session.
pub struct EtcdSession {
    inner: Arc<SessionInner>,
}

impl EtcdSession {
    async fn open(client: Client) -> Result<Arc<dyn LockSession>> {
        let mut lease = client.lease_client();
        let grant = lease.grant(SESSION_TTL, None).await.map_err(classify)?;
        let lease_id = grant.id();

        let (mut keeper, mut responses) =
            lease.keep_alive(lease_id).await.map_err(classify)?;

        let inner = Arc::new(SessionInner {
            client,
            lease_id,
            expired: AtomicBool::new(false),
            keepalive: Mutex::new(None),
        });

        let weak = Arc::downgrade(&inner);
        let handle = tokio::spawn(async move {
            let period = Duration::from_secs(SESSION_TTL as u64 / 3);
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else { break };
                if keeper.keep_alive().await.is_err() {
                    inner.expired.store(true, Ordering::SeqCst);
                    break;
                }
                match responses.message().await {
                    Ok(Some(resp)) if resp.ttl() > 0 => {}
                    _ => {
                        debug!(lease_id, "lease keepalive lost, marking session expired");
                        inner.expired.store(true, Ordering::SeqCst);
                        break;
                    }
                }
            }
        });
        *inner.keepalive.lock() = Some(handle);

        Ok(Arc::new(EtcdSession { inner }))
    }
}

#[async_trait]
impl LockSession for EtcdSession {
    fn new_mutex(&self, name: &str) -> Box<dyn NamedLock> {
        Box::new(EtcdMutex {
            session: Arc::clone(&self.inner),
            prefix: format!("{name}/"),
            owner_key: format!("{name}/{:x}", self.inner.lease_id),
        })
    }

    async fn close(&self) -> Result<()> {
        if let Some(handle) = self.inner.keepalive.lock().take() {
            handle.abort();
        }
        let mut lease = self.inner.client.lease_client();
        match lease.revoke(self.inner.lease_id).await {
            Ok(_) => Ok(()),
            // A lease that already expired is as revoked as it gets.
            Err(_) if self.inner.expired.load(Ordering::SeqCst) => Ok(()),
            Err(err) => Err(classify(err)),
        }
    }
}

/// A named lock held through a lease-attached ownership key.
pub struct EtcdMutex {
    session: Arc<SessionInner>,
    prefix: String,
    owner_key: String,
}

#[async_trait]
impl NamedLock for EtcdMutex {
    async fn try_lock(&mut self) -> Result<()> {
        if self.session.expired.load(Ordering::SeqCst) {
            return SessionExpiredSnafu.fail();
        }

        let mut kv = self.session.client.kv_client();

        // Claim our ownership key unless an earlier attempt left it behind.
        let txn = Txn::new()
            .when(vec![Compare::create_revision(
                self.owner_key.as_str(),
                CompareOp::Equal,
                0,
            )])
            .and_then(vec![TxnOp::put(
                self.owner_key.as_str(),
                Vec::new(),
                Some(PutOptions::new().with_lease(self.session.lease_id)),
            )])
            .or_else(vec![TxnOp::get(self.owner_key.as_str(), None)]);

        let resp = kv.txn(txn).await.map_err(|err| {
            if self.session.expired.load(Ordering::SeqCst) {
                StoreError::SessionExpired
            } else {
                classify(err)
            }
        })?;

        let my_revision = if resp.succeeded() {
            resp.header().map_or(0, |h| h.revision())
        } else {
            match resp.op_responses().into_iter().next() {
                Some(TxnOpResponse::Get(get)) => {
                    get.kvs().first().map_or(0, |kv| kv.create_revision())
                }
                _ => 0,
            }
        };

        // The oldest ownership key under the prefix holds the lock.
        let owner = kv
            .get(
                self.prefix.as_str(),
                Some(
                    GetOptions::new()
                        .with_prefix()
                        .with_sort(SortTarget::Create, SortOrder::Ascend)
                        .with_limit(1),
                ),
            )
            .await
            .map_err(classify)?;

        match owner.kvs().first() {
            Some(holder) if holder.create_revision() != my_revision => {
                let _ = kv.delete(self.owner_key.as_str(), None).await;
                LockedSnafu.fail()
            }
            _ => Ok(()),
        }
    }

    async fn unlock(&mut self) -> Result<()> {
        let mut kv = self.session.client.kv_client();
        kv.delete(self.owner_key.as_str(), None)
            .await
            .map_err(classify)?;
        Ok(())
    }

    fn key(&self) -> String {
        self.owner_key.clone()
    }
}

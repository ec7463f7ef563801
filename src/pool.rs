use crate::connection::Connection;
use crate::error::{Result, SynergyError};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Pool of TCP connections to one controller
///
/// A connection is owned by exactly one request between `acquire` and
/// `release`/`discard`. Acquiring waits while `max_connections` are checked out.
#[derive(Clone)]
pub(crate) struct ConnectionPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    address: String,
    keepalive: Option<Duration>,
    reuse: bool,
    idle: Mutex<Vec<Connection>>,
    permits: Arc<Semaphore>,
    opened: AtomicUsize,
}

/// A checked-out connection
///
/// Dropping it without calling [`release`](Self::release) closes the socket.
pub(crate) struct PooledConnection {
    conn: Connection,
    pool: Arc<PoolInner>,
    _permit: OwnedSemaphorePermit,
}

impl ConnectionPool {
    pub fn new(
        address: impl Into<String>,
        max_connections: usize,
        keepalive: Option<Duration>,
        reuse: bool,
    ) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                address: address.into(),
                keepalive,
                reuse,
                idle: Mutex::new(Vec::new()),
                permits: Arc::new(Semaphore::new(max_connections.max(1))),
                opened: AtomicUsize::new(0),
            }),
        }
    }

    /// Take an idle connection or open a new one
    pub async fn acquire(&self) -> Result<PooledConnection> {
        let permit = self
            .inner
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| SynergyError::ConnectionClosed)?;

        let idle = self.inner.idle().pop();
        let conn = match idle {
            Some(conn) => conn,
            None => {
                let conn = Connection::open(&self.inner.address, self.inner.keepalive).await?;
                self.inner.opened.fetch_add(1, Ordering::Relaxed);
                conn
            }
        };

        Ok(PooledConnection {
            conn,
            pool: self.inner.clone(),
            _permit: permit,
        })
    }

    /// Number of sockets opened over the pool's lifetime
    pub fn connections_opened(&self) -> usize {
        self.inner.opened.load(Ordering::Relaxed)
    }

    /// Number of connections waiting to be reused
    pub fn idle_count(&self) -> usize {
        self.inner.idle().len()
    }
}

impl PoolInner {
    fn idle(&self) -> MutexGuard<'_, Vec<Connection>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PooledConnection {
    /// Hand the connection back for reuse
    pub fn release(self) {
        let PooledConnection { conn, pool, _permit } = self;
        if pool.reuse {
            pool.idle().push(conn);
        }
    }

    /// Close the connection instead of reusing it
    pub fn discard(self) {
        drop(self);
    }
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.conn
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn listener() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        (listener, address)
    }

    #[tokio::test]
    async fn released_connection_is_reused() {
        let (listener, address) = listener().await;
        tokio::spawn(async move { while listener.accept().await.is_ok() {} });

        let pool = ConnectionPool::new(address, 2, None, true);
        pool.acquire().await.unwrap().release();
        assert_eq!(pool.idle_count(), 1);

        pool.acquire().await.unwrap().release();
        assert_eq!(pool.connections_opened(), 1);
    }

    #[tokio::test]
    async fn discarded_connection_is_not_reused() {
        let (listener, address) = listener().await;
        tokio::spawn(async move { while listener.accept().await.is_ok() {} });

        let pool = ConnectionPool::new(address, 1, Some(Duration::from_secs(5)), true);
        pool.acquire().await.unwrap().discard();
        assert_eq!(pool.idle_count(), 0);

        drop(pool.acquire().await.unwrap());
        pool.acquire().await.unwrap().release();
        assert_eq!(pool.connections_opened(), 3);
    }

    #[tokio::test]
    async fn single_use_mode_never_pools() {
        let (listener, address) = listener().await;
        tokio::spawn(async move { while listener.accept().await.is_ok() {} });

        let pool = ConnectionPool::new(address, 1, None, false);
        pool.acquire().await.unwrap().release();
        assert_eq!(pool.idle_count(), 0);
    }

    #[tokio::test]
    async fn acquire_waits_for_free_slot() {
        let (listener, address) = listener().await;
        tokio::spawn(async move { while listener.accept().await.is_ok() {} });

        let pool = ConnectionPool::new(address, 1, None, true);
        let held = pool.acquire().await.unwrap();

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire().await.map(|c| c.release()) })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        held.release();
        waiter.await.unwrap().unwrap();
        assert_eq!(pool.connections_opened(), 1);
    }

    #[tokio::test]
    async fn connect_failure_is_transport_error() {
        let (listener, address) = listener().await;
        drop(listener);

        let pool = ConnectionPool::new(address, 1, None, true);
        let err = pool.acquire().await.err().unwrap();
        assert!(err.is_transport(), "{err:?}");
    }
}

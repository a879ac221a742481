//! Fixed-size session pool.
//!
//! Built on a deadpool managed pool. All `pool_size` sessions are opened when
//! the pool is created, so a bad DSN or an unreachable server fails
//! [`TaosPool::new`] instead of the first query. Callers block in
//! [`TaosPool::acquire`] until a session is free; dropping the returned
//! [`PooledSession`] hands it back.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use deadpool::managed::{Manager, Metrics, Object, Pool, PoolError, RecycleError};

use crate::driver::{Connector, Session};
use crate::error::{Result, TaosError};
use crate::utils::Runtime;

/// A session checked out of a [`TaosPool`]. Returned to the pool on drop.
pub type PooledSession = Object<SessionManager>;

/// deadpool manager opening sessions through a [`Connector`].
pub struct SessionManager {
    connector: Arc<dyn Connector>,
}

impl SessionManager {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self { connector }
    }
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager").finish_non_exhaustive()
    }
}

#[async_trait]
impl Manager for SessionManager {
    type Type = Box<dyn Session>;
    type Error = TaosError;

    async fn create(&self) -> Result<Self::Type, Self::Error> {
        self.connector.connect().await
    }

    async fn recycle(&self, session: &mut Self::Type, _: &Metrics) -> Result<(), RecycleError<Self::Error>> {
        // Health check: a session that stopped answering is replaced
        session.ping().await.map_err(|e| {
            tracing::warn!(error = %e, "Pooled session failed health check");
            RecycleError::Backend(e)
        })
    }
}

/// Blocking pool of database sessions.
///
/// # Example
/// ```ignore
/// let pool = TaosPool::new(connector, 4, rt)?;
/// let session = pool.acquire()?;
/// session.exec("CREATE TABLE IF NOT EXISTS t (ts TIMESTAMP, v INT)")?;
/// // Session is returned to the pool when dropped
/// ```
pub struct TaosPool {
    pool: Pool<SessionManager>,
    rt: Arc<Runtime>,
    size: usize,
}

impl fmt::Debug for TaosPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaosPool")
            .field("size", &self.size)
            .field("status", &self.pool.status())
            .finish()
    }
}

impl TaosPool {
    /// Creates a pool of `size` sessions and opens all of them.
    ///
    /// # Arguments
    /// * `connector` - Opens the underlying sessions
    /// * `size` - Number of sessions, at least 1
    /// * `rt` - Async runtime for bridging
    ///
    /// # Errors
    /// Returns `InvalidOption` for a zero size, or the connector's error if
    /// any session cannot be opened.
    pub fn new(connector: Arc<dyn Connector>, size: usize, rt: Arc<Runtime>) -> Result<Self> {
        if size == 0 {
            return Err(TaosError::invalid_option("pool_size must be at least 1".to_string()));
        }

        let pool = Pool::builder(SessionManager::new(connector))
            .max_size(size)
            .build()
            .map_err(|e| TaosError::invalid_option(format!("Failed to build pool: {}", e)))?;
        let pool = Self { pool, rt, size };
        pool.fill()?;

        tracing::info!(size, "Session pool ready");
        Ok(pool)
    }

    /// Opens every session up front by holding `size` checkouts at once.
    fn fill(&self) -> Result<()> {
        let warm: Vec<PooledSession> = self.rt.block_on(async {
            let mut warm = Vec::with_capacity(self.size);
            for _ in 0..self.size {
                warm.push(self.pool.get().await.map_err(pool_error)?);
            }
            Ok::<_, TaosError>(warm)
        })?;
        drop(warm);
        Ok(())
    }

    /// Takes a session, blocking until one is free.
    ///
    /// # Errors
    /// `Connection` if the pool was closed or a replacement session could not
    /// be opened.
    pub fn acquire(&self) -> Result<PooledSession> {
        self.rt.block_on(self.pool.get()).map_err(pool_error)
    }

    /// Number of sessions the pool holds.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn status(&self) -> deadpool::Status {
        self.pool.status()
    }

    /// Closes the pool. Idle sessions are dropped now, checked-out ones when
    /// they are returned; later acquires fail.
    pub fn close(&self) {
        if !self.pool.is_closed() {
            self.pool.close();
            tracing::info!("Session pool closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }
}

impl Drop for TaosPool {
    fn drop(&mut self) {
        self.close();
    }
}

fn pool_error(e: PoolError<TaosError>) -> TaosError {
    match e {
        PoolError::Backend(e) => e,
        PoolError::Timeout(e) => TaosError::connection(format!("Pool timeout: {:?}", e)),
        PoolError::Closed => TaosError::connection("Pool closed".to_string()),
        PoolError::NoRuntimeSpecified => TaosError::connection("No runtime specified".to_string()),
        PoolError::PostCreateHook(_) => TaosError::connection("Post create hook failed".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::bind::BindValue;
    use crate::driver::QueryResult;

    struct Idle;

    impl Session for Idle {
        fn query(&self, _: &str) -> Result<QueryResult> {
            Ok(QueryResult::default())
        }
        fn exec(&self, _: &str) -> Result<usize> {
            Ok(0)
        }
        fn exec_prepared(&self, _: &str, rows: &[Vec<BindValue>]) -> Result<usize> {
            Ok(rows.len())
        }
    }

    #[derive(Default)]
    struct Counting {
        opened: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Connector for Counting {
        async fn connect(&self) -> Result<Box<dyn Session>> {
            if self.fail {
                return Err(TaosError::connection("connection refused".to_string()));
            }
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(Idle))
        }
    }

    fn runtime() -> Arc<Runtime> {
        Arc::new(Runtime::new().unwrap())
    }

    #[test]
    fn test_pool_opens_all_sessions_eagerly() {
        let connector = Arc::new(Counting::default());
        let pool = TaosPool::new(connector.clone(), 3, runtime()).unwrap();
        assert_eq!(connector.opened.load(Ordering::SeqCst), 3);
        assert_eq!(pool.size(), 3);

        // Reuse, not reconnect
        for _ in 0..5 {
            let session = pool.acquire().unwrap();
            assert_eq!(session.exec("SELECT 1").unwrap(), 0);
        }
        assert_eq!(connector.opened.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_pool_fails_fast_when_connect_fails() {
        let connector = Arc::new(Counting { fail: true, ..Default::default() });
        let err = TaosPool::new(connector, 2, runtime()).unwrap_err();
        assert!(err.is_connection());
    }

    #[test]
    fn test_pool_rejects_zero_size() {
        let err = TaosPool::new(Arc::new(Counting::default()), 0, runtime()).unwrap_err();
        assert!(err.is_invalid_option());
    }

    #[test]
    fn test_acquire_after_close() {
        let pool = TaosPool::new(Arc::new(Counting::default()), 1, runtime()).unwrap();
        pool.close();
        assert!(pool.is_closed());
        assert!(pool.acquire().err().unwrap().is_connection());
        // Closing twice is harmless
        pool.close();
    }

    #[test]
    fn test_acquire_blocks_until_release() {
        let pool = Arc::new(TaosPool::new(Arc::new(Counting::default()), 1, runtime()).unwrap());
        let held = pool.acquire().unwrap();

        let (tx, rx) = std::sync::mpsc::channel();
        let waiter = {
            let pool = Arc::clone(&pool);
            std::thread::spawn(move || {
                let _session = pool.acquire().unwrap();
                tx.send(()).unwrap();
            })
        };

        assert!(rx.recv_timeout(std::time::Duration::from_millis(100)).is_err());
        drop(held);
        rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap();
        waiter.join().unwrap();
    }
}

//! Lazily constructed database handle
//!
//! The [`ConnectionAccessor`] owns at most one handle. It is built on first
//! demand, reused afterwards, and closed once when the server shuts down. A
//! failed construction stores nothing, so the next caller tries again.

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use tokio::sync::Mutex;

use crate::config::AppConfig;
use crate::error::{Error, Result};

/// An open, reusable connection to the external database.
#[async_trait]
pub trait DatabaseHandle: Clone + Send + Sync + 'static {
    /// Name of the selected database.
    fn name(&self) -> &str;

    /// Round-trips a trivial command to the server.
    async fn ping(&self) -> Result<()>;

    async fn close(&self);
}

/// Builds new database handles.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Handle: DatabaseHandle;

    async fn connect(&self) -> Result<Self::Handle>;
}

/// Postgres pool plus the database it was opened against.
#[derive(Clone, Debug)]
pub struct Database {
    pool: PgPool,
    name: String,
}

impl Database {
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl DatabaseHandle for Database {
    fn name(&self) -> &str {
        &self.name
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Pool settings pulled out of [`AppConfig`]
#[derive(Clone, Debug)]
pub struct PgConnector {
    url: String,
    database_name: Option<String>,
    max_connections: u32,
    connect_timeout: Duration,
    acquire_timeout: Duration,
    idle_timeout: Duration,
}

impl PgConnector {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            url: config.database_url.clone(),
            database_name: config.database_name.clone(),
            max_connections: config.db_max_connections,
            connect_timeout: config.db_connect_timeout(),
            acquire_timeout: config.db_acquire_timeout(),
            idle_timeout: config.db_idle_timeout(),
        }
    }
}

#[async_trait]
impl Connector for PgConnector {
    type Handle = Database;

    async fn connect(&self) -> Result<Database> {
        let mut options = PgConnectOptions::from_str(&self.url)?;
        if let Some(name) = &self.database_name {
            options = options.database(name);
        }
        let name = options.get_database().unwrap_or("postgres").to_string();

        let pending = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(self.acquire_timeout)
            .idle_timeout(self.idle_timeout)
            .connect_with(options);

        let pool = tokio::time::timeout(self.connect_timeout, pending)
            .await
            .map_err(|_| Error::ConnectTimeout(self.connect_timeout))??;

        Ok(Database { pool, name })
    }
}

/// Owns the lazily created handle for one process.
pub struct ConnectionAccessor<C: Connector> {
    connector: C,
    slot: Mutex<Slot<C::Handle>>,
    /// Set as soon as shutdown starts, before `slot` is locked
    closed: AtomicBool,
}

enum Slot<H> {
    Empty,
    Ready(H),
    Closed,
}

impl<C: Connector> ConnectionAccessor<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            slot: Mutex::new(Slot::Empty),
            closed: AtomicBool::new(false),
        }
    }

    /// Returns the shared handle, constructing it on first use.
    ///
    /// Construction failures are logged and yield `None`; nothing is cached,
    /// so the following call attempts construction again. Construction runs
    /// under the slot lock, so concurrent first callers wait on a single
    /// attempt and shutdown waits for it to finish.
    pub async fn connection(&self) -> Option<C::Handle> {
        if self.is_closed() {
            return None;
        }

        let mut slot = self.slot.lock().await;
        match &*slot {
            Slot::Ready(handle) => return Some(handle.clone()),
            Slot::Closed => return None,
            Slot::Empty => {}
        }

        let handle = match self.connector.connect().await {
            Ok(handle) => handle,
            Err(err) => {
                tracing::error!(error = %err, "failed to connect to database");
                return None;
            }
        };

        // Shutdown began while connecting; the fresh handle is never handed out
        if self.is_closed() {
            handle.close().await;
            *slot = Slot::Closed;
            tracing::info!(
                database = handle.name(),
                "closed database connection opened during shutdown"
            );
            return None;
        }

        tracing::info!(database = handle.name(), "connected to database");
        *slot = Slot::Ready(handle.clone());
        Some(handle)
    }

    /// Like [`connection`](Self::connection) but reports a missing handle as
    /// [`Error::DependencyUnavailable`].
    pub async fn database_or_fail(&self) -> Result<C::Handle> {
        self.connection()
            .await
            .ok_or(Error::DependencyUnavailable("database"))
    }

    pub async fn is_connected(&self) -> bool {
        matches!(&*self.slot.lock().await, Slot::Ready(_))
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Shutdown hook. Closes the handle if one was ever built; later calls
    /// do nothing. Waits for an in-flight construction to settle first.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let mut slot = self.slot.lock().await;
        if let Slot::Ready(handle) = std::mem::replace(&mut *slot, Slot::Closed) {
            handle.close().await;
            tracing::info!(database = handle.name(), "database connection closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    #[derive(Clone, Debug)]
    struct FakeHandle {
        id: Arc<usize>,
        closes: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl DatabaseHandle for FakeHandle {
        fn name(&self) -> &str {
            "fake"
        }

        async fn ping(&self) -> Result<()> {
            Ok(())
        }

        async fn close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Fails the first `failures` attempts, then succeeds.
    struct FakeConnector {
        attempts: Arc<AtomicUsize>,
        closes: Arc<AtomicUsize>,
        failures: usize,
        delay: Duration,
    }

    impl FakeConnector {
        fn new(failures: usize) -> Self {
            Self {
                attempts: Arc::new(AtomicUsize::new(0)),
                closes: Arc::new(AtomicUsize::new(0)),
                failures,
                delay: Duration::ZERO,
            }
        }
    }

    #[async_trait]
    impl Connector for FakeConnector {
        type Handle = FakeHandle;

        async fn connect(&self) -> Result<FakeHandle> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if attempt < self.failures {
                return Err(Error::Database(sqlx::Error::PoolTimedOut));
            }
            Ok(FakeHandle {
                id: Arc::new(attempt),
                closes: self.closes.clone(),
            })
        }
    }

    #[tokio::test]
    async fn memoizes_handle_across_calls() {
        let connector = FakeConnector::new(0);
        let attempts = connector.attempts.clone();
        let accessor = ConnectionAccessor::new(connector);

        let first = accessor.connection().await.unwrap();
        let second = accessor.connection().await.unwrap();

        assert!(Arc::ptr_eq(&first.id, &second.id));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert!(accessor.is_connected().await);
    }

    #[tokio::test]
    async fn failure_is_not_cached() {
        let connector = FakeConnector::new(1);
        let attempts = connector.attempts.clone();
        let accessor = ConnectionAccessor::new(connector);

        assert!(accessor.connection().await.is_none());
        assert!(!accessor.is_connected().await);

        let handle = accessor.connection().await.unwrap();
        assert_eq!(*handle.id, 1);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn database_or_fail_reports_dependency_unavailable() {
        let accessor = ConnectionAccessor::new(FakeConnector::new(usize::MAX));

        let err = accessor.database_or_fail().await.unwrap_err();
        assert!(err.is_dependency_unavailable());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_calls_construct_once() {
        let mut connector = FakeConnector::new(0);
        connector.delay = Duration::from_millis(20);
        let attempts = connector.attempts.clone();
        let accessor = Arc::new(ConnectionAccessor::new(connector));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let accessor = accessor.clone();
                tokio::spawn(async move { accessor.connection().await })
            })
            .collect();

        let mut ids = Vec::new();
        for task in tasks {
            let handle = task.await.unwrap().unwrap();
            ids.push(handle.id);
        }

        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert!(ids.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
    }

    #[tokio::test]
    async fn close_runs_once_and_is_terminal() {
        let connector = FakeConnector::new(0);
        let closes = connector.closes.clone();
        let accessor = ConnectionAccessor::new(connector);

        accessor.connection().await.unwrap();
        accessor.close().await;
        accessor.close().await;

        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert!(accessor.is_closed());
        assert!(accessor.connection().await.is_none());
    }

    #[tokio::test]
    async fn close_during_first_connect_closes_fresh_handle() {
        let mut connector = FakeConnector::new(0);
        connector.delay = Duration::from_millis(100);
        let closes = connector.closes.clone();
        let accessor = Arc::new(ConnectionAccessor::new(connector));

        let pending = tokio::spawn({
            let accessor = accessor.clone();
            async move { accessor.connection().await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        accessor.close().await;

        assert!(pending.await.unwrap().is_none());
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert!(!accessor.is_connected().await);
        assert!(accessor.connection().await.is_none());
    }

    #[tokio::test]
    async fn close_without_handle_is_a_no_op() {
        let connector = FakeConnector::new(0);
        let attempts = connector.attempts.clone();
        let closes = connector.closes.clone();
        let accessor = ConnectionAccessor::new(connector);

        accessor.close().await;

        assert_eq!(attempts.load(Ordering::SeqCst), 0);
        assert_eq!(closes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn pg_connector_reads_pool_settings() {
        let config = AppConfig::from_lookup(|key| match key {
            "DB_MAX_CONNECTIONS" => Some("3".to_string()),
            "DB_CONNECT_TIMEOUT_MS" => Some("250".to_string()),
            _ => None,
        })
        .unwrap();

        let connector = PgConnector::from_config(&config);
        assert_eq!(connector.max_connections, 3);
        assert_eq!(connector.connect_timeout, Duration::from_millis(250));
    }
}

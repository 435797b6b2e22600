use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod, Runtime};
use std::time::{Duration, Instant};
use tokio_postgres::NoTls;

use super::config::{build_tls_connector, DatabaseSettings, SslMode};
use super::connection::Connection;
use super::executor::{with_timeout, CommandStatus, Executor};
use crate::error::{Error, Result};
use crate::record::Record;
use crate::value::Value;

/// A connection pool built from [`DatabaseSettings`].
///
/// Cloning shares the same pool. Used as an [`Executor`], each call checks a
/// connection out, runs on it, and returns it to the pool.
#[derive(Clone)]
pub struct Database {
    settings: DatabaseSettings,
    pool: Option<Pool>,
}

/// Snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoolStatus {
    pub max_size: usize,
    /// Connections currently open, idle or checked out.
    pub size: usize,
}

impl Database {
    pub fn new(settings: DatabaseSettings) -> Self {
        Self {
            settings,
            pool: None,
        }
    }

    pub fn settings(&self) -> &DatabaseSettings {
        &self.settings
    }

    /// Build the pool and open `min_size` connections. Does nothing if
    /// already connected.
    pub async fn connect(&mut self) -> Result<()> {
        if self.pool.is_some() {
            return Ok(());
        }

        let pg_config = self.settings.pg_config();
        let manager_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };
        let manager = match self.settings.ssl_mode {
            SslMode::Disable => Manager::from_config(pg_config, NoTls, manager_config),
            _ => {
                let tls = build_tls_connector(&self.settings)?;
                Manager::from_config(pg_config, tls, manager_config)
            }
        };

        let pool = Pool::builder(manager)
            .max_size(self.settings.max_size.max(1))
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build connection pool: {}", e)))?;

        let connect_timeout = Duration::from_secs(self.settings.connect_timeout);
        let warm = self.settings.min_size.min(self.settings.max_size);
        let mut opened = Vec::with_capacity(warm);
        for _ in 0..warm {
            let object = with_timeout(Some(connect_timeout), async { Ok(pool.get().await?) }).await?;
            opened.push(object);
        }
        drop(opened);

        tracing::info!(
            database = %self.settings.display_string(),
            min_size = warm,
            max_size = self.settings.max_size,
            "connection pool ready"
        );
        self.pool = Some(pool);
        Ok(())
    }

    /// Close the pool. Checked-out connections are dropped when returned.
    pub fn close(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.close();
            tracing::info!(database = %self.settings.display_string(), "connection pool closed");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.pool.is_some()
    }

    pub fn pool(&self) -> Result<&Pool> {
        self.pool.as_ref().ok_or(Error::NotConnected)
    }

    /// Check a connection out of the pool. It goes back when dropped.
    ///
    /// Connections idle for longer than `max_inactive_connection_lifetime`
    /// are discarded first.
    pub async fn acquire(&self, timeout: Option<Duration>) -> Result<Connection> {
        let pool = self.pool()?;
        let lifetime = self.settings.idle_lifetime();
        pool.retain(|_, metrics| metrics.last_used() < lifetime);
        let object = with_timeout(timeout, async { Ok(pool.get().await?) }).await?;
        Ok(Connection::new(object))
    }

    pub fn status(&self) -> Option<PoolStatus> {
        self.pool.as_ref().map(|pool| {
            let status = pool.status();
            PoolStatus {
                max_size: status.max_size,
                size: status.size,
            }
        })
    }

    fn call_timeout(&self, timeout: Option<Duration>) -> Option<Duration> {
        timeout.or_else(|| self.settings.command_timeout())
    }

    /// Check a connection out for one call. The checkout and the call share
    /// a single deadline; the returned timeout is what remains of it.
    async fn checkout(&self, timeout: Option<Duration>) -> Result<(Connection, Option<Duration>)> {
        let timeout = self.call_timeout(timeout);
        let started = Instant::now();
        let conn = self.acquire(timeout).await?;
        let remaining = remaining_timeout(timeout, started.elapsed())?;
        Ok((conn, remaining))
    }
}

fn remaining_timeout(timeout: Option<Duration>, elapsed: Duration) -> Result<Option<Duration>> {
    match timeout {
        Some(limit) => match limit.checked_sub(elapsed) {
            Some(left) if !left.is_zero() => Ok(Some(left)),
            _ => Err(Error::Timeout(limit)),
        },
        None => Ok(None),
    }
}

#[async_trait]
impl Executor for Database {
    async fn execute(
        &self,
        sql: &str,
        params: &[Value],
        timeout: Option<Duration>,
    ) -> Result<CommandStatus> {
        let (conn, timeout) = self.checkout(timeout).await?;
        conn.execute(sql, params, timeout).await
    }

    async fn execute_many(
        &self,
        sql: &str,
        args: &[Vec<Value>],
        timeout: Option<Duration>,
    ) -> Result<()> {
        let (conn, timeout) = self.checkout(timeout).await?;
        conn.execute_many(sql, args, timeout).await
    }

    async fn fetch(
        &self,
        sql: &str,
        params: &[Value],
        timeout: Option<Duration>,
    ) -> Result<Vec<Record>> {
        let (conn, timeout) = self.checkout(timeout).await?;
        conn.fetch(sql, params, timeout).await
    }

    async fn fetch_many(
        &self,
        sql: &str,
        args: &[Vec<Value>],
        timeout: Option<Duration>,
    ) -> Result<Vec<Record>> {
        let (conn, timeout) = self.checkout(timeout).await?;
        conn.fetch_many(sql, args, timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_not_connected() {
        let db = Database::new(DatabaseSettings::default());
        assert!(!db.is_connected());
        assert!(db.status().is_none());
        assert!(matches!(db.pool(), Err(Error::NotConnected)));
        assert!(matches!(db.acquire(None).await, Err(Error::NotConnected)));
        assert!(matches!(
            db.fetch("SELECT 1", &[], None).await,
            Err(Error::NotConnected)
        ));
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut db = Database::new(DatabaseSettings::default());
        db.close();
        db.close();
        assert!(!db.is_connected());
    }

    #[test]
    fn test_call_shares_one_deadline() {
        let limit = Duration::from_secs(10);
        assert_eq!(
            remaining_timeout(Some(limit), Duration::from_secs(4)).unwrap(),
            Some(Duration::from_secs(6))
        );
        assert!(matches!(
            remaining_timeout(Some(limit), limit),
            Err(Error::Timeout(d)) if d == limit
        ));
        assert!(matches!(
            remaining_timeout(Some(limit), Duration::from_secs(11)),
            Err(Error::Timeout(_))
        ));
        assert_eq!(remaining_timeout(None, Duration::from_secs(60)).unwrap(), None);
    }

    #[test]
    fn test_call_timeout_defaults_to_command_timeout() {
        let db = Database::new(DatabaseSettings::default());
        assert_eq!(db.call_timeout(None), Some(Duration::from_secs(60)));
        assert_eq!(
            db.call_timeout(Some(Duration::from_secs(1))),
            Some(Duration::from_secs(1))
        );
    }
}

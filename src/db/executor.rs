//! The driver boundary.
//!
//! Everything below this trait speaks compiled SQL and ordered parameter
//! vectors; nothing here ever sees a statement AST.

use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, GenericClient, Transaction};

use crate::error::{Error, Result};
use crate::record::{records_from_rows, Record};
use crate::value::Value;

/// Something SQL can be run on: a connection, a transaction, or a pool.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(
        &self,
        sql: &str,
        params: &[Value],
        timeout: Option<Duration>,
    ) -> Result<CommandStatus>;

    /// Run `sql` once per argument tuple, prepared once, on one connection.
    /// The batch is all-or-nothing.
    async fn execute_many(
        &self,
        sql: &str,
        args: &[Vec<Value>],
        timeout: Option<Duration>,
    ) -> Result<()>;

    async fn fetch(
        &self,
        sql: &str,
        params: &[Value],
        timeout: Option<Duration>,
    ) -> Result<Vec<Record>>;

    /// Like `execute_many`, returning the rows of every tuple in order.
    async fn fetch_many(
        &self,
        sql: &str,
        args: &[Vec<Value>],
        timeout: Option<Duration>,
    ) -> Result<Vec<Record>>;

    /// Value at `column` of the first row, or `None` when there are no rows.
    async fn fetch_val(
        &self,
        sql: &str,
        params: &[Value],
        column: usize,
        timeout: Option<Duration>,
    ) -> Result<Option<Value>> {
        let rows = self.fetch(sql, params, timeout).await?;
        match rows.into_iter().next() {
            Some(row) => row.take(column).map(Some),
            None => Ok(None),
        }
    }
}

/// Kind of command reported in a [`CommandStatus`].
#[derive(Debug, Clone, PartialEq)]
pub enum CommandTag {
    Select,
    Insert,
    Update,
    Delete,
    /// Any other command, by its leading keyword.
    Other(String),
}

/// Driver status of an executed command.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandStatus {
    pub tag: CommandTag,
    pub rows: u64,
}

impl CommandStatus {
    pub fn new(tag: CommandTag, rows: u64) -> Self {
        Self { tag, rows }
    }

    /// Derive the tag from the leading keyword of `sql`.
    pub fn from_sql(sql: &str, rows: u64) -> Self {
        let keyword = sql
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_ascii_uppercase();
        let tag = match keyword.as_str() {
            "SELECT" => CommandTag::Select,
            "INSERT" => CommandTag::Insert,
            "UPDATE" => CommandTag::Update,
            "DELETE" => CommandTag::Delete,
            _ => CommandTag::Other(keyword),
        };
        Self { tag, rows }
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.tag {
            CommandTag::Select => write!(f, "SELECT {}", self.rows),
            CommandTag::Insert => write!(f, "INSERT 0 {}", self.rows),
            CommandTag::Update => write!(f, "UPDATE {}", self.rows),
            CommandTag::Delete => write!(f, "DELETE {}", self.rows),
            CommandTag::Other(keyword) => write!(f, "{}", keyword),
        }
    }
}

/// Run `fut`, failing with [`Error::Timeout`] if it outlives `timeout`.
pub(crate) async fn with_timeout<T, F>(timeout: Option<Duration>, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| Error::Timeout(limit))?,
        None => fut.await,
    }
}

pub(crate) fn sql_params(params: &[Value]) -> Vec<&(dyn ToSql + Sync)> {
    params.iter().map(|p| p as &(dyn ToSql + Sync)).collect()
}

const BATCH_SAVEPOINT: &str = "pgfetch_batch";

/// How a batch of tuples is made all-or-nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchScope {
    /// Autocommit connection: the batch gets its own transaction.
    Transaction,
    /// Already inside a transaction: the batch runs under a savepoint.
    Savepoint,
}

impl BatchScope {
    fn begin(self) -> String {
        match self {
            BatchScope::Transaction => "BEGIN".to_string(),
            BatchScope::Savepoint => format!("SAVEPOINT {}", BATCH_SAVEPOINT),
        }
    }

    fn commit(self) -> String {
        match self {
            BatchScope::Transaction => "COMMIT".to_string(),
            BatchScope::Savepoint => format!("RELEASE SAVEPOINT {}", BATCH_SAVEPOINT),
        }
    }

    fn rollback(self) -> String {
        match self {
            BatchScope::Transaction => "ROLLBACK".to_string(),
            BatchScope::Savepoint => format!(
                "ROLLBACK TO SAVEPOINT {0}; RELEASE SAVEPOINT {0}",
                BATCH_SAVEPOINT
            ),
        }
    }
}

/// Driver clients that batches and prepared statements run on.
pub trait BatchTarget: GenericClient + Sync {
    const BATCH_SCOPE: BatchScope;
}

impl BatchTarget for Client {
    const BATCH_SCOPE: BatchScope = BatchScope::Transaction;
}

impl<'a> BatchTarget for Transaction<'a> {
    const BATCH_SCOPE: BatchScope = BatchScope::Savepoint;
}

/// Run `body` between the scope's begin and commit commands.
///
/// On failure or timeout the scope is rolled back, so no tuple of the batch
/// stays applied. `control` sends one command to the server.
pub(crate) async fn atomic_batch<T, C, CF, B>(
    scope: BatchScope,
    timeout: Option<Duration>,
    control: C,
    body: B,
) -> Result<T>
where
    C: Fn(String) -> CF,
    CF: Future<Output = Result<()>>,
    B: Future<Output = Result<T>>,
{
    let result = with_timeout(timeout, async {
        control(scope.begin()).await?;
        let value = body.await?;
        control(scope.commit()).await?;
        Ok(value)
    })
    .await;

    if let Err(err) = &result {
        tracing::warn!(error = %err, scope = ?scope, "batch failed, rolling back");
        if let Err(rollback) = control(scope.rollback()).await {
            tracing::warn!(error = %rollback, "batch rollback failed");
        }
    }
    result
}

/// Send a batch control command on `client`.
pub(crate) async fn batch_control<C>(client: &C, command: String) -> Result<()>
where
    C: GenericClient + Sync,
{
    client.batch_execute(&command).await.map_err(Error::from)
}

pub(crate) async fn client_execute<C>(
    client: &C,
    sql: &str,
    params: &[Value],
    timeout: Option<Duration>,
) -> Result<CommandStatus>
where
    C: GenericClient + Sync,
{
    tracing::debug!(sql = %sql, params = params.len(), "execute");
    with_timeout(timeout, async {
        let rows = client.execute(sql, &sql_params(params)).await?;
        Ok(CommandStatus::from_sql(sql, rows))
    })
    .await
}

pub(crate) async fn client_execute_many<C>(
    client: &C,
    sql: &str,
    args: &[Vec<Value>],
    timeout: Option<Duration>,
) -> Result<()>
where
    C: BatchTarget,
{
    tracing::debug!(sql = %sql, tuples = args.len(), "execute_many");
    if args.is_empty() {
        return Ok(());
    }
    atomic_batch(
        C::BATCH_SCOPE,
        timeout,
        |command| batch_control(client, command),
        async {
            let statement = client.prepare(sql).await?;
            for params in args {
                client.execute(&statement, &sql_params(params)).await?;
            }
            Ok(())
        },
    )
    .await
}

pub(crate) async fn client_fetch<C>(
    client: &C,
    sql: &str,
    params: &[Value],
    timeout: Option<Duration>,
) -> Result<Vec<Record>>
where
    C: GenericClient + Sync,
{
    tracing::debug!(sql = %sql, params = params.len(), "fetch");
    with_timeout(timeout, async {
        let rows = client.query(sql, &sql_params(params)).await?;
        Ok(records_from_rows(&rows))
    })
    .await
}

pub(crate) async fn client_fetch_many<C>(
    client: &C,
    sql: &str,
    args: &[Vec<Value>],
    timeout: Option<Duration>,
) -> Result<Vec<Record>>
where
    C: BatchTarget,
{
    tracing::debug!(sql = %sql, tuples = args.len(), "fetch_many");
    if args.is_empty() {
        return Ok(Vec::new());
    }
    atomic_batch(
        C::BATCH_SCOPE,
        timeout,
        |command| batch_control(client, command),
        async {
            let statement = client.prepare(sql).await?;
            let mut records = Vec::new();
            for params in args {
                let rows = client.query(&statement, &sql_params(params)).await?;
                records.extend(records_from_rows(&rows));
            }
            Ok(records)
        },
    )
    .await
}

#[async_trait]
impl Executor for Client {
    async fn execute(
        &self,
        sql: &str,
        params: &[Value],
        timeout: Option<Duration>,
    ) -> Result<CommandStatus> {
        client_execute(self, sql, params, timeout).await
    }

    async fn execute_many(
        &self,
        sql: &str,
        args: &[Vec<Value>],
        timeout: Option<Duration>,
    ) -> Result<()> {
        client_execute_many(self, sql, args, timeout).await
    }

    async fn fetch(
        &self,
        sql: &str,
        params: &[Value],
        timeout: Option<Duration>,
    ) -> Result<Vec<Record>> {
        client_fetch(self, sql, params, timeout).await
    }

    async fn fetch_many(
        &self,
        sql: &str,
        args: &[Vec<Value>],
        timeout: Option<Duration>,
    ) -> Result<Vec<Record>> {
        client_fetch_many(self, sql, args, timeout).await
    }
}

#[async_trait]
impl<'a> Executor for Transaction<'a> {
    async fn execute(
        &self,
        sql: &str,
        params: &[Value],
        timeout: Option<Duration>,
    ) -> Result<CommandStatus> {
        client_execute(self, sql, params, timeout).await
    }

    async fn execute_many(
        &self,
        sql: &str,
        args: &[Vec<Value>],
        timeout: Option<Duration>,
    ) -> Result<()> {
        client_execute_many(self, sql, args, timeout).await
    }

    async fn fetch(
        &self,
        sql: &str,
        params: &[Value],
        timeout: Option<Duration>,
    ) -> Result<Vec<Record>> {
        client_fetch(self, sql, params, timeout).await
    }

    async fn fetch_many(
        &self,
        sql: &str,
        args: &[Vec<Value>],
        timeout: Option<Duration>,
    ) -> Result<Vec<Record>> {
        client_fetch_many(self, sql, args, timeout).await
    }
}

/// Pool transactions run on the wrapped driver transaction.
#[async_trait]
impl<'a> Executor for deadpool_postgres::Transaction<'a> {
    async fn execute(
        &self,
        sql: &str,
        params: &[Value],
        timeout: Option<Duration>,
    ) -> Result<CommandStatus> {
        let tx: &Transaction<'a> = self;
        client_execute(tx, sql, params, timeout).await
    }

    async fn execute_many(
        &self,
        sql: &str,
        args: &[Vec<Value>],
        timeout: Option<Duration>,
    ) -> Result<()> {
        let tx: &Transaction<'a> = self;
        client_execute_many(tx, sql, args, timeout).await
    }

    async fn fetch(
        &self,
        sql: &str,
        params: &[Value],
        timeout: Option<Duration>,
    ) -> Result<Vec<Record>> {
        let tx: &Transaction<'a> = self;
        client_fetch(tx, sql, params, timeout).await
    }

    async fn fetch_many(
        &self,
        sql: &str,
        args: &[Vec<Value>],
        timeout: Option<Duration>,
    ) -> Result<Vec<Record>> {
        let tx: &Transaction<'a> = self;
        client_fetch_many(tx, sql, args, timeout).await
    }
}

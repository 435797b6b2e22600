use async_trait::async_trait;
use deadpool_postgres::{Object, Transaction};
use std::time::Duration;
use tokio_postgres::{Client, IsolationLevel};

use super::executor::{
    client_execute, client_execute_many, client_fetch, client_fetch_many, CommandStatus, Executor,
};
use super::prepared::{prepare, PreparedStatement};
use crate::ast::Statement;
use crate::error::Result;
use crate::record::Record;
use crate::value::Value;

/// A pooled connection. Returned to its pool when dropped.
pub struct Connection {
    object: Object,
}

/// Options for [`Connection::transaction`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TransactionOptions {
    /// `None` uses the server default (usually read committed).
    pub isolation: Option<IsolationLevel>,
    pub read_only: bool,
    /// Only meaningful for serializable read-only transactions.
    pub deferrable: bool,
}

impl TransactionOptions {
    pub fn serializable() -> Self {
        Self {
            isolation: Some(IsolationLevel::Serializable),
            ..Default::default()
        }
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn deferrable(mut self) -> Self {
        self.deferrable = true;
        self
    }
}

impl Connection {
    pub(crate) fn new(object: Object) -> Self {
        Self { object }
    }

    pub fn client(&self) -> &Client {
        &self.object
    }

    /// Start a transaction. Dropping it without `commit()` rolls back.
    pub async fn transaction(&mut self, options: TransactionOptions) -> Result<Transaction<'_>> {
        let mut builder = self.object.build_transaction();
        if let Some(isolation) = options.isolation {
            builder = builder.isolation_level(isolation);
        }
        let tx = builder
            .read_only(options.read_only)
            .deferrable(options.deferrable)
            .start()
            .await?;
        tracing::debug!(
            isolation = ?options.isolation,
            read_only = options.read_only,
            deferrable = options.deferrable,
            "transaction started"
        );
        Ok(tx)
    }

    /// Prepare `statement` on this connection.
    pub async fn prepare(
        &self,
        statement: &Statement,
        name: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<PreparedStatement<'_, Client>> {
        prepare(self.client(), statement, name, timeout).await
    }

    /// Detach from the pool wrapper, yielding the raw pool object.
    pub fn into_inner(self) -> Object {
        self.object
    }
}

#[async_trait]
impl Executor for Connection {
    async fn execute(
        &self,
        sql: &str,
        params: &[Value],
        timeout: Option<Duration>,
    ) -> Result<CommandStatus> {
        client_execute(self.client(), sql, params, timeout).await
    }

    async fn execute_many(
        &self,
        sql: &str,
        args: &[Vec<Value>],
        timeout: Option<Duration>,
    ) -> Result<()> {
        client_execute_many(self.client(), sql, args, timeout).await
    }

    async fn fetch(
        &self,
        sql: &str,
        params: &[Value],
        timeout: Option<Duration>,
    ) -> Result<Vec<Record>> {
        client_fetch(self.client(), sql, params, timeout).await
    }

    async fn fetch_many(
        &self,
        sql: &str,
        args: &[Vec<Value>],
        timeout: Option<Duration>,
    ) -> Result<Vec<Record>> {
        client_fetch_many(self.client(), sql, args, timeout).await
    }
}

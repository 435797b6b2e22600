//! Statement execution: compile, run on a target, map the rows.
//!
//! Each call is one compile → execute → map sequence with no state kept
//! between calls. The facade never acquires or releases connections; a
//! [`Database`] target checks one out per call on its own.

use std::time::Duration;
use tokio_postgres::Client;

use crate::ast::{compile, compile_literal, compile_without_params, CompiledQuery, Statement};
use crate::db::{CommandStatus, Connection, Database, Executor};
use crate::error::Result;
use crate::mapper::{map_many, map_optional, map_scalar, ScalarSelector, Selector};
use crate::value::Value;

/// Where a statement runs.
#[derive(Clone, Copy)]
pub enum Target<'a> {
    /// A single connection or transaction.
    Connection(&'a dyn Executor),
    /// A pool; each call runs on a connection checked out for that call.
    Pool(&'a Database),
}

impl<'a> Target<'a> {
    pub fn resolve(&self) -> &'a dyn Executor {
        match *self {
            Target::Connection(executor) => executor,
            Target::Pool(database) => database,
        }
    }
}

impl<'a> From<&'a Database> for Target<'a> {
    fn from(database: &'a Database) -> Self {
        Target::Pool(database)
    }
}

impl<'a> From<&'a Connection> for Target<'a> {
    fn from(connection: &'a Connection) -> Self {
        Target::Connection(connection)
    }
}

impl<'a> From<&'a Client> for Target<'a> {
    fn from(client: &'a Client) -> Self {
        Target::Connection(client)
    }
}

impl<'a, 'b> From<&'a deadpool_postgres::Transaction<'b>> for Target<'a> {
    fn from(tx: &'a deadpool_postgres::Transaction<'b>) -> Self {
        Target::Connection(tx)
    }
}

impl<'a, 'b> From<&'a tokio_postgres::Transaction<'b>> for Target<'a> {
    fn from(tx: &'a tokio_postgres::Transaction<'b>) -> Self {
        Target::Connection(tx)
    }
}

fn compile_for_run(statement: &Statement) -> Result<CompiledQuery> {
    let compiled = compile(statement)?;
    if tracing::enabled!(tracing::Level::TRACE) {
        if let Ok(literal) = compile_literal(statement) {
            tracing::trace!(kind = statement.kind(), sql = %literal, "statement");
        }
    }
    Ok(compiled)
}

/// Run a statement for its effect and return the driver status.
pub async fn execute<'a>(
    target: impl Into<Target<'a>>,
    statement: &Statement,
    timeout: Option<Duration>,
) -> Result<CommandStatus> {
    let compiled = compile_for_run(statement)?;
    target
        .into()
        .resolve()
        .execute(&compiled.sql, &compiled.params, timeout)
        .await
}

/// Run a statement once per argument tuple in a single batch call.
///
/// The statement is compiled once without its bound values; each tuple
/// supplies the values for `$1..$N` in order.
pub async fn execute_many<'a>(
    target: impl Into<Target<'a>>,
    statement: &Statement,
    args: &[Vec<Value>],
    timeout: Option<Duration>,
) -> Result<()> {
    let sql = compile_without_params(statement)?;
    target
        .into()
        .resolve()
        .execute_many(&sql, args, timeout)
        .await
}

/// Every row, mapped.
pub async fn fetch_all<'a, T>(
    target: impl Into<Target<'a>>,
    statement: &Statement,
    selector: &Selector<T>,
    timeout: Option<Duration>,
) -> Result<Vec<T>> {
    let compiled = compile_for_run(statement)?;
    let rows = target
        .into()
        .resolve()
        .fetch(&compiled.sql, &compiled.params, timeout)
        .await?;
    map_many(rows, selector)
}

/// Alias of [`fetch_all`].
pub async fn fetch<'a, T>(
    target: impl Into<Target<'a>>,
    statement: &Statement,
    selector: &Selector<T>,
    timeout: Option<Duration>,
) -> Result<Vec<T>> {
    fetch_all(target, statement, selector, timeout).await
}

/// Zero or one row, mapped. More than one row is an error.
pub async fn fetch_one<'a, T>(
    target: impl Into<Target<'a>>,
    statement: &Statement,
    selector: &Selector<T>,
    timeout: Option<Duration>,
) -> Result<Option<T>> {
    let compiled = compile_for_run(statement)?;
    let rows = target
        .into()
        .resolve()
        .fetch(&compiled.sql, &compiled.params, timeout)
        .await?;
    map_optional(&compiled.sql, rows, selector)
}

/// Alias of [`fetch_one`].
pub async fn fetch_row<'a, T>(
    target: impl Into<Target<'a>>,
    statement: &Statement,
    selector: &Selector<T>,
    timeout: Option<Duration>,
) -> Result<Option<T>> {
    fetch_one(target, statement, selector, timeout).await
}

/// One column of the first row, mapped. [`fetch_scalar`] reads column 0.
pub async fn fetch_val<'a, T>(
    target: impl Into<Target<'a>>,
    statement: &Statement,
    column: usize,
    selector: &ScalarSelector<T>,
    timeout: Option<Duration>,
) -> Result<Option<T>> {
    let compiled = compile_for_run(statement)?;
    let value = target
        .into()
        .resolve()
        .fetch_val(&compiled.sql, &compiled.params, column, timeout)
        .await?;
    map_scalar(value, selector)
}

/// The first column of the first row, mapped.
pub async fn fetch_scalar<'a, T>(
    target: impl Into<Target<'a>>,
    statement: &Statement,
    selector: &ScalarSelector<T>,
    timeout: Option<Duration>,
) -> Result<Option<T>> {
    fetch_val(target, statement, 0, selector, timeout).await
}

/// Run once per argument tuple in a single batch call and map every
/// returned row.
pub async fn fetch_many<'a, T>(
    target: impl Into<Target<'a>>,
    statement: &Statement,
    args: &[Vec<Value>],
    selector: &Selector<T>,
    timeout: Option<Duration>,
) -> Result<Vec<T>> {
    let sql = compile_without_params(statement)?;
    let rows = target
        .into()
        .resolve()
        .fetch_many(&sql, args, timeout)
        .await?;
    map_many(rows, selector)
}

impl Statement {
    pub async fn execute<'a>(
        &self,
        target: impl Into<Target<'a>>,
        timeout: Option<Duration>,
    ) -> Result<CommandStatus> {
        execute(target, self, timeout).await
    }

    pub async fn fetch_all<'a, T>(
        &self,
        target: impl Into<Target<'a>>,
        selector: &Selector<T>,
        timeout: Option<Duration>,
    ) -> Result<Vec<T>> {
        fetch_all(target, self, selector, timeout).await
    }

    pub async fn fetch_one<'a, T>(
        &self,
        target: impl Into<Target<'a>>,
        selector: &Selector<T>,
        timeout: Option<Duration>,
    ) -> Result<Option<T>> {
        fetch_one(target, self, selector, timeout).await
    }

    pub async fn fetch_val<'a, T>(
        &self,
        target: impl Into<Target<'a>>,
        column: usize,
        selector: &ScalarSelector<T>,
        timeout: Option<Duration>,
    ) -> Result<Option<T>> {
        fetch_val(target, self, column, selector, timeout).await
    }

    pub async fn fetch_scalar<'a, T>(
        &self,
        target: impl Into<Target<'a>>,
        selector: &ScalarSelector<T>,
        timeout: Option<Duration>,
    ) -> Result<Option<T>> {
        fetch_scalar(target, self, selector, timeout).await
    }
}

use std::time::Duration;

use super::executor::{atomic_batch, batch_control, sql_params, with_timeout, BatchTarget};
use crate::ast::{compile_without_params, Statement};
use crate::error::Result;
use crate::mapper::{map_many, map_optional, map_scalar, ScalarSelector, Selector};
use crate::record::{records_from_rows, Record};
use crate::value::Value;

/// A statement prepared on one connection, run with caller-supplied
/// argument tuples.
pub struct PreparedStatement<'c, C> {
    client: &'c C,
    statement: tokio_postgres::Statement,
    sql: String,
    name: Option<String>,
}

/// Compile `statement` without bound values and prepare it on `client`.
///
/// `name` only labels log events.
pub async fn prepare<'c, C>(
    client: &'c C,
    statement: &Statement,
    name: Option<&str>,
    timeout: Option<Duration>,
) -> Result<PreparedStatement<'c, C>>
where
    C: BatchTarget,
{
    let sql = compile_without_params(statement)?;
    tracing::debug!(sql = %sql, name = ?name, "prepare");
    let prepared = with_timeout(timeout, async { Ok(client.prepare(&sql).await?) }).await?;
    Ok(PreparedStatement {
        client,
        statement: prepared,
        sql,
        name: name.map(str::to_string),
    })
}

impl<'c, C> PreparedStatement<'c, C>
where
    C: BatchTarget,
{
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Number of parameters the server expects.
    pub fn param_count(&self) -> usize {
        self.statement.params().len()
    }

    pub fn columns(&self) -> Vec<String> {
        self.statement
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect()
    }

    async fn query(&self, args: &[Value], timeout: Option<Duration>) -> Result<Vec<Record>> {
        tracing::debug!(name = ?self.name, params = args.len(), "prepared fetch");
        with_timeout(timeout, async {
            let rows = self.client.query(&self.statement, &sql_params(args)).await?;
            Ok(records_from_rows(&rows))
        })
        .await
    }

    pub async fn fetch<T>(
        &self,
        args: &[Value],
        selector: &Selector<T>,
        timeout: Option<Duration>,
    ) -> Result<Vec<T>> {
        map_many(self.query(args, timeout).await?, selector)
    }

    pub async fn fetch_row<T>(
        &self,
        args: &[Value],
        selector: &Selector<T>,
        timeout: Option<Duration>,
    ) -> Result<Option<T>> {
        let rows = self.query(args, timeout).await?;
        map_optional(&self.sql, rows, selector)
    }

    pub async fn fetch_val<T>(
        &self,
        args: &[Value],
        column: usize,
        selector: &ScalarSelector<T>,
        timeout: Option<Duration>,
    ) -> Result<Option<T>> {
        let value = match self.query(args, timeout).await?.into_iter().next() {
            Some(row) => Some(row.take(column)?),
            None => None,
        };
        map_scalar(value, selector)
    }

    /// Run once per argument tuple, returning all rows in order. The batch
    /// is all-or-nothing.
    pub async fn fetch_many<T>(
        &self,
        args: &[Vec<Value>],
        selector: &Selector<T>,
        timeout: Option<Duration>,
    ) -> Result<Vec<T>> {
        tracing::debug!(name = ?self.name, tuples = args.len(), "prepared fetch_many");
        if args.is_empty() {
            return Ok(Vec::new());
        }
        let rows = atomic_batch(
            C::BATCH_SCOPE,
            timeout,
            |command| batch_control(self.client, command),
            async {
                let mut records = Vec::new();
                for params in args {
                    let rows = self.client.query(&self.statement, &sql_params(params)).await?;
                    records.extend(records_from_rows(&rows));
                }
                Ok(records)
            },
        )
        .await?;
        map_many(rows, selector)
    }

    /// Run once per argument tuple. The batch is all-or-nothing.
    pub async fn execute_many(&self, args: &[Vec<Value>], timeout: Option<Duration>) -> Result<()> {
        tracing::debug!(name = ?self.name, tuples = args.len(), "prepared execute_many");
        if args.is_empty() {
            return Ok(());
        }
        atomic_batch(
            C::BATCH_SCOPE,
            timeout,
            |command| batch_control(self.client, command),
            async {
                for params in args {
                    self.client.execute(&self.statement, &sql_params(params)).await?;
                }
                Ok(())
            },
        )
        .await
    }

    /// The server's JSON plan for this statement with `args`.
    ///
    /// With `analyze` the statement really runs; wrap the call in a
    /// transaction that is rolled back when it has side effects.
    pub async fn explain(
        &self,
        args: &[Value],
        analyze: bool,
        timeout: Option<Duration>,
    ) -> Result<serde_json::Value> {
        let sql = explain_sql(&self.sql, analyze);
        tracing::debug!(sql = %sql, "explain");
        with_timeout(timeout, async {
            let row = self.client.query_one(sql.as_str(), &sql_params(args)).await?;
            let plan: serde_json::Value = row.try_get(0)?;
            Ok(plan)
        })
        .await
    }
}

fn explain_sql(sql: &str, analyze: bool) -> String {
    if analyze {
        format!("EXPLAIN (FORMAT JSON, VERBOSE, ANALYZE) {}", sql)
    } else {
        format!("EXPLAIN (FORMAT JSON, VERBOSE) {}", sql)
    }
}

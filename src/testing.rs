//! In-memory [`Executor`] double for facade tests.

use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

use crate::db::{with_timeout, CommandStatus, Executor};
use crate::error::Result;
use crate::record::Record;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    Execute { sql: String, params: Vec<Value> },
    ExecuteMany { sql: String, args: Vec<Vec<Value>> },
    Fetch { sql: String, params: Vec<Value> },
    FetchMany { sql: String, args: Vec<Vec<Value>> },
}

/// Records every call and answers fetches with canned rows.
#[derive(Default)]
pub(crate) struct RecordingExecutor {
    rows: Vec<Record>,
    delay: Option<Duration>,
    calls: Mutex<Vec<Call>>,
}

impl RecordingExecutor {
    pub(crate) fn returning(rows: Vec<Record>) -> Self {
        Self {
            rows,
            ..Default::default()
        }
    }

    /// Every call sleeps for `delay` before answering.
    pub(crate) fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Default::default()
        }
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, call: Call) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }

    async fn answer<T>(&self, timeout: Option<Duration>, value: T) -> Result<T> {
        with_timeout(timeout, async {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            Ok(value)
        })
        .await
    }
}

#[async_trait]
impl Executor for RecordingExecutor {
    async fn execute(
        &self,
        sql: &str,
        params: &[Value],
        timeout: Option<Duration>,
    ) -> Result<CommandStatus> {
        self.record(Call::Execute {
            sql: sql.to_string(),
            params: params.to_vec(),
        });
        let rows = self.rows.len() as u64;
        self.answer(timeout, CommandStatus::from_sql(sql, rows)).await
    }

    async fn execute_many(
        &self,
        sql: &str,
        args: &[Vec<Value>],
        timeout: Option<Duration>,
    ) -> Result<()> {
        self.record(Call::ExecuteMany {
            sql: sql.to_string(),
            args: args.to_vec(),
        });
        self.answer(timeout, ()).await
    }

    async fn fetch(
        &self,
        sql: &str,
        params: &[Value],
        timeout: Option<Duration>,
    ) -> Result<Vec<Record>> {
        self.record(Call::Fetch {
            sql: sql.to_string(),
            params: params.to_vec(),
        });
        self.answer(timeout, self.rows.clone()).await
    }

    async fn fetch_many(
        &self,
        sql: &str,
        args: &[Vec<Value>],
        timeout: Option<Duration>,
    ) -> Result<Vec<Record>> {
        self.record(Call::FetchMany {
            sql: sql.to_string(),
            args: args.to_vec(),
        });
        let rows = args.iter().flat_map(|_| self.rows.clone()).collect();
        self.answer(timeout, rows).await
    }
}

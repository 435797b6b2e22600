use serde::{Deserialize, Serialize};

use super::params::BindParams;
use super::types::{Query, ScopedQuery};
use crate::value::Value;

/// A query AST together with the values bound to its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    query: Query,
    #[serde(default)]
    params: BindParams,
}

impl Statement {
    pub fn new(query: Query) -> Self {
        Self {
            query,
            params: BindParams::new(),
        }
    }

    pub fn with_params(query: Query, params: BindParams) -> Self {
        Self { query, params }
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn params(&self) -> &BindParams {
        &self.params
    }

    /// Bind or re-bind a named parameter.
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.bind(name, value);
        self
    }

    pub fn into_parts(self) -> (Query, BindParams) {
        (self.query, self.params)
    }

    /// Short statement kind for log fields.
    pub fn kind(&self) -> &'static str {
        self.query.kind()
    }

    /// The query with this statement's bound values scoped to it, for
    /// embedding as a subquery.
    pub fn into_scoped_query(self) -> Query {
        if self.params.is_empty() {
            self.query
        } else {
            Query::Scoped(ScopedQuery {
                query: Box::new(self.query),
                params: self.params,
            })
        }
    }
}

impl From<Statement> for Query {
    fn from(statement: Statement) -> Self {
        statement.into_scoped_query()
    }
}

impl From<Query> for Statement {
    fn from(query: Query) -> Self {
        Statement::new(query)
    }
}

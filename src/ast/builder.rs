//! Fluent constructors for [`Statement`]s.
//!
//! ```ignore
//! use pgfetch::ast::builder::{col, param, select, update};
//!
//! let stmt = select(["id", "name"])
//!     .from("users")
//!     .filter(col("id").eq(param("id")))
//!     .bind("id", 7)
//!     .build();
//!
//! let stmt = update("users")
//!     .set("status", "inactive")
//!     .filter_eq("id", 7)
//!     .build();
//! ```
//!
//! Builders never render SQL. Values passed to `set`, `value` and
//! `filter_eq` are bound under synthetic names (`status_1`, ...); values
//! referenced through [`param`] are bound explicitly with `bind`.

use super::params::BindParams;
use super::statement::Statement;
use super::types::*;
use crate::value::Value;

/// Column reference. `"t.col"` is qualified by table `t`.
pub fn col(name: &str) -> Expression {
    match name.split_once('.') {
        Some((table, column)) => Expression::Column {
            table: Some(table.to_string()),
            name: column.to_string(),
        },
        None => Expression::Column {
            table: None,
            name: name.to_string(),
        },
    }
}

/// Named bind parameter.
pub fn param(name: &str) -> Expression {
    Expression::Param(name.to_string())
}

/// Inline constant.
pub fn lit(value: impl Into<Literal>) -> Expression {
    Expression::Literal(value.into())
}

pub fn func(name: &str, args: impl IntoIterator<Item = Expression>) -> Expression {
    Expression::Function {
        name: name.to_string(),
        args: args.into_iter().collect(),
        distinct: false,
    }
}

/// `EXCLUDED.column`, for upsert assignments.
pub fn excluded(column: &str) -> Expression {
    Expression::Excluded(column.to_string())
}

/// `EXISTS (subquery)`. Values bound on a builder or statement passed here
/// stay scoped to the subquery.
pub fn exists(query: impl Into<Query>) -> Expression {
    Expression::Exists(Box::new(query.into()))
}

impl From<bool> for Literal {
    fn from(b: bool) -> Self {
        Literal::Boolean(b)
    }
}

impl From<i32> for Literal {
    fn from(i: i32) -> Self {
        Literal::Integer(i64::from(i))
    }
}

impl From<i64> for Literal {
    fn from(i: i64) -> Self {
        Literal::Integer(i)
    }
}

impl From<f64> for Literal {
    fn from(f: f64) -> Self {
        Literal::Float(f)
    }
}

impl From<&str> for Literal {
    fn from(s: &str) -> Self {
        Literal::String(s.to_string())
    }
}

impl From<String> for Literal {
    fn from(s: String) -> Self {
        Literal::String(s)
    }
}

impl Expression {
    fn binary(self, op: BinaryOperator, right: Expression) -> Expression {
        Expression::BinaryOp {
            left: Box::new(self),
            op,
            right: Box::new(right),
        }
    }

    pub fn eq(self, right: Expression) -> Expression {
        self.binary(BinaryOperator::Eq, right)
    }

    pub fn ne(self, right: Expression) -> Expression {
        self.binary(BinaryOperator::NotEq, right)
    }

    pub fn lt(self, right: Expression) -> Expression {
        self.binary(BinaryOperator::Lt, right)
    }

    pub fn lte(self, right: Expression) -> Expression {
        self.binary(BinaryOperator::LtEq, right)
    }

    pub fn gt(self, right: Expression) -> Expression {
        self.binary(BinaryOperator::Gt, right)
    }

    pub fn gte(self, right: Expression) -> Expression {
        self.binary(BinaryOperator::GtEq, right)
    }

    pub fn like(self, pattern: Expression) -> Expression {
        self.binary(BinaryOperator::Like, pattern)
    }

    pub fn ilike(self, pattern: Expression) -> Expression {
        self.binary(BinaryOperator::ILike, pattern)
    }

    /// `self = ANY(array)`.
    pub fn eq_any(self, array: Expression) -> Expression {
        self.binary(BinaryOperator::EqAny, array)
    }

    /// `self @> right`.
    pub fn contains(self, right: Expression) -> Expression {
        self.binary(BinaryOperator::Contains, right)
    }

    pub fn concat(self, right: Expression) -> Expression {
        self.binary(BinaryOperator::Concat, right)
    }

    pub fn and(self, right: Expression) -> Expression {
        self.binary(BinaryOperator::And, right)
    }

    pub fn or(self, right: Expression) -> Expression {
        self.binary(BinaryOperator::Or, right)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Expression {
        Expression::UnaryOp {
            op: UnaryOperator::Not,
            expr: Box::new(self.nested()),
        }
    }

    pub fn is_null(self) -> Expression {
        Expression::IsNull {
            expr: Box::new(self),
            negated: false,
        }
    }

    pub fn is_not_null(self) -> Expression {
        Expression::IsNull {
            expr: Box::new(self),
            negated: true,
        }
    }

    pub fn in_list(self, list: impl IntoIterator<Item = Expression>) -> Expression {
        Expression::InList {
            expr: Box::new(self),
            list: list.into_iter().collect(),
            negated: false,
        }
    }

    /// `self IN (subquery)`. Values bound on the subquery's builder stay
    /// scoped to it; parameters it leaves unbound resolve against the outer
    /// statement.
    pub fn in_query(self, query: impl Into<Query>) -> Expression {
        Expression::InSubquery {
            expr: Box::new(self),
            subquery: Box::new(query.into()),
            negated: false,
        }
    }

    pub fn between(self, low: Expression, high: Expression) -> Expression {
        Expression::Between {
            expr: Box::new(self),
            low: Box::new(low),
            high: Box::new(high),
            negated: false,
        }
    }

    pub fn cast(self, data_type: &str) -> Expression {
        Expression::TypeCast {
            expr: Box::new(self),
            data_type: data_type.to_string(),
        }
    }

    pub fn nested(self) -> Expression {
        match self {
            Expression::Nested(_) => self,
            other => Expression::Nested(Box::new(other)),
        }
    }
}

fn select_item(name: &str) -> SelectItem {
    if name == "*" {
        SelectItem::Wildcard
    } else if let Some(table) = name.strip_suffix(".*") {
        SelectItem::QualifiedWildcard(table.to_string())
    } else {
        SelectItem::Expression {
            expr: col(name),
            alias: None,
        }
    }
}

fn select_items<S: AsRef<str>>(names: impl IntoIterator<Item = S>) -> Vec<SelectItem> {
    names.into_iter().map(|n| select_item(n.as_ref())).collect()
}

fn table_ref(name: &str, alias: Option<&str>) -> TableRef {
    let (schema, name) = match name.split_once('.') {
        Some((schema, name)) => (Some(schema.to_string()), name.to_string()),
        None => (None, name.to_string()),
    };
    TableRef::Table {
        schema,
        name,
        alias: alias.map(str::to_string),
    }
}

fn and_filter(existing: Option<Expression>, expr: Expression) -> Option<Expression> {
    Some(match existing {
        Some(current) => current.and(expr),
        None => expr,
    })
}

/// Start a SELECT projecting the given columns. An empty list selects `*`.
pub fn select<S: AsRef<str>>(columns: impl IntoIterator<Item = S>) -> SelectBuilder {
    SelectBuilder {
        query: SelectQuery {
            projections: select_items(columns),
            ..Default::default()
        },
        params: BindParams::new(),
    }
}

#[derive(Debug, Clone)]
pub struct SelectBuilder {
    query: SelectQuery,
    params: BindParams,
}

impl SelectBuilder {
    pub fn distinct(mut self) -> Self {
        self.query.distinct = true;
        self
    }

    pub fn column(mut self, expr: Expression) -> Self {
        self.query
            .projections
            .push(SelectItem::Expression { expr, alias: None });
        self
    }

    pub fn column_as(mut self, expr: Expression, alias: &str) -> Self {
        self.query.projections.push(SelectItem::Expression {
            expr,
            alias: Some(alias.to_string()),
        });
        self
    }

    pub fn from(mut self, table: &str) -> Self {
        self.query.from.push(table_ref(table, None));
        self
    }

    pub fn from_as(mut self, table: &str, alias: &str) -> Self {
        self.query.from.push(table_ref(table, Some(alias)));
        self
    }

    pub fn from_query(mut self, query: impl Into<Query>, alias: &str) -> Self {
        self.query.from.push(TableRef::Subquery {
            query: Box::new(query.into()),
            alias: alias.to_string(),
        });
        self
    }

    fn push_join(mut self, join_type: JoinType, table: TableRef, on: Option<Expression>) -> Self {
        self.query.joins.push(Join {
            join_type,
            table,
            condition: on.map(JoinCondition::On),
        });
        self
    }

    pub fn join(self, table: &str, on: Expression) -> Self {
        self.push_join(JoinType::Inner, table_ref(table, None), Some(on))
    }

    pub fn join_as(self, table: &str, alias: &str, on: Expression) -> Self {
        self.push_join(JoinType::Inner, table_ref(table, Some(alias)), Some(on))
    }

    pub fn left_join(self, table: &str, on: Expression) -> Self {
        self.push_join(JoinType::Left, table_ref(table, None), Some(on))
    }

    pub fn left_join_as(self, table: &str, alias: &str, on: Expression) -> Self {
        self.push_join(JoinType::Left, table_ref(table, Some(alias)), Some(on))
    }

    pub fn cross_join(self, table: &str) -> Self {
        self.push_join(JoinType::Cross, table_ref(table, None), None)
    }

    /// Add a WHERE condition, ANDed with any existing one.
    pub fn filter(mut self, expr: Expression) -> Self {
        self.query.filter = and_filter(self.query.filter.take(), expr);
        self
    }

    /// `column = value`, binding `value` under a synthetic name.
    pub fn filter_eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        let name = self.params.bind_unique(&param_base(column), value);
        self.filter(col(column).eq(param(&name)))
    }

    pub fn group_by(mut self, expr: Expression) -> Self {
        self.query.group_by.push(expr);
        self
    }

    pub fn having(mut self, expr: Expression) -> Self {
        self.query.having = and_filter(self.query.having.take(), expr);
        self
    }

    pub fn order_by(mut self, expr: Expression, asc: bool) -> Self {
        self.query.order_by.push(OrderByExpr {
            expr,
            asc: Some(asc),
            nulls_first: None,
        });
        self
    }

    pub fn order_by_asc(self, column: &str) -> Self {
        self.order_by(col(column), true)
    }

    pub fn order_by_desc(self, column: &str) -> Self {
        self.order_by(col(column), false)
    }

    pub fn limit(mut self, n: i64) -> Self {
        self.query.limit = Some(lit(n));
        self
    }

    pub fn limit_param(mut self, name: &str) -> Self {
        self.query.limit = Some(param(name));
        self
    }

    pub fn offset(mut self, n: i64) -> Self {
        self.query.offset = Some(lit(n));
        self
    }

    pub fn offset_param(mut self, name: &str) -> Self {
        self.query.offset = Some(param(name));
        self
    }

    pub fn lock(mut self, mode: LockMode) -> Self {
        self.query.locking = Some(mode);
        self
    }

    pub fn bind(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.params.bind(name, value);
        self
    }

    /// The query, with any values bound on this builder scoped to it.
    pub fn into_query(self) -> Query {
        self.build().into_scoped_query()
    }

    pub fn build(self) -> Statement {
        Statement::with_params(Query::Select(Box::new(self.query)), self.params)
    }
}

impl From<SelectBuilder> for Query {
    fn from(builder: SelectBuilder) -> Self {
        builder.into_query()
    }
}

/// Synthetic parameter names drop any table qualifier.
fn param_base(column: &str) -> String {
    match column.rsplit_once('.') {
        Some((_, name)) => name.to_string(),
        None => column.to_string(),
    }
}

pub fn insert(table: &str) -> InsertBuilder {
    InsertBuilder {
        table: table_ref(table, None),
        columns: Vec::new(),
        row: Vec::new(),
        source: None,
        on_conflict: None,
        returning: Vec::new(),
        params: BindParams::new(),
    }
}

#[derive(Debug, Clone)]
pub struct InsertBuilder {
    table: TableRef,
    columns: Vec<String>,
    row: Vec<Expression>,
    source: Option<Query>,
    on_conflict: Option<OnConflict>,
    returning: Vec<SelectItem>,
    params: BindParams,
}

impl InsertBuilder {
    /// Insert `value` into `column`, binding it under a synthetic name.
    pub fn value(mut self, column: &str, value: impl Into<Value>) -> Self {
        let name = self.params.bind_unique(column, value);
        self.columns.push(column.to_string());
        self.row.push(param(&name));
        self
    }

    /// Insert an arbitrary expression into `column`.
    pub fn expr(mut self, column: &str, expr: Expression) -> Self {
        self.columns.push(column.to_string());
        self.row.push(expr);
        self
    }

    /// Insert the unbound parameter `name` into `column`, for batch execution.
    pub fn param(self, column: &str, name: &str) -> Self {
        self.expr(column, param(name))
    }

    /// `INSERT INTO t (columns) SELECT ...`.
    pub fn from_query<S: AsRef<str>>(
        mut self,
        columns: impl IntoIterator<Item = S>,
        query: impl Into<Query>,
    ) -> Self {
        self.columns = columns.into_iter().map(|c| c.as_ref().to_string()).collect();
        self.row.clear();
        self.source = Some(query.into());
        self
    }

    pub fn on_conflict_do_nothing(mut self) -> Self {
        self.on_conflict = Some(OnConflict {
            target: ConflictTarget::Any,
            action: ConflictAction::DoNothing,
        });
        self
    }

    /// Upsert: on a conflict over `target`, overwrite `update` from the
    /// proposed row.
    pub fn on_conflict_do_update<S: AsRef<str>, U: AsRef<str>>(
        mut self,
        target: impl IntoIterator<Item = S>,
        update: impl IntoIterator<Item = U>,
    ) -> Self {
        let assignments = update
            .into_iter()
            .map(|c| Assignment {
                column: c.as_ref().to_string(),
                value: excluded(c.as_ref()),
            })
            .collect();
        self.on_conflict = Some(OnConflict {
            target: ConflictTarget::Columns(
                target.into_iter().map(|c| c.as_ref().to_string()).collect(),
            ),
            action: ConflictAction::DoUpdate {
                assignments,
                filter: None,
            },
        });
        self
    }

    pub fn on_conflict(mut self, on_conflict: OnConflict) -> Self {
        self.on_conflict = Some(on_conflict);
        self
    }

    pub fn returning<S: AsRef<str>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.returning.extend(select_items(columns));
        self
    }

    pub fn bind(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.params.bind(name, value);
        self
    }

    pub fn build(self) -> Statement {
        let source = match self.source {
            Some(query) => InsertSource::Query(Box::new(query)),
            None if self.row.is_empty() => InsertSource::DefaultValues,
            None => InsertSource::Values(vec![self.row]),
        };
        let query = Query::Insert(InsertQuery {
            table: self.table,
            columns: self.columns,
            source,
            on_conflict: self.on_conflict,
            returning: self.returning,
        });
        Statement::with_params(query, self.params)
    }
}

pub fn update(table: &str) -> UpdateBuilder {
    UpdateBuilder {
        query: UpdateQuery {
            table: table_ref(table, None),
            assignments: Vec::new(),
            from: Vec::new(),
            filter: None,
            returning: Vec::new(),
        },
        params: BindParams::new(),
    }
}

#[derive(Debug, Clone)]
pub struct UpdateBuilder {
    query: UpdateQuery,
    params: BindParams,
}

impl UpdateBuilder {
    /// `column = value`, binding `value` under a synthetic name.
    pub fn set(mut self, column: &str, value: impl Into<Value>) -> Self {
        let name = self.params.bind_unique(column, value);
        self.set_expr(column, param(&name))
    }

    pub fn set_expr(mut self, column: &str, value: Expression) -> Self {
        self.query.assignments.push(Assignment {
            column: column.to_string(),
            value,
        });
        self
    }

    pub fn from(mut self, table: &str) -> Self {
        self.query.from.push(table_ref(table, None));
        self
    }

    pub fn filter(mut self, expr: Expression) -> Self {
        self.query.filter = and_filter(self.query.filter.take(), expr);
        self
    }

    pub fn filter_eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        let name = self.params.bind_unique(&param_base(column), value);
        self.filter(col(column).eq(param(&name)))
    }

    pub fn returning<S: AsRef<str>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.query.returning.extend(select_items(columns));
        self
    }

    pub fn bind(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.params.bind(name, value);
        self
    }

    pub fn build(self) -> Statement {
        Statement::with_params(Query::Update(self.query), self.params)
    }
}

pub fn delete(table: &str) -> DeleteBuilder {
    DeleteBuilder {
        query: DeleteQuery {
            table: table_ref(table, None),
            using: Vec::new(),
            filter: None,
            returning: Vec::new(),
        },
        params: BindParams::new(),
    }
}

#[derive(Debug, Clone)]
pub struct DeleteBuilder {
    query: DeleteQuery,
    params: BindParams,
}

impl DeleteBuilder {
    pub fn using(mut self, table: &str) -> Self {
        self.query.using.push(table_ref(table, None));
        self
    }

    pub fn filter(mut self, expr: Expression) -> Self {
        self.query.filter = and_filter(self.query.filter.take(), expr);
        self
    }

    pub fn filter_eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        let name = self.params.bind_unique(&param_base(column), value);
        self.filter(col(column).eq(param(&name)))
    }

    pub fn returning<S: AsRef<str>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.query.returning.extend(select_items(columns));
        self
    }

    pub fn bind(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.params.bind(name, value);
        self
    }

    pub fn build(self) -> Statement {
        Statement::with_params(Query::Delete(self.query), self.params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::compiler::{compile, compile_literal, compile_without_params};

    #[test]
    fn test_qualified_column() {
        assert_eq!(
            col("u.id"),
            Expression::Column {
                table: Some("u".into()),
                name: "id".into()
            }
        );
    }

    #[test]
    fn test_schema_qualified_table() {
        let stmt = select(["*"]).from("audit.events").build();
        assert_eq!(compile(&stmt).unwrap().sql, "SELECT * FROM audit.events");
    }

    #[test]
    fn test_filters_are_anded() {
        let stmt = select(["id"])
            .from("users")
            .filter_eq("status", "active")
            .filter_eq("u.status", "banned")
            .build();
        let compiled = compile(&stmt).unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT id FROM users WHERE status = $1 AND u.status = $2"
        );
        assert_eq!(
            compiled.positions,
            vec!["status_1".to_string(), "status_2".to_string()]
        );
    }

    #[test]
    fn test_or_inside_and_is_parenthesized() {
        let stmt = select(Vec::<&str>::new())
            .from("t")
            .filter(col("a").eq(lit(1)).or(col("b").eq(lit(2))))
            .filter(col("c").is_not_null())
            .build();
        assert_eq!(
            compile_literal(&stmt).unwrap(),
            "SELECT * FROM t WHERE (a = 1 OR b = 2) AND c IS NOT NULL"
        );
    }

    #[test]
    fn test_not_and_between() {
        let stmt = select(["id"])
            .from("t")
            .filter(col("n").between(lit(1), lit(9)).not())
            .build();
        assert_eq!(
            compile_literal(&stmt).unwrap(),
            "SELECT id FROM t WHERE NOT (n BETWEEN 1 AND 9)"
        );
    }

    #[test]
    fn test_insert_with_unbound_params_for_batches() {
        let stmt = insert("users")
            .param("email", "email")
            .param("name", "name")
            .build();
        assert_eq!(
            compile_without_params(&stmt).unwrap(),
            "INSERT INTO users (email, name) VALUES ($1, $2)"
        );
    }

    #[test]
    fn test_insert_default_values() {
        let stmt = insert("counters").returning(["id"]).build();
        assert_eq!(
            compile(&stmt).unwrap().sql,
            "INSERT INTO counters DEFAULT VALUES RETURNING id"
        );
    }

    #[test]
    fn test_insert_from_select() {
        let stmt = insert("archive")
            .from_query(["id"], select(["id"]).from("users").filter(col("old").eq(lit(true))))
            .build();
        assert_eq!(
            compile(&stmt).unwrap().sql,
            "INSERT INTO archive (id) SELECT id FROM users WHERE old = TRUE"
        );
    }

    #[test]
    fn test_subquery_values_stay_with_subquery() {
        let paid = select(["user_id"]).from("orders").filter_eq("status", "paid");
        let stmt = select(["id"])
            .from("users")
            .filter_eq("status", "active")
            .filter(col("id").in_query(paid))
            .build();

        let compiled = compile(&stmt).unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT id FROM users WHERE status = $1 AND id IN \
             (SELECT user_id FROM orders WHERE status = $2)"
        );
        assert_eq!(
            compiled.params,
            vec![Value::Text("active".into()), Value::Text("paid".into())]
        );
    }

    #[test]
    fn test_scoped_subquery_in_from_and_exists() {
        let recent = select(["user_id"])
            .from("logins")
            .filter(col("at").gt(param("since")))
            .bind("since", 10);
        let banned = select(Vec::<&str>::new())
            .from("bans")
            .filter(col("bans.user_id").eq(col("r.user_id")))
            .filter_eq("bans.kind", "hard");
        let stmt = select(["r.user_id"])
            .from_query(recent, "r")
            .filter(exists(banned.build()).not())
            .filter_eq("kind", "soft")
            .build();

        assert_eq!(
            compile_literal(&stmt).unwrap(),
            "SELECT r.user_id FROM (SELECT user_id FROM logins WHERE at > 10) AS r \
             WHERE NOT (EXISTS (SELECT * FROM bans WHERE bans.user_id = r.user_id \
             AND bans.kind = 'hard')) AND kind = 'soft'"
        );
    }

    #[test]
    fn test_scoped_query_round_trips_through_json() {
        let inner = select(["id"]).from("t").filter_eq("a", 1i64).into_query();
        assert!(matches!(inner, Query::Scoped(_)));
        assert_eq!(inner.kind(), "select");
        let json = serde_json::to_value(&inner).unwrap();
        let back: Query = serde_json::from_value(json).unwrap();
        assert_eq!(back, inner);

        let bare = select(["id"]).from("t").into_query();
        assert!(matches!(bare, Query::Select(_)));
    }

    #[test]
    fn test_delete_using_returning_all() {
        let stmt = delete("orders")
            .using("users")
            .filter(col("orders.user_id").eq(col("users.id")))
            .filter_eq("users.name", "bob")
            .returning(["orders.*"])
            .build();
        assert_eq!(
            compile_literal(&stmt).unwrap(),
            "DELETE FROM orders USING users WHERE orders.user_id = users.id \
             AND users.name = 'bob' RETURNING orders.*"
        );
    }
}

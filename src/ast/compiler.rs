/// Statement → SQL compiler.
///
/// Walks a [`Statement`]'s AST once, in render order, and emits PostgreSQL
/// text. Bind parameters are handled according to the mode:
///
/// - parameterized: each occurrence becomes `$k` and its bound value is
///   appended to the parameter vector, so `$k` always binds `params[k-1]`;
/// - literal: each occurrence is replaced by an escaped SQL literal, for
///   logs and diagnostics only;
/// - placeholders: `$k` text only, for batch execution and prepare where
///   the caller supplies the parameter tuples.
///
/// A parameter referenced several times gets one placeholder and one vector
/// slot per occurrence.
use super::params::BindParams;
use super::statement::Statement;
use super::types::*;
use crate::error::CompilationError;
use crate::value::Value;

/// Parameterized SQL plus its ordered parameter vector.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub sql: String,
    pub params: Vec<Value>,
    /// Bind parameter name behind each placeholder, in placeholder order.
    pub positions: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Mode {
    Parameterized,
    Literal,
    Placeholders,
}

/// Compile into `$k` placeholders and the matching parameter vector.
pub fn compile(statement: &Statement) -> Result<CompiledQuery, CompilationError> {
    let mut compiler = Compiler::new(statement.params(), Mode::Parameterized);
    let sql = compiler.compile(statement.query())?;
    tracing::trace!(sql = %sql, params = compiler.values.len(), "compiled statement");
    Ok(CompiledQuery {
        sql,
        params: compiler.values,
        positions: compiler.positions,
    })
}

/// Compile with every bind parameter rendered as an inline literal.
pub fn compile_literal(statement: &Statement) -> Result<String, CompilationError> {
    Compiler::new(statement.params(), Mode::Literal).compile(statement.query())
}

/// Compile into placeholder SQL without resolving bound values.
pub fn compile_without_params(statement: &Statement) -> Result<String, CompilationError> {
    Compiler::new(statement.params(), Mode::Placeholders).compile(statement.query())
}

/// Render a value as a PostgreSQL literal.
///
/// Returns `None` for values with no literal form (`bytea` and undecoded
/// values), or arrays containing them.
pub fn render_literal(value: &Value) -> Option<String> {
    let rendered = match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Int16(i) => i.to_string(),
        Value::Int32(i) => i.to_string(),
        Value::Int64(i) => i.to_string(),
        Value::Float32(f) => render_float(f64::from(*f), "float4"),
        Value::Float64(f) => render_float(*f, "float8"),
        Value::Numeric(d) => d.to_string(),
        Value::Text(s) => quote(s),
        Value::Date(d) => quote(&d.to_string()),
        Value::Time(t) => quote(&t.to_string()),
        Value::DateTime(dt) => quote(&dt.to_string()),
        Value::TimestampTz(dt) => quote(&dt.to_rfc3339()),
        Value::Uuid(u) => quote(&u.to_string()),
        Value::Json(j) => quote(&j.to_string()),
        Value::Array(items) if items.is_empty() => "'{}'".to_string(),
        Value::Array(items) => {
            let parts = items
                .iter()
                .map(render_literal)
                .collect::<Option<Vec<String>>>()?;
            format!("ARRAY[{}]", parts.join(", "))
        }
        Value::Bytes(_) | Value::Unknown(_) => return None,
    };
    Some(rendered)
}

fn render_float(f: f64, ty: &str) -> String {
    if f.is_nan() {
        format!("'NaN'::{}", ty)
    } else if f.is_infinite() {
        let sign = if f > 0.0 { "" } else { "-" };
        format!("'{}Infinity'::{}", sign, ty)
    } else {
        format!("{:?}", f)
    }
}

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

struct Compiler<'p> {
    params: &'p BindParams,
    /// Bind tables of the scoped subqueries being compiled, innermost last.
    scopes: Vec<BindParams>,
    mode: Mode,
    positions: Vec<String>,
    values: Vec<Value>,
}

type Sql = Result<String, CompilationError>;

impl<'p> Compiler<'p> {
    fn new(params: &'p BindParams, mode: Mode) -> Self {
        Self {
            params,
            scopes: Vec::new(),
            mode,
            positions: Vec::new(),
            values: Vec::new(),
        }
    }

    fn compile(&mut self, query: &Query) -> Sql {
        match query {
            Query::Select(s) => self.compile_select(s),
            Query::Insert(i) => self.compile_insert(i),
            Query::Update(u) => self.compile_update(u),
            Query::Delete(d) => self.compile_delete(d),
            Query::Scoped(scoped) => {
                self.scopes.push(scoped.params.clone());
                let sql = self.compile(&scoped.query);
                self.scopes.pop();
                sql
            }
        }
    }

    fn lookup(&self, name: &str) -> Option<&Value> {
        self.scopes
            .iter()
            .rev()
            .find_map(|params| params.get(name))
            .or_else(|| self.params.get(name))
    }

    fn bind(&mut self, name: &str) -> Sql {
        if self.mode == Mode::Placeholders {
            self.positions.push(name.to_string());
            return Ok(format!("${}", self.positions.len()));
        }

        let value = self
            .lookup(name)
            .cloned()
            .ok_or_else(|| CompilationError::MissingParameter {
                name: name.to_string(),
            })?;

        match self.mode {
            Mode::Literal => {
                render_literal(&value).ok_or_else(|| CompilationError::UnrenderableLiteral {
                    name: name.to_string(),
                    kind: value.kind(),
                })
            }
            _ => {
                self.positions.push(name.to_string());
                self.values.push(value);
                Ok(format!("${}", self.positions.len()))
            }
        }
    }

    fn compile_select(&mut self, select: &SelectQuery) -> Sql {
        let mut parts = Vec::new();

        // SELECT [DISTINCT]
        let mut select_clause = String::from("SELECT ");
        if select.distinct {
            select_clause.push_str("DISTINCT ");
        }

        if select.projections.is_empty() {
            select_clause.push('*');
        } else {
            select_clause.push_str(&self.compile_select_items(&select.projections)?);
        }
        parts.push(select_clause);

        // FROM
        if !select.from.is_empty() {
            parts.push(format!("FROM {}", self.compile_table_refs(&select.from)?));
        }

        // JOINs
        for join in &select.joins {
            parts.push(self.compile_join(join)?);
        }

        // WHERE
        if let Some(ref filter) = select.filter {
            parts.push(format!("WHERE {}", self.compile_expr(filter)?));
        }

        // GROUP BY
        if !select.group_by.is_empty() {
            parts.push(format!("GROUP BY {}", self.compile_exprs(&select.group_by)?));
        }

        // HAVING
        if let Some(ref having) = select.having {
            parts.push(format!("HAVING {}", self.compile_expr(having)?));
        }

        // ORDER BY
        if !select.order_by.is_empty() {
            let orders = select
                .order_by
                .iter()
                .map(|o| self.compile_order_by(o))
                .collect::<Result<Vec<_>, _>>()?;
            parts.push(format!("ORDER BY {}", orders.join(", ")));
        }

        // LIMIT
        if let Some(ref limit) = select.limit {
            parts.push(format!("LIMIT {}", self.compile_expr(limit)?));
        }

        // OFFSET
        if let Some(ref offset) = select.offset {
            parts.push(format!("OFFSET {}", self.compile_expr(offset)?));
        }

        if let Some(lock) = select.locking {
            parts.push(
                match lock {
                    LockMode::Update => "FOR UPDATE",
                    LockMode::NoKeyUpdate => "FOR NO KEY UPDATE",
                    LockMode::Share => "FOR SHARE",
                    LockMode::KeyShare => "FOR KEY SHARE",
                }
                .to_string(),
            );
        }

        Ok(parts.join(" "))
    }

    fn compile_select_items(&mut self, items: &[SelectItem]) -> Sql {
        let items = items
            .iter()
            .map(|item| self.compile_select_item(item))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items.join(", "))
    }

    fn compile_select_item(&mut self, item: &SelectItem) -> Sql {
        Ok(match item {
            SelectItem::Wildcard => "*".to_string(),
            SelectItem::QualifiedWildcard(table) => format!("{}.*", table),
            SelectItem::Expression { expr, alias } => {
                let expr_str = self.compile_expr(expr)?;
                match alias {
                    Some(a) => format!("{} AS {}", expr_str, a),
                    None => expr_str,
                }
            }
        })
    }

    fn compile_table_refs(&mut self, tables: &[TableRef]) -> Sql {
        let tables = tables
            .iter()
            .map(|t| self.compile_table_ref(t))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tables.join(", "))
    }

    fn compile_table_ref(&mut self, table: &TableRef) -> Sql {
        Ok(match table {
            TableRef::Table {
                schema,
                name,
                alias,
            } => {
                let mut s = match schema {
                    Some(sc) => format!("{}.{}", sc, name),
                    None => name.clone(),
                };
                if let Some(a) = alias {
                    s.push_str(&format!(" AS {}", a));
                }
                s
            }
            TableRef::Subquery { query, alias } => {
                format!("({}) AS {}", self.compile(query)?, alias)
            }
        })
    }

    fn compile_join(&mut self, join: &Join) -> Sql {
        let type_str = match join.join_type {
            JoinType::Inner => "JOIN",
            JoinType::Left => "LEFT JOIN",
            JoinType::Right => "RIGHT JOIN",
            JoinType::Full => "FULL JOIN",
            JoinType::Cross => "CROSS JOIN",
        };

        let table_str = self.compile_table_ref(&join.table)?;

        let condition_str = match &join.condition {
            Some(JoinCondition::On(expr)) => format!(" ON {}", self.compile_expr(expr)?),
            Some(JoinCondition::Using(cols)) => format!(" USING ({})", cols.join(", ")),
            None => String::new(),
        };

        Ok(format!("{} {}{}", type_str, table_str, condition_str))
    }

    fn compile_exprs(&mut self, exprs: &[Expression]) -> Sql {
        let items = exprs
            .iter()
            .map(|e| self.compile_expr(e))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items.join(", "))
    }

    fn compile_expr(&mut self, expr: &Expression) -> Sql {
        Ok(match expr {
            Expression::Column { table, name } => match table {
                Some(t) => format!("{}.{}", t, name),
                None => name.clone(),
            },
            Expression::Literal(lit) => compile_literal_node(lit),
            Expression::Param(name) => self.bind(name)?,
            Expression::Excluded(column) => format!("EXCLUDED.{}", column),
            Expression::BinaryOp { left, op, right } => {
                let prec = binary_precedence(*op);
                let chained = matches!(
                    op,
                    BinaryOperator::And | BinaryOperator::Or | BinaryOperator::Concat
                );
                let comparison = prec == PREC_COMPARISON || prec == PREC_MATCH;
                let left = self.compile_operand(left, prec, comparison)?;
                match op {
                    BinaryOperator::EqAny => {
                        format!("{} = ANY({})", left, self.compile_expr(right)?)
                    }
                    op => {
                        let right = self.compile_operand(right, prec, !chained)?;
                        format!("{} {} {}", left, binary_op_str(*op), right)
                    }
                }
            }
            Expression::UnaryOp { op, expr } => {
                let op_str = match op {
                    UnaryOperator::Not => "NOT",
                    UnaryOperator::Minus => "-",
                    UnaryOperator::Plus => "+",
                };
                let prec = match op {
                    UnaryOperator::Not => PREC_NOT,
                    UnaryOperator::Minus | UnaryOperator::Plus => PREC_SIGN,
                };
                format!("{} {}", op_str, self.compile_operand(expr, prec, false)?)
            }
            Expression::Function {
                name,
                args,
                distinct,
            } => {
                let distinct_str = if *distinct { "DISTINCT " } else { "" };
                format!("{}({}{})", name, distinct_str, self.compile_exprs(args)?)
            }
            Expression::Case {
                operand,
                when_clauses,
                else_clause,
            } => {
                let mut s = String::from("CASE");
                if let Some(op) = operand {
                    s.push_str(&format!(" {}", self.compile_expr(op)?));
                }
                for (when, then) in when_clauses {
                    let when = self.compile_expr(when)?;
                    let then = self.compile_expr(then)?;
                    s.push_str(&format!(" WHEN {} THEN {}", when, then));
                }
                if let Some(else_expr) = else_clause {
                    s.push_str(&format!(" ELSE {}", self.compile_expr(else_expr)?));
                }
                s.push_str(" END");
                s
            }
            Expression::Subquery(q) => format!("({})", self.compile(q)?),
            Expression::Exists(q) => format!("EXISTS ({})", self.compile(q)?),
            Expression::InList {
                expr,
                list,
                negated,
            } => {
                let not_str = if *negated { "NOT " } else { "" };
                let expr = self.compile_operand(expr, PREC_MATCH, true)?;
                format!("{} {}IN ({})", expr, not_str, self.compile_exprs(list)?)
            }
            Expression::InSubquery {
                expr,
                subquery,
                negated,
            } => {
                let not_str = if *negated { "NOT " } else { "" };
                let expr = self.compile_operand(expr, PREC_MATCH, true)?;
                format!("{} {}IN ({})", expr, not_str, self.compile(subquery)?)
            }
            Expression::Between {
                expr,
                low,
                high,
                negated,
            } => {
                let not_str = if *negated { "NOT " } else { "" };
                let expr = self.compile_operand(expr, PREC_MATCH, true)?;
                let low = self.compile_operand(low, PREC_MATCH, true)?;
                let high = self.compile_operand(high, PREC_MATCH, true)?;
                format!("{} {}BETWEEN {} AND {}", expr, not_str, low, high)
            }
            Expression::IsNull { expr, negated } => {
                let expr = self.compile_operand(expr, PREC_IS, true)?;
                if *negated {
                    format!("{} IS NOT NULL", expr)
                } else {
                    format!("{} IS NULL", expr)
                }
            }
            Expression::Wildcard => "*".to_string(),
            Expression::Array(elems) => format!("ARRAY[{}]", self.compile_exprs(elems)?),
            Expression::JsonAccess {
                expr,
                path,
                as_text,
            } => {
                let op = if *as_text { "->>" } else { "->" };
                let expr = self.compile_operand(expr, PREC_OTHER, false)?;
                format!("{}{}{}", expr, op, self.compile_operand(path, PREC_OTHER, true)?)
            }
            Expression::TypeCast { expr, data_type } => {
                format!("{}::{}", self.compile_operand(expr, PREC_CAST, false)?, data_type)
            }
            Expression::Nested(expr) => format!("({})", self.compile_expr(expr)?),
        })
    }

    /// Compile an operand of an operator with precedence `parent`,
    /// parenthesizing it when it would otherwise bind looser. With `strict`
    /// an operand of equal precedence is parenthesized too.
    fn compile_operand(&mut self, expr: &Expression, parent: u8, strict: bool) -> Sql {
        let sql = self.compile_expr(expr)?;
        Ok(match precedence(expr) {
            Some(prec) if prec < parent || (strict && prec == parent) => format!("({})", sql),
            _ => sql,
        })
    }

    fn compile_order_by(&mut self, order: &OrderByExpr) -> Sql {
        let mut s = self.compile_expr(&order.expr)?;
        match order.asc {
            Some(true) => s.push_str(" ASC"),
            Some(false) => s.push_str(" DESC"),
            None => {}
        }
        match order.nulls_first {
            Some(true) => s.push_str(" NULLS FIRST"),
            Some(false) => s.push_str(" NULLS LAST"),
            None => {}
        }
        Ok(s)
    }

    fn compile_assignments(&mut self, assignments: &[Assignment]) -> Sql {
        let sets = assignments
            .iter()
            .map(|a| -> Sql { Ok(format!("{} = {}", a.column, self.compile_expr(&a.value)?)) })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sets.join(", "))
    }

    fn compile_returning(&mut self, returning: &[SelectItem]) -> Sql {
        if returning.is_empty() {
            return Ok(String::new());
        }
        Ok(format!(" RETURNING {}", self.compile_select_items(returning)?))
    }

    fn compile_insert(&mut self, insert: &InsertQuery) -> Sql {
        let table = self.compile_table_ref(&insert.table)?;
        let columns = if insert.columns.is_empty() {
            String::new()
        } else {
            format!(" ({})", insert.columns.join(", "))
        };

        let source = match &insert.source {
            InsertSource::Values(rows) => {
                let row_strs = rows
                    .iter()
                    .map(|row| -> Sql { Ok(format!("({})", self.compile_exprs(row)?)) })
                    .collect::<Result<Vec<_>, _>>()?;
                format!("VALUES {}", row_strs.join(", "))
            }
            InsertSource::Query(q) => self.compile(q)?,
            InsertSource::DefaultValues => "DEFAULT VALUES".to_string(),
        };

        let conflict = match &insert.on_conflict {
            Some(on_conflict) => self.compile_on_conflict(on_conflict)?,
            None => String::new(),
        };

        let returning = self.compile_returning(&insert.returning)?;

        Ok(format!(
            "INSERT INTO {}{} {}{}{}",
            table, columns, source, conflict, returning
        ))
    }

    fn compile_on_conflict(&mut self, on_conflict: &OnConflict) -> Sql {
        let target = match &on_conflict.target {
            ConflictTarget::Any => String::new(),
            ConflictTarget::Columns(cols) => format!(" ({})", cols.join(", ")),
            ConflictTarget::Constraint(name) => format!(" ON CONSTRAINT {}", name),
        };

        let action = match &on_conflict.action {
            ConflictAction::DoNothing => "DO NOTHING".to_string(),
            ConflictAction::DoUpdate {
                assignments,
                filter,
            } => {
                let mut s = format!("DO UPDATE SET {}", self.compile_assignments(assignments)?);
                if let Some(f) = filter {
                    s.push_str(&format!(" WHERE {}", self.compile_expr(f)?));
                }
                s
            }
        };

        Ok(format!(" ON CONFLICT{} {}", target, action))
    }

    fn compile_update(&mut self, update: &UpdateQuery) -> Sql {
        let table = self.compile_table_ref(&update.table)?;
        let sets = self.compile_assignments(&update.assignments)?;

        let from = if update.from.is_empty() {
            String::new()
        } else {
            format!(" FROM {}", self.compile_table_refs(&update.from)?)
        };

        let filter = match &update.filter {
            Some(f) => format!(" WHERE {}", self.compile_expr(f)?),
            None => String::new(),
        };

        let returning = self.compile_returning(&update.returning)?;

        Ok(format!(
            "UPDATE {} SET {}{}{}{}",
            table, sets, from, filter, returning
        ))
    }

    fn compile_delete(&mut self, delete: &DeleteQuery) -> Sql {
        let table = self.compile_table_ref(&delete.table)?;

        let using = if delete.using.is_empty() {
            String::new()
        } else {
            format!(" USING {}", self.compile_table_refs(&delete.using)?)
        };

        let filter = match &delete.filter {
            Some(f) => format!(" WHERE {}", self.compile_expr(f)?),
            None => String::new(),
        };

        let returning = self.compile_returning(&delete.returning)?;

        Ok(format!("DELETE FROM {}{}{}{}", table, using, filter, returning))
    }
}

// PostgreSQL operator precedence, loosest first.
const PREC_OR: u8 = 1;
const PREC_AND: u8 = 2;
const PREC_NOT: u8 = 3;
const PREC_IS: u8 = 4;
const PREC_COMPARISON: u8 = 5;
const PREC_MATCH: u8 = 6;
const PREC_OTHER: u8 = 7;
const PREC_ADDITIVE: u8 = 8;
const PREC_MULTIPLICATIVE: u8 = 9;
const PREC_SIGN: u8 = 10;
const PREC_CAST: u8 = 11;

fn binary_precedence(op: BinaryOperator) -> u8 {
    match op {
        BinaryOperator::Or => PREC_OR,
        BinaryOperator::And => PREC_AND,
        BinaryOperator::Eq
        | BinaryOperator::NotEq
        | BinaryOperator::Lt
        | BinaryOperator::LtEq
        | BinaryOperator::Gt
        | BinaryOperator::GtEq
        | BinaryOperator::EqAny => PREC_COMPARISON,
        BinaryOperator::Like
        | BinaryOperator::ILike
        | BinaryOperator::NotLike
        | BinaryOperator::NotILike => PREC_MATCH,
        BinaryOperator::Concat | BinaryOperator::Contains => PREC_OTHER,
        BinaryOperator::Plus | BinaryOperator::Minus => PREC_ADDITIVE,
        BinaryOperator::Multiply | BinaryOperator::Divide | BinaryOperator::Modulo => {
            PREC_MULTIPLICATIVE
        }
    }
}

/// Precedence of an expression rendered around an operator. `None` for
/// expressions that are self-delimiting.
fn precedence(expr: &Expression) -> Option<u8> {
    match expr {
        Expression::BinaryOp { op, .. } => Some(binary_precedence(*op)),
        Expression::UnaryOp {
            op: UnaryOperator::Not,
            ..
        } => Some(PREC_NOT),
        Expression::UnaryOp { .. } => Some(PREC_SIGN),
        Expression::IsNull { .. } => Some(PREC_IS),
        Expression::Between { .. } | Expression::InList { .. } | Expression::InSubquery { .. } => {
            Some(PREC_MATCH)
        }
        Expression::JsonAccess { .. } => Some(PREC_OTHER),
        Expression::TypeCast { .. } => Some(PREC_CAST),
        _ => None,
    }
}

fn binary_op_str(op: BinaryOperator) -> &'static str {
    match op {
        BinaryOperator::Eq | BinaryOperator::EqAny => "=",
        BinaryOperator::NotEq => "<>",
        BinaryOperator::Lt => "<",
        BinaryOperator::LtEq => "<=",
        BinaryOperator::Gt => ">",
        BinaryOperator::GtEq => ">=",
        BinaryOperator::And => "AND",
        BinaryOperator::Or => "OR",
        BinaryOperator::Plus => "+",
        BinaryOperator::Minus => "-",
        BinaryOperator::Multiply => "*",
        BinaryOperator::Divide => "/",
        BinaryOperator::Modulo => "%",
        BinaryOperator::Like => "LIKE",
        BinaryOperator::ILike => "ILIKE",
        BinaryOperator::NotLike => "NOT LIKE",
        BinaryOperator::NotILike => "NOT ILIKE",
        BinaryOperator::Concat => "||",
        BinaryOperator::Contains => "@>",
    }
}

fn compile_literal_node(lit: &Literal) -> String {
    match lit {
        Literal::Null => "NULL".to_string(),
        Literal::Boolean(b) => {
            if *b {
                "TRUE".to_string()
            } else {
                "FALSE".to_string()
            }
        }
        Literal::Integer(i) => i.to_string(),
        Literal::Float(f) => format!("{}", f),
        Literal::String(s) => quote(s),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builder::{col, delete, insert, lit, param, select, update};

    fn users_by_id() -> Statement {
        select(["id", "name"])
            .from("users")
            .filter(col("id").eq(param("p1")))
            .bind("p1", 7)
            .build()
    }

    /// Substitute each `$k` with the literal rendering of `params[k-1]`.
    fn substitute(compiled: &CompiledQuery) -> String {
        let mut sql = compiled.sql.clone();
        // Highest index first so `$1` never clobbers the prefix of `$10`.
        for (i, value) in compiled.params.iter().enumerate().rev() {
            let literal = render_literal(value).expect("renderable");
            sql = sql.replace(&format!("${}", i + 1), &literal);
        }
        sql
    }

    #[test]
    fn test_parameterized_select() {
        let compiled = compile(&users_by_id()).unwrap();
        assert_eq!(compiled.sql, "SELECT id, name FROM users WHERE id = $1");
        assert_eq!(compiled.params, vec![Value::Int32(7)]);
        assert_eq!(compiled.positions, vec!["p1".to_string()]);
    }

    #[test]
    fn test_literal_select() {
        assert_eq!(
            compile_literal(&users_by_id()).unwrap(),
            "SELECT id, name FROM users WHERE id = 7"
        );
    }

    #[test]
    fn test_compile_is_deterministic() {
        let stmt = select(["id"])
            .from("users")
            .filter(col("a").eq(param("x")).and(col("b").gt(param("y"))))
            .bind("y", 2)
            .bind("x", 1)
            .build();
        let first = compile(&stmt).unwrap();
        let second = compile(&stmt).unwrap();
        assert_eq!(first, second);
        // Render order, not bind order, decides positions.
        assert_eq!(first.positions, vec!["x".to_string(), "y".to_string()]);
    }

    #[test]
    fn test_repeated_param_gets_slot_per_occurrence() {
        let stmt = select(["id"])
            .from("kb")
            .filter(col("question").ilike(param("q")).or(col("answer").ilike(param("q"))))
            .bind("q", "%rust%")
            .build();
        let compiled = compile(&stmt).unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT id FROM kb WHERE question ILIKE $1 OR answer ILIKE $2"
        );
        assert_eq!(compiled.params.len(), 2);
        assert_eq!(compiled.params[0], compiled.params[1]);
    }

    #[test]
    fn test_substitution_matches_literal_mode() {
        let stmt = select(["id", "name"])
            .from("users")
            .filter(
                col("name")
                    .eq(param("name"))
                    .and(col("score").gte(param("min")))
                    .and(col("id").ne(param("name_len"))),
            )
            .order_by_desc("id")
            .limit_param("lim")
            .bind("name", "O'Brien")
            .bind("min", 1.5)
            .bind("name_len", 7i64)
            .bind("lim", 10)
            .build();
        let compiled = compile(&stmt).unwrap();
        assert_eq!(compiled.params.len(), 4);
        assert_eq!(substitute(&compiled), compile_literal(&stmt).unwrap());
    }

    #[test]
    fn test_missing_param_is_error() {
        let stmt = select(["id"])
            .from("users")
            .filter(col("id").eq(param("nope")))
            .build();
        assert_eq!(
            compile(&stmt).unwrap_err(),
            CompilationError::MissingParameter {
                name: "nope".into()
            }
        );
        assert!(compile_literal(&stmt).is_err());
        assert_eq!(
            compile_without_params(&stmt).unwrap(),
            "SELECT id FROM users WHERE id = $1"
        );
    }

    #[test]
    fn test_bytes_have_no_literal_form() {
        let stmt = update("files")
            .set("body", vec![0xde_u8, 0xad])
            .filter(col("id").eq(param("id")))
            .bind("id", 1)
            .build();
        assert!(compile(&stmt).is_ok());
        assert_eq!(
            compile_literal(&stmt).unwrap_err(),
            CompilationError::UnrenderableLiteral {
                name: "body_1".into(),
                kind: "bytea"
            }
        );
    }

    #[test]
    fn test_insert_on_conflict_returning() {
        let stmt = insert("users")
            .value("email", "a@b.c")
            .value("name", "Ann")
            .on_conflict_do_update(["email"], ["name"])
            .returning(["id"])
            .build();
        let compiled = compile(&stmt).unwrap();
        assert_eq!(
            compiled.sql,
            "INSERT INTO users (email, name) VALUES ($1, $2) \
             ON CONFLICT (email) DO UPDATE SET name = EXCLUDED.name RETURNING id"
        );
        assert_eq!(
            compiled.params,
            vec![Value::Text("a@b.c".into()), Value::Text("Ann".into())]
        );
    }

    #[test]
    fn test_insert_do_nothing() {
        let stmt = insert("tags").value("name", "rust").on_conflict_do_nothing().build();
        assert_eq!(
            compile_literal(&stmt).unwrap(),
            "INSERT INTO tags (name) VALUES ('rust') ON CONFLICT DO NOTHING"
        );
    }

    #[test]
    fn test_update_and_delete() {
        let stmt = update("users")
            .set("verified", true)
            .filter(col("id").eq(param("id")))
            .bind("id", 3)
            .returning(["id", "verified"])
            .build();
        assert_eq!(
            compile(&stmt).unwrap().sql,
            "UPDATE users SET verified = $1 WHERE id = $2 RETURNING id, verified"
        );

        let stmt = delete("sessions")
            .filter(col("expired_at").lt(crate::ast::builder::func("now", Vec::new())))
            .build();
        assert_eq!(
            compile(&stmt).unwrap().sql,
            "DELETE FROM sessions WHERE expired_at < now()"
        );
    }

    #[test]
    fn test_join_group_having() {
        let stmt = select(["u.name"])
            .column_as(crate::ast::builder::func("count", [Expression::Wildcard]), "orders")
            .from_as("users", "u")
            .left_join_as("orders", "o", col("u.id").eq(col("o.user_id")))
            .group_by(col("u.name"))
            .having(crate::ast::builder::func("count", [Expression::Wildcard]).gt(param("n")))
            .bind("n", 5)
            .build();
        assert_eq!(
            compile_literal(&stmt).unwrap(),
            "SELECT u.name, count(*) AS orders FROM users AS u \
             LEFT JOIN orders AS o ON u.id = o.user_id GROUP BY u.name HAVING count(*) > 5"
        );
    }

    #[test]
    fn test_in_list_and_any() {
        let stmt = select(["id"])
            .from("posts")
            .filter(col("id").eq_any(param("ids")))
            .bind("ids", Value::Array(vec![Value::Int32(1), Value::Int32(2)]))
            .build();
        assert_eq!(
            compile_literal(&stmt).unwrap(),
            "SELECT id FROM posts WHERE id = ANY(ARRAY[1, 2])"
        );
    }

    fn bin(left: Expression, op: BinaryOperator, right: Expression) -> Expression {
        Expression::BinaryOp {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    fn where_sql(filter: Expression) -> String {
        let stmt = select(["id"]).from("t").filter(filter).build();
        compile_literal(&stmt).unwrap()
    }

    #[test]
    fn test_looser_operand_is_parenthesized() {
        let a = col("a").eq(lit(1));
        let b = col("b").eq(lit(2));
        let c = col("c").eq(lit(3));

        assert_eq!(
            where_sql(bin(bin(a.clone(), BinaryOperator::Or, b.clone()), BinaryOperator::And, c.clone())),
            "SELECT id FROM t WHERE (a = 1 OR b = 2) AND c = 3"
        );
        assert_eq!(
            where_sql(bin(c.clone(), BinaryOperator::And, bin(a.clone(), BinaryOperator::Or, b.clone()))),
            "SELECT id FROM t WHERE c = 3 AND (a = 1 OR b = 2)"
        );
        assert_eq!(
            where_sql(col("flag").eq(a.clone().or(b.clone()))),
            "SELECT id FROM t WHERE flag = (a = 1 OR b = 2)"
        );
        assert_eq!(
            where_sql(bin(a.clone(), BinaryOperator::Or, bin(b, BinaryOperator::And, c))),
            "SELECT id FROM t WHERE a = 1 OR b = 2 AND c = 3"
        );
    }

    #[test]
    fn test_same_precedence_operands() {
        let diff = bin(
            col("a"),
            BinaryOperator::Minus,
            bin(col("b"), BinaryOperator::Minus, col("c")),
        );
        assert_eq!(where_sql(diff.gt(lit(0))), "SELECT id FROM t WHERE a - (b - c) > 0");

        let left_assoc = bin(
            bin(col("a"), BinaryOperator::Minus, col("b")),
            BinaryOperator::Minus,
            col("c"),
        );
        assert_eq!(where_sql(left_assoc.gt(lit(0))), "SELECT id FROM t WHERE a - b - c > 0");

        let sum = bin(col("a"), BinaryOperator::Plus, col("b"));
        assert_eq!(
            where_sql(bin(sum, BinaryOperator::Multiply, lit(2)).lt(lit(10))),
            "SELECT id FROM t WHERE (a + b) * 2 < 10"
        );

        assert_eq!(
            where_sql(col("a").eq(col("b")).eq(lit(true))),
            "SELECT id FROM t WHERE (a = b) = TRUE"
        );
        assert_eq!(
            where_sql(col("a").eq(lit(1)).and(col("b").eq(lit(2))).and(col("c").eq(lit(3)))),
            "SELECT id FROM t WHERE a = 1 AND b = 2 AND c = 3"
        );
    }

    #[test]
    fn test_predicate_operands_are_parenthesized() {
        let either = col("a").eq(lit(1)).or(col("b").eq(lit(2)));
        assert_eq!(
            where_sql(either.clone().is_null()),
            "SELECT id FROM t WHERE (a = 1 OR b = 2) IS NULL"
        );
        assert_eq!(
            where_sql(Expression::UnaryOp {
                op: UnaryOperator::Not,
                expr: Box::new(either),
            }),
            "SELECT id FROM t WHERE NOT (a = 1 OR b = 2)"
        );
        let sum = bin(col("a"), BinaryOperator::Plus, col("b"));
        assert_eq!(
            where_sql(sum.cast("text").eq(lit("3"))),
            "SELECT id FROM t WHERE (a + b)::text = '3'"
        );
    }

    #[test]
    fn test_render_literal() {
        assert_eq!(render_literal(&Value::Null).unwrap(), "NULL");
        assert_eq!(render_literal(&Value::Bool(false)).unwrap(), "false");
        assert_eq!(render_literal(&Value::Text("it's".into())).unwrap(), "'it''s'");
        assert_eq!(render_literal(&Value::Float64(2.0)).unwrap(), "2.0");
        assert_eq!(
            render_literal(&Value::Float64(f64::NEG_INFINITY)).unwrap(),
            "'-Infinity'::float8"
        );
        assert_eq!(render_literal(&Value::Array(vec![])).unwrap(), "'{}'");
        assert_eq!(
            render_literal(&Value::Json(serde_json::json!({"a": "b"}))).unwrap(),
            r#"'{"a":"b"}'"#
        );
        assert_eq!(
            render_literal(&Value::Numeric(rust_decimal::Decimal::new(1050, 2))).unwrap(),
            "10.50"
        );
        assert_eq!(
            render_literal(&Value::Uuid(uuid::Uuid::nil())).unwrap(),
            "'00000000-0000-0000-0000-000000000000'"
        );
        assert!(render_literal(&Value::Bytes(vec![1])).is_none());
        assert!(render_literal(&Value::Array(vec![Value::Bytes(vec![])])).is_none());
    }

    #[test]
    fn test_subquery_params_follow_render_order() {
        let inner = select(["user_id"])
            .from("orders")
            .filter(col("total").gt(param("total")))
            .into_query();
        let stmt = select(["id"])
            .from("users")
            .filter(col("active").eq(param("active")).and(col("id").in_query(inner)))
            .bind("active", true)
            .bind("total", 100)
            .build();
        let compiled = compile(&stmt).unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT id FROM users WHERE active = $1 AND id IN (SELECT user_id FROM orders WHERE total > $2)"
        );
        assert_eq!(compiled.params, vec![Value::Bool(true), Value::Int32(100)]);
    }

    #[test]
    fn test_for_update() {
        let stmt = select(["id"])
            .from("jobs")
            .lock(LockMode::Update)
            .limit(1)
            .build();
        assert_eq!(
            compile(&stmt).unwrap().sql,
            "SELECT id FROM jobs LIMIT 1 FOR UPDATE"
        );
    }
}

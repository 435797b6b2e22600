//! Benchmarks for the statement compiler and the row mapper.
//!
//! Run with: `cargo bench`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use pgfetch::ast::builder::{col, func, insert, param, select, update};
use pgfetch::ast::{compile, compile_literal, compile_without_params, Expression, Statement};
use pgfetch::mapper::{map_many, Model, Selector};
use pgfetch::{Record, Value};
use serde::Deserialize;

// ---------------------------------------------------------------------------
// Statements organized by complexity
// ---------------------------------------------------------------------------

fn simple_select() -> Statement {
    select(["id", "name", "email"])
        .from("users")
        .filter(col("id").eq(param("id")))
        .bind("id", 42)
        .build()
}

fn select_with_join() -> Statement {
    select(["u.name", "o.total", "o.created_at"])
        .from_as("users", "u")
        .join_as("orders", "o", col("u.id").eq(col("o.user_id")))
        .filter(col("o.total").gt(param("min_total")))
        .filter(col("u.status").eq(param("status")))
        .order_by_desc("o.created_at")
        .limit_param("limit")
        .bind("min_total", 100.0)
        .bind("status", "active")
        .bind("limit", 50)
        .build()
}

fn aggregation() -> Statement {
    select(["department"])
        .column_as(func("count", [Expression::Wildcard]), "emp_count")
        .column_as(func("avg", [col("salary")]), "avg_salary")
        .from("employees")
        .filter(col("hire_date").gt(param("since")))
        .group_by(col("department"))
        .having(func("count", [Expression::Wildcard]).gt(param("min_count")))
        .order_by_desc("avg_salary")
        .bind("since", "2020-01-01")
        .bind("min_count", 5)
        .build()
}

fn upsert() -> Statement {
    insert("users")
        .value("email", "john@example.com")
        .value("name", "John Doe")
        .value("age", 30)
        .on_conflict_do_update(["email"], ["name", "age"])
        .returning(["id"])
        .build()
}

fn wide_update(columns: usize) -> Statement {
    let mut builder = update("metrics");
    for i in 0..columns {
        builder = builder.set(&format!("c{}", i), i as i64);
    }
    builder.filter_eq("id", 1).build()
}

fn bench_compilation(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile");

    let cases = [
        ("simple_select", simple_select()),
        ("select_with_join", select_with_join()),
        ("aggregation", aggregation()),
        ("upsert", upsert()),
    ];

    for (name, stmt) in &cases {
        group.bench_with_input(BenchmarkId::new("parameterized", name), stmt, |b, stmt| {
            b.iter(|| compile(black_box(stmt)));
        });
        group.bench_with_input(BenchmarkId::new("literal", name), stmt, |b, stmt| {
            b.iter(|| compile_literal(black_box(stmt)));
        });
    }

    group.bench_function("without_params/upsert", |b| {
        let stmt = upsert();
        b.iter(|| compile_without_params(black_box(&stmt)));
    });

    group.finish();
}

fn bench_parameter_count(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile_params");

    for columns in [4, 32, 256] {
        let stmt = wide_update(columns);
        group.bench_with_input(BenchmarkId::from_parameter(columns), &stmt, |b, stmt| {
            b.iter(|| compile(black_box(stmt)));
        });
    }

    group.finish();
}

#[derive(Deserialize)]
#[allow(dead_code)]
struct User {
    id: i64,
    name: String,
    email: String,
}

impl Model for User {}

fn rows(n: usize) -> Vec<Record> {
    (0..n)
        .map(|i| {
            Record::from_pairs([
                ("id", Value::Int64(i as i64)),
                ("name", Value::Text(format!("user{}", i))),
                ("email", Value::Text(format!("user{}@example.com", i))),
            ])
        })
        .collect()
}

fn bench_mapping(c: &mut Criterion) {
    let mut group = c.benchmark_group("map_many");
    let input = rows(1000);

    group.bench_function("raw", |b| {
        b.iter(|| map_many(black_box(input.clone()), &Selector::raw()));
    });

    group.bench_function("model", |b| {
        let selector = Selector::<User>::model();
        b.iter(|| map_many(black_box(input.clone()), &selector));
    });

    group.bench_function("map_fn", |b| {
        let selector = Selector::map(|r: Record| r["id"].display());
        b.iter(|| map_many(black_box(input.clone()), &selector));
    });

    group.finish();
}

criterion_group!(benches, bench_compilation, bench_parameter_count, bench_mapping);
criterion_main!(benches);

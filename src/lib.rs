//! Compile structured PostgreSQL statements and map their rows into caller
//! types.
//!
//! ```ignore
//! use pgfetch::ast::builder::{col, param, select};
//! use pgfetch::{fetch_one, Database, DatabaseSettings, Selector};
//!
//! let mut db = Database::new(DatabaseSettings::load_default()?);
//! db.connect().await?;
//!
//! let stmt = select(["id", "name"])
//!     .from("users")
//!     .filter(col("id").eq(param("id")))
//!     .bind("id", 7)
//!     .build();
//! let user: Option<User> = fetch_one(&db, &stmt, &Selector::model(), None).await?;
//! ```
pub mod ast;
pub mod db;
pub mod error;
pub mod facade;
pub mod mapper;
pub mod record;
pub mod value;

#[cfg(test)]
pub(crate) mod testing;

pub use ast::{compile, compile_literal, compile_without_params, CompiledQuery, Statement};
pub use db::{
    CommandStatus, Connection, Database, DatabaseSettings, Executor, PreparedStatement,
    TransactionOptions,
};
pub use error::{CompilationError, Error, MultipleRowsError, Result};
pub use facade::{
    execute, execute_many, fetch, fetch_all, fetch_many, fetch_one, fetch_row, fetch_scalar,
    fetch_val, Target,
};
pub use mapper::{Model, ScalarSelector, Selector};
pub use record::Record;
pub use value::Value;

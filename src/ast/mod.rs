/// Structured statements and their compilation to SQL.
///
/// ```text
/// builder.rs / JSON
///       ↓
/// Statement = Query AST (types.rs) + BindParams (params.rs)
///       ↓
/// SQL Compiler (compiler.rs)
///       ↓
/// CompiledQuery { sql, params } → db::Executor
/// ```
pub mod builder;
pub mod compiler;
pub mod params;
pub mod statement;
pub mod types;

// Re-export key types for convenience
pub use compiler::{compile, compile_literal, compile_without_params, render_literal, CompiledQuery};
pub use params::BindParams;
pub use statement::Statement;
pub use types::*;

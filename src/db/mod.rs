mod config;
mod connection;
mod executor;
mod pool;
mod prepared;

pub use config::{DatabaseSettings, SslMode};
pub use connection::{Connection, TransactionOptions};
pub use executor::{BatchScope, BatchTarget, CommandStatus, CommandTag, Executor};
#[cfg(test)]
pub(crate) use executor::with_timeout;
pub use pool::{Database, PoolStatus};
pub use prepared::{prepare, PreparedStatement};

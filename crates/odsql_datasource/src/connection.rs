//! Datasource and connection traits.

use crate::error::DatasourceResult;
use crate::result::ResultSet;
use crate::value::{SqlValue, StatementParam};

/// A source of connections.
///
/// Datasources are shared across requests and must be `Send + Sync`.
/// Each call to [`Datasource::connection`] hands out a connection that the
/// caller owns until it is dropped; dropping it releases it.
///
/// # Implementors
///
/// - [`super::SqliteDatasource`] - A new SQLite connection per call
/// - [`super::PinnedDatasource`] - The same pinned connection on every call
pub trait Datasource: Send + Sync {
    /// Acquires a connection.
    ///
    /// # Errors
    ///
    /// Returns an error if no connection can be opened.
    fn connection(&self) -> DatasourceResult<Box<dyn Connection>>;
}

/// A single database connection.
///
/// Connections follow JDBC transaction semantics: while autocommit is on,
/// every statement commits on its own. With autocommit off, statements join
/// one transaction that ends with [`Connection::commit`] or
/// [`Connection::rollback`].
pub trait Connection: Send {
    /// Runs a query and buffers its rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the statement fails to prepare or execute.
    fn query(&mut self, sql: &str, params: &[StatementParam]) -> DatasourceResult<ResultSet>;

    /// Runs a data-modifying statement and returns the affected row count.
    ///
    /// # Errors
    ///
    /// Returns an error if the statement fails to prepare or execute.
    fn execute(&mut self, sql: &str, params: &[StatementParam]) -> DatasourceResult<u64>;

    /// Returns the key generated by the most recent insert, if any.
    fn last_generated_key(&mut self) -> DatasourceResult<Option<SqlValue>>;

    /// Enables or disables autocommit.
    ///
    /// Enabling autocommit while a transaction is open commits it.
    fn set_auto_commit(&mut self, auto_commit: bool) -> DatasourceResult<()>;

    /// Returns whether autocommit is on.
    fn auto_commit(&self) -> bool;

    /// Commits the open transaction, if any.
    fn commit(&mut self) -> DatasourceResult<()>;

    /// Rolls back the open transaction, if any.
    fn rollback(&mut self) -> DatasourceResult<()>;

    /// Returns the product name of the database behind this connection.
    fn product_name(&self) -> &str;
}

//! A datasource pinned to one connection.

use crate::connection::{Connection, Datasource};
use crate::error::DatasourceResult;
use crate::result::ResultSet;
use crate::value::{SqlValue, StatementParam};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::trace;

/// A datasource that hands out the same underlying connection every time.
///
/// Used to run a group of operations inside one transaction: each nested
/// operation acquires "a connection" as usual but receives a handle to the
/// pinned one. Handles ignore transaction control (`commit`, `rollback`,
/// `set_auto_commit`), so only the owner of the `PinnedDatasource` decides
/// how the transaction ends.
pub struct PinnedDatasource {
    shared: Arc<Mutex<Box<dyn Connection>>>,
    product: String,
}

impl PinnedDatasource {
    /// Pins the given connection.
    pub fn new(connection: Box<dyn Connection>) -> Self {
        let product = connection.product_name().to_string();
        Self {
            shared: Arc::new(Mutex::new(connection)),
            product,
        }
    }

    /// Enables or disables autocommit on the pinned connection.
    pub fn set_auto_commit(&self, auto_commit: bool) -> DatasourceResult<()> {
        self.shared.lock().set_auto_commit(auto_commit)
    }

    /// Commits the pinned connection's transaction.
    pub fn commit(&self) -> DatasourceResult<()> {
        self.shared.lock().commit()
    }

    /// Rolls back the pinned connection's transaction.
    pub fn rollback(&self) -> DatasourceResult<()> {
        self.shared.lock().rollback()
    }

    /// Returns the number of live handles, including this datasource.
    #[must_use]
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.shared)
    }
}

impl std::fmt::Debug for PinnedDatasource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PinnedDatasource")
            .field("product", &self.product)
            .field("handles", &self.handle_count())
            .finish_non_exhaustive()
    }
}

impl Datasource for PinnedDatasource {
    fn connection(&self) -> DatasourceResult<Box<dyn Connection>> {
        Ok(Box::new(PinnedConnection {
            shared: Arc::clone(&self.shared),
            product: self.product.clone(),
        }))
    }
}

struct PinnedConnection {
    shared: Arc<Mutex<Box<dyn Connection>>>,
    product: String,
}

impl Connection for PinnedConnection {
    fn query(&mut self, sql: &str, params: &[StatementParam]) -> DatasourceResult<ResultSet> {
        self.shared.lock().query(sql, params)
    }

    fn execute(&mut self, sql: &str, params: &[StatementParam]) -> DatasourceResult<u64> {
        self.shared.lock().execute(sql, params)
    }

    fn last_generated_key(&mut self) -> DatasourceResult<Option<SqlValue>> {
        self.shared.lock().last_generated_key()
    }

    fn set_auto_commit(&mut self, auto_commit: bool) -> DatasourceResult<()> {
        trace!(auto_commit, "ignoring autocommit change on pinned connection");
        Ok(())
    }

    fn auto_commit(&self) -> bool {
        self.shared.lock().auto_commit()
    }

    fn commit(&mut self) -> DatasourceResult<()> {
        trace!("ignoring commit on pinned connection");
        Ok(())
    }

    fn rollback(&mut self) -> DatasourceResult<()> {
        trace!("ignoring rollback on pinned connection");
        Ok(())
    }

    fn product_name(&self) -> &str {
        &self.product
    }
}

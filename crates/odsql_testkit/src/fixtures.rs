//! Test fixtures and database helpers.
//!
//! Provides a seeded fleet database in a temporary directory plus a
//! processor wired to it.

use crate::builder::{BuilderConfig, SqliteQueryBuilder};
use crate::model::{FleetModel, SCHEMA_SQL, SEED_SQL};
use odsql_core::{ODataRequest, ODataResponse, SqlProcessor, SqlProcessorBuilder};
use odsql_datasource::{Datasource, SqlValue, SqliteDatasource};
use std::path::PathBuf;
use std::sync::{Arc, Once};
use tempfile::TempDir;
use tracing::debug;

static TRACING: Once = Once::new();

/// Installs a test-friendly tracing subscriber once per process.
///
/// Honors `RUST_LOG`; defaults to warnings only.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// A seeded fleet database with automatic cleanup.
pub struct TestDatabase {
    /// The datasource.
    pub datasource: Arc<SqliteDatasource>,
    /// The model metadata.
    pub model: FleetModel,
    path: PathBuf,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: TempDir,
}

impl TestDatabase {
    /// Creates the schema and seed rows in a fresh file database.
    pub fn new() -> Self {
        let db = Self::empty();
        db.execute_script(SEED_SQL);
        db
    }

    /// Creates the schema without seed rows.
    pub fn empty() -> Self {
        init_tracing();
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("fleet.db");
        let datasource = SqliteDatasource::open(&path).expect("Failed to open datasource");
        let db = Self {
            datasource: Arc::new(datasource),
            model: FleetModel::new(),
            path,
            _temp_dir: temp_dir,
        };
        db.execute_script(SCHEMA_SQL);
        debug!(path = %db.path.display(), "created fleet database");
        db
    }

    /// Returns the database file path.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Runs `;`-separated statements.
    pub fn execute_script(&self, script: &str) {
        let mut connection = self.datasource.connection().expect("Failed to connect");
        for statement in script.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            connection
                .execute(statement, &[])
                .unwrap_or_else(|e| panic!("Failed to run {statement}: {e}"));
        }
    }

    /// Runs a query and returns the first column of every row.
    pub fn column(&self, sql: &str) -> Vec<SqlValue> {
        let mut connection = self.datasource.connection().expect("Failed to connect");
        let rows = connection.query(sql, &[]).expect("Failed to query");
        rows.rows().map(|row| row.first().cloned().unwrap_or(SqlValue::Null)).collect()
    }

    /// Counts rows of a table.
    pub fn count(&self, table: &str) -> i64 {
        self.column(&format!("SELECT COUNT(*) FROM {table}"))
            .first()
            .and_then(SqlValue::as_i64)
            .expect("count")
    }

    /// Returns a query builder with the given paging.
    pub fn query_builder(&self, config: BuilderConfig) -> SqliteQueryBuilder {
        self.model.query_builder().with_config(config)
    }

    /// Starts a processor over this database with default paging.
    pub fn processor_builder(&self) -> SqlProcessorBuilder {
        SqlProcessor::builder(self.datasource.clone(), Arc::new(self.model.query_builder()))
            .edm(self.model.edm())
    }

    /// Returns a processor with default collaborators.
    pub fn processor(&self) -> SqlProcessor {
        self.processor_builder().build()
    }

    /// Returns a processor that pages by `page_size`.
    pub fn paged_processor(&self, page_size: u32) -> SqlProcessor {
        let builder = self.query_builder(BuilderConfig::default().with_page_size(page_size));
        SqlProcessor::builder(self.datasource.clone(), Arc::new(builder))
            .edm(self.model.edm())
            .build()
    }
}

impl Default for TestDatabase {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs a test with a seeded fleet database.
///
/// # Example
///
/// ```rust,ignore
/// use odsql_testkit::with_fleet_db;
///
/// #[test]
/// fn my_test() {
///     with_fleet_db(|db| {
///         let processor = db.processor();
///         // ... requests
///     });
/// }
/// ```
pub fn with_fleet_db<F, R>(f: F) -> R
where
    F: FnOnce(&TestDatabase) -> R,
{
    let db = TestDatabase::new();
    f(&db)
}

/// Handles a request and parses its JSON body.
pub fn json_of(processor: &SqlProcessor, request: &ODataRequest) -> (ODataResponse, serde_json::Value) {
    let response = processor.handle_request(request);
    let body = if response.has_body() {
        response.json_body().expect("JSON body")
    } else {
        serde_json::Value::Null
    };
    (response, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SEEDED_CARS;

    #[test]
    fn test_seeded_database() {
        let db = TestDatabase::new();
        assert_eq!(db.count("CARS"), SEEDED_CARS as i64);
        assert_eq!(db.count("DRIVERS"), 3);
        assert_eq!(db.count("CAR_SUMMARY"), 4);
        assert!(db.path().exists());
    }

    #[test]
    fn test_empty_database() {
        let db = TestDatabase::empty();
        assert_eq!(db.count("CARS"), 0);
    }

    #[test]
    fn test_with_fleet_db() {
        let makes = with_fleet_db(|db| db.column("SELECT DISTINCT MAKE FROM CARS ORDER BY MAKE"));
        assert_eq!(makes.len(), 4);
        assert_eq!(makes[0], SqlValue::Text("Audi".into()));
    }
}

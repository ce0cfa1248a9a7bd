//! SQLite datasource backed by `rusqlite`.

use crate::connection::{Connection, Datasource};
use crate::error::{DatasourceError, DatasourceResult};
use crate::result::ResultSet;
use crate::value::{SqlValue, StatementParam};
use parking_lot::Mutex;
use rusqlite::types::{ToSqlOutput, Value, ValueRef};
use rusqlite::{params_from_iter, OpenFlags, ToSql};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::trace;

/// Configuration for SQLite connections.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// How long a connection waits on a locked database.
    pub busy_timeout: Duration,
    /// Whether `PRAGMA foreign_keys` is switched on for every connection.
    pub foreign_keys: bool,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_secs(5),
            foreign_keys: true,
        }
    }
}

impl SqliteConfig {
    /// Sets the busy timeout.
    #[must_use]
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Enables or disables foreign key enforcement.
    #[must_use]
    pub fn with_foreign_keys(mut self, enabled: bool) -> Self {
        self.foreign_keys = enabled;
        self
    }
}

#[derive(Debug)]
enum Target {
    File(PathBuf),
    Memory(String),
}

/// A datasource that opens a fresh SQLite connection per acquisition.
///
/// In-memory datasources use a named shared-cache database; the datasource
/// keeps one idle connection open so the database outlives the connections
/// handed out to requests.
pub struct SqliteDatasource {
    target: Target,
    config: SqliteConfig,
    _keeper: Option<Mutex<rusqlite::Connection>>,
}

impl SqliteDatasource {
    /// Opens a file-backed datasource, creating the file if needed.
    pub fn open(path: impl AsRef<Path>) -> DatasourceResult<Self> {
        Self::open_with_config(path, SqliteConfig::default())
    }

    /// Opens a file-backed datasource with the given configuration.
    pub fn open_with_config(path: impl AsRef<Path>, config: SqliteConfig) -> DatasourceResult<Self> {
        let ds = Self {
            target: Target::File(path.as_ref().to_path_buf()),
            config,
            _keeper: None,
        };
        // Fail early on an unusable path.
        drop(ds.open_raw()?);
        Ok(ds)
    }

    /// Opens a named shared in-memory datasource.
    pub fn open_in_memory(name: &str) -> DatasourceResult<Self> {
        let mut ds = Self {
            target: Target::Memory(name.to_string()),
            config: SqliteConfig::default(),
            _keeper: None,
        };
        ds._keeper = Some(Mutex::new(ds.open_raw()?));
        Ok(ds)
    }

    fn open_raw(&self) -> DatasourceResult<rusqlite::Connection> {
        let conn = match &self.target {
            Target::File(path) => rusqlite::Connection::open_with_flags(path, OpenFlags::default())?,
            Target::Memory(name) => rusqlite::Connection::open_with_flags(
                format!("file:{name}?mode=memory&cache=shared"),
                OpenFlags::default(),
            )?,
        };
        conn.busy_timeout(self.config.busy_timeout)?;
        conn.pragma_update(None, "foreign_keys", self.config.foreign_keys)?;
        Ok(conn)
    }
}

impl std::fmt::Debug for SqliteDatasource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteDatasource")
            .field("target", &self.target)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Datasource for SqliteDatasource {
    fn connection(&self) -> DatasourceResult<Box<dyn Connection>> {
        let conn = self
            .open_raw()
            .map_err(|e| DatasourceError::ConnectionUnavailable(e.to_string()))?;
        Ok(Box::new(SqliteConnection {
            conn,
            auto_commit: true,
            in_transaction: false,
            last_insert: None,
        }))
    }
}

/// A SQLite connection with JDBC-like transaction handling.
struct SqliteConnection {
    conn: rusqlite::Connection,
    auto_commit: bool,
    in_transaction: bool,
    last_insert: Option<i64>,
}

impl SqliteConnection {
    fn begin_if_needed(&mut self) -> DatasourceResult<()> {
        if !self.auto_commit && !self.in_transaction {
            self.conn.execute_batch("BEGIN")?;
            self.in_transaction = true;
        }
        Ok(())
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Null => ToSqlOutput::Owned(Value::Null),
            SqlValue::Bool(v) => ToSqlOutput::Owned(Value::Integer(i64::from(*v))),
            SqlValue::Integer(v) => ToSqlOutput::Owned(Value::Integer(*v)),
            SqlValue::Double(v) => ToSqlOutput::Owned(Value::Real(*v)),
            SqlValue::Text(v) => ToSqlOutput::Borrowed(ValueRef::Text(v.as_bytes())),
            SqlValue::Bytes(v) => ToSqlOutput::Borrowed(ValueRef::Blob(v)),
        })
    }
}

fn from_value_ref(value: ValueRef<'_>) -> SqlValue {
    match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(v) => SqlValue::Integer(v),
        ValueRef::Real(v) => SqlValue::Double(v),
        ValueRef::Text(v) => SqlValue::Text(String::from_utf8_lossy(v).into_owned()),
        ValueRef::Blob(v) => SqlValue::Bytes(v.to_vec()),
    }
}

impl Connection for SqliteConnection {
    fn query(&mut self, sql: &str, params: &[StatementParam]) -> DatasourceResult<ResultSet> {
        self.begin_if_needed()?;
        trace!(sql, params = params.len(), "sqlite query");
        let mut stmt = self.conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let width = columns.len();
        let mut rows = stmt.query(params_from_iter(params.iter().map(|p| &p.value)))?;
        let mut buffered = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(from_value_ref(row.get_ref(i)?));
            }
            buffered.push(values);
        }
        ResultSet::new(columns, buffered)
    }

    fn execute(&mut self, sql: &str, params: &[StatementParam]) -> DatasourceResult<u64> {
        self.begin_if_needed()?;
        trace!(sql, params = params.len(), "sqlite execute");
        let affected = self
            .conn
            .execute(sql, params_from_iter(params.iter().map(|p| &p.value)))?;
        if sql.trim_start().to_ascii_uppercase().starts_with("INSERT") {
            self.last_insert = Some(self.conn.last_insert_rowid());
        }
        Ok(affected as u64)
    }

    fn last_generated_key(&mut self) -> DatasourceResult<Option<SqlValue>> {
        Ok(self.last_insert.map(SqlValue::Integer))
    }

    fn set_auto_commit(&mut self, auto_commit: bool) -> DatasourceResult<()> {
        if auto_commit && self.in_transaction {
            self.commit()?;
        }
        self.auto_commit = auto_commit;
        Ok(())
    }

    fn auto_commit(&self) -> bool {
        self.auto_commit
    }

    fn commit(&mut self) -> DatasourceResult<()> {
        if self.in_transaction {
            self.conn.execute_batch("COMMIT")?;
            self.in_transaction = false;
        }
        Ok(())
    }

    fn rollback(&mut self) -> DatasourceResult<()> {
        if !self.in_transaction {
            return Ok(());
        }
        // Over even if ROLLBACK fails.
        self.in_transaction = false;
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }

    fn product_name(&self) -> &str {
        "SQLite"
    }
}

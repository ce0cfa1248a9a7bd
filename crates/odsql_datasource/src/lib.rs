//! # odsql Datasource
//!
//! Connection-level abstraction used by the odsql request processor.
//!
//! This crate is the only place that talks to a SQL driver. Everything
//! above it works with [`Datasource`], [`Connection`], typed
//! [`SqlValue`]s and buffered [`ResultSet`]s.
//!
//! ## Available Datasources
//!
//! - [`SqliteDatasource`] - SQLite through `rusqlite`, file-backed or shared in-memory
//! - [`PinnedDatasource`] - Hands out one pinned connection, used for changesets
//!
//! ## Example
//!
//! ```rust
//! use odsql_datasource::{Datasource, SqliteDatasource, SqlValue};
//!
//! let ds = SqliteDatasource::open_in_memory("doc_example").unwrap();
//! let mut conn = ds.connection().unwrap();
//! conn.execute("CREATE TABLE T (ID INTEGER)", &[]).unwrap();
//! conn.execute("INSERT INTO T VALUES (7)", &[]).unwrap();
//! let rs = conn.query("SELECT ID AS T_ID FROM T", &[]).unwrap();
//! assert_eq!(rs.rows().next().unwrap().get("T_ID").unwrap(), &SqlValue::Integer(7));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod connection;
mod error;
mod pinned;
mod result;
mod sqlite;
mod value;

pub use connection::{Connection, Datasource};
pub use error::{DatasourceError, DatasourceResult};
pub use pinned::PinnedDatasource;
pub use result::{ResultSet, Row};
pub use sqlite::{SqliteConfig, SqliteDatasource};
pub use value::{SqlType, SqlValue, StatementParam};

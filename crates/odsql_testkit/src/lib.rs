//! # odsql Testkit
//!
//! Test utilities for odsql.
//!
//! This crate provides:
//! - The fleet fixture model and a seeded SQLite database
//! - A reference SQLite [`odsql_core::QueryBuilder`]
//! - A recording event handler and observing interceptors
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use odsql_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_database() {
//!     with_fleet_db(|db| {
//!         let processor = db.processor();
//!         // ... requests
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod builder;
pub mod filter;
pub mod fixtures;
pub mod generators;
pub mod hooks;
pub mod interceptors;
pub mod model;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::builder::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::hooks::*;
    pub use crate::interceptors::*;
    pub use crate::model::*;
}

pub use builder::{BuilderConfig, SqliteQueryBuilder, TableBinding, TableMapping};
pub use fixtures::*;
pub use hooks::{Operation, RecordingEventHandler};
pub use interceptors::{CountingQueryBuilder, FailingInterceptor, ReadRewriteInterceptor, RecordingInterceptor};
pub use model::FleetModel;

//! # odsql Core
//!
//! OData request processing over SQL datasources.
//!
//! This crate provides:
//! - Entity data model metadata ([`Schema`], [`EntityType`])
//! - The statement builder and interceptor contracts
//! - Event hooks around create, update and delete
//! - Result materialization and expand accumulation
//! - The JSON protocol codec and `multipart/mixed` batch framing
//! - [`SqlProcessor`], which runs reads, counts, mutations, batches and
//!   changesets against a [`odsql_datasource::Datasource`]
//!
//! ## Request lifecycle
//!
//! ```text
//! SqlProcessor -> InterceptorChain -> StatementBuilder -> Connection
//!              -> ResultSetReader -> ExpandAccumulator -> ProtocolCodec
//! ```
//!
//! The [`EventHandler`] is consulted at fixed points around the default
//! mutation path.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

pub mod accumulator;
pub mod codec;
pub mod config;
pub mod context;
pub mod edm;
pub mod entity;
pub mod error;
pub mod handler;
pub mod interceptor;
pub mod materializer;
pub mod multipart;
pub mod processor;
pub mod request;
pub mod response;
pub mod statement;
pub mod uri;

pub use accumulator::ExpandAccumulator;
pub use codec::{JsonCodec, ProtocolCodec};
pub use config::ProcessorConfig;
pub use context::RequestContext;
pub use edm::{
    ComplexType, EdmProvider, EdmSimpleType, EntitySet, EntityType, Multiplicity, NavigationProperty, Property,
    Schema, SimpleProperty, SourceKind,
};
pub use entity::{IdentityKey, ODataEntry, PropertyMap, PropertyValue, ResultSetEntity};
pub use error::{ODataError, ODataResult};
pub use handler::{EventHandler, NoopEventHandler};
pub use interceptor::{InterceptPoint, Intercepted, Interceptor, InterceptorChain};
pub use materializer::{IdentityCustomizer, PropertyValueCustomizer, ResultSetReader};
pub use processor::{SqlProcessor, SqlProcessorBuilder};
pub use request::{BatchPart, ExpandPath, KeyPredicate, ODataRequest, RequestBody, UriInfo};
pub use response::{BatchResponse, BatchResponsePart, ODataResponse, StatusCode};
pub use statement::{QueryBuilder, SqlContext, Statement, StatementBuilder, StatementKind, DEFAULT_SERVER_PAGING_SIZE};
pub use uri::parse_request;

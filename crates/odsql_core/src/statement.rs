//! Statement builder contracts.
//!
//! Turning a request into SQL is pluggable. A [`QueryBuilder`] creates one
//! [`StatementBuilder`] per statement the processor needs; interceptors may
//! swap that instance before [`StatementBuilder::build`] runs. Builders also
//! answer the metadata questions the materializer and paging logic ask:
//! column aliases, transient properties, page sizes.

use crate::edm::EntityType;
use crate::entity::{IdentityKey, ODataEntry, PropertyMap};
use crate::error::ODataResult;
use crate::request::UriInfo;
use odsql_datasource::StatementParam;
use std::collections::HashMap;
use std::fmt;

/// Page size used when server-side paging is on and nothing else is configured.
pub const DEFAULT_SERVER_PAGING_SIZE: u32 = 1000;

/// SQL text plus ordered bind parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// SQL text with `?` placeholders.
    pub sql: String,
    /// Parameters, in placeholder order.
    pub params: Vec<StatementParam>,
}

impl Statement {
    /// Creates a statement.
    pub fn new(sql: impl Into<String>, params: Vec<StatementParam>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

/// What a statement does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// Select one entity by key.
    SelectEntity,
    /// Select a page of an entity set.
    SelectEntitySet,
    /// Select only the keys of a page of roots.
    SelectKeys,
    /// Count an entity set.
    Count,
    /// Insert.
    Insert,
    /// Update by key.
    Update,
    /// Delete by key.
    Delete,
}

/// Environment handed to [`StatementBuilder::build`].
#[derive(Debug, Clone, Default)]
pub struct SqlContext {
    /// Product name of the connected database.
    pub database_product: String,
    /// Protocol parameters of the request.
    pub parameters: HashMap<String, String>,
}

/// Produces the SQL for one statement.
///
/// Instances are created per statement by a [`QueryBuilder`] and may be
/// replaced by interceptors, so wrappers that delegate to an inner builder
/// are the usual way to add behavior.
pub trait StatementBuilder: Send {
    /// Returns what this statement does.
    fn kind(&self) -> StatementKind;

    /// Renders the statement.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be expressed in SQL.
    fn build(&self, context: &SqlContext) -> ODataResult<Statement>;

    /// Returns the result column alias of a property of the given type.
    fn column_alias(&self, type_fqn: &str, property: &str) -> ODataResult<String>;

    /// Returns true if the property has no backing column.
    fn is_transient(&self, _type_fqn: &str, _property: &str) -> bool {
        false
    }

    /// Returns the alias of the row-number column used as identity for keyless types.
    fn row_number_alias(&self, ty: &EntityType) -> String {
        format!("{}_ROW_NUM", ty.name.to_ascii_uppercase())
    }

    /// Returns true if the database generates the key of new rows of this type.
    fn has_server_generated_key(&self, _ty: &EntityType) -> bool {
        false
    }

    /// Returns true if this statement was limited by server-side paging.
    fn is_serverside_paging(&self) -> bool {
        false
    }

    /// Returns the effective row limit, if any.
    fn top(&self) -> Option<u32> {
        None
    }

    /// Returns the page size configured for the type.
    fn page_size(&self, _ty: &EntityType) -> u32 {
        DEFAULT_SERVER_PAGING_SIZE
    }
}

/// Creates statement builders for requests.
pub trait QueryBuilder: Send + Sync {
    /// Select one entity by the request's key predicates, joined with expansions.
    fn select_entity(&self, uri: &UriInfo) -> ODataResult<Box<dyn StatementBuilder>>;

    /// Select a page of the entity set joined with expansions.
    ///
    /// When `pinned` is non-empty the statement must restrict roots to those
    /// keys and apply no paging of its own.
    fn select_entity_set(&self, uri: &UriInfo, pinned: &[IdentityKey]) -> ODataResult<Box<dyn StatementBuilder>>;

    /// Select only the key columns of a page of roots, without expansions.
    fn select_keys(&self, uri: &UriInfo) -> ODataResult<Box<dyn StatementBuilder>>;

    /// Count the filtered entity set.
    fn select_count(&self, uri: &UriInfo) -> ODataResult<Box<dyn StatementBuilder>>;

    /// Insert the entry.
    fn insert(&self, uri: &UriInfo, entry: &ODataEntry) -> ODataResult<Box<dyn StatementBuilder>>;

    /// Update the entity identified by `keys` from the entry.
    fn update(
        &self,
        uri: &UriInfo,
        entry: &ODataEntry,
        keys: &PropertyMap,
        merge: bool,
    ) -> ODataResult<Box<dyn StatementBuilder>>;

    /// Delete the entity identified by `keys`.
    fn delete(&self, uri: &UriInfo, keys: &PropertyMap) -> ODataResult<Box<dyn StatementBuilder>>;
}

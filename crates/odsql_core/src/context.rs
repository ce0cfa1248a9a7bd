//! Per-operation request context.

use crate::error::ODataResult;
use crate::statement::SqlContext;
use odsql_datasource::{Connection, Datasource};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// State of one operation.
///
/// A context is created per operation and dropped when it ends. Inside a
/// changeset every sub-request gets its own context whose datasource is
/// pinned to the changeset's connection, so nested operations join one
/// transaction without touching shared processor state.
pub struct RequestContext {
    datasource: Arc<dyn Datasource>,
    pinned: bool,
    parameters: HashMap<String, String>,
    state: HashMap<String, Value>,
}

impl RequestContext {
    /// Creates a context over a datasource.
    pub fn new(datasource: Arc<dyn Datasource>) -> Self {
        Self {
            datasource,
            pinned: false,
            parameters: HashMap::new(),
            state: HashMap::new(),
        }
    }

    /// Adds a protocol parameter, e.g. a tenant or the service root.
    #[must_use]
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    /// Derives the context of a changeset sub-request.
    ///
    /// The child shares protocol parameters, uses the pinned datasource and
    /// starts with empty hook state.
    pub(crate) fn pinned_child(&self, datasource: Arc<dyn Datasource>) -> Self {
        Self {
            datasource,
            pinned: true,
            parameters: self.parameters.clone(),
            state: HashMap::new(),
        }
    }

    /// Derives the context of a standalone batch part.
    pub(crate) fn sibling(&self) -> Self {
        Self {
            datasource: Arc::clone(&self.datasource),
            pinned: self.pinned,
            parameters: self.parameters.clone(),
            state: HashMap::new(),
        }
    }

    /// Returns the datasource operations acquire connections from.
    pub fn datasource(&self) -> &Arc<dyn Datasource> {
        &self.datasource
    }

    /// Acquires a connection from the context's datasource.
    pub fn connection(&self) -> ODataResult<Box<dyn Connection>> {
        Ok(self.datasource.connection()?)
    }

    /// Returns true inside a changeset.
    pub fn is_pinned(&self) -> bool {
        self.pinned
    }

    /// Returns the protocol parameters.
    pub fn parameters(&self) -> &HashMap<String, String> {
        &self.parameters
    }

    /// Returns a value stored by an earlier hook of this operation.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.state.get(key)
    }

    /// Stores a value for later hooks of this operation.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.state.insert(key.into(), value)
    }

    /// Removes a stored value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.state.remove(key)
    }

    pub(crate) fn sql_context(&self, connection: &dyn Connection) -> SqlContext {
        SqlContext {
            database_product: connection.product_name().to_string(),
            parameters: self.parameters.clone(),
        }
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("pinned", &self.pinned)
            .field("parameters", &self.parameters)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

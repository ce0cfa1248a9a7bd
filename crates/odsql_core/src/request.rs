//! Parsed requests.
//!
//! Wire-level parsing happens elsewhere; the processor receives requests in
//! this structured form with metadata already resolved.

use crate::edm::{EntitySet, EntityType, NavigationProperty, Property};
use crate::entity::{PropertyMap, PropertyValue};
use crate::error::{ODataError, ODataResult};
use odsql_datasource::SqlValue;
use std::sync::Arc;

/// One step of an expand path.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpandSegment {
    /// The navigation followed.
    pub navigation: NavigationProperty,
    /// The type reached.
    pub target: Arc<EntityType>,
}

/// A resolved `$expand` path, e.g. `Owner/Address`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpandPath(Vec<ExpandSegment>);

impl ExpandPath {
    /// Creates a path from its segments.
    pub fn new(segments: Vec<ExpandSegment>) -> Self {
        Self(segments)
    }

    /// Returns the segments in order.
    pub fn segments(&self) -> &[ExpandSegment] {
        &self.0
    }
}

/// A key predicate value, e.g. `Id='7'` in `Cars('7')`.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyPredicate {
    /// Key property name.
    pub property: String,
    /// Typed key value.
    pub value: SqlValue,
}

/// The resource path and system query options of one request.
#[derive(Debug, Clone, PartialEq)]
pub struct UriInfo {
    /// Target entity set.
    pub entity_set: Arc<EntitySet>,
    /// Key predicates; empty when addressing the whole set.
    pub key_predicates: Vec<KeyPredicate>,
    /// `$filter` expression text.
    pub filter: Option<String>,
    /// `$select` property names; empty selects everything.
    pub select: Vec<String>,
    /// `$expand` paths.
    pub expand: Vec<ExpandPath>,
    /// `$top`.
    pub top: Option<u32>,
    /// `$skip`.
    pub skip: Option<u32>,
    /// `$skiptoken`.
    pub skip_token: Option<String>,
    /// `$orderby` expression text.
    pub order_by: Option<String>,
    /// `$inlinecount=allpages`.
    pub inline_count: bool,
    /// Addressed property, e.g. `Make` in `Cars('7')/Make`.
    pub property_path: Option<String>,
    /// Whether `$value` was requested for the addressed property.
    pub raw_value: bool,
    /// The request URI relative to the service root, used for next-links.
    pub request_uri: String,
}

impl UriInfo {
    /// Addresses the given entity set.
    pub fn new(entity_set: Arc<EntitySet>) -> Self {
        let request_uri = entity_set.name.clone();
        Self {
            entity_set,
            key_predicates: Vec::new(),
            filter: None,
            select: Vec::new(),
            expand: Vec::new(),
            top: None,
            skip: None,
            skip_token: None,
            order_by: None,
            inline_count: false,
            property_path: None,
            raw_value: false,
            request_uri,
        }
    }

    /// Adds a key predicate.
    #[must_use]
    pub fn with_key(mut self, property: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.key_predicates.push(KeyPredicate {
            property: property.into(),
            value: value.into(),
        });
        self
    }

    /// Sets `$filter`.
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Sets `$select`.
    #[must_use]
    pub fn with_select<I, S>(mut self, properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select = properties.into_iter().map(Into::into).collect();
        self
    }

    /// Adds an `$expand` path.
    #[must_use]
    pub fn with_expand(mut self, path: ExpandPath) -> Self {
        self.expand.push(path);
        self
    }

    /// Sets `$top`.
    #[must_use]
    pub fn with_top(mut self, top: u32) -> Self {
        self.top = Some(top);
        self
    }

    /// Sets `$skip`.
    #[must_use]
    pub fn with_skip(mut self, skip: u32) -> Self {
        self.skip = Some(skip);
        self
    }

    /// Sets `$skiptoken`.
    #[must_use]
    pub fn with_skip_token(mut self, token: impl Into<String>) -> Self {
        self.skip_token = Some(token.into());
        self
    }

    /// Sets `$orderby`.
    #[must_use]
    pub fn with_order_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = Some(order_by.into());
        self
    }

    /// Requests an inline count.
    #[must_use]
    pub fn with_inline_count(mut self) -> Self {
        self.inline_count = true;
        self
    }

    /// Addresses a single property of the entity.
    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>) -> Self {
        self.property_path = Some(name.into());
        self
    }

    /// Requests the raw `$value` of the addressed property.
    #[must_use]
    pub fn with_raw_value(mut self) -> Self {
        self.raw_value = true;
        self
    }

    /// Sets the request URI.
    #[must_use]
    pub fn with_request_uri(mut self, uri: impl Into<String>) -> Self {
        self.request_uri = uri.into();
        self
    }

    /// Returns the target entity type.
    pub fn target_type(&self) -> &Arc<EntityType> {
        &self.entity_set.entity_type
    }

    /// Returns true if any expansion was requested.
    pub fn has_expand(&self) -> bool {
        !self.expand.is_empty()
    }

    /// Returns the skip offset from `$skip`, or from a numeric `$skiptoken`.
    pub fn effective_skip(&self) -> u32 {
        self.skip
            .or_else(|| self.skip_token.as_deref().and_then(|t| t.parse().ok()))
            .unwrap_or(0)
    }

    /// Returns the key predicates as a property map.
    ///
    /// # Errors
    ///
    /// Fails if a declared key property has no predicate.
    pub fn key_values(&self) -> ODataResult<PropertyMap> {
        let ty = self.target_type();
        let mut keys = PropertyMap::new();
        for key in ty.key_properties() {
            let predicate = self
                .key_predicates
                .iter()
                .find(|p| p.property == key.name)
                .ok_or_else(|| {
                    ODataError::BadRequest(format!("missing key property {} of {}", key.name, ty.fqn()))
                })?;
            keys.insert(key.name.clone(), PropertyValue::Simple(predicate.value.clone()));
        }
        Ok(keys)
    }

    /// Returns the properties to materialize, honoring `$select`.
    ///
    /// Key properties are always included so identity can be derived.
    pub fn selected_properties(&self) -> Vec<&Property> {
        let ty = self.target_type();
        if self.select.is_empty() || self.select.iter().any(|s| s == "*") {
            return ty.properties.iter().collect();
        }
        ty.properties
            .iter()
            .filter(|p| ty.keys.iter().any(|k| k == p.name()) || self.select.iter().any(|s| s == p.name()))
            .collect()
    }
}

/// A request body with its content type.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestBody {
    /// MIME type of the body.
    pub content_type: String,
    /// Raw bytes.
    pub bytes: Vec<u8>,
}

impl RequestBody {
    /// Creates a JSON body.
    pub fn json(value: &serde_json::Value) -> Self {
        Self {
            content_type: "application/json".to_string(),
            bytes: value.to_string().into_bytes(),
        }
    }
}

/// One protocol request.
#[derive(Debug, Clone, PartialEq)]
pub enum ODataRequest {
    /// `GET Set(key)`
    ReadEntity(UriInfo),
    /// `GET Set`
    ReadEntitySet(UriInfo),
    /// `GET Set(key)/Property[/$value]`
    ReadProperty(UriInfo),
    /// `GET Set/$count`
    Count(UriInfo),
    /// `POST Set`
    Create {
        /// Target set.
        uri: UriInfo,
        /// Submitted entity.
        body: RequestBody,
    },
    /// `PUT`/`MERGE`/`PATCH Set(key)`
    Update {
        /// Target entity.
        uri: UriInfo,
        /// Submitted entity.
        body: RequestBody,
        /// True for `MERGE`/`PATCH`.
        merge: bool,
    },
    /// `DELETE Set(key)`
    Delete(UriInfo),
}

impl ODataRequest {
    /// Returns the request URI info.
    pub fn uri(&self) -> &UriInfo {
        match self {
            ODataRequest::ReadEntity(uri)
            | ODataRequest::ReadEntitySet(uri)
            | ODataRequest::ReadProperty(uri)
            | ODataRequest::Count(uri)
            | ODataRequest::Delete(uri) => uri,
            ODataRequest::Create { uri, .. } | ODataRequest::Update { uri, .. } => uri,
        }
    }

    /// Returns the protocol method name.
    pub fn method(&self) -> &'static str {
        match self {
            ODataRequest::ReadEntity(_)
            | ODataRequest::ReadEntitySet(_)
            | ODataRequest::ReadProperty(_)
            | ODataRequest::Count(_) => "GET",
            ODataRequest::Create { .. } => "POST",
            ODataRequest::Update { merge: false, .. } => "PUT",
            ODataRequest::Update { merge: true, .. } => "MERGE",
            ODataRequest::Delete(_) => "DELETE",
        }
    }

    /// Returns true for create, update and delete.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            ODataRequest::Create { .. } | ODataRequest::Update { .. } | ODataRequest::Delete(_)
        )
    }
}

/// One part of a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchPart {
    /// A standalone request.
    Request(ODataRequest),
    /// An atomic group of mutations.
    ChangeSet(Vec<ODataRequest>),
}

//! Materialized entities, submitted entries and identity keys.

use crate::edm::EntityType;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use odsql_datasource::SqlValue;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Property name to value.
pub type PropertyMap = BTreeMap<String, PropertyValue>;

/// The value of one structural property.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// A primitive value.
    Simple(SqlValue),
    /// A complex value.
    Complex(PropertyMap),
}

impl PropertyValue {
    /// Shorthand for a `null` primitive.
    pub const NULL: PropertyValue = PropertyValue::Simple(SqlValue::Null);

    /// Returns the primitive value, if any.
    pub fn as_simple(&self) -> Option<&SqlValue> {
        match self {
            PropertyValue::Simple(v) => Some(v),
            PropertyValue::Complex(_) => None,
        }
    }

    /// Converts to JSON. Binary values become base64 text.
    pub fn to_json(&self) -> Value {
        match self {
            PropertyValue::Simple(v) => sql_to_json(v),
            PropertyValue::Complex(map) => Value::Object(map_to_json(map)),
        }
    }
}

macro_rules! simple_from {
    ($($t:ty),*) => {
        $(impl From<$t> for PropertyValue {
            fn from(v: $t) -> Self {
                PropertyValue::Simple(v.into())
            }
        })*
    };
}

simple_from!(SqlValue, bool, i32, i64, f64, &str, String, Vec<u8>);

/// Converts a primitive value to JSON.
pub fn sql_to_json(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Bool(v) => json!(v),
        SqlValue::Integer(v) => json!(v),
        SqlValue::Double(v) => json!(v),
        SqlValue::Text(v) => json!(v),
        SqlValue::Bytes(v) => json!(BASE64.encode(v)),
    }
}

/// Converts a property map to a JSON object.
pub fn map_to_json(map: &PropertyMap) -> Map<String, Value> {
    map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect()
}

/// The values identifying one entity, in key order.
///
/// Keyless sources carry a single synthetic row-number component.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IdentityKey(Vec<SqlValue>);

impl IdentityKey {
    /// Creates a key from its components.
    pub fn new(values: Vec<SqlValue>) -> Self {
        Self(values)
    }

    /// Returns the key components.
    pub fn values(&self) -> &[SqlValue] {
        &self.0
    }

    /// Returns true if every component is `null`.
    pub fn is_null(&self) -> bool {
        self.0.iter().all(SqlValue::is_null)
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{v}")?;
        }
        f.write_str(")")
    }
}

/// An entity materialized from a result row.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultSetEntity {
    entity_type: Arc<EntityType>,
    data: PropertyMap,
    key: IdentityKey,
}

impl ResultSetEntity {
    /// Creates an entity.
    pub fn new(entity_type: Arc<EntityType>, data: PropertyMap, key: IdentityKey) -> Self {
        Self {
            entity_type,
            data,
            key,
        }
    }

    /// Returns the entity type.
    pub fn entity_type(&self) -> &Arc<EntityType> {
        &self.entity_type
    }

    /// Returns the materialized properties.
    pub fn data(&self) -> &PropertyMap {
        &self.data
    }

    /// Returns the identity key.
    pub fn key(&self) -> &IdentityKey {
        &self.key
    }

    /// Returns true if this row carried no entity, i.e. the key is all `null`.
    ///
    /// Left joins produce such rows for parents without children.
    pub fn is_empty(&self) -> bool {
        self.key.is_null()
    }

    /// Consumes the entity, returning its properties.
    pub fn into_data(self) -> PropertyMap {
        self.data
    }
}

/// An entity payload submitted by a client.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ODataEntry {
    /// The submitted properties.
    pub properties: PropertyMap,
}

impl ODataEntry {
    /// Creates an entry from properties.
    pub fn new(properties: PropertyMap) -> Self {
        Self { properties }
    }

    /// Sets a property, returning the entry.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Returns a property value.
    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    /// Returns the key values of this entry in key order, or `None` if a key
    /// property is missing or `null`.
    pub fn key_values(&self, ty: &EntityType) -> Option<PropertyMap> {
        let mut keys = PropertyMap::new();
        for key in ty.key_properties() {
            match self.properties.get(&key.name) {
                Some(PropertyValue::Simple(v)) if !v.is_null() => {
                    keys.insert(key.name.clone(), PropertyValue::Simple(v.clone()));
                }
                _ => return None,
            }
        }
        Some(keys)
    }
}

//! Entity data model metadata.
//!
//! Types here describe what can be queried: entity types with their
//! properties and keys, complex types, navigation properties and entity
//! sets. They are built once, wrapped in [`Arc`], and shared read-only by
//! every request.

use crate::error::{ODataError, ODataResult};
use crate::request::{ExpandPath, ExpandSegment};
use odsql_datasource::SqlType;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Primitive EDM types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdmSimpleType {
    /// Edm.Boolean
    Boolean,
    /// Edm.Byte
    Byte,
    /// Edm.Int16
    Int16,
    /// Edm.Int32
    Int32,
    /// Edm.Int64
    Int64,
    /// Edm.Single
    Single,
    /// Edm.Double
    Double,
    /// Edm.Decimal
    Decimal,
    /// Edm.String
    String,
    /// Edm.Binary
    Binary,
    /// Edm.DateTime
    DateTime,
    /// Edm.Time
    Time,
    /// Edm.Guid
    Guid,
}

impl EdmSimpleType {
    /// Returns the qualified EDM name, e.g. `Edm.Int32`.
    pub fn name(self) -> &'static str {
        match self {
            Self::Boolean => "Edm.Boolean",
            Self::Byte => "Edm.Byte",
            Self::Int16 => "Edm.Int16",
            Self::Int32 => "Edm.Int32",
            Self::Int64 => "Edm.Int64",
            Self::Single => "Edm.Single",
            Self::Double => "Edm.Double",
            Self::Decimal => "Edm.Decimal",
            Self::String => "Edm.String",
            Self::Binary => "Edm.Binary",
            Self::DateTime => "Edm.DateTime",
            Self::Time => "Edm.Time",
            Self::Guid => "Edm.Guid",
        }
    }

    /// Returns the SQL type used when binding values of this type.
    pub fn sql_type(self) -> SqlType {
        match self {
            Self::Boolean => SqlType::Boolean,
            Self::Byte => SqlType::TinyInt,
            Self::Int16 => SqlType::SmallInt,
            Self::Int32 => SqlType::Integer,
            Self::Int64 => SqlType::BigInt,
            Self::Single => SqlType::Real,
            Self::Double => SqlType::Double,
            Self::Decimal => SqlType::Decimal,
            Self::String | Self::Guid => SqlType::Varchar,
            Self::Binary => SqlType::Binary,
            Self::DateTime => SqlType::Timestamp,
            Self::Time => SqlType::Time,
        }
    }
}

impl fmt::Display for EdmSimpleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A property holding a primitive value.
#[derive(Debug, Clone, PartialEq)]
pub struct SimpleProperty {
    /// Property name.
    pub name: String,
    /// EDM type.
    pub edm_type: EdmSimpleType,
    /// Whether `null` is allowed.
    pub nullable: bool,
}

/// A property holding a structured value of a complex type.
#[derive(Debug, Clone, PartialEq)]
pub struct ComplexProperty {
    /// Property name.
    pub name: String,
    /// The complex type of the value.
    pub complex_type: Arc<ComplexType>,
}

/// A structural property of an entity or complex type.
#[derive(Debug, Clone, PartialEq)]
pub enum Property {
    /// A primitive property.
    Simple(SimpleProperty),
    /// A complex property.
    Complex(ComplexProperty),
}

impl Property {
    /// Creates a nullable simple property.
    pub fn simple(name: impl Into<String>, edm_type: EdmSimpleType) -> Self {
        Property::Simple(SimpleProperty {
            name: name.into(),
            edm_type,
            nullable: true,
        })
    }

    /// Creates a complex property.
    pub fn complex(name: impl Into<String>, complex_type: Arc<ComplexType>) -> Self {
        Property::Complex(ComplexProperty {
            name: name.into(),
            complex_type,
        })
    }

    /// Returns the property name.
    pub fn name(&self) -> &str {
        match self {
            Property::Simple(p) => &p.name,
            Property::Complex(p) => &p.name,
        }
    }
}

/// A named structured type without identity.
#[derive(Debug, Clone, PartialEq)]
pub struct ComplexType {
    /// Namespace.
    pub namespace: String,
    /// Type name.
    pub name: String,
    /// Properties, in declaration order.
    pub properties: Vec<Property>,
}

impl ComplexType {
    /// Creates a complex type.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, properties: Vec<Property>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            properties,
        }
    }

    /// Returns the fully-qualified name.
    pub fn fqn(&self) -> String {
        format!("{}.{}", self.namespace, self.name)
    }
}

/// Where the rows of an entity type come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceKind {
    /// A physical table.
    #[default]
    Table,
    /// A database view.
    View,
    /// A calculated query.
    Calculated,
}

impl SourceKind {
    /// Parses a source kind name, case-insensitively.
    ///
    /// Unknown names fall back to [`SourceKind::Table`].
    pub fn parse(kind: &str) -> Self {
        match kind.to_ascii_lowercase().as_str() {
            "table" => Self::Table,
            "view" => Self::View,
            "calculated" => Self::Calculated,
            other => {
                warn!(kind = other, "unknown source kind, treating as table");
                Self::Table
            }
        }
    }
}

/// Cardinality of a navigation target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Multiplicity {
    /// `0..1`
    ZeroOrOne,
    /// `1`
    One,
    /// `*`
    Many,
}

/// Join condition of a navigation: `source.source_property = target.target_property`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferentialConstraint {
    /// Property on the declaring type.
    pub source_property: String,
    /// Property on the target type.
    pub target_property: String,
}

/// A navigation from one entity type to another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationProperty {
    /// Navigation name.
    pub name: String,
    /// Fully-qualified name of the target entity type.
    pub target_type: String,
    /// Cardinality of the target end.
    pub multiplicity: Multiplicity,
    /// Join condition.
    pub constraint: ReferentialConstraint,
}

impl NavigationProperty {
    /// Creates a navigation property.
    pub fn new(
        name: impl Into<String>,
        target_type: impl Into<String>,
        multiplicity: Multiplicity,
        source_property: impl Into<String>,
        target_property: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            target_type: target_type.into(),
            multiplicity,
            constraint: ReferentialConstraint {
                source_property: source_property.into(),
                target_property: target_property.into(),
            },
        }
    }
}

/// Metadata for one kind of entity.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityType {
    /// Namespace.
    pub namespace: String,
    /// Type name.
    pub name: String,
    /// Properties, in declaration order.
    pub properties: Vec<Property>,
    /// Key property names, in key order. Empty for keyless sources.
    pub keys: Vec<String>,
    /// Navigation properties.
    pub navigation: Vec<NavigationProperty>,
    /// Row source.
    pub source_kind: SourceKind,
}

impl EntityType {
    /// Starts building an entity type.
    pub fn builder(namespace: impl Into<String>, name: impl Into<String>) -> EntityTypeBuilder {
        EntityTypeBuilder {
            ty: EntityType {
                namespace: namespace.into(),
                name: name.into(),
                properties: Vec::new(),
                keys: Vec::new(),
                navigation: Vec::new(),
                source_kind: SourceKind::Table,
            },
        }
    }

    /// Returns the fully-qualified name.
    pub fn fqn(&self) -> String {
        format!("{}.{}", self.namespace, self.name)
    }

    /// Looks up a property by name.
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name() == name)
    }

    /// Returns the key properties, in key order.
    pub fn key_properties(&self) -> impl Iterator<Item = &SimpleProperty> {
        self.keys.iter().filter_map(move |k| match self.property(k) {
            Some(Property::Simple(p)) => Some(p),
            _ => None,
        })
    }

    /// Returns true if the type declares no key.
    pub fn is_keyless(&self) -> bool {
        self.keys.is_empty()
    }

    /// Looks up a navigation property by name.
    pub fn navigation_property(&self, name: &str) -> Option<&NavigationProperty> {
        self.navigation.iter().find(|n| n.name == name)
    }
}

/// Builder for [`EntityType`].
#[derive(Debug)]
pub struct EntityTypeBuilder {
    ty: EntityType,
}

impl EntityTypeBuilder {
    /// Adds a non-nullable key property.
    #[must_use]
    pub fn key(mut self, name: impl Into<String>, edm_type: EdmSimpleType) -> Self {
        let name = name.into();
        self.ty.keys.push(name.clone());
        self.ty.properties.push(Property::Simple(SimpleProperty {
            name,
            edm_type,
            nullable: false,
        }));
        self
    }

    /// Adds a nullable simple property.
    #[must_use]
    pub fn property(mut self, name: impl Into<String>, edm_type: EdmSimpleType) -> Self {
        self.ty.properties.push(Property::simple(name, edm_type));
        self
    }

    /// Adds a complex property.
    #[must_use]
    pub fn complex(mut self, name: impl Into<String>, complex_type: Arc<ComplexType>) -> Self {
        self.ty.properties.push(Property::complex(name, complex_type));
        self
    }

    /// Adds a navigation property.
    #[must_use]
    pub fn navigation(mut self, navigation: NavigationProperty) -> Self {
        self.ty.navigation.push(navigation);
        self
    }

    /// Sets the source kind.
    #[must_use]
    pub fn source_kind(mut self, kind: SourceKind) -> Self {
        self.ty.source_kind = kind;
        self
    }

    /// Finishes the type.
    ///
    /// # Errors
    ///
    /// Fails if a navigation constraint or key names an unknown or complex
    /// property.
    pub fn build(self) -> ODataResult<EntityType> {
        let ty = self.ty;
        if ty.key_properties().count() != ty.keys.len() {
            return Err(ODataError::Internal(format!(
                "{} declares a key that is not a simple property",
                ty.fqn()
            )));
        }
        for nav in &ty.navigation {
            if ty.property(&nav.constraint.source_property).is_none() {
                return Err(ODataError::Internal(format!(
                    "navigation {} of {} joins on unknown property {}",
                    nav.name,
                    ty.fqn(),
                    nav.constraint.source_property
                )));
            }
        }
        Ok(ty)
    }
}

/// A named collection of entities of one type.
#[derive(Debug, Clone, PartialEq)]
pub struct EntitySet {
    /// Set name.
    pub name: String,
    /// Element type.
    pub entity_type: Arc<EntityType>,
}

/// Source of entity metadata.
pub trait EdmProvider: Send + Sync {
    /// Looks up an entity type by fully-qualified name.
    fn entity_type(&self, fqn: &str) -> Option<Arc<EntityType>>;

    /// Looks up an entity set by name.
    fn entity_set(&self, name: &str) -> Option<Arc<EntitySet>>;

    /// Resolves an expand path like `Owner/Address` starting at `root`.
    ///
    /// # Errors
    ///
    /// Returns a bad request error for unknown navigation names.
    fn expand_path(&self, root: &EntityType, path: &str) -> ODataResult<ExpandPath> {
        let mut segments = Vec::new();
        let mut current = root.clone();
        for name in path.split('/').filter(|s| !s.is_empty()) {
            let navigation = current.navigation_property(name).cloned().ok_or_else(|| {
                ODataError::BadRequest(format!("{} has no navigation property {name}", current.fqn()))
            })?;
            let target = self.entity_type(&navigation.target_type).ok_or_else(|| {
                ODataError::Internal(format!("unknown navigation target: {}", navigation.target_type))
            })?;
            current = (*target).clone();
            segments.push(ExpandSegment { navigation, target });
        }
        if segments.is_empty() {
            return Err(ODataError::BadRequest(format!("empty expand path: {path:?}")));
        }
        Ok(ExpandPath::new(segments))
    }
}

/// An in-memory registry of entity types and sets.
#[derive(Debug, Default)]
pub struct Schema {
    types: BTreeMap<String, Arc<EntityType>>,
    sets: BTreeMap<String, Arc<EntitySet>>,
}

impl Schema {
    /// Creates an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an entity type.
    pub fn add_entity_type(&mut self, ty: EntityType) -> Arc<EntityType> {
        let ty = Arc::new(ty);
        self.types.insert(ty.fqn(), Arc::clone(&ty));
        ty
    }

    /// Registers an entity set over a registered type.
    pub fn add_entity_set(&mut self, name: impl Into<String>, type_fqn: &str) -> ODataResult<Arc<EntitySet>> {
        let entity_type = self
            .types
            .get(type_fqn)
            .cloned()
            .ok_or_else(|| ODataError::Internal(format!("unknown entity type: {type_fqn}")))?;
        let set = Arc::new(EntitySet {
            name: name.into(),
            entity_type,
        });
        self.sets.insert(set.name.clone(), Arc::clone(&set));
        Ok(set)
    }
}

impl EdmProvider for Schema {
    fn entity_type(&self, fqn: &str) -> Option<Arc<EntityType>> {
        self.types.get(fqn).cloned()
    }

    fn entity_set(&self, name: &str) -> Option<Arc<EntitySet>> {
        self.sets.get(name).cloned()
    }
}

//! Turning result rows into entities.

use crate::edm::{EdmSimpleType, EntityType, Property, SimpleProperty};
use crate::entity::{IdentityKey, PropertyMap, PropertyValue, ResultSetEntity};
use crate::error::{ODataError, ODataResult};
use crate::statement::StatementBuilder;
use odsql_datasource::{Row, SqlValue};
use std::sync::Arc;

/// Adjusts property values after they are read and before they are stored.
pub trait PropertyValueCustomizer: Send + Sync {
    /// Returns the value to store for `property` of `entity_type`.
    fn customize(&self, entity_type: &EntityType, property: &SimpleProperty, value: SqlValue) -> ODataResult<SqlValue>;
}

/// Stores values as read.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityCustomizer;

impl PropertyValueCustomizer for IdentityCustomizer {
    fn customize(&self, _entity_type: &EntityType, _property: &SimpleProperty, value: SqlValue) -> ODataResult<SqlValue> {
        Ok(value)
    }
}

/// Reads entities out of rows using the column aliases of a statement builder.
pub struct ResultSetReader<'a> {
    builder: &'a dyn StatementBuilder,
    customizer: &'a dyn PropertyValueCustomizer,
}

impl<'a> ResultSetReader<'a> {
    /// Creates a reader for rows produced by `builder`'s statement.
    pub fn new(builder: &'a dyn StatementBuilder, customizer: &'a dyn PropertyValueCustomizer) -> Self {
        Self { builder, customizer }
    }

    /// Materializes `properties` of `ty` from `row`.
    ///
    /// Key properties are always read, so the identity key is available
    /// even under a narrow `$select`.
    pub fn read_entity(&self, row: &Row<'_>, ty: &Arc<EntityType>, properties: &[&Property]) -> ODataResult<ResultSetEntity> {
        let fqn = ty.fqn();
        let mut data = PropertyMap::new();
        for property in properties {
            data.insert(property.name().to_string(), self.read_property(row, &fqn, ty, property)?);
        }
        let key = self.read_identity(row, ty, &mut data)?;
        Ok(ResultSetEntity::new(Arc::clone(ty), data, key))
    }

    /// Materializes every property of `ty`.
    pub fn read_full_entity(&self, row: &Row<'_>, ty: &Arc<EntityType>) -> ODataResult<ResultSetEntity> {
        let properties: Vec<&Property> = ty.properties.iter().collect();
        self.read_entity(row, ty, &properties)
    }

    /// Reads only the identity key of `ty`.
    pub fn read_key(&self, row: &Row<'_>, ty: &EntityType) -> ODataResult<IdentityKey> {
        let mut scratch = PropertyMap::new();
        self.read_identity(row, ty, &mut scratch)
    }

    /// Reads a single property of `ty`.
    pub fn read_property(&self, row: &Row<'_>, type_fqn: &str, ty: &EntityType, property: &Property) -> ODataResult<PropertyValue> {
        match property {
            Property::Simple(p) => Ok(PropertyValue::Simple(self.read_simple(row, type_fqn, ty, p)?)),
            Property::Complex(p) => {
                let complex_fqn = p.complex_type.fqn();
                let mut map = PropertyMap::new();
                for sub in &p.complex_type.properties {
                    map.insert(sub.name().to_string(), self.read_property(row, &complex_fqn, ty, sub)?);
                }
                Ok(PropertyValue::Complex(map))
            }
        }
    }

    fn read_simple(&self, row: &Row<'_>, type_fqn: &str, ty: &EntityType, property: &SimpleProperty) -> ODataResult<SqlValue> {
        if self.builder.is_transient(type_fqn, &property.name) {
            return Ok(SqlValue::Null);
        }
        let alias = self.builder.column_alias(type_fqn, &property.name)?;
        let value = if property.edm_type == EdmSimpleType::Binary {
            row.get_bytes(&alias)?.map_or(SqlValue::Null, SqlValue::Bytes)
        } else {
            coerce(row.get(&alias)?.clone(), property.edm_type, &alias)?
        };
        self.customizer.customize(ty, property, value)
    }

    fn read_identity(&self, row: &Row<'_>, ty: &EntityType, data: &mut PropertyMap) -> ODataResult<IdentityKey> {
        if ty.is_keyless() {
            let alias = self.builder.row_number_alias(ty);
            return Ok(IdentityKey::new(vec![row.get(&alias)?.clone()]));
        }
        let fqn = ty.fqn();
        let mut values = Vec::with_capacity(ty.keys.len());
        for key in ty.key_properties() {
            let value = match data.get(&key.name) {
                Some(PropertyValue::Simple(v)) => v.clone(),
                _ => {
                    let v = self.read_simple(row, &fqn, ty, key)?;
                    data.insert(key.name.clone(), PropertyValue::Simple(v.clone()));
                    v
                }
            };
            values.push(value);
        }
        Ok(IdentityKey::new(values))
    }
}

/// Converts a driver value to the representation of an EDM type.
///
/// Drivers with loose typing hand back integers for booleans and wide
/// numbers for narrow ones; this narrows them, failing when the value does
/// not fit.
pub fn coerce(value: SqlValue, edm_type: EdmSimpleType, column: &str) -> ODataResult<SqlValue> {
    let mismatch = |value: &SqlValue| {
        ODataError::Materialization(format!(
            "column {column}: cannot read {} as {edm_type}",
            value.type_name()
        ))
    };
    if value.is_null() {
        return Ok(value);
    }
    match edm_type {
        EdmSimpleType::Boolean => match &value {
            SqlValue::Bool(_) => Ok(value),
            SqlValue::Integer(0) => Ok(SqlValue::Bool(false)),
            SqlValue::Integer(1) => Ok(SqlValue::Bool(true)),
            SqlValue::Text(t) if t.eq_ignore_ascii_case("true") => Ok(SqlValue::Bool(true)),
            SqlValue::Text(t) if t.eq_ignore_ascii_case("false") => Ok(SqlValue::Bool(false)),
            _ => Err(mismatch(&value)),
        },
        EdmSimpleType::Byte | EdmSimpleType::Int16 | EdmSimpleType::Int32 | EdmSimpleType::Int64 => {
            let n = match &value {
                SqlValue::Integer(n) => *n,
                SqlValue::Bool(b) => i64::from(*b),
                SqlValue::Double(d) if d.fract() == 0.0 && d.abs() < 9.0e15 => *d as i64,
                SqlValue::Text(t) => t.trim().parse().map_err(|_| mismatch(&value))?,
                _ => return Err(mismatch(&value)),
            };
            let (min, max) = match edm_type {
                EdmSimpleType::Byte => (0, i64::from(u8::MAX)),
                EdmSimpleType::Int16 => (i64::from(i16::MIN), i64::from(i16::MAX)),
                EdmSimpleType::Int32 => (i64::from(i32::MIN), i64::from(i32::MAX)),
                _ => (i64::MIN, i64::MAX),
            };
            if n < min || n > max {
                return Err(ODataError::Materialization(format!(
                    "column {column}: value {n} out of range for {edm_type}"
                )));
            }
            Ok(SqlValue::Integer(n))
        }
        EdmSimpleType::Single | EdmSimpleType::Double | EdmSimpleType::Decimal => match &value {
            SqlValue::Double(_) => Ok(value),
            SqlValue::Integer(n) => Ok(SqlValue::Double(*n as f64)),
            SqlValue::Text(t) => t.trim().parse().map(SqlValue::Double).map_err(|_| mismatch(&value)),
            _ => Err(mismatch(&value)),
        },
        EdmSimpleType::String | EdmSimpleType::Guid | EdmSimpleType::DateTime | EdmSimpleType::Time => {
            match value {
                SqlValue::Text(_) => Ok(value),
                SqlValue::Integer(n) => Ok(SqlValue::Text(n.to_string())),
                SqlValue::Double(d) => Ok(SqlValue::Text(d.to_string())),
                SqlValue::Bool(b) => Ok(SqlValue::Text(b.to_string())),
                other => Err(mismatch(&other)),
            }
        }
        EdmSimpleType::Binary => match value {
            SqlValue::Bytes(_) => Ok(value),
            SqlValue::Text(t) => Ok(SqlValue::Bytes(t.into_bytes())),
            other => Err(mismatch(&other)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edm::ComplexType;
    use crate::statement::{SqlContext, Statement, StatementKind};
    use odsql_datasource::ResultSet;

    /// Aliases are `<TYPE>_<PROPERTY>` in upper case; `Notes` is transient.
    struct Aliases;

    impl StatementBuilder for Aliases {
        fn kind(&self) -> StatementKind {
            StatementKind::SelectEntitySet
        }
        fn build(&self, _context: &SqlContext) -> ODataResult<Statement> {
            Ok(Statement::new("", vec![]))
        }
        fn column_alias(&self, type_fqn: &str, property: &str) -> ODataResult<String> {
            let name = type_fqn.rsplit('.').next().unwrap_or(type_fqn);
            Ok(format!("{}_{}", name, property).to_ascii_uppercase())
        }
        fn is_transient(&self, _type_fqn: &str, property: &str) -> bool {
            property == "Notes"
        }
    }

    struct Upper;

    impl PropertyValueCustomizer for Upper {
        fn customize(&self, _ty: &EntityType, property: &SimpleProperty, value: SqlValue) -> ODataResult<SqlValue> {
            match (property.name.as_str(), value) {
                ("Make", SqlValue::Text(t)) => Ok(SqlValue::Text(t.to_uppercase())),
                (_, v) => Ok(v),
            }
        }
    }

    fn car_type() -> Arc<EntityType> {
        let dims = Arc::new(ComplexType::new(
            "ns",
            "Dimensions",
            vec![
                Property::simple("Length", EdmSimpleType::Double),
                Property::simple("Width", EdmSimpleType::Double),
            ],
        ));
        Arc::new(
            EntityType::builder("ns", "Car")
                .key("Id", EdmSimpleType::String)
                .property("Make", EdmSimpleType::String)
                .property("Year", EdmSimpleType::Int32)
                .property("Electric", EdmSimpleType::Boolean)
                .property("Image", EdmSimpleType::Binary)
                .property("Notes", EdmSimpleType::String)
                .complex("Size", dims)
                .build()
                .unwrap(),
        )
    }

    fn rows() -> ResultSet {
        ResultSet::new(
            [
                "CAR_ID",
                "CAR_MAKE",
                "CAR_YEAR",
                "CAR_ELECTRIC",
                "CAR_IMAGE",
                "DIMENSIONS_LENGTH",
                "DIMENSIONS_WIDTH",
                "SUMMARY_ROW_NUM",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            vec![vec![
                SqlValue::Text("c1".into()),
                SqlValue::Text("bmw".into()),
                SqlValue::Integer(2019),
                SqlValue::Integer(1),
                SqlValue::Bytes(vec![7, 7]),
                SqlValue::Integer(4),
                SqlValue::Double(1.8),
                SqlValue::Integer(3),
            ]],
        )
        .unwrap()
    }

    // === Entities ===

    #[test]
    fn reads_all_property_kinds() {
        let ty = car_type();
        let rs = rows();
        let row = rs.rows().next().unwrap();
        let entity = ResultSetReader::new(&Aliases, &IdentityCustomizer)
            .read_full_entity(&row, &ty)
            .unwrap();

        let data = entity.data();
        assert_eq!(data["Make"], PropertyValue::from("bmw"));
        assert_eq!(data["Year"], PropertyValue::from(2019));
        assert_eq!(data["Electric"], PropertyValue::from(true));
        assert_eq!(data["Image"], PropertyValue::from(vec![7u8, 7]));
        assert_eq!(data["Notes"], PropertyValue::NULL);
        match &data["Size"] {
            PropertyValue::Complex(size) => {
                assert_eq!(size["Length"], PropertyValue::from(4.0));
                assert_eq!(size["Width"], PropertyValue::from(1.8));
            }
            other => panic!("expected complex value, got {other:?}"),
        }
        assert_eq!(entity.key(), &IdentityKey::new(vec!["c1".into()]));
    }

    #[test]
    fn customizer_sees_every_simple_value() {
        let ty = car_type();
        let rs = rows();
        let row = rs.rows().next().unwrap();
        let entity = ResultSetReader::new(&Aliases, &Upper).read_full_entity(&row, &ty).unwrap();
        assert_eq!(entity.data()["Make"], PropertyValue::from("BMW"));
    }

    #[test]
    fn narrow_select_still_reads_keys() {
        let ty = car_type();
        let rs = rows();
        let row = rs.rows().next().unwrap();
        let make = ty.property("Make").unwrap();
        let entity = ResultSetReader::new(&Aliases, &IdentityCustomizer)
            .read_entity(&row, &ty, &[make])
            .unwrap();
        assert_eq!(entity.data().len(), 2);
        assert!(!entity.is_empty());
    }

    #[test]
    fn keyless_types_use_row_number() {
        let ty = Arc::new(
            EntityType::builder("ns", "Summary")
                .property("Make", EdmSimpleType::String)
                .build()
                .unwrap(),
        );
        let rs = ResultSet::new(
            vec!["SUMMARY_MAKE".into(), "SUMMARY_ROW_NUM".into()],
            vec![vec![SqlValue::Text("bmw".into()), SqlValue::Integer(3)]],
        )
        .unwrap();
        let row = rs.rows().next().unwrap();
        let entity = ResultSetReader::new(&Aliases, &IdentityCustomizer)
            .read_full_entity(&row, &ty)
            .unwrap();
        assert_eq!(entity.key(), &IdentityKey::new(vec![SqlValue::Integer(3)]));
    }

    #[test]
    fn missing_column_fails() {
        let ty = Arc::new(
            EntityType::builder("ns", "Car")
                .key("Id", EdmSimpleType::String)
                .property("Color", EdmSimpleType::String)
                .build()
                .unwrap(),
        );
        let rs = rows();
        let row = rs.rows().next().unwrap();
        let result = ResultSetReader::new(&Aliases, &IdentityCustomizer).read_full_entity(&row, &ty);
        assert!(matches!(result, Err(ODataError::DataAccess(_))));
    }

    // === Coercion ===

    #[test]
    fn coercion_rules() {
        assert_eq!(coerce(SqlValue::Integer(0), EdmSimpleType::Boolean, "c").unwrap(), SqlValue::Bool(false));
        assert_eq!(coerce(SqlValue::Double(3.0), EdmSimpleType::Int16, "c").unwrap(), SqlValue::Integer(3));
        assert_eq!(coerce(SqlValue::Integer(3), EdmSimpleType::Decimal, "c").unwrap(), SqlValue::Double(3.0));
        assert_eq!(coerce(SqlValue::Integer(3), EdmSimpleType::String, "c").unwrap(), SqlValue::Text("3".into()));
        assert_eq!(coerce(SqlValue::Null, EdmSimpleType::Int32, "c").unwrap(), SqlValue::Null);
        assert!(coerce(SqlValue::Integer(70_000), EdmSimpleType::Int16, "c").is_err());
        assert!(coerce(SqlValue::Integer(256), EdmSimpleType::Byte, "c").is_err());
        assert!(coerce(SqlValue::Double(1.5), EdmSimpleType::Int64, "c").is_err());
        assert!(matches!(
            coerce(SqlValue::Text("BOOM".into()), EdmSimpleType::Double, "CAR_PRICE"),
            Err(ODataError::Materialization(msg)) if msg.contains("CAR_PRICE")
        ));
    }
}

//! Protocol payload encoding.
//!
//! The processor reads submitted entries and writes entries, feeds,
//! properties and counts through a [`ProtocolCodec`]. [`JsonCodec`]
//! implements the OData v2 JSON format. Batch envelopes default to the
//! framing in [`crate::multipart`].

use crate::edm::{EdmProvider, EdmSimpleType, EntityType, Multiplicity, NavigationProperty, Property};
use crate::entity::{sql_to_json, ODataEntry, PropertyMap, PropertyValue};
use crate::error::{ODataError, ODataResult};
use crate::multipart;
use crate::request::{BatchPart, ExpandPath, UriInfo};
use crate::response::{BatchResponse, ODataResponse, StatusCode};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use odsql_datasource::SqlValue;
use serde_json::{json, Map, Value};

/// Reads and writes protocol payloads.
pub trait ProtocolCodec: Send + Sync {
    /// Parses a submitted entry of type `ty`.
    fn read_entry(&self, ty: &EntityType, content_type: &str, bytes: &[u8]) -> ODataResult<ODataEntry>;

    /// Writes one entity rendered by the expand accumulator.
    fn write_entry(&self, status: StatusCode, uri: &UriInfo, entity: Map<String, Value>) -> ODataResult<ODataResponse>;

    /// Writes a feed of rendered entities.
    fn write_feed(
        &self,
        uri: &UriInfo,
        entities: Vec<Map<String, Value>>,
        count: Option<u64>,
        next_link: Option<String>,
    ) -> ODataResult<ODataResponse>;

    /// Writes a single property, or its raw value.
    fn write_property(&self, uri: &UriInfo, name: &str, value: &PropertyValue) -> ODataResult<ODataResponse>;

    /// Writes a count.
    fn write_count(&self, count: u64) -> ODataResult<ODataResponse>;

    /// Parses a wire batch into its parts, resolving request lines against `edm`.
    fn read_batch(&self, edm: &dyn EdmProvider, content_type: &str, bytes: &[u8]) -> ODataResult<Vec<BatchPart>> {
        multipart::read_batch(edm, content_type, bytes)
    }

    /// Writes the envelope of an executed batch.
    fn write_batch(&self, batch: &BatchResponse) -> ODataResult<ODataResponse> {
        Ok(multipart::write_batch(batch))
    }
}

/// OData v2 JSON ("verbose") codec.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

/// Navigation properties to expand below one entity, merged by prefix.
struct ExpandNode<'a> {
    navigation: &'a NavigationProperty,
    children: Vec<ExpandNode<'a>>,
}

fn expand_tree(paths: &[ExpandPath]) -> Vec<ExpandNode<'_>> {
    let mut roots: Vec<ExpandNode<'_>> = Vec::new();
    for path in paths {
        let mut level = &mut roots;
        for segment in path.segments() {
            let index = match level.iter().position(|n| n.navigation.name == segment.navigation.name) {
                Some(index) => index,
                None => {
                    level.push(ExpandNode {
                        navigation: &segment.navigation,
                        children: Vec::new(),
                    });
                    level.len() - 1
                }
            };
            level = &mut level[index].children;
        }
    }
    roots
}

/// Replaces type-named buckets with navigation-named values.
fn shape_entity(mut entity: Map<String, Value>, type_fqn: &str, expand: &[ExpandNode<'_>]) -> Map<String, Value> {
    let mut buckets: Vec<(String, Value)> = Vec::new();
    for node in expand {
        let children = match entity.get(&node.navigation.target_type) {
            Some(Value::Array(children)) => children.clone(),
            _ => Vec::new(),
        };
        let shaped: Vec<Value> = children
            .into_iter()
            .map(|child| match child {
                Value::Object(map) => Value::Object(shape_entity(map, &node.navigation.target_type, &node.children)),
                other => other,
            })
            .collect();
        let value = match node.navigation.multiplicity {
            Multiplicity::Many => json!({ "results": shaped }),
            Multiplicity::One | Multiplicity::ZeroOrOne => shaped.into_iter().next().unwrap_or(Value::Null),
        };
        buckets.push((node.navigation.name.clone(), value));
    }
    for node in expand {
        entity.remove(&node.navigation.target_type);
    }
    entity.insert("__metadata".into(), json!({ "type": type_fqn }));
    entity.extend(buckets);
    entity
}

fn value_to_sql(value: &Value, edm_type: EdmSimpleType, name: &str) -> ODataResult<SqlValue> {
    let invalid = || ODataError::BadRequest(format!("invalid value for property {name}: expected {edm_type}"));
    match (edm_type, value) {
        (_, Value::Null) => Ok(SqlValue::Null),
        (EdmSimpleType::Boolean, Value::Bool(b)) => Ok(SqlValue::Bool(*b)),
        (EdmSimpleType::Boolean, Value::String(s)) => s.parse().map(SqlValue::Bool).map_err(|_| invalid()),
        (EdmSimpleType::Byte | EdmSimpleType::Int16 | EdmSimpleType::Int32 | EdmSimpleType::Int64, v) => {
            let n = match v {
                Value::Number(n) => n.as_i64().ok_or_else(invalid)?,
                Value::String(s) => s.trim().parse().map_err(|_| invalid())?,
                _ => return Err(invalid()),
            };
            let fits = match edm_type {
                EdmSimpleType::Byte => u8::try_from(n).is_ok(),
                EdmSimpleType::Int16 => i16::try_from(n).is_ok(),
                EdmSimpleType::Int32 => i32::try_from(n).is_ok(),
                _ => true,
            };
            if fits {
                Ok(SqlValue::Integer(n))
            } else {
                Err(invalid())
            }
        }
        (EdmSimpleType::Single | EdmSimpleType::Double | EdmSimpleType::Decimal, v) => match v {
            Value::Number(n) => n.as_f64().map(SqlValue::Double).ok_or_else(invalid),
            Value::String(s) => s.trim().parse().map(SqlValue::Double).map_err(|_| invalid()),
            _ => Err(invalid()),
        },
        (EdmSimpleType::Binary, Value::String(s)) => BASE64.decode(s).map(SqlValue::Bytes).map_err(|_| invalid()),
        (
            EdmSimpleType::String | EdmSimpleType::Guid | EdmSimpleType::DateTime | EdmSimpleType::Time,
            Value::String(s),
        ) => Ok(SqlValue::Text(s.clone())),
        _ => Err(invalid()),
    }
}

fn read_properties(properties: &[Property], object: &Map<String, Value>, owner: &str) -> ODataResult<PropertyMap> {
    let mut map = PropertyMap::new();
    for (name, value) in object {
        let property = properties
            .iter()
            .find(|p| p.name() == name)
            .ok_or_else(|| ODataError::BadRequest(format!("unknown property {name} of {owner}")))?;
        let parsed = match (property, value) {
            (Property::Simple(p), v) => PropertyValue::Simple(value_to_sql(v, p.edm_type, name)?),
            (Property::Complex(p), Value::Object(inner)) => {
                let mut inner = inner.clone();
                inner.remove("__metadata");
                PropertyValue::Complex(read_properties(&p.complex_type.properties, &inner, &p.complex_type.fqn())?)
            }
            (Property::Complex(_), Value::Null) => PropertyValue::NULL,
            (Property::Complex(p), _) => {
                return Err(ODataError::BadRequest(format!(
                    "invalid value for property {name}: expected {}",
                    p.complex_type.fqn()
                )))
            }
        };
        map.insert(name.clone(), parsed);
    }
    Ok(map)
}

impl ProtocolCodec for JsonCodec {
    fn read_entry(&self, ty: &EntityType, content_type: &str, bytes: &[u8]) -> ODataResult<ODataEntry> {
        let mime = content_type.split(';').next().unwrap_or("").trim();
        if !mime.is_empty() && !mime.eq_ignore_ascii_case("application/json") {
            return Err(ODataError::NotImplemented(format!("content type {mime}")));
        }
        let document: Value = serde_json::from_slice(bytes)
            .map_err(|e| ODataError::BadRequest(format!("malformed entry: {e}")))?;
        let mut object = match document {
            Value::Object(mut outer) => match outer.remove("d") {
                Some(Value::Object(inner)) => inner,
                Some(other) => {
                    outer.insert("d".into(), other);
                    outer
                }
                None => outer,
            },
            _ => return Err(ODataError::BadRequest("entry must be a JSON object".into())),
        };
        object.remove("__metadata");
        // Links and inline entries are not written through this entry.
        for navigation in &ty.navigation {
            object.remove(&navigation.name);
        }
        Ok(ODataEntry::new(read_properties(&ty.properties, &object, &ty.fqn())?))
    }

    fn write_entry(&self, status: StatusCode, uri: &UriInfo, entity: Map<String, Value>) -> ODataResult<ODataResponse> {
        let tree = expand_tree(&uri.expand);
        let shaped = shape_entity(entity, &uri.target_type().fqn(), &tree);
        Ok(ODataResponse::json(status, &json!({ "d": shaped })))
    }

    fn write_feed(
        &self,
        uri: &UriInfo,
        entities: Vec<Map<String, Value>>,
        count: Option<u64>,
        next_link: Option<String>,
    ) -> ODataResult<ODataResponse> {
        let tree = expand_tree(&uri.expand);
        let fqn = uri.target_type().fqn();
        let results: Vec<Value> = entities
            .into_iter()
            .map(|e| Value::Object(shape_entity(e, &fqn, &tree)))
            .collect();
        let mut feed = Map::new();
        feed.insert("results".into(), Value::Array(results));
        if let Some(count) = count {
            feed.insert("__count".into(), Value::String(count.to_string()));
        }
        if let Some(next) = next_link {
            feed.insert("__next".into(), Value::String(next));
        }
        Ok(ODataResponse::json(StatusCode::OK, &json!({ "d": feed })))
    }

    fn write_property(&self, uri: &UriInfo, name: &str, value: &PropertyValue) -> ODataResult<ODataResponse> {
        if uri.raw_value {
            return Ok(match value {
                PropertyValue::Simple(SqlValue::Bytes(b)) => {
                    ODataResponse::new(StatusCode::OK, "application/octet-stream", b.clone())
                }
                PropertyValue::Simple(SqlValue::Text(t)) => ODataResponse::text(StatusCode::OK, t.clone()),
                PropertyValue::Simple(SqlValue::Null) => ODataResponse::no_content(),
                PropertyValue::Simple(v) => ODataResponse::text(StatusCode::OK, sql_to_json(v).to_string()),
                PropertyValue::Complex(_) => {
                    return Err(ODataError::BadRequest(format!("$value of complex property {name}")))
                }
            });
        }
        Ok(ODataResponse::json(StatusCode::OK, &json!({ "d": { name: value.to_json() } })))
    }

    fn write_count(&self, count: u64) -> ODataResult<ODataResponse> {
        Ok(ODataResponse::text(StatusCode::OK, count.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edm::{ComplexType, EntitySet, Schema};
    use std::sync::Arc;

    fn schema() -> Schema {
        let mut schema = Schema::new();
        let dims = Arc::new(ComplexType::new(
            "ns",
            "Dimensions",
            vec![Property::simple("Length", EdmSimpleType::Double)],
        ));
        schema.add_entity_type(
            EntityType::builder("ns", "Car")
                .key("Id", EdmSimpleType::String)
                .property("Price", EdmSimpleType::Double)
                .property("Year", EdmSimpleType::Int16)
                .property("Image", EdmSimpleType::Binary)
                .property("OwnerId", EdmSimpleType::String)
                .complex("Size", dims)
                .navigation(NavigationProperty::new("Owner", "ns.Owner", Multiplicity::ZeroOrOne, "OwnerId", "Id"))
                .navigation(NavigationProperty::new("Drivers", "ns.Driver", Multiplicity::Many, "Id", "CarId"))
                .build()
                .unwrap(),
        );
        schema.add_entity_type(EntityType::builder("ns", "Owner").key("Id", EdmSimpleType::String).build().unwrap());
        schema.add_entity_type(
            EntityType::builder("ns", "Driver")
                .key("Id", EdmSimpleType::String)
                .property("CarId", EdmSimpleType::String)
                .build()
                .unwrap(),
        );
        schema.add_entity_set("Cars", "ns.Car").unwrap();
        schema
    }

    fn car(schema: &Schema) -> Arc<EntityType> {
        schema.entity_type("ns.Car").unwrap()
    }

    fn cars(schema: &Schema) -> Arc<EntitySet> {
        schema.entity_set("Cars").unwrap()
    }

    // === Reading ===

    #[test]
    fn reads_wrapped_and_bare_entries() {
        let schema = schema();
        let ty = car(&schema);
        let wrapped = br#"{"d":{"__metadata":{"type":"ns.Car"},"Id":"1","Price":"12.5","Year":2020}}"#;
        let entry = JsonCodec.read_entry(&ty, "application/json", wrapped).unwrap();
        assert_eq!(entry.get("Price"), Some(&PropertyValue::from(12.5)));
        assert_eq!(entry.get("Year"), Some(&PropertyValue::from(2020)));

        let bare = br#"{"Id":"1","Image":"AAEC","Size":{"Length":4.2},"Owner":{"__deferred":{}}}"#;
        let entry = JsonCodec.read_entry(&ty, "application/json;charset=utf-8", bare).unwrap();
        assert_eq!(entry.get("Image"), Some(&PropertyValue::from(vec![0u8, 1, 2])));
        assert!(matches!(entry.get("Size"), Some(PropertyValue::Complex(_))));
        assert!(entry.get("Owner").is_none());
    }

    #[test]
    fn rejects_bad_entries() {
        let schema = schema();
        let ty = car(&schema);
        let cases: [&[u8]; 5] = [
            br#"{"Id":"1","Price":"BOOM"}"#,
            br#"{"Id":"1","Color":"red"}"#,
            br#"{"Id":"1","Year":70000}"#,
            br#"[1,2]"#,
            b"not json",
        ];
        for body in cases {
            assert!(matches!(
                JsonCodec.read_entry(&ty, "application/json", body),
                Err(ODataError::BadRequest(_))
            ));
        }
        assert!(matches!(
            JsonCodec.read_entry(&ty, "application/atom+xml", b"<entry/>"),
            Err(ODataError::NotImplemented(_))
        ));
    }

    // === Writing ===

    #[test]
    fn writes_expanded_entry() {
        let schema = schema();
        let ty = car(&schema);
        let uri = UriInfo::new(cars(&schema))
            .with_expand(schema.expand_path(&ty, "Owner").unwrap())
            .with_expand(schema.expand_path(&ty, "Drivers").unwrap());
        let mut entity = Map::new();
        entity.insert("Id".into(), json!("1"));
        entity.insert("ns.Owner".into(), json!([{ "Id": "o1" }]));
        let response = JsonCodec.write_entry(StatusCode::OK, &uri, entity).unwrap();
        let body = response.json_body().unwrap();
        assert_eq!(body["d"]["__metadata"]["type"], "ns.Car");
        assert_eq!(body["d"]["Owner"]["Id"], "o1");
        assert_eq!(body["d"]["Owner"]["__metadata"]["type"], "ns.Owner");
        assert_eq!(body["d"]["Drivers"]["results"], json!([]));
        assert!(body["d"].get("ns.Owner").is_none());
    }

    #[test]
    fn writes_feed_with_count_and_next() {
        let schema = schema();
        let uri = UriInfo::new(cars(&schema));
        let mut entity = Map::new();
        entity.insert("Id".into(), json!("1"));
        let response = JsonCodec
            .write_feed(&uri, vec![entity], Some(7), Some("Cars?$skip=1".into()))
            .unwrap();
        let body = response.json_body().unwrap();
        assert_eq!(body["d"]["results"][0]["Id"], "1");
        assert_eq!(body["d"]["__count"], "7");
        assert_eq!(body["d"]["__next"], "Cars?$skip=1");
    }

    #[test]
    fn writes_properties_and_counts() {
        let schema = schema();
        let uri = UriInfo::new(cars(&schema));
        let json_value = JsonCodec.write_property(&uri, "Price", &PropertyValue::from(9.5)).unwrap();
        assert_eq!(json_value.json_body().unwrap()["d"]["Price"], 9.5);

        let raw = uri.clone().with_raw_value();
        let text = JsonCodec.write_property(&raw, "Make", &PropertyValue::from("BMW")).unwrap();
        assert_eq!(text.text_body().unwrap(), "BMW");
        let empty = JsonCodec.write_property(&raw, "Make", &PropertyValue::NULL).unwrap();
        assert_eq!(empty.status(), StatusCode::NO_CONTENT);

        assert_eq!(JsonCodec.write_count(7).unwrap().text_body().unwrap(), "7");
    }
}

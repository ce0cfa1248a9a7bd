//! Request line parsing.
//!
//! Turns a method and a URI relative to the service root into an
//! [`ODataRequest`]. The resource paths served are:
//!
//! ```text
//! Set                        Set(key)               Set/$count
//! Set(key)/Property          Set(key)/Property/$value
//! ```
//!
//! Keys are either a single literal (`Cars('c1')`) or named
//! (`Items(Order=1,Line=2)`). The system query options `$filter`,
//! `$select`, `$expand`, `$top`, `$skip`, `$skiptoken`, `$orderby`,
//! `$inlinecount` and `$format` are understood; custom options are ignored.

use crate::edm::{EdmProvider, EdmSimpleType, EntityType};
use crate::error::{ODataError, ODataResult};
use crate::request::{ODataRequest, RequestBody, UriInfo};
use odsql_datasource::SqlValue;
use percent_encoding::percent_decode_str;

/// Parses one request.
///
/// `target` is relative to the service root; a leading `/` is ignored.
/// `body` is required for `POST`, `PUT`, `MERGE` and `PATCH`.
///
/// # Errors
///
/// Unknown entity sets and properties are not found; malformed paths,
/// literals and options are bad requests; navigation paths and unknown
/// methods are not implemented.
pub fn parse_request(
    edm: &dyn EdmProvider,
    method: &str,
    target: &str,
    body: Option<RequestBody>,
) -> ODataResult<ODataRequest> {
    let target = target.trim().trim_start_matches('/');
    let (path, query) = target.split_once('?').unwrap_or((target, ""));
    let path = decode(path)?;
    let resource = ResourcePath::parse(&path)?;

    let entity_set = edm
        .entity_set(resource.set)
        .ok_or_else(|| ODataError::NotFound(format!("entity set {}", resource.set)))?;
    let mut uri = UriInfo::new(entity_set).with_request_uri(target);
    if let Some(raw) = resource.key {
        for (name, value) in key_predicates(uri.target_type(), raw)? {
            uri = uri.with_key(name, value);
        }
    }
    uri = apply_options(edm, uri, query)?;

    let keyed = resource.key.is_some();
    let method = method.to_ascii_uppercase();
    match method.as_str() {
        "GET" => read_request(uri, keyed, &resource.tail),
        "POST" if !keyed && resource.tail.is_empty() => Ok(ODataRequest::Create {
            uri,
            body: require_body(&method, body)?,
        }),
        "PUT" | "MERGE" | "PATCH" if keyed && resource.tail.is_empty() => Ok(ODataRequest::Update {
            uri,
            body: require_body(&method, body)?,
            merge: method != "PUT",
        }),
        "DELETE" if keyed && resource.tail.is_empty() => Ok(ODataRequest::Delete(uri)),
        "POST" | "PUT" | "MERGE" | "PATCH" | "DELETE" => {
            Err(ODataError::BadRequest(format!("{method} is not supported on {path}")))
        }
        other => Err(ODataError::NotImplemented(format!("method {other}"))),
    }
}

fn read_request(mut uri: UriInfo, keyed: bool, tail: &[&str]) -> ODataResult<ODataRequest> {
    match (keyed, tail) {
        (false, []) => Ok(ODataRequest::ReadEntitySet(uri)),
        (true, []) => Ok(ODataRequest::ReadEntity(uri)),
        (false, ["$count"]) => Ok(ODataRequest::Count(uri)),
        (true, ["$count"]) => Err(ODataError::BadRequest("$count of a single entity".into())),
        (true, [name]) | (true, [name, "$value"]) => {
            let ty = uri.target_type();
            if ty.property(name).is_none() {
                if ty.navigation_property(name).is_some() {
                    return Err(ODataError::NotImplemented(format!("navigation path {name}")));
                }
                return Err(ODataError::NotFound(format!("property {name} of {}", ty.fqn())));
            }
            uri = uri.with_property(*name);
            if tail.len() == 2 {
                uri = uri.with_raw_value();
            }
            Ok(ODataRequest::ReadProperty(uri))
        }
        _ => Err(ODataError::BadRequest(format!("unsupported resource path {}", uri.request_uri))),
    }
}

fn require_body(method: &str, body: Option<RequestBody>) -> ODataResult<RequestBody> {
    body.ok_or_else(|| ODataError::BadRequest(format!("{method} without a body")))
}

fn decode(raw: &str) -> ODataResult<String> {
    percent_decode_str(raw)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|e| ODataError::BadRequest(format!("invalid percent-encoding in {raw:?}: {e}")))
}

/// A resource path split into its parts.
#[derive(Debug, PartialEq)]
struct ResourcePath<'a> {
    set: &'a str,
    key: Option<&'a str>,
    tail: Vec<&'a str>,
}

impl<'a> ResourcePath<'a> {
    fn parse(path: &'a str) -> ODataResult<Self> {
        let set_end = path.find(['(', '/']).unwrap_or(path.len());
        let set = &path[..set_end];
        if set.is_empty() {
            return Err(ODataError::BadRequest(format!("no entity set in {path:?}")));
        }
        let mut rest = &path[set_end..];
        let mut key = None;
        if let Some(inner) = rest.strip_prefix('(') {
            let close = unquoted(inner)
                .find(|(_, c)| *c == ')')
                .map(|(i, _)| i)
                .ok_or_else(|| ODataError::BadRequest(format!("unclosed key predicate in {path:?}")))?;
            key = Some(&inner[..close]);
            rest = &inner[close + 1..];
        }
        if !rest.is_empty() && !rest.starts_with('/') {
            return Err(ODataError::BadRequest(format!("malformed resource path {path:?}")));
        }
        let tail = rest.split('/').filter(|s| !s.is_empty()).collect();
        Ok(Self { set, key, tail })
    }
}

/// Characters of `s` that are outside single-quoted literals.
fn unquoted(s: &str) -> impl Iterator<Item = (usize, char)> + '_ {
    let mut quoted = false;
    s.char_indices().filter(move |(_, c)| {
        if *c == '\'' {
            quoted = !quoted;
            return false;
        }
        !quoted
    })
}

fn split_unquoted(s: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    for (i, _) in unquoted(s).filter(|(_, c)| *c == separator) {
        parts.push(&s[start..i]);
        start = i + separator.len_utf8();
    }
    parts.push(&s[start..]);
    parts
}

fn key_predicates(ty: &EntityType, raw: &str) -> ODataResult<Vec<(String, SqlValue)>> {
    let keys: Vec<_> = ty.key_properties().collect();
    if keys.is_empty() {
        return Err(ODataError::BadRequest(format!("{} has no key", ty.fqn())));
    }
    let parts = split_unquoted(raw, ',');
    if let [single] = parts.as_slice() {
        if split_unquoted(single, '=').len() == 1 {
            let [key] = keys.as_slice() else {
                return Err(ODataError::BadRequest(format!("{} needs named key values", ty.fqn())));
            };
            return Ok(vec![(key.name.clone(), literal(single, key.edm_type)?)]);
        }
    }

    let mut predicates = Vec::with_capacity(parts.len());
    for part in parts {
        let (name, value) = part
            .split_once('=')
            .ok_or_else(|| ODataError::BadRequest(format!("malformed key predicate {part:?}")))?;
        let name = name.trim();
        let key = keys
            .iter()
            .find(|k| k.name == name)
            .ok_or_else(|| ODataError::BadRequest(format!("{name} is not a key of {}", ty.fqn())))?;
        predicates.push((key.name.clone(), literal(value, key.edm_type)?));
    }
    Ok(predicates)
}

/// Parses a URI literal of the given type.
fn literal(raw: &str, edm_type: EdmSimpleType) -> ODataResult<SqlValue> {
    let raw = raw.trim();
    let invalid = || ODataError::BadRequest(format!("invalid {edm_type} literal {raw}"));
    if raw == "null" {
        return Ok(SqlValue::Null);
    }
    match edm_type {
        EdmSimpleType::String => unquote(raw).map(SqlValue::Text).ok_or_else(invalid),
        EdmSimpleType::Guid | EdmSimpleType::DateTime | EdmSimpleType::Time => {
            let prefix = match edm_type {
                EdmSimpleType::Guid => "guid",
                EdmSimpleType::DateTime => "datetime",
                _ => "time",
            };
            let quoted = match raw.get(..prefix.len()) {
                Some(head) if head.eq_ignore_ascii_case(prefix) => &raw[prefix.len()..],
                _ => raw,
            };
            unquote(quoted).map(SqlValue::Text).ok_or_else(invalid)
        }
        EdmSimpleType::Boolean => raw.parse().map(SqlValue::Bool).map_err(|_| invalid()),
        EdmSimpleType::Byte | EdmSimpleType::Int16 | EdmSimpleType::Int32 | EdmSimpleType::Int64 => raw
            .trim_end_matches(['L', 'l'])
            .parse()
            .map(SqlValue::Integer)
            .map_err(|_| invalid()),
        EdmSimpleType::Single | EdmSimpleType::Double | EdmSimpleType::Decimal => raw
            .trim_end_matches(['d', 'D', 'f', 'F', 'm', 'M'])
            .parse()
            .map(SqlValue::Double)
            .map_err(|_| invalid()),
        EdmSimpleType::Binary => Err(ODataError::NotImplemented(format!("binary literal {raw}"))),
    }
}

fn unquote(raw: &str) -> Option<String> {
    let inner = raw.strip_prefix('\'')?.strip_suffix('\'')?;
    Some(inner.replace("''", "'"))
}

fn apply_options(edm: &dyn EdmProvider, mut uri: UriInfo, query: &str) -> ODataResult<UriInfo> {
    for option in query.split('&').filter(|o| !o.is_empty()) {
        let (name, raw) = option.split_once('=').unwrap_or((option, ""));
        let name = decode(name)?;
        let value = decode(raw)?;
        let number = |value: &str| {
            value
                .trim()
                .parse::<u32>()
                .map_err(|_| ODataError::BadRequest(format!("{name} must be a non-negative integer")))
        };
        uri = match name.as_str() {
            "$filter" => uri.with_filter(value),
            "$orderby" => uri.with_order_by(value),
            "$top" => uri.with_top(number(&value)?),
            "$skip" => uri.with_skip(number(&value)?),
            "$skiptoken" => uri.with_skip_token(value),
            "$select" => uri.with_select(value.split(',').map(str::trim).filter(|s| !s.is_empty())),
            "$expand" => {
                for path in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                    let path = edm.expand_path(uri.target_type(), path)?;
                    uri = uri.with_expand(path);
                }
                uri
            }
            "$inlinecount" => match value.as_str() {
                "allpages" => uri.with_inline_count(),
                "none" => uri,
                other => return Err(ODataError::BadRequest(format!("$inlinecount={other}"))),
            },
            "$format" if value.eq_ignore_ascii_case("json") => uri,
            "$format" => return Err(ODataError::NotImplemented(format!("$format={value}"))),
            system if system.starts_with('$') => {
                return Err(ODataError::BadRequest(format!("unknown system query option {system}")))
            }
            _ => uri,
        };
    }
    Ok(uri)
}

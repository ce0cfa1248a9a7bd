//! A small `$filter` and `$orderby` translator.
//!
//! Supports conjunctions of comparisons between a simple property and a
//! literal, e.g. `Make eq 'BMW' and Year ge 2018`. That is enough to drive
//! the processor in tests; anything richer is rejected.

use odsql_core::{EdmSimpleType, EntityType, ODataError, ODataResult, Property};
use odsql_datasource::{SqlValue, StatementParam};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Text(String),
}

fn tokenize(input: &str) -> ODataResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == '\'' {
            chars.next();
            let mut text = String::new();
            loop {
                match chars.next() {
                    Some('\'') if chars.peek() == Some(&'\'') => {
                        chars.next();
                        text.push('\'');
                    }
                    Some('\'') => break,
                    Some(c) => text.push(c),
                    None => return Err(ODataError::BadRequest(format!("unterminated string in {input:?}"))),
                }
            }
            tokens.push(Token::Text(text));
        } else {
            let mut word = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() || c == '\'' {
                    break;
                }
                word.push(c);
                chars.next();
            }
            tokens.push(Token::Word(word));
        }
    }
    Ok(tokens)
}

fn comparison(op: &str) -> ODataResult<&'static str> {
    Ok(match op {
        "eq" => "=",
        "ne" => "<>",
        "gt" => ">",
        "ge" => ">=",
        "lt" => "<",
        "le" => "<=",
        other => return Err(ODataError::NotImplemented(format!("$filter operator {other}"))),
    })
}

fn literal(token: Token, edm_type: EdmSimpleType, property: &str) -> ODataResult<SqlValue> {
    let invalid = |text: &str| ODataError::BadRequest(format!("invalid literal {text} for {property}"));
    let word = match token {
        Token::Text(text) => {
            return match edm_type {
                EdmSimpleType::String | EdmSimpleType::Guid | EdmSimpleType::DateTime | EdmSimpleType::Time => {
                    Ok(SqlValue::Text(text))
                }
                _ => Err(invalid(&text)),
            }
        }
        Token::Word(word) => word,
    };
    if word == "null" {
        return Ok(SqlValue::Null);
    }
    match edm_type {
        EdmSimpleType::Boolean => word.parse().map(SqlValue::Bool).map_err(|_| invalid(&word)),
        EdmSimpleType::Byte | EdmSimpleType::Int16 | EdmSimpleType::Int32 | EdmSimpleType::Int64 => word
            .trim_end_matches(['L', 'l'])
            .parse()
            .map(SqlValue::Integer)
            .map_err(|_| invalid(&word)),
        EdmSimpleType::Single | EdmSimpleType::Double | EdmSimpleType::Decimal => word
            .trim_end_matches(['M', 'm', 'd', 'D', 'f', 'F'])
            .parse()
            .map(SqlValue::Double)
            .map_err(|_| invalid(&word)),
        _ => Err(invalid(&word)),
    }
}

/// Translates a `$filter` expression into a SQL condition and its parameters.
///
/// `column` maps a property name to its qualified column.
///
/// # Errors
///
/// Returns a bad request for malformed expressions or unknown properties,
/// and not implemented for operators outside the supported subset.
pub fn translate_filter<F>(filter: &str, ty: &EntityType, column: F) -> ODataResult<(String, Vec<StatementParam>)>
where
    F: Fn(&str) -> String,
{
    let malformed = || ODataError::BadRequest(format!("malformed $filter: {filter:?}"));
    let mut tokens = tokenize(filter)?.into_iter();
    let mut clauses = Vec::new();
    let mut params = Vec::new();
    loop {
        let Some(Token::Word(name)) = tokens.next() else {
            return Err(malformed());
        };
        let property = match ty.property(&name) {
            Some(Property::Simple(p)) => p,
            _ => return Err(ODataError::BadRequest(format!("cannot filter on {name} of {}", ty.fqn()))),
        };
        let Some(Token::Word(op)) = tokens.next() else {
            return Err(malformed());
        };
        let op = op.to_ascii_lowercase();
        let value = literal(tokens.next().ok_or_else(malformed)?, property.edm_type, &name)?;
        let column = column(&property.name);
        match (op.as_str(), value) {
            ("eq", SqlValue::Null) => clauses.push(format!("{column} IS NULL")),
            ("ne", SqlValue::Null) => clauses.push(format!("{column} IS NOT NULL")),
            (_, SqlValue::Null) => {
                return Err(ODataError::BadRequest(format!("null compared with {op} in {filter:?}")))
            }
            (op, value) => {
                clauses.push(format!("{column} {} ?", comparison(op)?));
                params.push(StatementParam::new(value, property.edm_type.sql_type()));
            }
        }
        match tokens.next() {
            None => break,
            Some(Token::Word(w)) if w.eq_ignore_ascii_case("and") => {}
            Some(_) => return Err(ODataError::NotImplemented(format!("$filter expression {filter:?}"))),
        }
    }
    Ok((clauses.join(" AND "), params))
}

/// Translates `$orderby`, e.g. `Price desc, Make`, into ORDER BY terms.
///
/// # Errors
///
/// Returns a bad request for unknown properties or directions.
pub fn translate_order_by<F>(order_by: &str, ty: &EntityType, column: F) -> ODataResult<Vec<String>>
where
    F: Fn(&str) -> String,
{
    let mut terms = Vec::new();
    for item in order_by.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let mut parts = item.split_whitespace();
        let name = parts.next().unwrap_or_default();
        if !matches!(ty.property(name), Some(Property::Simple(_))) {
            return Err(ODataError::BadRequest(format!("cannot order by {name} of {}", ty.fqn())));
        }
        let direction = match parts.next().map(str::to_ascii_lowercase).as_deref() {
            None | Some("asc") => "ASC",
            Some("desc") => "DESC",
            Some(other) => return Err(ODataError::BadRequest(format!("unknown sort direction {other}"))),
        };
        terms.push(format!("{} {direction}", column(name)));
    }
    Ok(terms)
}

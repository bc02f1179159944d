//! Natural-key filters, canonical comparison and link construction

use super::kind::{KindDescriptor, LiteralType};
use crate::{Error, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

/// Build the `$filter` expression matching `attributes` on the natural key
///
/// String literals are single-quoted with embedded quotes doubled, so names
/// containing `'` cannot break out of the literal.
pub fn natural_key_filter(
    descriptor: &KindDescriptor,
    attributes: &Map<String, Value>,
) -> Result<String> {
    let mut clauses = Vec::with_capacity(descriptor.natural_key.len());

    for key in descriptor.natural_key {
        let value = attributes.get(key.name).ok_or_else(|| {
            Error::invalid_metadata(format!(
                "{} entity is missing natural key field '{}'",
                descriptor.collection, key.name
            ))
        })?;

        let literal = match key.literal {
            LiteralType::Text => text_literal(value),
            LiteralType::DateTime => datetime_literal(value),
        }
        .ok_or_else(|| {
            Error::invalid_metadata(format!(
                "{} field '{}' cannot be used in a filter: {}",
                descriptor.collection, key.name, value
            ))
        })?;

        clauses.push(format!("{} eq {}", key.name, literal));
    }

    Ok(clauses.join(" and "))
}

/// Quote a string for a filter expression
pub fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn text_literal(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(quote(s)),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some("null".to_string()),
        Value::Array(_) | Value::Object(_) => None,
    }
}

fn datetime_literal(value: &Value) -> Option<String> {
    let instant = parse_instant(value.as_str()?)?;
    Some(instant.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

fn parse_instant(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Whether the local entity's canonical fields match the remote record
///
/// Only canonical fields the local entity carries are compared, so defaults
/// the store fills in do not cause a mismatch. Values compare structurally
/// (object key order never matters); numbers compare by value and RFC 3339
/// strings by instant.
pub fn canonical_matches(
    descriptor: &KindDescriptor,
    local: &Map<String, Value>,
    remote: &Map<String, Value>,
) -> bool {
    descriptor
        .canonical_fields
        .iter()
        .filter_map(|field| local.get(*field).map(|value| (field, value)))
        .all(|(field, value)| {
            let remote_value = remote.get(*field).unwrap_or(&Value::Null);
            normalized_eq(value, remote_value)
        })
}

/// Canonical subset of `attributes` used as an update body
pub fn canonical_subset(
    descriptor: &KindDescriptor,
    attributes: &Map<String, Value>,
) -> Map<String, Value> {
    descriptor
        .canonical_fields
        .iter()
        .filter_map(|field| {
            attributes
                .get(*field)
                .map(|value| (field.to_string(), value.clone()))
        })
        .collect()
}

/// Structural equality tolerant of number and timestamp representation
pub fn normalized_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::String(x), Value::String(y)) => {
            x == y
                || matches!(
                    (parse_instant(x), parse_instant(y)),
                    (Some(p), Some(q)) if p == q
                )
        }
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| normalized_eq(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| normalized_eq(x, y)))
        }
        _ => a == b,
    }
}

/// URL of a top-level collection
pub fn collection_url(base_url: &str, collection: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), collection)
}

/// URL of a child collection below a parent entity
///
/// Parent links normally end in the identifier parenthesis
/// (`.../Things(5)`); a link without it is completed from `parent_id`.
pub fn nested_collection_url(parent_link: &str, parent_id: &Value, child: &str) -> String {
    let link = parent_link.trim_end_matches('/');
    if link.ends_with(')') {
        format!("{}/{}", link, child)
    } else {
        format!("{}({})/{}", link, id_literal(parent_id), child)
    }
}

/// Link to one entity of a collection
pub fn entity_url(collection_url: &str, id: &Value) -> String {
    format!("{}({})", collection_url.trim_end_matches('/'), id_literal(id))
}

/// Identifier as written inside a resource path parenthesis
pub fn id_literal(id: &Value) -> String {
    match id {
        Value::String(s) => quote(s),
        other => other.to_string(),
    }
}

/// Recover an identifier from an entity URL such as `.../Things(42)`
pub fn id_from_link(link: &str) -> Option<Value> {
    static ID_PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = ID_PATTERN.get_or_init(|| {
        Regex::new(r"\(([^()]*)\)/?$").expect("identifier pattern is valid")
    });

    let raw = pattern.captures(link.trim())?.get(1)?.as_str();
    if let Some(quoted) = raw.strip_prefix('\'').and_then(|r| r.strip_suffix('\'')) {
        return Some(Value::String(quoted.replace("''", "'")));
    }
    match raw.parse::<i64>() {
        Ok(n) => Some(Value::from(n)),
        Err(_) if raw.is_empty() => None,
        Err(_) => Some(Value::String(raw.to_string())),
    }
}

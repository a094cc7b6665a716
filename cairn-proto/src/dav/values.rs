use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use cairn_dav::deadtypes::{DeadValue, PropertyName};
use cairn_repo::property::{
    Namespace, PropertyTypeDefinition, PropertyValue, QualifiedName, Value, ValueType,
};

use super::codec::HTTP_DATE;

const DATE: &str = "%Y-%m-%d";

// Repository properties in the default namespace travel in DAV:
// and elements without namespace are kept under an empty URI.

pub(crate) fn qualified(name: &PropertyName) -> QualifiedName {
    let namespace = match name.namespace.as_deref() {
        Some("DAV:") => Namespace::Default,
        Some(uri) => Namespace::Uri(uri.to_string()),
        None => Namespace::Uri(String::new()),
    };
    QualifiedName::new(namespace, name.name.clone())
}

pub(crate) fn wire_name(name: &QualifiedName) -> PropertyName {
    match &name.namespace {
        Namespace::Default => PropertyName::new(Some("DAV:"), &name.name),
        Namespace::Uri(uri) if uri.is_empty() => PropertyName::new(None, &name.name),
        Namespace::Uri(uri) => PropertyName::new(Some(uri), &name.name),
    }
}

pub(crate) fn format(value: &Value) -> String {
    match value {
        Value::String(s) | Value::Xml(s) => s.clone(),
        Value::Integer(i) => i.to_string(),
        Value::Boolean(b) => b.to_string(),
        Value::Timestamp(t) => t.format(HTTP_DATE).to_string(),
        Value::Date(d) => d.format(DATE).to_string(),
    }
}

pub(crate) fn to_dead(value: &PropertyValue) -> DeadValue {
    match value {
        PropertyValue::Single(Value::Xml(markup)) => DeadValue::Xml(markup.clone()),
        PropertyValue::Single(v) => DeadValue::Text(format(v)),
        PropertyValue::Multiple(vs) => DeadValue::List(vs.iter().map(format).collect()),
    }
}

/// Convert what a client sent into the value stored by the repository.
///
/// Without definition (or with an untyped one) the value is kept as
/// received. The error is the message of the constraint violation.
pub(crate) fn convert(
    name: &QualifiedName,
    definition: Option<&PropertyTypeDefinition>,
    dead: &DeadValue,
) -> Result<PropertyValue, String> {
    let def = match definition {
        Some(d) if d.value_type != ValueType::Untyped => d,
        _ => {
            return Ok(match dead {
                DeadValue::Text(t) => PropertyValue::Single(Value::String(t.clone())),
                DeadValue::Xml(x) => PropertyValue::Single(Value::Xml(x.clone())),
                DeadValue::List(items) => PropertyValue::Multiple(
                    items.iter().cloned().map(Value::String).collect(),
                ),
            })
        }
    };

    let raw: Vec<&str> = match dead {
        DeadValue::List(items) => items.iter().map(|s| s.trim()).collect(),
        DeadValue::Text(t) if def.multiple => t
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect(),
        DeadValue::Text(t) => vec![t.trim()],
        DeadValue::Xml(_) => return Err(format!("{} does not accept markup", name.name)),
    };

    let values = raw
        .into_iter()
        .map(|r| typed(def.value_type, r).ok_or_else(|| invalid(name, def.value_type, r)))
        .collect::<Result<Vec<_>, _>>()?;

    if def.multiple {
        return Ok(PropertyValue::Multiple(values));
    }
    match <[Value; 1]>::try_from(values) {
        Ok([single]) => Ok(PropertyValue::Single(single)),
        Err(_) => Err(format!("{} takes a single value", name.name)),
    }
}

fn invalid(name: &QualifiedName, value_type: ValueType, raw: &str) -> String {
    let expected = match value_type {
        ValueType::String | ValueType::Untyped => "string",
        ValueType::Integer => "integer",
        ValueType::Boolean => "boolean",
        ValueType::Timestamp => "timestamp",
        ValueType::Date => "date",
    };
    format!("'{}' is not a valid {} for {}", raw, expected, name.name)
}

fn typed(value_type: ValueType, raw: &str) -> Option<Value> {
    match value_type {
        ValueType::String | ValueType::Untyped => Some(Value::String(raw.to_string())),
        ValueType::Integer => raw.parse().ok().map(Value::Integer),
        ValueType::Boolean => match raw {
            "true" | "1" => Some(Value::Boolean(true)),
            "false" | "0" => Some(Value::Boolean(false)),
            _ => None,
        },
        ValueType::Timestamp => parse_timestamp(raw).map(Value::Timestamp),
        ValueType::Date => parse_date(raw).map(Value::Date),
    }
}

/// HTTP-date first, then the usual suspects
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = NaiveDateTime::parse_from_str(raw, HTTP_DATE) {
        return Some(t.and_utc());
    }
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t.with_timezone(&Utc));
    }
    if let Ok(t) = DateTime::parse_from_rfc2822(raw) {
        return Some(t.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(t) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(t.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, DATE)
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|t| t.and_utc())
}

pub(crate) fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, DATE)
        .ok()
        .or_else(|| parse_timestamp(raw).map(|t| t.date_naive()))
}

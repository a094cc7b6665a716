use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};

use cairn_user::config::{PropertyTypeConfig, ValueTypeConfig};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Namespace {
    /// The repository's own namespace
    Default,
    Uri(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QualifiedName {
    pub namespace: Namespace,
    pub name: String,
}

impl QualifiedName {
    pub fn new(namespace: Namespace, name: impl Into<String>) -> Self {
        Self {
            namespace,
            name: name.into(),
        }
    }

    pub fn default_ns(name: impl Into<String>) -> Self {
        Self::new(Namespace::Default, name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Integer(i64),
    Boolean(bool),
    Timestamp(DateTime<Utc>),
    Date(NaiveDate),
    /// Markup of an untyped property, stored as received
    Xml(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Single(Value),
    Multiple(Vec<Value>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub name: QualifiedName,
    pub value: PropertyValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    String,
    Integer,
    Boolean,
    Timestamp,
    Date,
    Untyped,
}

impl From<ValueTypeConfig> for ValueType {
    fn from(value: ValueTypeConfig) -> Self {
        match value {
            ValueTypeConfig::String => Self::String,
            ValueTypeConfig::Integer => Self::Integer,
            ValueTypeConfig::Boolean => Self::Boolean,
            ValueTypeConfig::Timestamp => Self::Timestamp,
            ValueTypeConfig::Date => Self::Date,
            ValueTypeConfig::Untyped => Self::Untyped,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyTypeDefinition {
    pub name: QualifiedName,
    pub value_type: ValueType,
    pub multiple: bool,
    /// Protected properties can't be changed by clients
    pub protected: bool,
}

/// Declared types of the controlled properties.
/// A property without definition is uncontrolled.
pub trait TypeRegistry: Send + Sync {
    fn definition(&self, name: &QualifiedName) -> Option<&PropertyTypeDefinition>;
}

#[derive(Default)]
pub struct StaticTypeRegistry {
    definitions: HashMap<QualifiedName, PropertyTypeDefinition>,
}

impl StaticTypeRegistry {
    pub fn new(definitions: impl IntoIterator<Item = PropertyTypeDefinition>) -> Self {
        Self {
            definitions: definitions
                .into_iter()
                .map(|d| (d.name.clone(), d))
                .collect(),
        }
    }

    pub fn from_config(config: &[PropertyTypeConfig]) -> Self {
        Self::new(config.iter().map(|c| PropertyTypeDefinition {
            name: QualifiedName::new(
                match &c.namespace {
                    Some(uri) => Namespace::Uri(uri.clone()),
                    None => Namespace::Default,
                },
                c.name.clone(),
            ),
            value_type: c.value_type.into(),
            multiple: c.multiple,
            protected: c.protected,
        }))
    }
}

impl TypeRegistry for StaticTypeRegistry {
    fn definition(&self, name: &QualifiedName) -> Option<&PropertyTypeDefinition> {
        self.definitions.get(name)
    }
}

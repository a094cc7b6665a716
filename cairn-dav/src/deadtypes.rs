use super::realization::Repo;
use super::types::Named;

// Dead properties: any element a client sends in a PROPPATCH
// is kept and returned verbatim by PROPFIND.

/// Qualified name of a property.
///
/// `namespace` is `None` for elements in no namespace (`xmlns=""`).
#[derive(Debug, PartialEq, Eq, Hash, Clone, PartialOrd, Ord)]
pub struct PropertyName {
    pub namespace: Option<String>,
    pub name: String,
}

impl PropertyName {
    pub fn new(namespace: Option<&str>, name: &str) -> Self {
        Self {
            namespace: namespace.map(str::to_string),
            name: name.to_string(),
        }
    }

    pub fn is_dav(&self) -> bool {
        self.namespace.as_deref() == Some("DAV:")
    }
}

impl std::fmt::Display for PropertyName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{{{}}}{}", ns, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// What a dead property element contains
#[derive(Debug, PartialEq, Clone)]
pub enum DeadValue {
    /// Character data only
    Text(String),
    /// A `<V:values>` list, one `<V:value>` per item
    List(Vec<String>),
    /// Arbitrary child elements, kept as markup
    Xml(String),
}

#[derive(Debug, PartialEq, Clone)]
pub struct DeadProperty {
    pub name: PropertyName,
    pub value: DeadValue,
}

impl Named<Repo> for DeadProperty {
    fn name(&self) -> PropertyName {
        self.name.clone()
    }
}

#[derive(Debug, PartialEq, Clone)]
pub enum Violation {
    /// A value does not fit the type registered for its property
    ConstraintViolation(String),
}

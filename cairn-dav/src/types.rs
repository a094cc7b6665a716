use chrono::{DateTime, FixedOffset};

use super::xml;

/// It's how we implement a DAV extension
/// (a vocabulary of properties, errors and resource types)
pub trait Extension: std::fmt::Debug + PartialEq + Clone {
    type Error: xml::Node<Self::Error>;
    type Property: xml::Node<Self::Property>;
    type PropertyRequest: xml::Node<Self::PropertyRequest>;
    type ResourceType: xml::Node<Self::ResourceType>;
}

/// 14.1.  activelock XML Element
///
/// Describes a lock on a resource.
/// <!ELEMENT activelock (lockscope, locktype, depth, owner?, timeout?,
///           locktoken?, lockroot)>
#[derive(Debug, PartialEq, Clone)]
pub struct ActiveLock {
    pub lockscope: LockScope,
    pub locktype: LockType,
    pub depth: Depth,
    pub owner: Option<Owner>,
    pub timeout: Option<Timeout>,
    pub locktoken: Option<LockToken>,
    pub lockroot: LockRoot,
}

/// 14.4 depth XML Element
///
/// Value: "0" | "1" | "infinity"
#[derive(Debug, PartialEq, Clone)]
pub enum Depth {
    Zero,
    One,
    Infinity,
}

/// 14.5 error XML Element
///
/// Error responses, particularly 403 Forbidden and 409 Conflict,
/// sometimes need more information to indicate what went wrong.
/// The body carries one element per violated precondition or
/// postcondition.
#[derive(Debug, PartialEq, Clone)]
pub struct Error<E: Extension>(pub Vec<Violation<E>>);

/// Preconditions and postconditions of RFC 4918 §16
#[derive(Debug, PartialEq, Clone)]
pub enum Violation<E: Extension> {
    /// (DAV:lock-token-matches-request-uri) UNLOCK with a token
    /// that does not lock the Request-URI
    LockTokenMatchesRequestUri,

    /// (DAV:lock-token-submitted) a lock token should have been
    /// submitted for the listed resources
    LockTokenSubmitted(Vec<Href>),

    /// (DAV:no-conflicting-lock) a LOCK request failed due the
    /// presence of an already existing conflicting lock
    NoConflictingLock(Vec<Href>),

    /// (DAV:no-external-entities)
    NoExternalEntities,

    /// (DAV:preserved-live-properties)
    PreservedLiveProperties,

    /// (DAV:propfind-finite-depth) the server refuses `Depth: infinity`
    /// on this collection
    PropfindFiniteDepth,

    /// (DAV:cannot-modify-protected-property) the client attempted to
    /// set a protected property in a PROPPATCH
    CannotModifyProtectedProperty,

    /// Violations defined by an extension
    Extension(E::Error),
}

/// 14.7.  href XML Element
#[derive(Debug, PartialEq, Clone)]
pub struct Href(pub String);

/// 14.8.  include XML Element
///
/// Any child element represents the name of a property to be
/// included in the PROPFIND response.
#[derive(Debug, PartialEq, Clone)]
pub struct Include<E: Extension>(pub Vec<PropertyRequest<E>>);

/// 14.9.  location XML Element
#[derive(Debug, PartialEq, Clone)]
pub struct Location(pub Href);

/// 14.10.  lockentry XML Element
#[derive(Debug, PartialEq, Clone)]
pub struct LockEntry {
    pub lockscope: LockScope,
    pub locktype: LockType,
}

/// 14.11.  lockinfo XML Element
///
/// Body of a LOCK request creating a new lock.
#[derive(Debug, PartialEq, Clone)]
pub struct LockInfo {
    pub lockscope: LockScope,
    pub locktype: LockType,
    pub owner: Option<Owner>,
}

/// 14.12.  lockroot XML Element
#[derive(Debug, PartialEq, Clone)]
pub struct LockRoot(pub Href);

/// 14.13.  lockscope XML Element
#[derive(Debug, PartialEq, Clone)]
pub enum LockScope {
    Exclusive,
    Shared,
}

/// 14.14.  locktoken XML Element
#[derive(Debug, PartialEq, Clone)]
pub struct LockToken(pub Href);

/// 14.15.  locktype XML Element
///
/// RFC 4918 only defines write locks.
#[derive(Debug, PartialEq, Clone)]
pub enum LockType {
    Write,
}

/// 14.16.  multistatus XML Element
#[derive(Debug, PartialEq, Clone)]
pub struct Multistatus<E: Extension> {
    pub responses: Vec<Response<E>>,
    pub responsedescription: Option<ResponseDescription>,
}

/// 14.17.  owner XML Element
///
/// The client provides information about itself, we keep it
/// as plain text or as a link.
#[derive(Debug, PartialEq, Clone)]
pub enum Owner {
    Txt(String),
    Href(Href),
    Unknown,
}

/// 14.18.  prop XML Element, when it only names properties
#[derive(Debug, PartialEq, Clone)]
pub struct PropName<E: Extension>(pub Vec<PropertyRequest<E>>);

/// 14.18.  prop XML Element, when it carries values
#[derive(Debug, PartialEq, Clone)]
pub struct PropValue<E: Extension>(pub Vec<Property<E>>);

/// 14.18.  prop XML Element, inside a propstat it can carry names
/// (propname request) or values
#[derive(Debug, PartialEq, Clone)]
pub struct AnyProp<E: Extension>(pub Vec<AnyProperty<E>>);

/// 14.19.  propertyupdate XML Element
///
/// Instructions are applied in document order.
#[derive(Debug, PartialEq, Clone)]
pub struct PropertyUpdate<E: Extension>(pub Vec<PropertyUpdateItem<E>>);

#[derive(Debug, PartialEq, Clone)]
pub enum PropertyUpdateItem<E: Extension> {
    Remove(Remove<E>),
    Set(Set<E>),
}

/// 14.20.  propfind XML Element
#[derive(Debug, PartialEq, Clone)]
pub enum PropFind<E: Extension> {
    PropName,
    AllProp(Option<Include<E>>),
    Prop(PropName<E>),
}

/// 14.22.  propstat XML Element
///
/// Groups together a prop and status element that is associated with
/// a particular 'href' element.
#[derive(Debug, PartialEq, Clone)]
pub struct PropStat<E: Extension> {
    pub prop: AnyProp<E>,
    pub status: Status,
    pub error: Option<Error<E>>,
    pub responsedescription: Option<ResponseDescription>,
}

/// 14.23.  remove XML Element
#[derive(Debug, PartialEq, Clone)]
pub struct Remove<E: Extension>(pub PropName<E>);

/// 14.24.  response XML Element
///
/// Either one status for one or more hrefs,
/// or one href with a propstat per status.
#[derive(Debug, PartialEq, Clone)]
pub enum StatusOrPropstat<E: Extension> {
    Status(Vec<Href>, Status),
    PropStat(Href, Vec<PropStat<E>>),
}

#[derive(Debug, PartialEq, Clone)]
pub struct Response<E: Extension> {
    pub status_or_propstat: StatusOrPropstat<E>,
    pub error: Option<Error<E>>,
    pub responsedescription: Option<ResponseDescription>,
    pub location: Option<Location>,
}

/// 14.25.  responsedescription XML Element
#[derive(Debug, PartialEq, Clone)]
pub struct ResponseDescription(pub String);

/// 14.26.  set XML Element
#[derive(Debug, PartialEq, Clone)]
pub struct Set<E: Extension>(pub PropValue<E>);

/// 14.28.  status XML Element
///
/// Serialized as a status-line, eg. `HTTP/1.1 200 OK`
#[derive(Debug, PartialEq, Clone)]
pub struct Status(pub http::status::StatusCode);

/// 14.29.  timeout XML Element
///
/// The number of seconds remaining before a lock expires,
/// or "Infinite".
#[derive(Debug, PartialEq, Clone)]
pub enum Timeout {
    Seconds(u32),
    Infinite,
}

/// A prop element content inside a multistatus can be a name
/// (PROPFIND propname, properties not found) or a value
#[derive(Debug, PartialEq, Clone)]
pub enum AnyProperty<E: Extension> {
    Request(PropertyRequest<E>),
    Value(Property<E>),
}

/// 15.  DAV Properties, by name
#[derive(Debug, PartialEq, Clone)]
pub enum PropertyRequest<E: Extension> {
    CreationDate,
    DisplayName,
    GetContentLanguage,
    GetContentLength,
    GetContentType,
    GetEtag,
    GetLastModified,
    LockDiscovery,
    ResourceType,
    SupportedLock,
    Extension(E::PropertyRequest),
}

/// 15.  DAV Properties, with their value
#[derive(Debug, PartialEq, Clone)]
pub enum Property<E: Extension> {
    /// 15.1 creationdate, RFC 3339 date-time
    CreationDate(DateTime<FixedOffset>),
    /// 15.2 displayname
    DisplayName(String),
    /// 15.3 getcontentlanguage
    GetContentLanguage(String),
    /// 15.4 getcontentlength
    GetContentLength(u64),
    /// 15.5 getcontenttype
    GetContentType(String),
    /// 15.6 getetag
    GetEtag(String),
    /// 15.7 getlastmodified, rfc1123-date
    GetLastModified(DateTime<FixedOffset>),
    /// 15.8 lockdiscovery
    LockDiscovery(Vec<ActiveLock>),
    /// 15.9 resourcetype, empty for a non-collection resource
    ResourceType(Vec<ResourceType<E>>),
    /// 15.10 supportedlock
    SupportedLock(Vec<LockEntry>),
    Extension(E::Property),
}

#[derive(Debug, PartialEq, Clone)]
pub enum ResourceType<E: Extension> {
    Collection,
    Extension(E::ResourceType),
}

impl<E: Extension> PropertyRequest<E> {
    /// The core property named `name` in the DAV: namespace
    pub fn from_dav_name(name: &str) -> Option<Self> {
        let request = match name {
            "creationdate" => Self::CreationDate,
            "displayname" => Self::DisplayName,
            "getcontentlanguage" => Self::GetContentLanguage,
            "getcontentlength" => Self::GetContentLength,
            "getcontenttype" => Self::GetContentType,
            "getetag" => Self::GetEtag,
            "getlastmodified" => Self::GetLastModified,
            "lockdiscovery" => Self::LockDiscovery,
            "resourcetype" => Self::ResourceType,
            "supportedlock" => Self::SupportedLock,
            _ => return None,
        };
        Some(request)
    }

    /// The local name in the DAV: namespace of the core properties
    pub fn dav_name(&self) -> Option<&'static str> {
        let name = match self {
            Self::CreationDate => "creationdate",
            Self::DisplayName => "displayname",
            Self::GetContentLanguage => "getcontentlanguage",
            Self::GetContentLength => "getcontentlength",
            Self::GetContentType => "getcontenttype",
            Self::GetEtag => "getetag",
            Self::GetLastModified => "getlastmodified",
            Self::LockDiscovery => "lockdiscovery",
            Self::ResourceType => "resourcetype",
            Self::SupportedLock => "supportedlock",
            Self::Extension(_) => return None,
        };
        Some(name)
    }
}

impl<E: Extension> Property<E> {
    /// The name of this property, without its value
    pub fn request(&self) -> PropertyRequest<E>
    where
        E::Property: Named<E>,
    {
        match self {
            Self::CreationDate(_) => PropertyRequest::CreationDate,
            Self::DisplayName(_) => PropertyRequest::DisplayName,
            Self::GetContentLanguage(_) => PropertyRequest::GetContentLanguage,
            Self::GetContentLength(_) => PropertyRequest::GetContentLength,
            Self::GetContentType(_) => PropertyRequest::GetContentType,
            Self::GetEtag(_) => PropertyRequest::GetEtag,
            Self::GetLastModified(_) => PropertyRequest::GetLastModified,
            Self::LockDiscovery(_) => PropertyRequest::LockDiscovery,
            Self::ResourceType(_) => PropertyRequest::ResourceType,
            Self::SupportedLock(_) => PropertyRequest::SupportedLock,
            Self::Extension(ext) => PropertyRequest::Extension(ext.name()),
        }
    }
}

/// Extension properties that know their own name
pub trait Named<E: Extension> {
    fn name(&self) -> E::PropertyRequest;
}

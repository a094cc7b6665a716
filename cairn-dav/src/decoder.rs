use chrono::DateTime;
use quick_xml::events::Event;

use super::error::ParsingError;
use super::types::*;
use super::xml::{IRead, QRead, Reader, DAV_URN};

// ---- Requests ----

impl<E: Extension> QRead<PropFind<E>> for PropFind<E> {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "propfind").await?;
        let propfind = loop {
            match xml.peek_name_in(DAV_URN).as_deref() {
                Some("propname") => {
                    xml.open_any().await?;
                    xml.close().await?;
                    break PropFind::PropName;
                }
                Some("allprop") => {
                    xml.open_any().await?;
                    xml.close().await?;
                    // include is a sibling of allprop
                    break PropFind::AllProp(xml.maybe_find::<Include<E>>().await?);
                }
                Some("prop") => break PropFind::Prop(PropName::qread(xml).await?),
                _ => {
                    if xml.skip_or_end().await? {
                        return Err(ParsingError::MissingChild);
                    }
                }
            }
        };
        xml.close().await?;
        Ok(propfind)
    }
}

impl<E: Extension> QRead<PropertyUpdate<E>> for PropertyUpdate<E> {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "propertyupdate").await?;
        let items = xml.collect::<PropertyUpdateItem<E>>().await?;
        xml.close().await?;
        Ok(PropertyUpdate(items))
    }
}

impl<E: Extension> QRead<PropertyUpdateItem<E>> for PropertyUpdateItem<E> {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        let is_set = match xml.peek_name_in(DAV_URN).as_deref() {
            Some("set") => true,
            Some("remove") => false,
            _ => return Err(ParsingError::Recoverable),
        };

        xml.open_any().await?;
        let item = match is_set {
            true => PropertyUpdateItem::Set(Set(xml.find::<PropValue<E>>().await?)),
            false => PropertyUpdateItem::Remove(Remove(xml.find::<PropName<E>>().await?)),
        };
        xml.close().await?;
        Ok(item)
    }
}

impl<E: Extension> QRead<Set<E>> for Set<E> {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        match PropertyUpdateItem::<E>::qread(xml).await? {
            PropertyUpdateItem::Set(set) => Ok(set),
            PropertyUpdateItem::Remove(_) => Err(ParsingError::WrongToken),
        }
    }
}

impl<E: Extension> QRead<Remove<E>> for Remove<E> {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        match PropertyUpdateItem::<E>::qread(xml).await? {
            PropertyUpdateItem::Remove(remove) => Ok(remove),
            PropertyUpdateItem::Set(_) => Err(ParsingError::WrongToken),
        }
    }
}

impl QRead<LockInfo> for LockInfo {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "lockinfo").await?;
        let (mut lockscope, mut locktype, mut owner) = (None, None, None);
        loop {
            let mut dirty = false;
            xml.maybe_read::<LockScope>(&mut lockscope, &mut dirty).await?;
            xml.maybe_read::<LockType>(&mut locktype, &mut dirty).await?;
            xml.maybe_read::<Owner>(&mut owner, &mut dirty).await?;
            if !dirty && xml.skip_or_end().await? {
                break;
            }
        }
        xml.close().await?;

        Ok(LockInfo {
            lockscope: lockscope.ok_or(ParsingError::MissingChild)?,
            locktype: locktype.ok_or(ParsingError::MissingChild)?,
            owner,
        })
    }
}

impl<E: Extension> QRead<Include<E>> for Include<E> {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "include").await?;
        let names = xml.collect::<PropertyRequest<E>>().await?;
        xml.close().await?;
        Ok(Include(names))
    }
}

// ---- Responses ----

impl<E: Extension> QRead<Multistatus<E>> for Multistatus<E> {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "multistatus").await?;
        let (mut responses, mut responsedescription) = (Vec::new(), None);
        loop {
            let mut dirty = false;
            xml.maybe_push::<Response<E>>(&mut responses, &mut dirty).await?;
            xml.maybe_read::<ResponseDescription>(&mut responsedescription, &mut dirty)
                .await?;
            if !dirty && xml.skip_or_end().await? {
                break;
            }
        }
        xml.close().await?;

        Ok(Multistatus {
            responses,
            responsedescription,
        })
    }
}

impl<E: Extension> QRead<Response<E>> for Response<E> {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "response").await?;
        let (mut hrefs, mut propstats) = (Vec::new(), Vec::new());
        let (mut status, mut error, mut responsedescription, mut location) =
            (None, None, None, None);
        loop {
            let mut dirty = false;
            xml.maybe_push::<Href>(&mut hrefs, &mut dirty).await?;
            xml.maybe_push::<PropStat<E>>(&mut propstats, &mut dirty).await?;
            xml.maybe_read::<Status>(&mut status, &mut dirty).await?;
            xml.maybe_read::<Error<E>>(&mut error, &mut dirty).await?;
            xml.maybe_read::<ResponseDescription>(&mut responsedescription, &mut dirty)
                .await?;
            xml.maybe_read::<Location>(&mut location, &mut dirty).await?;
            if !dirty && xml.skip_or_end().await? {
                break;
            }
        }
        xml.close().await?;

        // Either several hrefs sharing one status, or a single href
        // with its propstats
        let status_or_propstat = match (status, propstats.is_empty()) {
            (Some(status), true) if !hrefs.is_empty() => StatusOrPropstat::Status(hrefs, status),
            (None, false) if hrefs.len() == 1 => {
                let href = hrefs.pop().ok_or(ParsingError::MissingChild)?;
                StatusOrPropstat::PropStat(href, propstats)
            }
            (Some(_), false) => return Err(ParsingError::InvalidValue),
            _ => return Err(ParsingError::MissingChild),
        };

        Ok(Response {
            status_or_propstat,
            error,
            responsedescription,
            location,
        })
    }
}

impl<E: Extension> QRead<PropStat<E>> for PropStat<E> {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "propstat").await?;
        let (mut prop, mut status, mut error, mut responsedescription) = (None, None, None, None);
        loop {
            let mut dirty = false;
            xml.maybe_read::<AnyProp<E>>(&mut prop, &mut dirty).await?;
            xml.maybe_read::<Status>(&mut status, &mut dirty).await?;
            xml.maybe_read::<Error<E>>(&mut error, &mut dirty).await?;
            xml.maybe_read::<ResponseDescription>(&mut responsedescription, &mut dirty)
                .await?;
            if !dirty && xml.skip_or_end().await? {
                break;
            }
        }
        xml.close().await?;

        Ok(PropStat {
            prop: prop.ok_or(ParsingError::MissingChild)?,
            status: status.ok_or(ParsingError::MissingChild)?,
            error,
            responsedescription,
        })
    }
}

impl QRead<Status> for Status {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "status").await?;
        // status-line, e.g. "HTTP/1.1 423 Locked"
        let line = xml.tag_string().await?;
        let code = line
            .split_whitespace()
            .nth(1)
            .and_then(|c| http::status::StatusCode::from_bytes(c.as_bytes()).ok())
            .ok_or(ParsingError::InvalidValue)?;
        xml.close().await?;
        Ok(Status(code))
    }
}

impl QRead<ResponseDescription> for ResponseDescription {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "responsedescription").await?;
        let description = xml.tag_string_or_empty().await?;
        xml.close().await?;
        Ok(ResponseDescription(description))
    }
}

impl QRead<Location> for Location {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        wrapped_href(xml, "location").await.map(Location)
    }
}

impl<E: Extension> QRead<Error<E>> for Error<E> {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "error").await?;
        let violations = xml.collect::<Violation<E>>().await?;
        xml.close().await?;
        Ok(Error(violations))
    }
}

/// Preconditions and postconditions of RFC 4918
const CORE_VIOLATIONS: [&str; 7] = [
    "lock-token-matches-request-uri",
    "lock-token-submitted",
    "no-conflicting-lock",
    "no-external-entities",
    "preserved-live-properties",
    "propfind-finite-depth",
    "cannot-modify-protected-property",
];

impl<E: Extension> QRead<Violation<E>> for Violation<E> {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        let name = match xml.peek_name_in(DAV_URN) {
            Some(name) if CORE_VIOLATIONS.contains(&name.as_str()) => name,
            _ => return E::Error::qread(xml).await.map(Violation::Extension),
        };

        xml.open_any().await?;
        let violation = match name.as_str() {
            "lock-token-matches-request-uri" => Violation::LockTokenMatchesRequestUri,
            "lock-token-submitted" => Violation::LockTokenSubmitted(xml.collect().await?),
            "no-conflicting-lock" => Violation::NoConflictingLock(xml.collect().await?),
            "no-external-entities" => Violation::NoExternalEntities,
            "preserved-live-properties" => Violation::PreservedLiveProperties,
            "propfind-finite-depth" => Violation::PropfindFiniteDepth,
            "cannot-modify-protected-property" => Violation::CannotModifyProtectedProperty,
            _ => return Err(ParsingError::WrongToken),
        };
        xml.close().await?;
        Ok(violation)
    }
}

// ---- Properties ----

impl<E: Extension> QRead<PropName<E>> for PropName<E> {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "prop").await?;
        let names = xml.collect::<PropertyRequest<E>>().await?;
        xml.close().await?;
        Ok(PropName(names))
    }
}

impl<E: Extension> QRead<PropValue<E>> for PropValue<E> {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "prop").await?;
        let values = xml.collect::<Property<E>>().await?;
        xml.close().await?;
        Ok(PropValue(values))
    }
}

impl<E: Extension> QRead<AnyProp<E>> for AnyProp<E> {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "prop").await?;
        let props = xml.collect::<AnyProperty<E>>().await?;
        xml.close().await?;
        Ok(AnyProp(props))
    }
}

impl<E: Extension> QRead<AnyProperty<E>> for AnyProperty<E> {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        // A self-closed element is a name. Extensions accepting any
        // element would otherwise read it as an empty value.
        if let Event::Empty(_) = xml.peek() {
            return PropertyRequest::qread(xml).await.map(Self::Request);
        }

        match Property::qread(xml).await {
            Err(ParsingError::Recoverable) => PropertyRequest::qread(xml).await.map(Self::Request),
            otherwise => otherwise.map(Self::Value),
        }
    }
}

impl<E: Extension> QRead<PropertyRequest<E>> for PropertyRequest<E> {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        let core = xml
            .peek_name_in(DAV_URN)
            .and_then(|name| Self::from_dav_name(&name));
        match core {
            Some(request) => {
                xml.open_any().await?;
                xml.close().await?;
                Ok(request)
            }
            None => E::PropertyRequest::qread(xml)
                .await
                .map(PropertyRequest::Extension),
        }
    }
}

impl<E: Extension> QRead<Property<E>> for Property<E> {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        // Core values are read from elements with content only
        let core = match xml.peek() {
            Event::Start(_) => xml
                .peek_name_in(DAV_URN)
                .and_then(|name| PropertyRequest::<E>::from_dav_name(&name)),
            _ => None,
        };
        let request = match core {
            Some(request) => request,
            None => return E::Property::qread(xml).await.map(Property::Extension),
        };

        xml.open_any().await?;
        let value = match request {
            PropertyRequest::CreationDate => Property::CreationDate(
                DateTime::parse_from_rfc3339(xml.tag_string().await?.trim())?,
            ),
            PropertyRequest::DisplayName => Property::DisplayName(xml.tag_string().await?),
            PropertyRequest::GetContentLanguage => {
                Property::GetContentLanguage(xml.tag_string().await?.trim().to_string())
            }
            PropertyRequest::GetContentLength => {
                Property::GetContentLength(xml.tag_string().await?.trim().parse::<u64>()?)
            }
            PropertyRequest::GetContentType => {
                Property::GetContentType(xml.tag_string().await?.trim().to_string())
            }
            PropertyRequest::GetEtag => Property::GetEtag(xml.tag_string().await?.trim().to_string()),
            PropertyRequest::GetLastModified => Property::GetLastModified(
                DateTime::parse_from_rfc2822(xml.tag_string().await?.trim())?,
            ),
            PropertyRequest::LockDiscovery => Property::LockDiscovery(xml.collect().await?),
            PropertyRequest::ResourceType => Property::ResourceType(xml.collect().await?),
            PropertyRequest::SupportedLock => Property::SupportedLock(xml.collect().await?),
            PropertyRequest::Extension(_) => return Err(ParsingError::WrongToken),
        };
        xml.close().await?;
        Ok(value)
    }
}

impl<E: Extension> QRead<ResourceType<E>> for ResourceType<E> {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        if xml.peek_name_in(DAV_URN).as_deref() == Some("collection") {
            xml.open_any().await?;
            xml.close().await?;
            return Ok(ResourceType::Collection);
        }
        E::ResourceType::qread(xml)
            .await
            .map(ResourceType::Extension)
    }
}

// ---- Locks ----

impl QRead<ActiveLock> for ActiveLock {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "activelock").await?;
        let (mut lockscope, mut locktype, mut depth, mut lockroot) = (None, None, None, None);
        let (mut owner, mut timeout, mut locktoken) = (None, None, None);
        loop {
            let mut dirty = false;
            xml.maybe_read::<LockScope>(&mut lockscope, &mut dirty).await?;
            xml.maybe_read::<LockType>(&mut locktype, &mut dirty).await?;
            xml.maybe_read::<Depth>(&mut depth, &mut dirty).await?;
            xml.maybe_read::<Owner>(&mut owner, &mut dirty).await?;
            xml.maybe_read::<Timeout>(&mut timeout, &mut dirty).await?;
            xml.maybe_read::<LockToken>(&mut locktoken, &mut dirty).await?;
            xml.maybe_read::<LockRoot>(&mut lockroot, &mut dirty).await?;
            if !dirty && xml.skip_or_end().await? {
                break;
            }
        }
        xml.close().await?;

        Ok(ActiveLock {
            lockscope: lockscope.ok_or(ParsingError::MissingChild)?,
            locktype: locktype.ok_or(ParsingError::MissingChild)?,
            depth: depth.ok_or(ParsingError::MissingChild)?,
            owner,
            timeout,
            locktoken,
            lockroot: lockroot.ok_or(ParsingError::MissingChild)?,
        })
    }
}

impl QRead<LockEntry> for LockEntry {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "lockentry").await?;
        let (mut lockscope, mut locktype) = (None, None);
        loop {
            let mut dirty = false;
            xml.maybe_read::<LockScope>(&mut lockscope, &mut dirty).await?;
            xml.maybe_read::<LockType>(&mut locktype, &mut dirty).await?;
            if !dirty && xml.skip_or_end().await? {
                break;
            }
        }
        xml.close().await?;

        Ok(LockEntry {
            lockscope: lockscope.ok_or(ParsingError::MissingChild)?,
            locktype: locktype.ok_or(ParsingError::MissingChild)?,
        })
    }
}

impl QRead<LockScope> for LockScope {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "lockscope").await?;
        let lockscope = loop {
            let scope = match xml.peek_name_in(DAV_URN).as_deref() {
                Some("exclusive") => LockScope::Exclusive,
                Some("shared") => LockScope::Shared,
                _ => {
                    if xml.skip_or_end().await? {
                        return Err(ParsingError::MissingChild);
                    }
                    continue;
                }
            };
            xml.open_any().await?;
            xml.close().await?;
            break scope;
        };
        xml.close().await?;
        Ok(lockscope)
    }
}

impl QRead<LockType> for LockType {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "locktype").await?;
        // write is the only lock type RFC 4918 defines
        while xml.peek_name_in(DAV_URN).as_deref() != Some("write") {
            if matches!(xml.peek(), Event::Start(_) | Event::Empty(_)) {
                tracing::warn!("only write locks are implemented, skipping");
            }
            if xml.skip_or_end().await? {
                return Err(ParsingError::MissingChild);
            }
        }
        xml.open_any().await?;
        xml.close().await?;
        xml.close().await?;
        Ok(LockType::Write)
    }
}

impl QRead<Depth> for Depth {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "depth").await?;
        let raw = xml.tag_string().await?;
        xml.close().await?;

        let depth = match raw.trim() {
            "0" => Depth::Zero,
            "1" => Depth::One,
            v if v.eq_ignore_ascii_case("infinity") => Depth::Infinity,
            _ => return Err(ParsingError::WrongToken),
        };
        Ok(depth)
    }
}

impl QRead<Owner> for Owner {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "owner").await?;

        // An href wins over text, text is only kept when not blank
        let mut owner = Owner::Unknown;
        while xml.parent_has_child() {
            match xml.peek() {
                Event::End(_) => break,
                Event::Text(_) | Event::CData(_) => {
                    let txt = xml.tag_string().await?;
                    let txt = txt.trim();
                    if matches!(owner, Owner::Unknown) && !txt.is_empty() {
                        owner = Owner::Txt(txt.to_string());
                    }
                }
                Event::Start(_) | Event::Empty(_) => {
                    let mut href = None;
                    let mut dirty = false;
                    xml.maybe_read::<Href>(&mut href, &mut dirty).await?;
                    match href {
                        Some(h) => owner = Owner::Href(h),
                        None => {
                            tracing::debug!("owner markup other than href is not kept, skipping");
                            xml.skip().await?;
                        }
                    }
                }
                _ => {
                    xml.skip().await?;
                }
            }
        }

        xml.close().await?;
        Ok(owner)
    }
}

impl QRead<Timeout> for Timeout {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "timeout").await?;
        let raw = xml.tag_string().await?;
        xml.close().await?;

        match raw.trim() {
            "Infinite" => Ok(Timeout::Infinite),
            other => match other.strip_prefix("Second-") {
                Some(secs) => Ok(Timeout::Seconds(secs.parse::<u32>()?)),
                None => Err(ParsingError::InvalidValue),
            },
        }
    }
}

impl QRead<LockToken> for LockToken {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        wrapped_href(xml, "locktoken").await.map(LockToken)
    }
}

impl QRead<LockRoot> for LockRoot {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        wrapped_href(xml, "lockroot").await.map(LockRoot)
    }
}

impl QRead<Href> for Href {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "href").await?;
        let url = xml.tag_string().await?;
        xml.close().await?;
        Ok(Href(url.trim().to_string()))
    }
}

/// `<D:{key}><D:href>...</D:href></D:{key}>`
async fn wrapped_href(xml: &mut Reader<impl IRead>, key: &str) -> Result<Href, ParsingError> {
    xml.open(DAV_URN, key).await?;
    let href = xml.find::<Href>().await?;
    xml.close().await?;
    Ok(href)
}

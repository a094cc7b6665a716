use chrono::{DateTime, Utc};
use hyper::StatusCode;

use cairn_dav::deadtypes::{DeadProperty, PropertyName};
use cairn_dav::realization::Repo;
use cairn_dav::types as dav;
use cairn_repo::property::Namespace;
use cairn_repo::resource::{Depth, Lock, Resource};

use super::values;

/// Mapped properties, always listed first by allprop and propname
pub(crate) const ALLPROP: [dav::PropertyRequest<Repo>; 10] = [
    dav::PropertyRequest::CreationDate,
    dav::PropertyRequest::DisplayName,
    dav::PropertyRequest::GetContentLanguage,
    dav::PropertyRequest::GetContentLength,
    dav::PropertyRequest::GetContentType,
    dav::PropertyRequest::GetEtag,
    dav::PropertyRequest::GetLastModified,
    dav::PropertyRequest::LockDiscovery,
    dav::PropertyRequest::ResourceType,
    dav::PropertyRequest::SupportedLock,
];

/// A requested property and what was found for it on a resource
#[derive(Debug, PartialEq, Clone)]
pub(crate) struct ResolvedProperty {
    pub request: dav::PropertyRequest<Repo>,
    pub value: Option<dav::Property<Repo>>,
}

pub(crate) fn href(res: &Resource) -> dav::Href {
    dav::Href(res.path.to_href(res.is_collection))
}

/// Every property name of a resource: the mapped ones, then the
/// repository properties of the default namespace, then the others
pub(crate) fn all_names(res: &Resource) -> Vec<dav::PropertyRequest<Repo>> {
    let mapped: Vec<&str> = ALLPROP.iter().filter_map(|p| p.dav_name()).collect();

    let (default_ns, others): (Vec<_>, Vec<_>) = res
        .properties
        .iter()
        .map(|p| &p.name)
        .partition(|n| n.namespace == Namespace::Default);

    let custom = default_ns
        .into_iter()
        .filter(|n| !mapped.contains(&n.name.as_str()))
        .chain(others)
        .map(|n| dav::PropertyRequest::Extension(values::wire_name(n)));

    ALLPROP.to_vec().into_iter().chain(custom).collect()
}

pub(crate) fn resolve(
    res: &Resource,
    request: &dav::PropertyRequest<Repo>,
    now: DateTime<Utc>,
) -> ResolvedProperty {
    use dav::PropertyRequest as Req;

    let value = match request {
        Req::CreationDate => Some(dav::Property::CreationDate(res.creation_time.into())),
        Req::DisplayName => Some(dav::Property::DisplayName(res.display_name().to_string())),
        Req::GetContentLanguage => res
            .content_language
            .clone()
            .map(dav::Property::GetContentLanguage),
        Req::GetContentLength => {
            (!res.is_collection).then_some(dav::Property::GetContentLength(res.content_length))
        }
        Req::GetContentType => Some(dav::Property::GetContentType(res.content_type.clone())),
        Req::GetEtag => Some(dav::Property::GetEtag(res.etag.clone())),
        Req::GetLastModified => Some(dav::Property::GetLastModified(res.last_modified.into())),
        Req::LockDiscovery => Some(dav::Property::LockDiscovery(lock_discovery(res, now))),
        Req::ResourceType => Some(dav::Property::ResourceType(match res.is_collection {
            true => vec![dav::ResourceType::Collection],
            false => vec![],
        })),
        Req::SupportedLock => Some(dav::Property::SupportedLock(vec![dav::LockEntry {
            lockscope: dav::LockScope::Exclusive,
            locktype: dav::LockType::Write,
        }])),
        Req::Extension(name) => extension(res, name).map(dav::Property::Extension),
    };

    ResolvedProperty {
        request: request.clone(),
        value,
    }
}

fn extension(res: &Resource, name: &PropertyName) -> Option<DeadProperty> {
    res.property(&values::qualified(name)).map(|p| DeadProperty {
        name: name.clone(),
        value: values::to_dead(&p.value),
    })
}

pub(crate) fn lock_discovery(res: &Resource, now: DateTime<Utc>) -> Vec<dav::ActiveLock> {
    res.active_lock(now)
        .map(|lock| active_lock(lock, res, now))
        .into_iter()
        .collect()
}

fn active_lock(lock: &Lock, res: &Resource, now: DateTime<Utc>) -> dav::ActiveLock {
    // an inherited lock comes from a collection
    let root_is_collection = lock.root != res.path || res.is_collection;
    dav::ActiveLock {
        lockscope: dav::LockScope::Exclusive,
        locktype: dav::LockType::Write,
        depth: match lock.depth {
            Depth::Zero => dav::Depth::Zero,
            Depth::Infinity => dav::Depth::Infinity,
        },
        owner: (!lock.owner_info.is_empty()).then(|| dav::Owner::Txt(lock.owner_info.clone())),
        timeout: Some(match lock.seconds_left(now) {
            Some(secs) => dav::Timeout::Seconds(secs),
            None => dav::Timeout::Infinite,
        }),
        locktoken: Some(dav::LockToken(dav::Href(lock.token.clone()))),
        lockroot: dav::LockRoot(dav::Href(lock.root.to_href(root_is_collection))),
    }
}

/// Group resolved properties by status. Unknown properties are
/// left out when the client did not ask for them by name.
pub(crate) fn propstats(
    resolved: Vec<ResolvedProperty>,
    names_only: bool,
    wildcard: bool,
) -> Vec<dav::PropStat<Repo>> {
    let (found, not_found): (Vec<_>, Vec<_>) =
        resolved.into_iter().partition(|r| r.value.is_some());

    let found: Vec<_> = found
        .into_iter()
        .filter_map(|r| match names_only {
            true => Some(dav::AnyProperty::Request(r.request)),
            false => r.value.map(dav::AnyProperty::Value),
        })
        .collect();
    let not_found: Vec<_> = not_found
        .into_iter()
        .map(|r| dav::AnyProperty::Request(r.request))
        .collect();

    let mut prop_desc = vec![];
    if !found.is_empty() || not_found.is_empty() || wildcard {
        prop_desc.push(propstat(StatusCode::OK, found));
    }
    if !not_found.is_empty() && !wildcard {
        prop_desc.push(propstat(StatusCode::NOT_FOUND, not_found));
    }
    prop_desc
}

fn propstat(status: StatusCode, props: Vec<dav::AnyProperty<Repo>>) -> dav::PropStat<Repo> {
    dav::PropStat {
        prop: dav::AnyProp(props),
        status: dav::Status(status),
        error: None,
        responsedescription: None,
    }
}

/// The entry of one resource in a PROPFIND multistatus
pub(crate) fn propfind_response(
    res: &Resource,
    propfind: &dav::PropFind<Repo>,
    now: DateTime<Utc>,
) -> dav::Response<Repo> {
    let (requests, names_only, wildcard) = match propfind {
        dav::PropFind::PropName => (all_names(res), true, true),
        dav::PropFind::AllProp(None) => (all_names(res), false, true),
        dav::PropFind::AllProp(Some(dav::Include(include))) => {
            let mut names = all_names(res);
            for extra in include {
                if !names.contains(extra) {
                    names.push(extra.clone());
                }
            }
            (names, false, true)
        }
        dav::PropFind::Prop(dav::PropName(names)) => (names.clone(), false, false),
    };

    let resolved = requests.iter().map(|r| resolve(res, r, now)).collect();
    dav::Response {
        status_or_propstat: dav::StatusOrPropstat::PropStat(
            href(res),
            propstats(resolved, names_only, wildcard),
        ),
        error: None,
        responsedescription: None,
        location: None,
    }
}

/// An entry reporting a single status for a path
pub(crate) fn status_response(href: dav::Href, status: StatusCode) -> dav::Response<Repo> {
    dav::Response {
        status_or_propstat: dav::StatusOrPropstat::Status(vec![href], dav::Status(status)),
        error: None,
        responsedescription: None,
        location: None,
    }
}

/// PROPPATCH answer: one 200 propstat per set or remove instruction,
/// naming the properties it touched
pub(crate) fn proppatch_response(
    res: &Resource,
    actions: Vec<Vec<dav::PropertyRequest<Repo>>>,
) -> dav::Multistatus<Repo> {
    let propstats = actions
        .into_iter()
        .map(|names| {
            propstat(
                StatusCode::OK,
                names.into_iter().map(dav::AnyProperty::Request).collect(),
            )
        })
        .collect();

    dav::Multistatus {
        responses: vec![dav::Response {
            status_or_propstat: dav::StatusOrPropstat::PropStat(href(res), propstats),
            error: None,
            responsedescription: None,
            location: None,
        }],
        responsedescription: None,
    }
}

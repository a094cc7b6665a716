use chrono::Utc;
use hyper::header::HeaderMap;

use cairn_dav::ifheader::{self, ETagMatch, HeaderError, IfHeader, IfList, Subject};
use cairn_repo::resource::Resource;
use cairn_repo::Path;

use super::codec::href_path;

/// Outcome of the conditions on a write
#[derive(Debug, PartialEq, Clone, Copy)]
pub(crate) enum Precondition {
    Proceed,
    /// The resource is locked and its token was not submitted
    Locked,
    Failed,
}

/// Outcome of If-Match and If-None-Match
#[derive(Debug, PartialEq, Clone, Copy)]
pub(crate) enum EtagCheck {
    Proceed,
    NotModified,
    Failed,
}

/// The conditional headers of one request.
///
/// Parsed once when the request comes in, then handed to
/// the method handler.
#[derive(Debug, Clone)]
pub(crate) struct Conditions {
    /// Untagged lists apply to the request URI only
    target: Path,
    if_header: Option<IfHeader>,
    if_match: Option<ETagMatch>,
    if_none_match: Option<ETagMatch>,
}

impl Conditions {
    pub(crate) fn from_headers(headers: &HeaderMap, target: &Path) -> Result<Self, HeaderError> {
        let raw = |name: &str| -> Result<Option<String>, HeaderError> {
            match headers.get(name) {
                None => Ok(None),
                Some(v) => v
                    .to_str()
                    .map(|s| Some(s.to_string()))
                    .or(Err(HeaderError::Malformed("conditional"))),
            }
        };

        Ok(Self {
            target: target.clone(),
            if_header: raw("If")?.map(|v| ifheader::parse_if(&v)).transpose()?,
            if_match: raw("If-Match")?
                .map(|v| ifheader::parse_etag_match(&v))
                .transpose()?,
            if_none_match: raw("If-None-Match")?
                .map(|v| ifheader::parse_etag_match(&v))
                .transpose()?,
        })
    }

    pub(crate) fn has_if(&self) -> bool {
        self.if_header.is_some()
    }

    fn lists(&self) -> impl Iterator<Item = &IfList> {
        self.if_header.iter().flat_map(|hdr| hdr.0.iter())
    }

    /// Evaluate the If header against the current state of a resource.
    ///
    /// Without any list applying to the resource, the answer is
    /// `!token_required`.
    pub(crate) fn matches(&self, res: &Resource, token_required: bool) -> bool {
        let now = Utc::now();
        let current_token = res.active_lock(now).map(|l| l.token.as_str());

        let mut lists = self.lists().filter(|l| applies_to(l, &self.target, res)).peekable();
        if lists.peek().is_none() {
            return !token_required;
        }

        lists.any(|list| {
            list.conditions.iter().all(|cond| {
                let equal = match &cond.subject {
                    Subject::Token(t) => current_token == Some(t.as_str()),
                    Subject::ETag(e) => ifheader::weak_eq(e, &res.etag),
                };
                equal != cond.negated
            })
        })
    }

    /// The lock token of the resource, when the If header submits it
    pub(crate) fn submitted_token<'a>(&'a self, res: &Resource) -> Option<&'a str> {
        let lock = res.active_lock(Utc::now())?;
        self.lists()
            .filter(|l| applies_to(l, &self.target, res))
            .flat_map(|list| list.conditions.iter())
            .filter(|cond| !cond.negated)
            .find_map(|cond| match &cond.subject {
                Subject::Token(t) if t == &lock.token => Some(t.as_str()),
                _ => None,
            })
    }

    /// Whether a lock token appears, not negated, in any list of the If
    /// header. Used for locks held by other resources than the request
    /// URI: locked members and locked parent collections.
    pub(crate) fn submits_token(&self, token: &str) -> bool {
        self.lists()
            .flat_map(|list| list.conditions.iter())
            .any(|cond| !cond.negated && matches!(&cond.subject, Subject::Token(t) if t == token))
    }

    /// Rules shared by every method changing a resource: a locked
    /// resource needs its token, an If header must hold
    pub(crate) fn check_write(&self, res: &Resource) -> Precondition {
        if res.active_lock(Utc::now()).is_some() {
            if self.matches(res, true) && self.submitted_token(res).is_some() {
                return Precondition::Proceed;
            }
            return Precondition::Locked;
        }

        match self.matches(res, false) {
            true => Precondition::Proceed,
            false => Precondition::Failed,
        }
    }

    /// If-Match and If-None-Match. `safe` methods (GET, HEAD) get a
    /// 304 instead of a 412 when If-None-Match matches.
    pub(crate) fn check_etags(&self, res: Option<&Resource>, safe: bool) -> EtagCheck {
        let current = res.map(|r| r.etag.as_str());

        if let Some(if_match) = &self.if_match {
            if !if_match.matches(current) {
                return EtagCheck::Failed;
            }
        }

        if let Some(if_none_match) = &self.if_none_match {
            if if_none_match.matches(current) {
                return match safe {
                    true => EtagCheck::NotModified,
                    false => EtagCheck::Failed,
                };
            }
        }

        EtagCheck::Proceed
    }
}

/// A tagged list only applies to the resource its tag designates
fn applies_to(list: &IfList, target: &Path, res: &Resource) -> bool {
    match &list.resource {
        None => &res.path == target,
        Some(tag) => href_path(tag).as_ref() == Some(&res.path),
    }
}

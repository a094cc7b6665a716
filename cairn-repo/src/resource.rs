use chrono::{DateTime, Utc};

use cairn_user::login::Principal;

use crate::path::Path;
use crate::property::{Property, QualifiedName};

/// Timeout meaning "never expires", also what a client gets
/// when it asks for `Infinite`
pub const INFINITE_TIMEOUT_SECONDS: u32 = u32::MAX;

/// Owner descriptions longer than this are truncated
pub const MAX_OWNER_INFO: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Depth {
    Zero,
    Infinity,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Lock {
    pub token: String,
    pub owner_info: String,
    pub principal: Principal,
    pub depth: Depth,
    /// `None` for a lock that never expires
    pub expires: Option<DateTime<Utc>>,
    /// The resource the lock was taken on, an ancestor
    /// for inherited locks
    pub root: Path,
}

impl Lock {
    pub fn expires_at(now: DateTime<Utc>, timeout_seconds: u32) -> Option<DateTime<Utc>> {
        match timeout_seconds {
            INFINITE_TIMEOUT_SECONDS => None,
            secs => Some(now + chrono::Duration::seconds(secs.into())),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires, Some(exp) if exp <= now)
    }

    /// Remaining lifetime, `None` when infinite
    pub fn seconds_left(&self, now: DateTime<Utc>) -> Option<u32> {
        self.expires.map(|exp| {
            let left = (exp - now).num_seconds().max(0);
            u32::try_from(left).unwrap_or(INFINITE_TIMEOUT_SECONDS - 1)
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub path: Path,
    pub is_collection: bool,
    pub content_length: u64,
    pub content_type: String,
    pub content_language: Option<String>,
    pub etag: String,
    pub creation_time: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    /// The lock applying to this resource, taken on it or inherited
    /// from an ancestor with an infinite depth. May be expired.
    pub lock: Option<Lock>,
    pub properties: Vec<Property>,
}

impl Resource {
    /// Expired locks are the same as no lock at all
    pub fn active_lock(&self, now: DateTime<Utc>) -> Option<&Lock> {
        self.lock.as_ref().filter(|l| !l.is_expired(now))
    }

    pub fn property(&self, name: &QualifiedName) -> Option<&Property> {
        self.properties.iter().find(|p| &p.name == name)
    }

    /// Replace the property with the same name or append it
    pub fn set_property(&mut self, prop: Property) {
        match self.properties.iter_mut().find(|p| p.name == prop.name) {
            Some(existing) => *existing = prop,
            None => self.properties.push(prop),
        }
    }

    pub fn remove_property(&mut self, name: &QualifiedName) -> bool {
        let before = self.properties.len();
        self.properties.retain(|p| &p.name != name);
        before != self.properties.len()
    }

    pub fn display_name(&self) -> &str {
        self.path.name()
    }
}

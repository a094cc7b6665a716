use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::RngCore;
use tokio::sync::RwLock;

use cairn_user::login::{Principal, SecurityToken};

use crate::error::{Error, Result};
use crate::path::Path;
use crate::property::Property;
use crate::repository::Repository;
use crate::resource::{Depth, Lock, Resource, MAX_OWNER_INFO};

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";
const COLLECTION_CONTENT_TYPE: &str = "httpd/unix-directory";

#[derive(Debug, Clone)]
struct Node {
    is_collection: bool,
    content: Vec<u8>,
    content_type: String,
    content_language: Option<String>,
    etag: String,
    creation_time: DateTime<Utc>,
    last_modified: DateTime<Utc>,
    lock: Option<Lock>,
    properties: Vec<Property>,
}

struct State {
    nodes: BTreeMap<Path, Node>,
    revision: u64,
}

impl State {
    fn next_etag(&mut self) -> String {
        self.revision += 1;
        format!("\"{:016x}\"", self.revision)
    }

    fn new_node(&mut self, is_collection: bool, now: DateTime<Utc>) -> Node {
        Node {
            is_collection,
            content: vec![],
            content_type: match is_collection {
                true => COLLECTION_CONTENT_TYPE.into(),
                false => DEFAULT_CONTENT_TYPE.into(),
            },
            content_language: None,
            etag: self.next_etag(),
            creation_time: now,
            last_modified: now,
            lock: None,
            properties: vec![],
        }
    }

    fn node(&self, path: &Path) -> Result<&Node> {
        self.nodes.get(path).ok_or(Error::NotFound)
    }

    fn node_mut(&mut self, path: &Path) -> Result<&mut Node> {
        self.nodes.get_mut(path).ok_or(Error::NotFound)
    }

    /// The lock set on this node, or the closest one set with an
    /// infinite depth on an ancestor
    fn effective_lock(&self, path: &Path, now: DateTime<Utc>) -> Option<&Lock> {
        let own = self
            .nodes
            .get(path)
            .and_then(|n| n.lock.as_ref())
            .filter(|l| !l.is_expired(now));
        if own.is_some() {
            return own;
        }

        let mut cursor = path.parent();
        while let Some(p) = cursor {
            let inherited = self
                .nodes
                .get(&p)
                .and_then(|n| n.lock.as_ref())
                .filter(|l| !l.is_expired(now) && l.depth == Depth::Infinity);
            if inherited.is_some() {
                return inherited;
            }
            cursor = p.parent();
        }
        None
    }

    fn check_unlocked(&self, path: &Path, who: &Principal, now: DateTime<Utc>) -> Result<()> {
        match self.effective_lock(path, now) {
            Some(lock) if &lock.principal != who => {
                tracing::debug!(path=%path, holder=%lock.principal, "blocked by lock");
                Err(Error::Locked)
            }
            _ => Ok(()),
        }
    }

    /// Members locked by someone else, the node itself excluded
    fn locked_descendants(&self, path: &Path, who: &Principal, now: DateTime<Utc>) -> Vec<Path> {
        self.subtree(path)
            .into_iter()
            .filter(|p| p != path)
            .filter(|p| {
                matches!(
                    self.nodes.get(p).and_then(|n| n.lock.as_ref()),
                    Some(l) if !l.is_expired(now) && &l.principal != who
                )
            })
            .collect()
    }

    /// The node and all its descendants, parents first
    fn subtree(&self, path: &Path) -> Vec<Path> {
        self.nodes
            .keys()
            .filter(|p| *p == path || path.is_ancestor_of(p))
            .cloned()
            .collect()
    }

    fn check_parent(&self, path: &Path) -> Result<()> {
        let parent = path
            .parent()
            .ok_or_else(|| Error::illegal("the root already exists"))?;
        match self.nodes.get(&parent) {
            Some(n) if n.is_collection => Ok(()),
            Some(_) => Err(Error::illegal("parent is not a collection")),
            None => Err(Error::illegal("parent does not exist")),
        }
    }

    fn resource(&self, path: &Path, now: DateTime<Utc>) -> Result<Resource> {
        let node = self.node(path)?;
        Ok(Resource {
            path: path.clone(),
            is_collection: node.is_collection,
            content_length: node.content.len() as u64,
            content_type: node.content_type.clone(),
            content_language: node.content_language.clone(),
            etag: node.etag.clone(),
            creation_time: node.creation_time,
            last_modified: node.last_modified,
            lock: self.effective_lock(path, now).cloned(),
            properties: node.properties.clone(),
        })
    }

    fn remove_subtree(&mut self, path: &Path) {
        for p in self.subtree(path) {
            self.nodes.remove(&p);
        }
    }

    fn touch(&mut self, path: &Path, now: DateTime<Utc>) -> Result<()> {
        let etag = self.next_etag();
        let node = self.node_mut(path)?;
        node.etag = etag;
        node.last_modified = now;
        Ok(())
    }
}

/// A repository living in memory, lost when the process stops.
///
/// Anonymous callers can read but not write.
pub struct MemRepository {
    read_only: bool,
    state: RwLock<State>,
}

impl MemRepository {
    pub fn new(read_only: bool) -> Self {
        let now = Utc::now();
        let mut state = State {
            nodes: BTreeMap::new(),
            revision: 0,
        };
        let root = state.new_node(true, now);
        state.nodes.insert(Path::root(), root);

        Self {
            read_only,
            state: RwLock::new(state),
        }
    }

    fn writer<'a>(&self, token: &'a SecurityToken) -> Result<&'a Principal> {
        let who = token.principal().ok_or(Error::AuthenticationRequired)?;
        if self.read_only {
            return Err(Error::ReadOnly);
        }
        Ok(who)
    }

    async fn create(&self, token: &SecurityToken, path: &Path, is_collection: bool) -> Result<Resource> {
        let who = self.writer(token)?;
        let now = Utc::now();
        let mut state = self.state.write().await;

        if state.nodes.contains_key(path) {
            return Err(Error::illegal("resource already exists"));
        }
        state.check_parent(path)?;
        state.check_unlocked(path, who, now)?;

        let node = state.new_node(is_collection, now);
        state.nodes.insert(path.clone(), node);
        if let Some(parent) = path.parent() {
            state.touch(&parent, now)?;
        }

        tracing::debug!(path=%path, collection=is_collection, "created");
        state.resource(path, now)
    }

    fn new_lock_token() -> String {
        let mut raw = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut raw);
        let hex = hex::encode(raw);
        format!(
            "opaquelocktoken:{}-{}-{}-{}-{}",
            &hex[0..8],
            &hex[8..12],
            &hex[12..16],
            &hex[16..20],
            &hex[20..32]
        )
    }
}

impl Default for MemRepository {
    fn default() -> Self {
        Self::new(false)
    }
}

#[async_trait]
impl Repository for MemRepository {
    async fn retrieve(&self, _token: &SecurityToken, path: &Path) -> Result<Resource> {
        let state = self.state.read().await;
        state.resource(path, Utc::now())
    }

    async fn exists(&self, _token: &SecurityToken, path: &Path) -> Result<bool> {
        Ok(self.state.read().await.nodes.contains_key(path))
    }

    async fn list_children(&self, _token: &SecurityToken, path: &Path) -> Result<Vec<Resource>> {
        let now = Utc::now();
        let state = self.state.read().await;
        state.node(path)?;

        state
            .nodes
            .keys()
            .filter(|p| p.parent().as_ref() == Some(path))
            .map(|p| state.resource(p, now))
            .collect()
    }

    async fn retrieve_content(&self, _token: &SecurityToken, path: &Path) -> Result<Vec<u8>> {
        let state = self.state.read().await;
        let node = state.node(path)?;
        if node.is_collection {
            return Err(Error::illegal("a collection has no content"));
        }
        Ok(node.content.clone())
    }

    async fn store(&self, token: &SecurityToken, resource: &Resource) -> Result<Resource> {
        let who = self.writer(token)?;
        let now = Utc::now();
        let mut state = self.state.write().await;
        state.check_unlocked(&resource.path, who, now)?;

        let etag = state.next_etag();
        let node = state.node_mut(&resource.path)?;
        node.properties = resource.properties.clone();
        node.content_type = resource.content_type.clone();
        node.content_language = resource.content_language.clone();
        node.etag = etag;
        node.last_modified = now;

        state.resource(&resource.path, now)
    }

    async fn store_content(
        &self,
        token: &SecurityToken,
        path: &Path,
        content: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<Resource> {
        let who = self.writer(token)?;
        let now = Utc::now();
        let mut state = self.state.write().await;
        state.check_unlocked(path, who, now)?;

        let etag = state.next_etag();
        let node = state.node_mut(path)?;
        if node.is_collection {
            return Err(Error::illegal("can't store content in a collection"));
        }
        node.content = content;
        if let Some(ct) = content_type {
            node.content_type = ct.to_string();
        }
        node.etag = etag;
        node.last_modified = now;

        state.resource(path, now)
    }

    async fn create_document(&self, token: &SecurityToken, path: &Path) -> Result<Resource> {
        self.create(token, path, false).await
    }

    async fn create_collection(&self, token: &SecurityToken, path: &Path) -> Result<Resource> {
        self.create(token, path, true).await
    }

    async fn copy(
        &self,
        token: &SecurityToken,
        src: &Path,
        dest: &Path,
        depth: Depth,
        overwrite: bool,
        preserve_acl: bool,
    ) -> Result<bool> {
        let who = self.writer(token)?;
        let now = Utc::now();
        let mut state = self.state.write().await;

        let src_is_collection = state.node(src)?.is_collection;
        if src == dest || (src_is_collection && depth == Depth::Infinity && src.is_ancestor_of(dest)) {
            return Err(Error::illegal("can't copy a resource into itself"));
        }
        if dest.is_ancestor_of(src) {
            return Err(Error::illegal("can't copy a resource over its ancestor"));
        }
        state.check_parent(dest)?;

        let existed = state.nodes.contains_key(dest);
        if existed {
            if !overwrite {
                return Err(Error::Overwrite);
            }
            state.check_unlocked(dest, who, now)?;
            let blocked = state.locked_descendants(dest, who, now);
            if !blocked.is_empty() {
                return Err(Error::FailedDependency(
                    blocked.into_iter().map(|p| (p, Error::Locked)).collect(),
                ));
            }
            state.remove_subtree(dest);
        } else {
            state.check_unlocked(dest, who, now)?;
        }

        let sources = match depth {
            Depth::Infinity => state.subtree(src),
            Depth::Zero => vec![src.clone()],
        };
        for from in sources {
            let Some(to) = from.rebase(src, dest) else {
                continue;
            };
            let mut node = state.node(&from)?.clone();
            node.etag = state.next_etag();
            node.creation_time = now;
            node.last_modified = now;
            node.lock = None;
            state.nodes.insert(to, node);
        }
        if let Some(parent) = dest.parent() {
            state.touch(&parent, now)?;
        }

        // no access control model to carry over
        tracing::debug!(src=%src, dest=%dest, preserve_acl, created=!existed, "copied");
        Ok(!existed)
    }

    async fn move_resource(
        &self,
        token: &SecurityToken,
        src: &Path,
        dest: &Path,
        overwrite: bool,
    ) -> Result<bool> {
        let who = self.writer(token)?;
        let now = Utc::now();
        let mut state = self.state.write().await;

        state.node(src)?;
        if src.is_root() {
            return Err(Error::illegal("the root can't be moved"));
        }
        if src == dest || src.is_ancestor_of(dest) || dest.is_ancestor_of(src) {
            return Err(Error::illegal("can't move a resource into itself"));
        }
        state.check_parent(dest)?;
        state.check_unlocked(src, who, now)?;
        let blocked = state.locked_descendants(src, who, now);
        if !blocked.is_empty() {
            return Err(Error::FailedDependency(
                blocked.into_iter().map(|p| (p, Error::Locked)).collect(),
            ));
        }

        let existed = state.nodes.contains_key(dest);
        if existed {
            if !overwrite {
                return Err(Error::Overwrite);
            }
            state.check_unlocked(dest, who, now)?;
            if !state.locked_descendants(dest, who, now).is_empty() {
                return Err(Error::Locked);
            }
            state.remove_subtree(dest);
        } else {
            state.check_unlocked(dest, who, now)?;
        }

        for from in state.subtree(src) {
            let Some(to) = from.rebase(src, dest) else {
                continue;
            };
            if let Some(mut node) = state.nodes.remove(&from) {
                // locks stay behind
                node.lock = None;
                state.nodes.insert(to, node);
            }
        }
        for parent in [src.parent(), dest.parent()].into_iter().flatten() {
            state.touch(&parent, now)?;
        }

        tracing::debug!(src=%src, dest=%dest, created=!existed, "moved");
        Ok(!existed)
    }

    async fn delete(&self, token: &SecurityToken, path: &Path) -> Result<()> {
        let who = self.writer(token)?;
        let now = Utc::now();
        let mut state = self.state.write().await;

        state.node(path)?;
        if path.is_root() {
            return Err(Error::illegal("the root can't be deleted"));
        }
        state.check_unlocked(path, who, now)?;
        let blocked = state.locked_descendants(path, who, now);
        if !blocked.is_empty() {
            return Err(Error::FailedDependency(
                blocked.into_iter().map(|p| (p, Error::Locked)).collect(),
            ));
        }

        state.remove_subtree(path);
        if let Some(parent) = path.parent() {
            state.touch(&parent, now)?;
        }
        tracing::debug!(path=%path, "deleted");
        Ok(())
    }

    async fn lock(
        &self,
        token: &SecurityToken,
        path: &Path,
        owner_info: &str,
        depth: Depth,
        timeout_seconds: u32,
        existing_lock_token: Option<&str>,
    ) -> Result<Resource> {
        let who = self.writer(token)?.clone();
        let now = Utc::now();
        let mut state = self.state.write().await;
        state.node(path)?;

        let expires = Lock::expires_at(now, timeout_seconds);
        match existing_lock_token {
            Some(submitted) => {
                let root = match state.effective_lock(path, now) {
                    Some(lock) if lock.token == submitted => lock.root.clone(),
                    Some(_) => return Err(Error::Locked),
                    None => return Err(Error::illegal("no lock to refresh")),
                };
                if let Some(lock) = state.node_mut(&root)?.lock.as_mut() {
                    lock.expires = expires;
                }
                tracing::debug!(path=%path, token=%submitted, "lock refreshed");
            }
            None => {
                if state.effective_lock(path, now).is_some() {
                    return Err(Error::Locked);
                }
                if depth == Depth::Infinity {
                    let any_lock = |p: &Path| {
                        matches!(
                            state.nodes.get(p).and_then(|n| n.lock.as_ref()),
                            Some(l) if !l.is_expired(now)
                        )
                    };
                    if state.subtree(path).iter().any(any_lock) {
                        return Err(Error::Locked);
                    }
                }

                let owner_info: String = owner_info.chars().take(MAX_OWNER_INFO).collect();
                let lock = Lock {
                    token: Self::new_lock_token(),
                    owner_info,
                    principal: who,
                    depth,
                    expires,
                    root: path.clone(),
                };
                tracing::debug!(path=%path, token=%lock.token, "lock created");
                state.node_mut(path)?.lock = Some(lock);
            }
        }

        state.resource(path, now)
    }

    async fn unlock(&self, token: &SecurityToken, path: &Path, lock_token: &str) -> Result<()> {
        let who = self.writer(token)?;
        let now = Utc::now();
        let mut state = self.state.write().await;
        state.node(path)?;

        let root = match state.effective_lock(path, now) {
            None => return Err(Error::illegal("resource is not locked")),
            Some(lock) if lock.token != lock_token => return Err(Error::Locked),
            Some(lock) if &lock.principal != who => return Err(Error::AuthorizationDenied),
            Some(lock) => lock.root.clone(),
        };
        state.node_mut(&root)?.lock = None;
        tracing::debug!(path=%path, token=%lock_token, "unlocked");
        Ok(())
    }
}

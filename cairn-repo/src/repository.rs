use std::sync::Arc;

use async_trait::async_trait;

use cairn_user::login::SecurityToken;

use crate::error::Result;
use crate::path::Path;
use crate::resource::{Depth, Resource};

/// The content repository, as seen by the WebDAV layer.
///
/// Every call carries the token of the caller. Locks are enforced per
/// principal: a lock taken by someone else blocks writes, checking that
/// the holder submitted the lock token is left to the caller.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn retrieve(&self, token: &SecurityToken, path: &Path) -> Result<Resource>;
    async fn exists(&self, token: &SecurityToken, path: &Path) -> Result<bool>;
    /// Direct members of a collection, empty for a document
    async fn list_children(&self, token: &SecurityToken, path: &Path) -> Result<Vec<Resource>>;
    async fn retrieve_content(&self, token: &SecurityToken, path: &Path) -> Result<Vec<u8>>;

    /// Save the metadata of a resource: properties, content type
    /// and content language
    async fn store(&self, token: &SecurityToken, resource: &Resource) -> Result<Resource>;
    async fn store_content(
        &self,
        token: &SecurityToken,
        path: &Path,
        content: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<Resource>;
    async fn create_document(&self, token: &SecurityToken, path: &Path) -> Result<Resource>;
    async fn create_collection(&self, token: &SecurityToken, path: &Path) -> Result<Resource>;

    /// Returns true when the destination did not exist before
    async fn copy(
        &self,
        token: &SecurityToken,
        src: &Path,
        dest: &Path,
        depth: Depth,
        overwrite: bool,
        preserve_acl: bool,
    ) -> Result<bool>;
    /// Returns true when the destination did not exist before
    async fn move_resource(
        &self,
        token: &SecurityToken,
        src: &Path,
        dest: &Path,
        overwrite: bool,
    ) -> Result<bool>;
    /// Recursive
    async fn delete(&self, token: &SecurityToken, path: &Path) -> Result<()>;

    /// Create a lock, or refresh the one identified by `existing_lock_token`
    async fn lock(
        &self,
        token: &SecurityToken,
        path: &Path,
        owner_info: &str,
        depth: Depth,
        timeout_seconds: u32,
        existing_lock_token: Option<&str>,
    ) -> Result<Resource>;
    async fn unlock(&self, token: &SecurityToken, path: &Path, lock_token: &str) -> Result<()>;
}

pub type ArcRepository = Arc<dyn Repository>;

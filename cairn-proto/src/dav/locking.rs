use anyhow::{anyhow, Result};
use chrono::Utc;
use hyper::header::HeaderValue;
use hyper::{Response, StatusCode};

use cairn_dav::realization::Repo;
use cairn_dav::types as dav;
use cairn_repo::resource::{Depth, Resource, MAX_OWNER_INFO};
use cairn_repo::Error;

use super::codec::{self, deserialize, serialize, status_only, text_body, HttpResponse};
use super::conditional::Precondition;
use super::controller::{collection_locked, Controller};
use super::multistatus::{href, lock_discovery};

impl Controller {
    /// LOCK creates a lock, or refreshes one when the body is empty
    pub(super) async fn lock(self) -> Result<HttpResponse> {
        let timeout = codec::timeout(&self.req);
        if codec::is_blank(self.req.body()) {
            return self.refresh(timeout).await;
        }

        let info = match deserialize::<dav::LockInfo>(self.req.body()).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(err=?e, "unable to decode LOCK body");
                return Ok(Response::builder()
                    .status(400)
                    .body(text_body("Bad request"))?);
            }
        };
        tracing::debug!(recv=?info, "decoded lock request");

        // Only full locks are known to the repository, a depth 1 lock
        // covers the resource alone
        let depth = match codec::depth(&self.req) {
            Ok(None) | Ok(Some(dav::Depth::Infinity)) => Depth::Infinity,
            Ok(Some(dav::Depth::Zero)) | Ok(Some(dav::Depth::One)) => Depth::Zero,
            Err(_) => return status_only(StatusCode::BAD_REQUEST),
        };

        let owner = match &info.owner {
            Some(dav::Owner::Txt(txt)) => txt.trim(),
            Some(dav::Owner::Href(h)) => h.0.as_str(),
            Some(dav::Owner::Unknown) | None => "",
        };
        let owner: String = owner.chars().take(MAX_OWNER_INFO).collect();

        let repo = self.ctx.repository.clone();
        let created = match repo.retrieve(&self.token, &self.path).await {
            Ok(res) => {
                match self.conditions.check_write(&res) {
                    Precondition::Proceed => (),
                    Precondition::Locked => return conflicting_lock(&res),
                    Precondition::Failed => {
                        return status_only(StatusCode::PRECONDITION_FAILED)
                    }
                }
                false
            }
            Err(Error::NotFound) => {
                if let Some(parent) = self.locked_parent(&self.path).await? {
                    return collection_locked(&parent);
                }
                repo.create_document(&self.token, &self.path).await?;
                true
            }
            Err(e) => return Err(e.into()),
        };

        let locked = match repo
            .lock(&self.token, &self.path, &owner, depth, timeout, None)
            .await
        {
            Ok(v) => v,
            Err(e) => {
                if created {
                    self.discard_created().await;
                }
                return Err(e.into());
            }
        };

        let now = Utc::now();
        let lock_token = locked
            .active_lock(now)
            .map(|l| l.token.clone())
            .ok_or(anyhow!("the repository returned a resource without lock"))?;
        tracing::info!(path=%self.path, token=%lock_token, "lock created");

        let status = match created {
            true => StatusCode::CREATED,
            false => StatusCode::OK,
        };
        let mut response = serialize(status, discovery(&locked))?;
        response.headers_mut().insert(
            "Lock-Token",
            HeaderValue::from_str(&format!("<{}>", lock_token))?,
        );
        Ok(response)
    }

    async fn refresh(self, timeout: u32) -> Result<HttpResponse> {
        let repo = &self.ctx.repository;
        let res = repo.retrieve(&self.token, &self.path).await?;

        let lock_token = match self.conditions.submitted_token(&res) {
            Some(v) => v.to_string(),
            None => {
                tracing::info!(path=%self.path, "refresh without the current lock token");
                return status_only(StatusCode::PRECONDITION_FAILED);
            }
        };

        let refreshed = repo
            .lock(&self.token, &self.path, "", Depth::Zero, timeout, Some(&lock_token))
            .await?;
        serialize(StatusCode::OK, discovery(&refreshed))
    }

    pub(super) async fn unlock(self) -> Result<HttpResponse> {
        let lock_token = match codec::lock_token(&self.req) {
            Some(v) => v,
            None => {
                return Ok(Response::builder()
                    .status(400)
                    .body(text_body("Missing Lock-Token header"))?)
            }
        };

        let repo = &self.ctx.repository;
        let res = repo.retrieve(&self.token, &self.path).await?;
        let holds = res
            .active_lock(Utc::now())
            .map(|l| l.token == lock_token)
            .unwrap_or(false);
        if !holds {
            tracing::info!(path=%self.path, token=%lock_token, "token does not lock this resource");
            return serialize(
                StatusCode::PRECONDITION_FAILED,
                dav::Error::<Repo>(vec![dav::Violation::LockTokenMatchesRequestUri]),
            );
        }

        repo.unlock(&self.token, &self.path, &lock_token).await?;
        status_only(StatusCode::OK)
    }
}

fn discovery(res: &Resource) -> dav::PropValue<Repo> {
    dav::PropValue(vec![dav::Property::LockDiscovery(lock_discovery(
        res,
        Utc::now(),
    ))])
}

/// 423 naming the root of the lock in the way
fn conflicting_lock(res: &Resource) -> Result<HttpResponse> {
    let root = match res.active_lock(Utc::now()) {
        Some(lock) => dav::Href(lock.root.to_href(lock.root != res.path || res.is_collection)),
        None => href(res),
    };
    serialize(
        StatusCode::LOCKED,
        dav::Error::<Repo>(vec![dav::Violation::NoConflictingLock(vec![root])]),
    )
}

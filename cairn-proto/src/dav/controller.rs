use std::collections::VecDeque;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use hyper::body::Bytes;
use hyper::{Request, Response, StatusCode};

use cairn_dav::realization::Repo;
use cairn_dav::types as dav;
use cairn_repo::resource::{Depth, Resource};
use cairn_repo::{Error, Path};
use cairn_user::login::SecurityToken;

use super::codec::{self, serialize, status_only, text_body, HttpResponse, HTTP_DATE};
use super::conditional::{Conditions, EtagCheck, Precondition};
use super::status;
use super::DavContext;

const ALLOW: &str =
    "OPTIONS,GET,HEAD,PUT,DELETE,MKCOL,COPY,MOVE,LOCK,UNLOCK,PROPFIND,PROPPATCH";

pub(crate) struct Controller {
    pub(super) ctx: Arc<DavContext>,
    pub(super) token: SecurityToken,
    pub(super) path: Path,
    pub(super) conditions: Conditions,
    pub(super) req: Request<Bytes>,
}

impl Controller {
    pub(crate) async fn route(
        ctx: Arc<DavContext>,
        token: SecurityToken,
        req: Request<Bytes>,
    ) -> Result<HttpResponse> {
        let method = req.method().clone();

        let path = match Path::parse(req.uri().path()) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(err=?e, uri=%req.uri(), "invalid request path");
                return Ok(Response::builder()
                    .status(400)
                    .body(text_body("Bad request path"))?);
            }
        };

        let conditions = match Conditions::from_headers(req.headers(), &path) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(err=?e, "invalid conditional header");
                return Ok(Response::builder()
                    .status(400)
                    .body(text_body("Malformed conditional header"))?);
            }
        };

        let xml_body = matches!(method.as_str(), "PROPFIND" | "PROPPATCH" | "LOCK");
        if xml_body && req.body().len() > ctx.webdav.max_xml_body {
            tracing::warn!(size = req.body().len(), "XML body too large");
            return status_only(StatusCode::PAYLOAD_TOO_LARGE);
        }

        let ctrl = Self {
            ctx,
            token,
            path,
            conditions,
            req,
        };

        let res = match method.as_str() {
            "OPTIONS" => ctrl.options(),
            "GET" => ctrl.get(true).await,
            "HEAD" => ctrl.get(false).await,
            "PUT" => ctrl.put().await,
            "MKCOL" => ctrl.mkcol().await,
            "DELETE" => ctrl.delete().await,
            "COPY" => ctrl.transfer(false).await,
            "MOVE" => ctrl.transfer(true).await,
            "LOCK" => ctrl.lock().await,
            "UNLOCK" => ctrl.unlock().await,
            "PROPFIND" => ctrl.propfind().await,
            "PROPPATCH" => ctrl.proppatch().await,
            _ => Ok(Response::builder()
                .status(501)
                .body(text_body("HTTP Method not implemented"))?),
        };

        // Refusals of the repository become the status of the request,
        // anything else is an internal error
        match res {
            Ok(v) => Ok(v),
            Err(e) => match e.downcast::<Error>() {
                Ok(repo_err) => status::error_response(&method, repo_err),
                Err(e) => Err(e),
            },
        }
    }

    // --- Per-method functions ---

    fn options(self) -> Result<HttpResponse> {
        Ok(Response::builder()
            .status(200)
            .header("DAV", "1, 2")
            .header("MS-Author-Via", "DAV")
            .header("Allow", ALLOW)
            .body(text_body(""))?)
    }

    /// GET and HEAD, the latter without the content
    async fn get(self, with_body: bool) -> Result<HttpResponse> {
        let res = self
            .ctx
            .repository
            .retrieve(&self.token, &self.path)
            .await?;
        if res.is_collection {
            return status_only(StatusCode::METHOD_NOT_ALLOWED);
        }

        match self.conditions.check_etags(Some(&res), true) {
            EtagCheck::Proceed => (),
            EtagCheck::NotModified => {
                return Ok(Response::builder()
                    .status(304)
                    .header("ETag", &res.etag)
                    .body(text_body(""))?)
            }
            EtagCheck::Failed => return status_only(StatusCode::PRECONDITION_FAILED),
        }

        let mut builder = Response::builder()
            .status(200)
            .header("ETag", &res.etag)
            .header("Last-Modified", res.last_modified.format(HTTP_DATE).to_string())
            .header("Content-Type", &res.content_type);
        if let Some(lang) = &res.content_language {
            builder = builder.header("Content-Language", lang);
        }

        if !with_body {
            return Ok(builder
                .header("Content-Length", res.content_length)
                .body(text_body(""))?);
        }

        let content = self
            .ctx
            .repository
            .retrieve_content(&self.token, &self.path)
            .await?;
        Ok(builder.body(codec::bytes_body(content))?)
    }

    async fn put(self) -> Result<HttpResponse> {
        if self.forbidden_name(self.path.name()) {
            tracing::info!(path=%self.path, "refusing a forbidden name");
            return status_only(StatusCode::FORBIDDEN);
        }

        let repo = self.ctx.repository.clone();
        let existing = match repo.retrieve(&self.token, &self.path).await {
            Ok(v) => Some(v),
            Err(Error::NotFound) => None,
            Err(e) => return Err(e.into()),
        };

        if existing.as_ref().map(|r| r.is_collection).unwrap_or(false) {
            return status_only(StatusCode::CONFLICT);
        }

        if self.conditions.check_etags(existing.as_ref(), false) == EtagCheck::Failed {
            return status_only(StatusCode::PRECONDITION_FAILED);
        }

        match &existing {
            Some(res) => match self.conditions.check_write(res) {
                Precondition::Proceed => (),
                Precondition::Locked if self.lenient_client(res) => {
                    tracing::debug!(path=%self.path, "lock owner writes without If header")
                }
                Precondition::Locked => return status_only(StatusCode::LOCKED),
                Precondition::Failed => return status_only(StatusCode::PRECONDITION_FAILED),
            },
            None => {
                if let Some(parent) = self.locked_parent(&self.path).await? {
                    if !self.lenient_client(&parent) {
                        return collection_locked(&parent);
                    }
                    tracing::debug!(path=%self.path, "lock owner adds a member without If header")
                }
            }
        }

        let created = existing.is_none();
        if created {
            repo.create_document(&self.token, &self.path).await?;
        }

        let content = self.req.body().to_vec();
        let content_type = codec::content_type(&self.req);
        let mut res = match repo
            .store_content(&self.token, &self.path, content, content_type)
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

        if let Some(lang) = codec::content_language(&self.req) {
            if res.content_language.as_deref() != Some(lang) {
                res.content_language = Some(lang.to_string());
                res = repo.store(&self.token, &res).await?;
            }
        }

        let status = match created {
            true => StatusCode::CREATED,
            false => StatusCode::OK,
        };
        Ok(Response::builder()
            .status(status)
            .header("ETag", &res.etag)
            .body(text_body(""))?)
    }

    async fn mkcol(self) -> Result<HttpResponse> {
        if !codec::is_blank(self.req.body()) {
            return status_only(StatusCode::UNSUPPORTED_MEDIA_TYPE);
        }

        let repo = &self.ctx.repository;
        if repo.exists(&self.token, &self.path).await? {
            return status_only(StatusCode::METHOD_NOT_ALLOWED);
        }
        if let Some(parent) = self.locked_parent(&self.path).await? {
            return collection_locked(&parent);
        }

        repo.create_collection(&self.token, &self.path).await?;
        status_only(StatusCode::CREATED)
    }

    async fn delete(self) -> Result<HttpResponse> {
        let repo = &self.ctx.repository;
        let res = repo.retrieve(&self.token, &self.path).await?;
        if let Some(denied) = refusal(self.conditions.check_write(&res)) {
            return denied;
        }
        if let Some(parent) = self.locked_parent(&self.path).await? {
            return collection_locked(&parent);
        }

        let blocked = self.locked_members(&res).await?;
        if !blocked.is_empty() {
            let failed = blocked.into_iter().map(|m| (m.path, Error::Locked)).collect();
            return Err(Error::FailedDependency(failed).into());
        }

        repo.delete(&self.token, &self.path).await?;
        status_only(StatusCode::OK)
    }

    /// COPY and MOVE
    async fn transfer(self, is_move: bool) -> Result<HttpResponse> {
        let dest = match codec::destination(&self.req) {
            Ok(v) => v,
            Err(e) => {
                tracing::info!(err=?e, "missing or invalid Destination");
                return Ok(Response::builder()
                    .status(400)
                    .body(text_body("Missing or invalid Destination header"))?);
            }
        };
        if dest == self.path {
            return status_only(StatusCode::FORBIDDEN);
        }

        let overwrite = match codec::overwrite(&self.req) {
            Ok(v) => v.unwrap_or(is_move),
            Err(_) => return status_only(StatusCode::BAD_REQUEST),
        };

        let depth = match codec::depth(&self.req) {
            Ok(None) | Ok(Some(dav::Depth::Infinity)) => Depth::Infinity,
            Ok(Some(dav::Depth::Zero)) if !is_move => Depth::Zero,
            _ => return status_only(StatusCode::BAD_REQUEST),
        };

        let repo = self.ctx.repository.clone();
        let src = repo.retrieve(&self.token, &self.path).await?;
        let on_source = match is_move {
            true => self.conditions.check_write(&src),
            false if self.conditions.matches(&src, false) => Precondition::Proceed,
            false => Precondition::Failed,
        };
        if let Some(denied) = refusal(on_source) {
            return denied;
        }
        if is_move {
            if let Some(parent) = self.locked_parent(&self.path).await? {
                return collection_locked(&parent);
            }
            let blocked = self.locked_members(&src).await?;
            if !blocked.is_empty() {
                return members_locked(&blocked);
            }
        }

        match repo.retrieve(&self.token, &dest).await {
            Ok(existing) => {
                if !overwrite {
                    return status_only(StatusCode::PRECONDITION_FAILED);
                }
                if let Some(denied) = refusal(self.conditions.check_write(&existing)) {
                    return denied;
                }
                let blocked = self.locked_members(&existing).await?;
                if !blocked.is_empty() {
                    return members_locked(&blocked);
                }
            }
            Err(Error::NotFound) => {
                if let Some(parent) = self.locked_parent(&dest).await? {
                    return collection_locked(&parent);
                }
            }
            Err(e) => return Err(e.into()),
        }

        let created = match is_move {
            true => {
                repo.move_resource(&self.token, &self.path, &dest, overwrite)
                    .await?
            }
            false => {
                let preserve_acl = codec::preserve_acl(&self.req);
                repo.copy(&self.token, &self.path, &dest, depth, overwrite, preserve_acl)
                    .await?
            }
        };
        tracing::debug!(src=%self.path, dest=%dest, is_move, created, "transfer done");

        match created {
            true => status_only(StatusCode::CREATED),
            false => status_only(StatusCode::NO_CONTENT),
        }
    }

    // --- Common utility functions ---

    fn forbidden_name(&self, name: &str) -> bool {
        self.ctx.webdav.forbidden_names.iter().any(|pattern| {
            match glob::Pattern::new(pattern) {
                Ok(p) => p.matches(name),
                Err(e) => {
                    tracing::warn!(err=?e, pattern=%pattern, "invalid forbidden name pattern");
                    false
                }
            }
        })
    }

    /// The parent collection of `path`, when it is locked and the
    /// request does not submit its lock token. Adding or removing a
    /// member changes the collection, whatever the depth of its lock.
    pub(super) async fn locked_parent(&self, path: &Path) -> Result<Option<Resource>> {
        let parent = match path.parent() {
            Some(p) => p,
            None => return Ok(None),
        };
        let res = match self.ctx.repository.retrieve(&self.token, &parent).await {
            Ok(v) => v,
            Err(Error::NotFound) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let missing = res
            .active_lock(Utc::now())
            .map(|lock| !self.conditions.submits_token(&lock.token))
            .unwrap_or(false);
        if missing {
            tracing::info!(path=%path, parent=%res.path, "collection locked, token not submitted");
        }
        Ok(missing.then_some(res))
    }

    /// Members of `res`, at any depth, holding a lock of their own whose
    /// token the request does not submit
    async fn locked_members(&self, res: &Resource) -> Result<Vec<Resource>> {
        let now = Utc::now();
        let mut blocked = vec![];
        let mut queue = VecDeque::new();
        if res.is_collection {
            queue.push_back(res.path.clone());
        }

        while let Some(path) = queue.pop_front() {
            for member in self.ctx.repository.list_children(&self.token, &path).await? {
                let missing = member
                    .active_lock(now)
                    .map(|lock| {
                        lock.root == member.path && !self.conditions.submits_token(&lock.token)
                    })
                    .unwrap_or(false);
                if member.is_collection {
                    queue.push_back(member.path.clone());
                }
                if missing {
                    tracing::info!(path=%member.path, "member locked, token not submitted");
                    blocked.push(member);
                }
            }
        }
        Ok(blocked)
    }

    /// Some clients write a resource they locked themselves without
    /// ever sending the If header
    fn lenient_client(&self, res: &Resource) -> bool {
        if self.conditions.has_if() {
            return false;
        }
        let agent = match codec::user_agent(&self.req) {
            Some(v) => v,
            None => return false,
        };
        let own_lock = match (res.active_lock(Utc::now()), self.token.principal()) {
            (Some(lock), Some(caller)) => &lock.principal == caller,
            _ => false,
        };

        own_lock
            && self
                .ctx
                .webdav
                .lenient_user_agents
                .iter()
                .any(|prefix| agent.starts_with(prefix.as_str()))
    }

    /// Remove the empty document created for a request that then failed
    pub(super) async fn discard_created(&self) {
        if let Err(e) = self.ctx.repository.delete(&self.token, &self.path).await {
            tracing::warn!(err=?e, path=%self.path, "unable to remove the created document");
        }
    }
}

/// 423 naming the root of the lock of a collection
pub(super) fn collection_locked(parent: &Resource) -> Result<HttpResponse> {
    let roots = parent
        .active_lock(Utc::now())
        .map(|lock| dav::Href(lock.root.to_href(true)))
        .into_iter()
        .collect();
    lock_token_submitted(roots)
}

/// 423 listing the locked members
fn members_locked(members: &[Resource]) -> Result<HttpResponse> {
    let hrefs = members
        .iter()
        .map(|m| dav::Href(m.path.to_href(m.is_collection)))
        .collect();
    lock_token_submitted(hrefs)
}

fn lock_token_submitted(hrefs: Vec<dav::Href>) -> Result<HttpResponse> {
    serialize(
        StatusCode::LOCKED,
        dav::Error::<Repo>(vec![dav::Violation::LockTokenSubmitted(hrefs)]),
    )
}

/// The response refusing a write, if any
pub(super) fn refusal(verdict: Precondition) -> Option<Result<HttpResponse>> {
    match verdict {
        Precondition::Proceed => None,
        Precondition::Locked => Some(status_only(StatusCode::LOCKED)),
        Precondition::Failed => Some(status_only(StatusCode::PRECONDITION_FAILED)),
    }
}

use std::collections::VecDeque;

use anyhow::Result;
use chrono::Utc;
use hyper::{Response, StatusCode};

use cairn_dav::deadtypes;
use cairn_dav::realization::Repo;
use cairn_dav::types as dav;
use cairn_repo::property::Property;
use cairn_repo::resource::Resource;
use cairn_repo::Error;

use super::codec::{self, deserialize, serialize, text_body, HttpResponse};
use super::controller::{refusal, Controller};
use super::multistatus::{proppatch_response, propfind_response};
use super::values;

impl Controller {
    pub(super) async fn propfind(self) -> Result<HttpResponse> {
        let depth = match codec::depth(&self.req) {
            Ok(v) => v.unwrap_or(dav::Depth::One),
            Err(_) => return bad_request(),
        };

        let propfind = match codec::is_blank(self.req.body()) {
            true => dav::PropFind::<Repo>::AllProp(None),
            false => match deserialize::<dav::PropFind<Repo>>(self.req.body()).await {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(err=?e, "unable to decode PROPFIND body");
                    return bad_request();
                }
            },
        };
        tracing::debug!(recv=?propfind, "decoded propfind request");

        let repo = &self.ctx.repository;
        let root = repo.retrieve(&self.token, &self.path).await?;
        let limit = self.ctx.webdav.propfind_max_resources;
        let now = Utc::now();

        // Breadth first, the request URI comes first in the multistatus
        let mut responses = Vec::new();
        let mut queue = VecDeque::from([root]);
        while let Some(res) = queue.pop_front() {
            responses.push(propfind_response(&res, &propfind, now));

            let descend = res.is_collection
                && match depth {
                    dav::Depth::Zero => false,
                    dav::Depth::One => res.path == self.path,
                    dav::Depth::Infinity => true,
                };
            if !descend {
                continue;
            }

            match repo.list_children(&self.token, &res.path).await {
                Ok(children) => queue.extend(children),
                Err(Error::AuthorizationDenied) => {
                    tracing::debug!(path=%res.path, "members can't be listed")
                }
                Err(e) => return Err(e.into()),
            }

            if depth == dav::Depth::Infinity && responses.len() + queue.len() > limit {
                tracing::info!(path=%self.path, limit, "infinite PROPFIND is too large");
                return serialize(
                    StatusCode::FORBIDDEN,
                    dav::Error::<Repo>(vec![dav::Violation::PropfindFiniteDepth]),
                );
            }
        }

        serialize(
            StatusCode::MULTI_STATUS,
            dav::Multistatus::<Repo> {
                responses,
                responsedescription: None,
            },
        )
    }

    pub(super) async fn proppatch(self) -> Result<HttpResponse> {
        let repo = self.ctx.repository.clone();
        let res = repo.retrieve(&self.token, &self.path).await?;
        if let Some(denied) = refusal(self.conditions.check_write(&res)) {
            return denied;
        }

        let update = match deserialize::<dav::PropertyUpdate<Repo>>(self.req.body()).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(err=?e, "unable to decode PROPPATCH body");
                return bad_request();
            }
        };
        tracing::debug!(recv=?update, "decoded proppatch request");

        // Everything is applied to a copy, the repository only sees
        // the final state
        let mut updated = res.clone();
        let mut actions = Vec::with_capacity(update.0.len());
        for item in update.0 {
            let names = match item {
                dav::PropertyUpdateItem::Set(dav::Set(dav::PropValue(props))) => {
                    let mut names = Vec::with_capacity(props.len());
                    for prop in props {
                        names.push(prop.request());
                        if let Err(violation) = self.set(&mut updated, prop) {
                            return forbidden(violation);
                        }
                    }
                    names
                }
                dav::PropertyUpdateItem::Remove(dav::Remove(dav::PropName(names))) => {
                    for name in names.iter() {
                        if let Err(violation) = self.remove(&mut updated, name) {
                            return forbidden(violation);
                        }
                    }
                    names
                }
            };
            actions.push(names);
        }

        let stored = repo.store(&self.token, &updated).await?;
        serialize(StatusCode::MULTI_STATUS, proppatch_response(&stored, actions))
    }

    fn set(&self, res: &mut Resource, prop: dav::Property<Repo>) -> Result<(), dav::Violation<Repo>> {
        match prop {
            dav::Property::GetContentType(ct) => res.content_type = ct,
            dav::Property::GetContentLanguage(lang) => res.content_language = Some(lang),
            dav::Property::Extension(dead) => {
                let name = values::qualified(&dead.name);
                let definition = self.ctx.registry.definition(&name);
                if definition.map(|d| d.protected).unwrap_or(false) {
                    return Err(dav::Violation::CannotModifyProtectedProperty);
                }
                let value = values::convert(&name, definition, &dead.value).map_err(|msg| {
                    dav::Violation::Extension(deadtypes::Violation::ConstraintViolation(msg))
                })?;
                res.set_property(Property { name, value });
            }
            _ => return Err(dav::Violation::CannotModifyProtectedProperty),
        }
        Ok(())
    }

    fn remove(
        &self,
        res: &mut Resource,
        name: &dav::PropertyRequest<Repo>,
    ) -> Result<(), dav::Violation<Repo>> {
        // DAV: is reserved, built-ins can't be removed either
        let wire = match name {
            dav::PropertyRequest::Extension(wire) if !wire.is_dav() => wire,
            _ => return Ok(()),
        };

        let name = values::qualified(wire);
        if let Some(def) = self.ctx.registry.definition(&name) {
            if def.protected {
                return Err(dav::Violation::CannotModifyProtectedProperty);
            }
        }
        res.remove_property(&name);
        Ok(())
    }
}

fn bad_request() -> Result<HttpResponse> {
    Ok(Response::builder()
        .status(400)
        .body(text_body("Bad request"))?)
}

fn forbidden(violation: dav::Violation<Repo>) -> Result<HttpResponse> {
    tracing::info!(violation=?violation, "property update refused");
    serialize(StatusCode::FORBIDDEN, dav::Error::<Repo>(vec![violation]))
}

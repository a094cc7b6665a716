use anyhow::{anyhow, Result};
use base64::Engine;
use futures::future::BoxFuture;
use hyper::{Request, Response};

use cairn_user::login::{ArcLoginProvider, SecurityToken};

use super::codec::{text_body, HttpResponse};

/// Resolve the caller of a request. Requests without credentials go
/// on as anonymous, the repository decides what they may do.
pub(super) async fn auth<'a, B>(
    login: ArcLoginProvider,
    req: Request<B>,
    next: impl Fn(SecurityToken, Request<B>) -> BoxFuture<'a, Result<HttpResponse>>,
) -> Result<HttpResponse> {
    let auth_val = match req.headers().get(hyper::header::AUTHORIZATION) {
        Some(hv) => hv.to_str()?,
        None => {
            tracing::debug!("anonymous request");
            return next(SecurityToken::anonymous(), req).await;
        }
    };

    let b64_creds_maybe_padded = match auth_val.split_once(' ') {
        Some(("Basic", b64)) => b64.trim(),
        _ => {
            tracing::info!("Unsupported authorization field");
            return Ok(Response::builder()
                .status(400)
                .body(text_body("Unsupported Authorization field"))?);
        }
    };

    // base64urlencoded may have trailing equals, base64urlsafe has not
    // theoretically authorization is padded but "be liberal in what you accept"
    let b64_creds_clean = b64_creds_maybe_padded.trim_end_matches('=');

    let creds = base64::engine::general_purpose::STANDARD_NO_PAD.decode(b64_creds_clean)?;
    let str_creds = std::str::from_utf8(&creds)?;

    let (username, password) = str_creds.split_once(':').ok_or(anyhow!(
        "Missing colon in Authorization, can't split decoded value into a username/password pair"
    ))?;

    let principal = match login.login(username, password).await {
        Ok(p) => p,
        Err(_) => {
            tracing::info!(user = username, "Wrong credentials");
            return Ok(Response::builder()
                .status(401)
                .header("WWW-Authenticate", "Basic realm=\"cairn\"")
                .body(text_body("Wrong credentials"))?);
        }
    };

    next(SecurityToken::authenticated(principal), req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::FutureExt;
    use hyper::StatusCode;
    use std::sync::Arc;

    use cairn_user::login::demo_provider::DemoLoginProvider;

    use crate::dav::codec::status_only;

    async fn caller(authorization: Option<&str>) -> (StatusCode, Option<String>) {
        let login: ArcLoginProvider = Arc::new(DemoLoginProvider::new());
        let mut builder = Request::builder().uri("/");
        if let Some(v) = authorization {
            builder = builder.header("Authorization", v);
        }
        let req = builder.body(()).unwrap();

        let seen = Arc::new(std::sync::Mutex::new(None));
        let res = auth(login, req, |token, _req| {
            let seen = seen.clone();
            async move {
                *seen.lock().unwrap() = Some(token.principal().map(|p| p.to_string()));
                status_only(StatusCode::OK)
            }
            .boxed()
        })
        .await
        .unwrap();

        let who = seen.lock().unwrap().clone().flatten();
        (res.status(), who)
    }

    fn basic(creds: &str) -> String {
        format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode(creds)
        )
    }

    #[tokio::test]
    async fn anonymous_requests_go_through() {
        assert_eq!(caller(None).await, (StatusCode::OK, None));
    }

    #[tokio::test]
    async fn known_user() {
        assert_eq!(
            caller(Some(&basic("alice:hunter2"))).await,
            (StatusCode::OK, Some("alice".to_string()))
        );
    }

    #[tokio::test]
    async fn rejected_credentials() {
        let (status, who) = caller(Some(&basic("alice:nope"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(who, None);

        let (status, _) = caller(Some("Bearer abc")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}

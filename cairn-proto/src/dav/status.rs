use anyhow::Result;
use hyper::{Method, Response, StatusCode};

use cairn_dav::realization::Repo;
use cairn_dav::types as dav;
use cairn_repo::Error;

use super::codec::{serialize, status_only, text_body, HttpResponse};
use super::multistatus::status_response;

/// Status answered when a repository operation fails.
///
/// `None` for errors the method layer does not expect.
pub(crate) fn status_for(method: &Method, err: &Error) -> Option<StatusCode> {
    let status = match err {
        Error::NotFound => StatusCode::NOT_FOUND,
        Error::Locked => StatusCode::LOCKED,
        Error::ReadOnly => StatusCode::FORBIDDEN,
        Error::IllegalOperation(_) => match method.as_str() {
            "PUT" | "MKCOL" | "COPY" | "MOVE" | "LOCK" => StatusCode::CONFLICT,
            _ => StatusCode::FORBIDDEN,
        },
        Error::Overwrite => StatusCode::PRECONDITION_FAILED,
        Error::FailedDependency(_) => StatusCode::FAILED_DEPENDENCY,
        Error::AuthenticationRequired => StatusCode::UNAUTHORIZED,
        Error::AuthorizationDenied => StatusCode::FORBIDDEN,
        Error::Internal(_) => return None,
    };
    Some(status)
}

/// Turn a repository error into the response of the request.
///
/// Unexpected errors are handed back to the caller.
pub(crate) fn error_response(method: &Method, err: Error) -> Result<HttpResponse> {
    let status = match status_for(method, &err) {
        Some(s) => s,
        None => return Err(err.into()),
    };
    tracing::debug!(method=%method, err=%err, status=%status, "repository refused the operation");

    match err {
        Error::AuthenticationRequired => Ok(Response::builder()
            .status(status)
            .header("WWW-Authenticate", "Basic realm=\"cairn\"")
            .body(text_body("Authentication required"))?),
        Error::FailedDependency(failed) if method == Method::DELETE => {
            serialize(StatusCode::MULTI_STATUS, failed_members(method, failed))
        }
        _ => status_only(status),
    }
}

/// One response per member the operation could not be applied to
fn failed_members(method: &Method, failed: Vec<(cairn_repo::Path, Error)>) -> dav::Multistatus<Repo> {
    let responses = failed
        .into_iter()
        .map(|(path, err)| {
            let status = status_for(method, &err).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            let mut response = status_response(dav::Href(path.to_href(false)), status);
            if let Error::Locked = err {
                response.error = Some(dav::Error(vec![dav::Violation::LockTokenSubmitted(
                    vec![dav::Href(path.to_href(false))],
                )]));
            }
            response
        })
        .collect();

    dav::Multistatus {
        responses,
        responsedescription: None,
    }
}

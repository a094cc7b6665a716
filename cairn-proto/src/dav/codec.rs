use anyhow::Result;
use futures::sink::SinkExt;
use futures::stream::StreamExt;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::{Bytes, Frame};
use hyper::header::HeaderValue;
use hyper::{Request, Response, StatusCode};
use std::io::{Error, ErrorKind};
use tokio_util::io::{CopyToBytes, SinkWriter};
use tokio_util::sync::PollSender;

use cairn_dav::ifheader::HeaderError;
use cairn_dav::types as dav;
use cairn_dav::xml as dxml;
use cairn_repo::resource::INFINITE_TIMEOUT_SECONDS;
use cairn_repo::Path;

pub type HttpResponse = Response<BoxBody<Bytes, std::io::Error>>;

pub(crate) const XML_CONTENT_TYPE: &str = "text/xml; charset=\"utf-8\"";
pub(crate) const HTTP_DATE: &str = "%a, %d %b %Y %H:%M:%S GMT";

// --- bodies ---

pub(crate) fn text_body(txt: &'static str) -> BoxBody<Bytes, std::io::Error> {
    BoxBody::new(Full::new(Bytes::from(txt)).map_err(|e| match e {}))
}

pub(crate) fn bytes_body(content: Vec<u8>) -> BoxBody<Bytes, std::io::Error> {
    BoxBody::new(Full::new(Bytes::from(content)).map_err(|e| match e {}))
}

/// A response made of a status code and nothing else
pub(crate) fn status_only(status: StatusCode) -> Result<HttpResponse> {
    Ok(Response::builder().status(status).body(text_body(""))?)
}

pub(crate) fn serialize<T: dxml::QWrite + Send + 'static>(
    status: StatusCode,
    elem: T,
) -> Result<HttpResponse> {
    let (tx, rx) = tokio::sync::mpsc::channel::<Bytes>(1);

    // Build the writer
    tokio::task::spawn(async move {
        let sink = PollSender::new(tx).sink_map_err(|_| Error::from(ErrorKind::BrokenPipe));
        let mut writer = SinkWriter::new(CopyToBytes::new(sink));
        let q = quick_xml::writer::Writer::new_with_indent(&mut writer, b' ', 4);
        let ns_to_apply = dxml::default_namespaces();
        let mut qwriter = dxml::Writer { q, ns_to_apply };
        let decl = quick_xml::events::BytesDecl::from_start(
            quick_xml::events::BytesStart::from_content("xml version=\"1.0\" encoding=\"utf-8\"", 0),
        );
        if let Err(e) = qwriter
            .q
            .write_event_async(quick_xml::events::Event::Decl(decl))
            .await
        {
            tracing::error!(err=?e, "unable to write XML declaration <?xml ... >");
            return;
        }
        match elem.qwrite(&mut qwriter).await {
            Ok(_) => tracing::debug!("fully serialized object"),
            Err(e) => tracing::error!(err=?e, "failed to serialize object"),
        }
    });

    // Build the reader
    let recv = tokio_stream::wrappers::ReceiverStream::new(rx);
    let stream = StreamBody::new(recv.map(|v| Ok(Frame::data(v))));
    let boxed_body = BoxBody::new(stream);

    let response = Response::builder()
        .status(status)
        .header("Content-Type", XML_CONTENT_TYPE)
        .body(boxed_body)?;

    Ok(response)
}

/// Deserialize a request body to an XML request
pub(crate) async fn deserialize<T: dxml::Node<T>>(body: &Bytes) -> Result<T> {
    let mut rdr = dxml::Reader::new(quick_xml::reader::NsReader::from_reader(body.as_ref())).await?;
    let parsed = rdr.find::<T>().await?;
    Ok(parsed)
}

/// Bodies made only of whitespaces count as no body at all
pub(crate) fn is_blank(body: &Bytes) -> bool {
    body.iter().all(u8::is_ascii_whitespace)
}

// --- request headers ---

fn header<'a>(req: &'a Request<Bytes>, name: &str) -> Option<&'a str> {
    req.headers()
        .get(name)
        .map(HeaderValue::to_str)
        .and_then(std::result::Result::ok)
        .map(str::trim)
}

/// `None` when the header is absent, each method picks its own default
pub(crate) fn depth(req: &Request<Bytes>) -> Result<Option<dav::Depth>, HeaderError> {
    match header(req, "Depth") {
        None => Ok(None),
        Some("0") => Ok(Some(dav::Depth::Zero)),
        Some("1") => Ok(Some(dav::Depth::One)),
        Some(v) if v.eq_ignore_ascii_case("infinity") => Ok(Some(dav::Depth::Infinity)),
        Some(_) => Err(HeaderError::Malformed("Depth")),
    }
}

pub(crate) fn overwrite(req: &Request<Bytes>) -> Result<Option<bool>, HeaderError> {
    match header(req, "Overwrite") {
        None => Ok(None),
        Some("T") | Some("t") => Ok(Some(true)),
        Some("F") | Some("f") => Ok(Some(false)),
        Some(_) => Err(HeaderError::Malformed("Overwrite")),
    }
}

/// Requested lock lifetime in seconds. Only the first proposal
/// of the client is considered.
pub(crate) fn timeout(req: &Request<Bytes>) -> u32 {
    let first = header(req, "Timeout")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .unwrap_or("");

    if first.eq_ignore_ascii_case("infinite") || first.starts_with("Extend-") {
        return INFINITE_TIMEOUT_SECONDS;
    }
    first
        .strip_prefix("Second-")
        .and_then(|secs| secs.parse::<u64>().ok())
        .map(|secs| secs.min(INFINITE_TIMEOUT_SECONDS.into()) as u32)
        .unwrap_or(INFINITE_TIMEOUT_SECONDS)
}

pub(crate) fn destination(req: &Request<Bytes>) -> Result<Path, HeaderError> {
    header(req, "Destination")
        .and_then(href_path)
        .ok_or(HeaderError::Malformed("Destination"))
}

/// `Lock-Token: <opaquelocktoken:...>`, without the angle brackets
pub(crate) fn lock_token(req: &Request<Bytes>) -> Option<String> {
    header(req, "Lock-Token")
        .map(|v| v.trim_start_matches('<').trim_end_matches('>').trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

pub(crate) fn preserve_acl(req: &Request<Bytes>) -> bool {
    matches!(header(req, "X-Cairn-Preserve-ACL"), Some("T") | Some("t"))
}

pub(crate) fn user_agent(req: &Request<Bytes>) -> Option<&str> {
    header(req, "User-Agent")
}

pub(crate) fn content_type(req: &Request<Bytes>) -> Option<&str> {
    header(req, "Content-Type").filter(|v| !v.is_empty())
}

pub(crate) fn content_language(req: &Request<Bytes>) -> Option<&str> {
    header(req, "Content-Language").filter(|v| !v.is_empty())
}

/// Repository path designated by an absolute URL or an absolute path
pub(crate) fn href_path(raw: &str) -> Option<Path> {
    let path = match raw.split_once("://") {
        Some((_scheme, rest)) => rest.find('/').map(|idx| &rest[idx..]).unwrap_or("/"),
        None => raw,
    };
    let path = path.split(['?', '#']).next().unwrap_or(path);
    if !path.starts_with('/') {
        return None;
    }
    Path::parse(path).ok()
}

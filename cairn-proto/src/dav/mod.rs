mod codec;
mod conditional;
mod controller;
mod locking;
mod middleware;
mod multistatus;
mod properties;
mod status;
mod values;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use futures::future::FutureExt;
use futures::stream::{FuturesUnordered, StreamExt};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::{Bytes, Incoming};
use hyper::rt::{Read, Write};
use hyper::server::conn::http1 as http;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use rustls_pemfile::{certs, private_key};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_rustls::TlsAcceptor;

use cairn_repo::property::TypeRegistry;
use cairn_repo::ArcRepository;
use cairn_user::config::{DavConfig, DavUnsecureConfig, WebdavConfig};
use cairn_user::login::{ArcLoginProvider, SecurityToken};

use crate::dav::controller::Controller;

pub use crate::dav::codec::HttpResponse;

/// Everything a request needs besides itself
pub struct DavContext {
    pub repository: ArcRepository,
    pub registry: Arc<dyn TypeRegistry>,
    pub webdav: WebdavConfig,
}

/// Answer one request on behalf of an already resolved caller.
///
/// The body must have been collected. Errors are the ones the method
/// layer can't turn into a status, they end up as a 500.
pub async fn dispatch(
    ctx: Arc<DavContext>,
    token: SecurityToken,
    req: Request<Bytes>,
) -> Result<HttpResponse> {
    Controller::route(ctx, token, req).await
}

pub struct Server {
    bind_addr: SocketAddr,
    login_provider: ArcLoginProvider,
    context: Arc<DavContext>,
    tls: Option<TlsAcceptor>,
}

pub fn new_unsecure(
    config: DavUnsecureConfig,
    login: ArcLoginProvider,
    context: Arc<DavContext>,
) -> Server {
    Server {
        bind_addr: config.bind_addr,
        login_provider: login,
        context,
        tls: None,
    }
}

pub fn new(config: DavConfig, login: ArcLoginProvider, context: Arc<DavContext>) -> Result<Server> {
    let loaded_certs = certs(&mut std::io::BufReader::new(std::fs::File::open(
        config.certs,
    )?))
    .collect::<Result<Vec<_>, _>>()?;
    let loaded_key = private_key(&mut std::io::BufReader::new(std::fs::File::open(
        &config.key,
    )?))?
    .ok_or(anyhow!("no private key found in {}", config.key.display()))?;

    let tls_config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(loaded_certs, loaded_key)?;
    let acceptor = TlsAcceptor::from(Arc::new(tls_config));

    Ok(Server {
        bind_addr: config.bind_addr,
        login_provider: login,
        context,
        tls: Some(acceptor),
    })
}

trait Stream: Read + Write + Send + Unpin {}
impl<T: Unpin + AsyncRead + AsyncWrite + Send> Stream for TokioIo<T> {}

impl Server {
    pub async fn run(self: Self, mut must_exit: watch::Receiver<bool>) -> Result<()> {
        let tcp = TcpListener::bind(self.bind_addr).await?;
        tracing::info!("DAV server listening on {:#}", self.bind_addr);

        let mut connections = FuturesUnordered::new();
        while !*must_exit.borrow() {
            let wait_conn_finished = async {
                if connections.is_empty() {
                    futures::future::pending().await
                } else {
                    connections.next().await
                }
            };
            let (socket, remote_addr) = tokio::select! {
                a = tcp.accept() => a?,
                _ = wait_conn_finished => continue,
                _ = must_exit.changed() => continue,
            };
            tracing::info!("Accepted connection from {}", remote_addr);
            let stream = match self.build_stream(socket).await {
                Ok(v) => v,
                Err(e) => {
                    tracing::error!(err=?e, "TLS acceptor failed");
                    continue;
                }
            };

            let login = self.login_provider.clone();
            let context = self.context.clone();
            let conn = tokio::spawn(async move {
                match http::Builder::new()
                    .serve_connection(
                        stream,
                        service_fn(|req: Request<Incoming>| {
                            let login = login.clone();
                            let context = context.clone();
                            tracing::info!("{:?} {:?}", req.method(), req.uri());
                            async move {
                                match middleware::auth(login, req, |token, request| {
                                    let context = context.clone();
                                    async move { collect_and_dispatch(context, token, request).await }
                                        .boxed()
                                })
                                .await
                                {
                                    Ok(v) => Ok(v),
                                    Err(e) => {
                                        tracing::error!(err=?e, "internal error");
                                        Response::builder()
                                            .status(500)
                                            .body(codec::text_body("Internal error"))
                                    }
                                }
                            }
                        }),
                    )
                    .await
                {
                    Err(e) => tracing::warn!(err=?e, "connection failed"),
                    Ok(()) => tracing::trace!("connection terminated with success"),
                }
            });
            connections.push(conn);
        }
        drop(tcp);

        tracing::info!("Server shutting down, draining remaining connections...");
        while connections.next().await.is_some() {}

        Ok(())
    }

    async fn build_stream(&self, socket: TcpStream) -> Result<Box<dyn Stream>> {
        match self.tls.clone() {
            Some(acceptor) => {
                let stream = acceptor.accept(socket).await?;
                Ok(Box::new(TokioIo::new(stream)))
            }
            None => Ok(Box::new(TokioIo::new(socket))),
        }
    }
}

/// Read the whole body, bounded by `max_body`, before dispatching
async fn collect_and_dispatch(
    ctx: Arc<DavContext>,
    token: SecurityToken,
    req: Request<Incoming>,
) -> Result<HttpResponse> {
    let (parts, body) = req.into_parts();
    let collected = match Limited::new(body, ctx.webdav.max_body).collect().await {
        Ok(v) => v.to_bytes(),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            tracing::warn!(limit = ctx.webdav.max_body, "request body too large");
            return codec::status_only(StatusCode::PAYLOAD_TOO_LARGE);
        }
        Err(e) => return Err(anyhow!("unable to read the request body: {}", e)),
    };

    dispatch(ctx, token, Request::from_parts(parts, collected)).await
}

// Local crates
use crate::rpc::server::RpcServer;

// External crates
use bytes::Bytes;
use http_body_util::Full;
use hyper::{
    Request, Response, StatusCode,
    body::{Body, Incoming},
    header::{CONTENT_TYPE, HeaderValue, X_CONTENT_TYPE_OPTIONS},
    service::service_fn,
};
use hyper_util::{
    rt::{TokioExecutor, TokioIo},
    server::conn::auto::Builder as HyperServerBuilder,
};
use std::{
    collections::HashMap,
    convert::Infallible,
    error::Error as StdError,
    io,
    net::{Ipv4Addr, Ipv6Addr},
    sync::Arc,
    time::Duration,
};
use tokio::net::TcpListener;
use tracing::{Instrument, instrument, instrument::WithSubscriber};

/// Maps request paths to RPC servers.
#[derive(Debug, Default)]
pub struct Router {
    routes: HashMap<String, Arc<RpcServer>>,
}

impl Router {
    /// Router with no routes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `path` with `server`.
    pub fn handle(&mut self, path: &str, server: Arc<RpcServer>) {
        self.routes.insert(path.to_string(), server);
    }

    /// Answer one request; unknown paths get a plain 404.
    pub async fn route<B>(&self, req: Request<B>) -> Response<Full<Bytes>>
    where
        B: Body,
        B::Error: Into<Box<dyn StdError + Send + Sync>>,
    {
        match self.routes.get(req.uri().path()) {
            Some(server) => server.handle(req).await,
            None => {
                tracing::debug!(path = %req.uri().path(), "No route for request");
                let mut response =
                    Response::new(Full::new(Bytes::from_static(b"404 page not found\n")));
                *response.status_mut() = StatusCode::NOT_FOUND;
                let headers = response.headers_mut();
                headers.insert(
                    CONTENT_TYPE,
                    HeaderValue::from_static("text/plain; charset=utf-8"),
                );
                headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
                response
            }
        }
    }
}

/// Bind `port` on every interface.
///
/// Prefers the dual-stack `[::]` wildcard and falls back to `0.0.0.0` on
/// hosts without IPv6.
pub async fn bind_all_interfaces(port: u16) -> io::Result<TcpListener> {
    match TcpListener::bind((Ipv6Addr::UNSPECIFIED, port)).await {
        Err(err) if ipv6_unavailable(&err) => {
            tracing::debug!(error = %err, "IPv6 unavailable, listening on IPv4 only");
            TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await
        }
        bound => bound,
    }
}

fn ipv6_unavailable(err: &io::Error) -> bool {
    // EAFNOSUPPORT
    matches!(
        err.kind(),
        io::ErrorKind::AddrNotAvailable | io::ErrorKind::Unsupported
    ) || err.raw_os_error() == Some(97)
}

/// Bind `port` on every interface and serve `router` until the listener fails.
///
/// Only returns on a fatal error: the bind failure or the accept error that
/// stopped the loop.
#[instrument(
    name = "rpc_http::listen_and_serve",
    target = "rpc::http",
    skip(router),
    level = "debug"
)]
pub async fn listen_and_serve(port: u16, router: Arc<Router>) -> io::Error {
    let listener = match bind_all_interfaces(port).await {
        Ok(listener) => listener,
        Err(err) => return err,
    };

    match listener.local_addr() {
        Ok(local) => tracing::info!(address = %local, "Listening on {local}"),
        Err(err) => return err,
    }

    serve(listener, router).await
}

fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    ) || matches!(err.raw_os_error(), Some(23 | 24))
}

/// Accept connections on `listener` and serve `router` on each.
///
/// Transient accept errors (aborted handshakes, file descriptor exhaustion)
/// are retried with a backoff from 5ms up to 1s; any other error is returned.
pub async fn serve(listener: TcpListener, router: Arc<Router>) -> io::Error {
    let mut backoff = Duration::ZERO;

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => {
                backoff = Duration::ZERO;
                accepted
            }
            Err(err) if is_transient(&err) => {
                backoff = (backoff * 2).clamp(Duration::from_millis(5), Duration::from_secs(1));
                tracing::warn!(error = %err, retry_in = ?backoff, "Accept error");
                tokio::time::sleep(backoff).await;
                continue;
            }
            Err(err) => {
                tracing::error!(error = %err, "Listener failed");
                return err;
            }
        };

        let io = TokioIo::new(stream);
        let conn_router = Arc::clone(&router);
        let service = service_fn(move |req: Request<Incoming>| {
            let router = Arc::clone(&conn_router);
            async move { Ok::<_, Infallible>(router.route(req).await) }
        });

        tracing::trace!(peer = %peer, "Spawning background task to handle connection");
        tokio::spawn(
            async move {
                if let Err(err) = HyperServerBuilder::new(TokioExecutor::new())
                    .serve_connection(io, service)
                    .await
                {
                    tracing::debug!(error = %err, "Connection closed with error");
                }
            }
            .instrument(tracing::debug_span!(target: "rpc::http", "connection", %peer))
            .with_current_subscriber(),
        );
    }
}

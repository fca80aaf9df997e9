// Local crates
use crate::rpc::codec::{Codec, RpcResponse};

// External crates
use bytes::Bytes;
use futures::future::BoxFuture;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::{
    Method, Request, Response, StatusCode,
    body::Body,
    header::{CONTENT_TYPE, HeaderValue, X_CONTENT_TYPE_OPTIONS},
};
use serde_json::Value;
use std::{collections::HashMap, error::Error as StdError, fmt, sync::Arc};
use tracing::instrument;

/// Largest request body read, in bytes.
pub const MAX_REQUEST_BODY: usize = 1 << 20;

/// Failure of a single service method call.
#[derive(Debug, thiserror::Error)]
pub enum RpcCallError {
    /// The service has no such method.
    #[error("unknown method {0}")]
    UnknownMethod(String),

    /// The params do not fit the method's arguments.
    #[error("rpc: invalid params: {0}")]
    InvalidParams(#[source] serde_json::Error),

    /// The method ran and failed; reported to the caller in the response.
    #[error("{0:#}")]
    Failed(anyhow::Error),
}

/// A named group of methods callable over RPC.
pub trait RpcService: Send + Sync + fmt::Debug {
    /// Run `method` with `params`, `null` when none were sent.
    fn call<'a>(&'a self, method: &'a str, params: Value)
    -> BoxFuture<'a, Result<Value, RpcCallError>>;
}

/// Dispatches JSON-RPC calls to registered services.
///
/// Mirrors the classic `net/rpc` over HTTP layout: a codec per content type and
/// services addressed as `Service.Method`.
#[derive(Debug, Default)]
pub struct RpcServer {
    codecs: HashMap<String, Arc<dyn Codec>>,
    services: HashMap<String, Arc<dyn RpcService>>,
}

fn normalize_content_type(content_type: &str) -> String {
    content_type
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase()
}

fn plain(status: StatusCode, message: impl Into<String>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(message.into())));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    response
}

impl RpcServer {
    /// Server with no codecs and no services.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `codec` for requests sent with `content_type`.
    pub fn register_codec(&mut self, codec: Arc<dyn Codec>, content_type: &str) {
        self.codecs
            .insert(normalize_content_type(content_type), codec);
    }

    /// Expose `service` under `name`, returning the service it replaces.
    pub fn register_service(
        &mut self,
        name: &str,
        service: Arc<dyn RpcService>,
    ) -> Option<Arc<dyn RpcService>> {
        self.services.insert(name.to_string(), service)
    }

    /// Codec for a request `Content-Type` header value.
    ///
    /// An exact match wins, then the media type alone. Without a header the
    /// only registered codec is used.
    fn codec_for(&self, content_type: &str) -> Option<&Arc<dyn Codec>> {
        let normalized = normalize_content_type(content_type);
        if normalized.is_empty() && self.codecs.len() == 1 {
            return self.codecs.values().next();
        }
        self.codecs.get(&normalized).or_else(|| {
            let media_type = normalized.split(';').next().unwrap_or_default();
            self.codecs.get(media_type)
        })
    }

    /// Answer one HTTP request.
    #[instrument(name = "rpc_server::handle", target = "rpc::server", level = "debug", skip_all)]
    pub async fn handle<B>(&self, req: Request<B>) -> Response<Full<Bytes>>
    where
        B: Body,
        B::Error: Into<Box<dyn StdError + Send + Sync>>,
    {
        if req.method() != Method::POST {
            return plain(
                StatusCode::METHOD_NOT_ALLOWED,
                format!("rpc: POST method required, received {}", req.method()),
            );
        }

        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let Some(codec) = self.codec_for(&content_type) else {
            return plain(
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                format!("rpc: unrecognized Content-Type: {content_type}"),
            );
        };

        let body = match Limited::new(req.into_body(), MAX_REQUEST_BODY).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(err) if err.is::<LengthLimitError>() => {
                return plain(
                    StatusCode::PAYLOAD_TOO_LARGE,
                    format!("rpc: request body exceeds {MAX_REQUEST_BODY} bytes"),
                );
            }
            Err(err) => {
                return plain(
                    StatusCode::BAD_REQUEST,
                    format!("rpc: cannot read request body: {err}"),
                );
            }
        };

        let request = match codec.decode_request(&body) {
            Ok(request) => request,
            Err(err) => return plain(StatusCode::BAD_REQUEST, err.to_string()),
        };

        let Some((service_name, method_name)) = request
            .method
            .split_once('.')
            .filter(|(_, method)| !method.contains('.'))
        else {
            return plain(
                StatusCode::BAD_REQUEST,
                format!(
                    "rpc: service/method request ill-formed: {:?}",
                    request.method
                ),
            );
        };
        let Some(service) = self.services.get(service_name) else {
            return plain(
                StatusCode::BAD_REQUEST,
                format!("rpc: can't find service {:?}", request.method),
            );
        };

        tracing::debug!(method = %request.method, id = %request.id, "Calling service method");
        let response = match service.call(method_name, request.params).await {
            Ok(result) => RpcResponse::success(request.id, result),
            Err(RpcCallError::UnknownMethod(_)) => {
                return plain(
                    StatusCode::BAD_REQUEST,
                    format!("rpc: can't find method {:?}", request.method),
                );
            }
            Err(err @ RpcCallError::InvalidParams(_)) => {
                return plain(StatusCode::BAD_REQUEST, err.to_string());
            }
            Err(err @ RpcCallError::Failed(_)) => {
                tracing::warn!(method = %request.method, error = %err, "Service method failed");
                RpcResponse::failure(request.id, err.to_string())
            }
        };

        match codec.encode_response(&response) {
            Ok(bytes) => {
                let mut reply = Response::new(Full::new(bytes));
                reply.headers_mut().insert(
                    CONTENT_TYPE,
                    HeaderValue::from_static(codec.content_type()),
                );
                reply
            }
            Err(err) => plain(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
        }
    }
}

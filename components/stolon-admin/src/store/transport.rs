//! HTTP/1.1 requests to the coordination store.
//!
//! Each request opens a fresh connection (TLS when configured). Endpoints are
//! tried in the order given: a connection-level failure moves on to the next
//! endpoint, while any HTTP answer, error statuses included, is final.

// Local crates
use crate::store::errors::ClientError;

// External crates
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{
    Method, Request, StatusCode,
    client::conn::http1,
    header::{CONTENT_TYPE, HOST},
};
use hyper_util::rt::TokioIo;
use std::fmt;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
};
use tokio_rustls::{TlsConnector, rustls::pki_types::ServerName};
use tracing::{Instrument, instrument, instrument::WithSubscriber};
use url::{Position, Url};

/// A request body together with its content type.
#[derive(Debug, Clone)]
pub struct Body {
    /// `Content-Type` header value.
    pub content_type: &'static str,
    /// Raw bytes.
    pub bytes: Bytes,
}

/// Status and body of a store answer.
#[derive(Debug, Clone)]
pub struct Answer {
    /// HTTP status.
    pub status: StatusCode,
    /// Full body.
    pub body: Bytes,
}

/// Parse a comma-delimited endpoint list.
///
/// Entries without a scheme get `https://` when `tls` is set and `http://`
/// otherwise. Empty entries are skipped; an empty list yields `default`.
pub fn parse_endpoints(list: &str, default: &str, tls: bool) -> Result<Vec<Url>, ClientError> {
    let mut entries: Vec<&str> = list
        .split(',')
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .collect();
    if entries.is_empty() {
        entries.push(default);
    }

    let scheme = if tls { "https" } else { "http" };
    entries
        .into_iter()
        .map(|entry| {
            let candidate = if entry.contains("://") {
                entry.to_string()
            } else {
                format!("{scheme}://{entry}")
            };
            let url = Url::parse(&candidate).map_err(|e| ClientError::InvalidEndpoint {
                endpoint: entry.to_string(),
                reason: e.to_string(),
            })?;

            match url.scheme() {
                "http" | "https" => {}
                other => {
                    return Err(ClientError::InvalidEndpoint {
                        endpoint: entry.to_string(),
                        reason: format!("unsupported scheme {other}"),
                    });
                }
            }
            if url.host_str().is_none() {
                return Err(ClientError::InvalidEndpoint {
                    endpoint: entry.to_string(),
                    reason: "missing host".to_string(),
                });
            }
            Ok(url)
        })
        .collect()
}

/// Sends requests to the first reachable store endpoint.
#[derive(Clone)]
pub struct StoreTransport {
    endpoints: Vec<Url>,
    tls: Option<TlsConnector>,
}

impl fmt::Debug for StoreTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreTransport")
            .field("endpoints", &self.endpoints)
            .field("tls", &self.tls.is_some())
            .finish()
    }
}

impl StoreTransport {
    /// Transport over `endpoints`, using `tls` for `https` endpoints.
    pub fn new(endpoints: Vec<Url>, tls: Option<TlsConnector>) -> Self {
        Self { endpoints, tls }
    }

    /// Endpoints in the order they are tried.
    pub fn endpoints(&self) -> &[Url] {
        &self.endpoints
    }

    /// Send `method` to the first endpoint that answers.
    ///
    /// Every element of `path` is one percent-encoded segment appended to the
    /// endpoint's path; an empty last element leaves a trailing slash.
    #[instrument(
        name = "store::transport::request",
        target = "store::transport",
        level = "debug",
        skip(self, body)
    )]
    pub async fn request(
        &self,
        method: Method,
        path: &[&str],
        query: Option<&str>,
        body: Option<Body>,
    ) -> Result<Answer, ClientError> {
        let mut last_error = String::from("no endpoints configured");

        for endpoint in &self.endpoints {
            let url = target(endpoint, path, query)?;

            match self.send(method.clone(), &url, body.clone()).await {
                Ok(answer) => {
                    tracing::debug!(
                        endpoint = %endpoint,
                        status = %answer.status,
                        "Store answered"
                    );
                    return Ok(answer);
                }
                Err(e) => {
                    tracing::debug!(endpoint = %endpoint, error = %e, "Store endpoint failed");
                    last_error = format!("{endpoint}: {e}");
                }
            }
        }

        Err(ClientError::Unreachable {
            endpoints: self
                .endpoints
                .iter()
                .map(Url::as_str)
                .collect::<Vec<_>>()
                .join(","),
            last_error,
        })
    }

    async fn send(&self, method: Method, url: &Url, body: Option<Body>) -> anyhow::Result<Answer> {
        let host = url
            .host_str()
            .ok_or_else(|| anyhow::anyhow!("endpoint has no host"))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| anyhow::anyhow!("endpoint has no port"))?;
        let authority = &url[Position::BeforeHost..Position::AfterPort];

        let mut builder = Request::builder()
            .method(method)
            .uri(&url[Position::BeforePath..Position::AfterQuery])
            .header(HOST, authority);
        let payload = match body {
            Some(body) => {
                builder = builder.header(CONTENT_TYPE, body.content_type);
                body.bytes
            }
            None => Bytes::new(),
        };
        let request = builder.body(Full::new(payload))?;

        let stream = TcpStream::connect((host.trim_matches(['[', ']']), port)).await?;

        if url.scheme() == "https" {
            let connector = self
                .tls
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("https endpoint without TLS material"))?;
            let server_name = ServerName::try_from(host.trim_matches(['[', ']']).to_string())?;
            let stream = connector.connect(server_name, stream).await?;
            exchange(stream, request).await
        } else {
            exchange(stream, request).await
        }
    }
}

fn target(endpoint: &Url, path: &[&str], query: Option<&str>) -> Result<Url, ClientError> {
    let mut url = endpoint.clone();
    url.path_segments_mut()
        .map_err(|()| ClientError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason: "endpoint cannot carry a path".to_string(),
        })?
        .pop_if_empty()
        .extend(path);
    url.set_query(query);
    Ok(url)
}

async fn exchange<S>(stream: S, request: Request<Full<Bytes>>) -> anyhow::Result<Answer>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut sender, conn) = http1::handshake(TokioIo::new(stream)).await?;

    tokio::spawn(
        async move {
            if let Err(err) = conn.await {
                tracing::debug!(error = %err, "Store connection closed with error");
            }
        }
        .in_current_span()
        .with_current_subscriber(),
    );

    let response = sender.send_request(request).await?;
    let status = response.status();
    let body = response.into_body().collect().await?.to_bytes();
    Ok(Answer { status, body })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_endpoints_get_a_scheme() {
        let urls = parse_endpoints("10.0.0.1:2379, 10.0.0.2:2379", "127.0.0.1:2379", false).unwrap();
        assert_eq!(urls.len(), 2);
        assert_eq!(urls[0].as_str(), "http://10.0.0.1:2379/");
        assert_eq!(urls[1].port(), Some(2379));

        let urls = parse_endpoints("etcd.local:2379", "127.0.0.1:2379", true).unwrap();
        assert_eq!(urls[0].scheme(), "https");
    }

    #[test]
    fn explicit_scheme_is_kept() {
        let urls = parse_endpoints("https://consul:8501", "127.0.0.1:8500", false).unwrap();
        assert_eq!(urls[0].scheme(), "https");
        assert_eq!(urls[0].port(), Some(8501));
    }

    #[test]
    fn empty_list_falls_back_to_default() {
        let urls = parse_endpoints(" , ", "127.0.0.1:8500", false).unwrap();
        assert_eq!(urls.len(), 1);
        assert_eq!(urls[0].as_str(), "http://127.0.0.1:8500/");
    }

    #[test]
    fn unsupported_scheme_is_rejected() {
        let err = parse_endpoints("unix:///var/run/etcd.sock", "", false).unwrap_err();
        assert!(matches!(err, ClientError::InvalidEndpoint { .. }));
    }

    #[test]
    fn segments_are_appended_to_the_endpoint_path() {
        let endpoint = Url::parse("http://consul:8500/").unwrap();
        let url = target(&endpoint, &["v1", "kv", "stolon", "cluster", ""], Some("keys")).unwrap();
        assert_eq!(url.as_str(), "http://consul:8500/v1/kv/stolon/cluster/?keys");

        let prefixed = Url::parse("https://gateway/etcd/").unwrap();
        let url = target(&prefixed, &["v2", "keys", "stolon"], None).unwrap();
        assert_eq!(url.as_str(), "https://gateway/etcd/v2/keys/stolon");
    }

    #[test]
    fn segments_cannot_change_the_path_or_query() {
        let endpoint = Url::parse("http://etcd:2379/").unwrap();

        let url = target(&endpoint, &["v2", "keys", "a/b", "clusterdata"], None).unwrap();
        assert_eq!(url.path(), "/v2/keys/a%2Fb/clusterdata");

        let url = target(&endpoint, &["v1", "kv", "main?x#y"], Some("raw")).unwrap();
        assert_eq!(url.path(), "/v1/kv/main%3Fx%23y");
        assert_eq!(url.query(), Some("raw"));
        assert_eq!(url.fragment(), None);

        let url = target(&endpoint, &["v2", "keys", "..", "..", "secrets"], None).unwrap();
        assert!(url.path().starts_with("/v2/keys/"), "{url}");
    }

    #[test]
    fn debug_hides_tls_material() {
        let transport =
            StoreTransport::new(parse_endpoints("etcd:2379", "", false).unwrap(), None);
        let text = format!("{transport:?}");
        assert!(text.contains("http://etcd:2379/"), "{text}");
        assert!(text.contains("tls: false"), "{text}");
    }

    #[tokio::test]
    async fn unreachable_endpoints_are_all_tried() {
        let a = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let b = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let list = format!("{},{}", a.local_addr().unwrap(), b.local_addr().unwrap());
        drop((a, b));

        let transport = StoreTransport::new(parse_endpoints(&list, "", false).unwrap(), None);
        let err = transport
            .request(Method::GET, &["v2", "keys", "stolon"], None, None)
            .await
            .unwrap_err();

        match err {
            ClientError::Unreachable { endpoints, .. } => {
                assert_eq!(endpoints.split(',').count(), 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}

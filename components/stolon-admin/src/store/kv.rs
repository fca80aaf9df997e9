//! Key/value access to the coordination store.
//!
//! Two backends speak the store's HTTP API directly:
//! - [`EtcdStore`]: the etcd v2 keys API (`/v2/keys/...`),
//! - [`ConsulStore`]: the Consul KV API (`/v1/kv/...`).

// Local crates
use crate::store::{
    errors::ClientError,
    transport::{Answer, Body, StoreTransport},
};

// External crates
use bytes::Bytes;
use futures::future::BoxFuture;
use hyper::{Method, StatusCode};
use serde::Deserialize;
use std::fmt;
use url::form_urlencoded;

/// Supported store backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum StoreBackend {
    /// etcd, v2 keys API.
    Etcd,
    /// Consul KV.
    Consul,
}

impl StoreBackend {
    /// Endpoint used when none is configured.
    pub fn default_endpoint(&self) -> &'static str {
        match self {
            StoreBackend::Etcd => "127.0.0.1:2379",
            StoreBackend::Consul => "127.0.0.1:8500",
        }
    }
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreBackend::Etcd => f.write_str("etcd"),
            StoreBackend::Consul => f.write_str("consul"),
        }
    }
}

/// Minimal key/value capability the cluster client is built on.
pub trait KvStore: Send + Sync + fmt::Debug {
    /// Value stored at `key`, `None` when absent.
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Bytes>, ClientError>>;

    /// Store `value` at `key`, overwriting.
    fn put<'a>(&'a self, key: &'a str, value: Bytes) -> BoxFuture<'a, Result<(), ClientError>>;

    /// Names of the direct children of `prefix`, in store order.
    fn list<'a>(&'a self, prefix: &'a str) -> BoxFuture<'a, Result<Vec<String>, ClientError>>;
}

fn unexpected(answer: Answer, key: &str) -> ClientError {
    ClientError::UnexpectedStatus {
        status: answer.status,
        key: key.to_string(),
        body: String::from_utf8_lossy(&answer.body).trim().to_string(),
    }
}

fn key_path<'a>(root: &[&'a str], key: &'a str) -> Vec<&'a str> {
    root.iter()
        .copied()
        .chain(key.split('/').filter(|s| !s.is_empty()))
        .collect()
}

fn child_name(prefix: &str, key: &str) -> Option<String> {
    let rest = key
        .trim_start_matches('/')
        .strip_prefix(prefix.trim_matches('/'))?
        .strip_prefix('/')?;
    let name = rest.trim_end_matches('/');
    (!name.is_empty() && !name.contains('/')).then(|| name.to_string())
}

/// etcd v2 keys API backend.
#[derive(Debug, Clone)]
pub struct EtcdStore {
    transport: StoreTransport,
}

#[derive(Debug, Deserialize)]
struct EtcdResponse {
    node: EtcdNode,
}

#[derive(Debug, Deserialize)]
struct EtcdNode {
    key: Option<String>,
    value: Option<String>,
    #[serde(default)]
    nodes: Vec<EtcdNode>,
}

impl EtcdStore {
    /// Backend over `transport`.
    pub fn new(transport: StoreTransport) -> Self {
        Self { transport }
    }

    fn path(key: &str) -> Vec<&str> {
        key_path(&["v2", "keys"], key)
    }

    fn decode(answer: &Answer, key: &str) -> Result<EtcdResponse, ClientError> {
        serde_json::from_slice(&answer.body).map_err(|source| ClientError::MalformedResponse {
            key: key.to_string(),
            source,
        })
    }
}

impl KvStore for EtcdStore {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Bytes>, ClientError>> {
        Box::pin(async move {
            let answer = self
                .transport
                .request(Method::GET, &Self::path(key), None, None)
                .await?;
            match answer.status {
                StatusCode::OK => {
                    let response = Self::decode(&answer, key)?;
                    Ok(response.node.value.map(Bytes::from))
                }
                StatusCode::NOT_FOUND => Ok(None),
                _ => Err(unexpected(answer, key)),
            }
        })
    }

    fn put<'a>(&'a self, key: &'a str, value: Bytes) -> BoxFuture<'a, Result<(), ClientError>> {
        Box::pin(async move {
            let form = form_urlencoded::Serializer::new(String::new())
                .append_pair("value", &String::from_utf8_lossy(&value))
                .finish();
            let body = Body {
                content_type: "application/x-www-form-urlencoded",
                bytes: Bytes::from(form),
            };

            let answer = self
                .transport
                .request(Method::PUT, &Self::path(key), None, Some(body))
                .await?;
            match answer.status {
                StatusCode::OK | StatusCode::CREATED => Ok(()),
                _ => Err(unexpected(answer, key)),
            }
        })
    }

    fn list<'a>(&'a self, prefix: &'a str) -> BoxFuture<'a, Result<Vec<String>, ClientError>> {
        Box::pin(async move {
            let answer = self
                .transport
                .request(Method::GET, &Self::path(prefix), None, None)
                .await?;
            match answer.status {
                StatusCode::OK => {
                    let response = Self::decode(&answer, prefix)?;
                    Ok(response
                        .node
                        .nodes
                        .iter()
                        .filter_map(|n| n.key.as_deref())
                        .filter_map(|k| child_name(prefix, k))
                        .collect())
                }
                StatusCode::NOT_FOUND => Ok(Vec::new()),
                _ => Err(unexpected(answer, prefix)),
            }
        })
    }
}

/// Consul KV API backend.
#[derive(Debug, Clone)]
pub struct ConsulStore {
    transport: StoreTransport,
}

impl ConsulStore {
    /// Backend over `transport`.
    pub fn new(transport: StoreTransport) -> Self {
        Self { transport }
    }

    fn path(key: &str) -> Vec<&str> {
        key_path(&["v1", "kv"], key)
    }
}

impl KvStore for ConsulStore {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Bytes>, ClientError>> {
        Box::pin(async move {
            let answer = self
                .transport
                .request(Method::GET, &Self::path(key), Some("raw"), None)
                .await?;
            match answer.status {
                StatusCode::OK => Ok(Some(answer.body)),
                StatusCode::NOT_FOUND => Ok(None),
                _ => Err(unexpected(answer, key)),
            }
        })
    }

    fn put<'a>(&'a self, key: &'a str, value: Bytes) -> BoxFuture<'a, Result<(), ClientError>> {
        Box::pin(async move {
            let body = Body {
                content_type: "application/octet-stream",
                bytes: value,
            };
            let answer = self
                .transport
                .request(Method::PUT, &Self::path(key), None, Some(body))
                .await?;

            let accepted = answer.status == StatusCode::OK
                && answer.body.as_ref().trim_ascii() == b"true";
            if accepted {
                Ok(())
            } else {
                Err(unexpected(answer, key))
            }
        })
    }

    fn list<'a>(&'a self, prefix: &'a str) -> BoxFuture<'a, Result<Vec<String>, ClientError>> {
        Box::pin(async move {
            let mut path = Self::path(prefix);
            path.push("");
            let answer = self
                .transport
                .request(Method::GET, &path, Some("keys&separator=/"), None)
                .await?;
            match answer.status {
                StatusCode::OK => {
                    let keys: Vec<String> = serde_json::from_slice(&answer.body).map_err(
                        |source| ClientError::MalformedResponse {
                            key: prefix.to_string(),
                            source,
                        },
                    )?;
                    Ok(keys.iter().filter_map(|k| child_name(prefix, k)).collect())
                }
                StatusCode::NOT_FOUND => Ok(Vec::new()),
                _ => Err(unexpected(answer, prefix)),
            }
        })
    }
}

//! In-process stand-ins for the etcd v2 and Consul KV HTTP APIs.

#![allow(dead_code)]

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{
    Method, Request, Response, StatusCode, body::Incoming, client::conn::http1,
    server::conn::http1 as server_http1, service::service_fn,
};
use hyper_util::rt::TokioIo;
use serde_json::{Value, json};
use std::{
    collections::BTreeMap,
    convert::Infallible,
    net::SocketAddr,
    sync::{Arc, Mutex},
};
use stolon_admin::store::kv::StoreBackend;
use tokio::net::{TcpListener, TcpStream};
use url::form_urlencoded;

type Entries = Arc<Mutex<BTreeMap<String, String>>>;

/// A running fake store.
pub struct FakeStore {
    pub addr: SocketAddr,
    pub backend: StoreBackend,
    entries: Entries,
}

impl FakeStore {
    /// Start a fake `backend` on a random local port.
    pub async fn spawn(backend: StoreBackend) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let entries: Entries = Arc::default();

        let shared = Arc::clone(&entries);
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let entries = Arc::clone(&shared);
                let service = service_fn(move |req: Request<Incoming>| {
                    let entries = Arc::clone(&entries);
                    async move { Ok::<_, Infallible>(handle(backend, entries, req).await) }
                });
                tokio::spawn(async move {
                    let _ = server_http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
        });

        Self {
            addr,
            backend,
            entries,
        }
    }

    pub fn insert(&self, key: &str, value: &str) {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().unwrap().get(key).cloned()
    }

    pub fn json(&self, key: &str) -> Value {
        serde_json::from_str(&self.get(key).unwrap()).unwrap()
    }
}

/// A cluster data document with one master and one standby.
pub fn cluster_data() -> Value {
    json!({
        "formatVersion": 1,
        "cluster": {
            "uid": "c0ffee",
            "spec": {"sleepInterval": "5s", "maxStandbys": 20},
            "status": {"phase": "normal", "master": "db1"}
        },
        "keepers": {
            "keeper1": {"status": {"healthy": true}},
            "keeper2": {"status": {"healthy": true}}
        },
        "dbs": {
            "db1": {
                "spec": {"keeperUID": "keeper1", "role": "master"},
                "status": {"healthy": true, "listenAddress": "10.0.0.1", "port": "5432"}
            },
            "db2": {
                "spec": {"keeperUID": "keeper2", "role": "standby"},
                "status": {"healthy": true, "listenAddress": "10.0.0.2", "port": "5432"}
            }
        }
    })
}

fn reply(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
}

fn children(entries: &BTreeMap<String, String>, prefix: &str) -> Vec<(String, bool)> {
    let dir = format!("{}/", prefix.trim_end_matches('/'));
    let mut found: Vec<(String, bool)> = Vec::new();
    for key in entries.keys().filter(|k| k.starts_with(&dir)) {
        let rest = &key[dir.len()..];
        let (name, is_dir) = match rest.split_once('/') {
            Some((name, _)) => (name, true),
            None => (rest, false),
        };
        if !found.iter().any(|(n, _)| n == name) {
            found.push((name.to_string(), is_dir));
        }
    }
    found
}

async fn handle(backend: StoreBackend, entries: Entries, req: Request<Incoming>) -> Response<Full<Bytes>> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().unwrap_or_default().to_string();
    let body = req.into_body().collect().await.unwrap().to_bytes();

    match backend {
        StoreBackend::Etcd => {
            let Some(key) = path.strip_prefix("/v2/keys/") else {
                return reply(StatusCode::NOT_FOUND, "");
            };
            let key = key.trim_end_matches('/').to_string();
            let mut entries = entries.lock().unwrap();
            match method {
                Method::GET => {
                    if let Some(value) = entries.get(&key) {
                        let doc = json!({"action": "get", "node": {"key": format!("/{key}"), "value": value}});
                        return reply(StatusCode::OK, doc.to_string());
                    }
                    let nodes: Vec<Value> = children(&entries, &key)
                        .into_iter()
                        .map(|(name, dir)| json!({"key": format!("/{key}/{name}"), "dir": dir}))
                        .collect();
                    if nodes.is_empty() {
                        let doc = json!({"errorCode": 100, "message": "Key not found", "cause": format!("/{key}")});
                        return reply(StatusCode::NOT_FOUND, doc.to_string());
                    }
                    let doc = json!({"action": "get", "node": {"key": format!("/{key}"), "dir": true, "nodes": nodes}});
                    reply(StatusCode::OK, doc.to_string())
                }
                Method::PUT => {
                    let value = form_urlencoded::parse(&body)
                        .find(|(k, _)| k == "value")
                        .map(|(_, v)| v.into_owned())
                        .unwrap_or_default();
                    let created = entries.insert(key.clone(), value.clone()).is_none();
                    let doc = json!({"action": "set", "node": {"key": format!("/{key}"), "value": value}});
                    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
                    reply(status, doc.to_string())
                }
                _ => reply(StatusCode::METHOD_NOT_ALLOWED, ""),
            }
        }
        StoreBackend::Consul => {
            let Some(key) = path.strip_prefix("/v1/kv/") else {
                return reply(StatusCode::NOT_FOUND, "");
            };
            let mut entries = entries.lock().unwrap();
            match method {
                Method::GET if query.contains("keys") => {
                    let prefix = key.trim_end_matches('/');
                    let keys: Vec<String> = children(&entries, prefix)
                        .into_iter()
                        .map(|(name, dir)| {
                            if dir {
                                format!("{prefix}/{name}/")
                            } else {
                                format!("{prefix}/{name}")
                            }
                        })
                        .collect();
                    if keys.is_empty() {
                        return reply(StatusCode::NOT_FOUND, "");
                    }
                    reply(StatusCode::OK, serde_json::to_string(&keys).unwrap())
                }
                Method::GET => match entries.get(key) {
                    Some(value) => reply(StatusCode::OK, value.clone()),
                    None => reply(StatusCode::NOT_FOUND, ""),
                },
                Method::PUT => {
                    let value = String::from_utf8(body.to_vec()).unwrap();
                    entries.insert(key.to_string(), value);
                    reply(StatusCode::OK, "true")
                }
                _ => reply(StatusCode::METHOD_NOT_ALLOWED, ""),
            }
        }
    }
}

/// Send one HTTP/1.1 request to `addr`.
pub async fn http_request(
    addr: SocketAddr,
    method: Method,
    path: &str,
    content_type: Option<&str>,
    body: &str,
) -> (StatusCode, String) {
    let stream = TcpStream::connect(addr).await.unwrap();
    let (mut sender, conn) = http1::handshake(TokioIo::new(stream)).await.unwrap();
    tokio::spawn(conn);

    let mut builder = Request::builder()
        .method(method)
        .uri(path)
        .header(hyper::header::HOST, addr.to_string());
    if let Some(ct) = content_type {
        builder = builder.header(hyper::header::CONTENT_TYPE, ct);
    }
    let request = builder
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap();

    let response = sender.send_request(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

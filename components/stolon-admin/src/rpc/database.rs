//! The `DatabaseOperation` RPC service.

// Local crates
use crate::{
    helpers::load_config::RpcServiceConfig,
    rpc::server::{RpcCallError, RpcService},
};

// External crates
use anyhow::Context;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tracing::instrument;

/// Default time allowed for a `Ping` connection attempt.
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(5);

/// How to reach the database the service operates on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnSettings {
    /// Database host name or address.
    pub host: String,
    /// Database port.
    pub port: u16,
    /// Role used to connect.
    pub username: String,
}

impl From<&RpcServiceConfig> for ConnSettings {
    fn from(cfg: &RpcServiceConfig) -> Self {
        Self {
            host: cfg.db_host.clone(),
            port: cfg.db_port,
            username: cfg.db_username.clone(),
        }
    }
}

impl ConnSettings {
    fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct PingArgs {
    timeout_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PingReply {
    address: String,
    latency_ms: u64,
}

/// Database operations bound to one set of connection settings.
///
/// Methods:
/// - `ConnSettings`: the configured host, port and username,
/// - `Ping`: opens a TCP connection to the database; params may set
///   `timeoutMs`.
#[derive(Debug, Clone)]
pub struct DatabaseOperation {
    conn: ConnSettings,
}

impl DatabaseOperation {
    /// Service name used at registration.
    pub const NAME: &'static str = "DatabaseOperation";

    /// Service over `conn`.
    pub fn new(conn: ConnSettings) -> Self {
        Self { conn }
    }

    #[instrument(
        name = "database_operation::ping",
        target = "rpc::database",
        skip(self),
        level = "debug"
    )]
    async fn ping(&self, timeout: Duration) -> anyhow::Result<PingReply> {
        let address = self.conn.address();
        let started = Instant::now();

        let stream = tokio::time::timeout(timeout, TcpStream::connect(address.as_str()))
            .await
            .with_context(|| format!("timed out connecting to database at {address}"))?
            .with_context(|| format!("cannot reach database at {address}"))?;
        drop(stream);

        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        tracing::debug!(address = %address, latency_ms, "Database reachable");
        Ok(PingReply {
            address,
            latency_ms,
        })
    }
}

fn args<T: Default + DeserializeOwned>(params: Value) -> Result<T, RpcCallError> {
    if params.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(params).map_err(RpcCallError::InvalidParams)
}

fn reply<T: Serialize>(value: T) -> Result<Value, RpcCallError> {
    serde_json::to_value(value).map_err(|e| RpcCallError::Failed(e.into()))
}

impl RpcService for DatabaseOperation {
    fn call<'a>(
        &'a self,
        method: &'a str,
        params: Value,
    ) -> BoxFuture<'a, Result<Value, RpcCallError>> {
        Box::pin(async move {
            match method {
                "ConnSettings" => reply(&self.conn),
                "Ping" => {
                    let args: PingArgs = args(params)?;
                    let timeout = args
                        .timeout_ms
                        .map(Duration::from_millis)
                        .unwrap_or(DEFAULT_PING_TIMEOUT);
                    let pong = self.ping(timeout).await.map_err(RpcCallError::Failed)?;
                    reply(pong)
                }
                other => Err(RpcCallError::UnknownMethod(other.to_string())),
            }
        })
    }
}

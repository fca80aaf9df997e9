// Local crates
use crate::{
    cli::cli::CliConfig,
    store::{
        errors::ClientError,
        kv::{ConsulStore, EtcdStore, KvStore, StoreBackend},
        models::{CLUSTERS_PREFIX, ClusterData, ClusterStatus, cluster_data_key},
        tls::{self, TlsPaths},
        transport::{StoreTransport, parse_endpoints},
    },
};

// External crates
use bytes::Bytes;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::instrument;

/// Operations `stolonctl` performs against a cluster store.
///
/// Any backend (etcd, consul, an in-memory fake) provides these five
/// capabilities.
pub trait ClusterOperations {
    /// Current configuration document of `cluster`.
    fn config(&self, cluster: &str) -> impl Future<Output = Result<Value, ClientError>> + Send;

    /// Merge the partial document `payload` into the configuration of `cluster`.
    fn patch_config(
        &self,
        cluster: &str,
        payload: &[u8],
    ) -> impl Future<Output = Result<(), ClientError>> + Send;

    /// Replace the whole configuration of `cluster` with `payload`.
    fn replace_config(
        &self,
        cluster: &str,
        payload: &[u8],
    ) -> impl Future<Output = Result<(), ClientError>> + Send;

    /// Health and topology of `cluster`.
    fn status(&self, cluster: &str)
    -> impl Future<Output = Result<ClusterStatus, ClientError>> + Send;

    /// Names of all known clusters.
    fn clusters(&self) -> impl Future<Output = Result<Vec<String>, ClientError>> + Send;
}

/// [`ClusterOperations`] over a key/value coordination store.
///
/// Each cluster keeps one JSON document at `stolon/cluster/<name>/clusterdata`;
/// the configuration lives at `cluster.spec` inside it. Writes edit the raw
/// document so fields this client does not know about survive.
#[derive(Debug, Clone)]
pub struct StoreClient {
    backend: StoreBackend,
    kv: Arc<dyn KvStore>,
}

impl StoreClient {
    /// Build a client from the resolved CLI configuration.
    ///
    /// Validates the backend, the endpoints and the TLS material; does not
    /// contact the store.
    #[instrument(name = "store::client::new", target = "store::client", level = "debug", skip_all)]
    pub fn new(cfg: &CliConfig) -> Result<Self, ClientError> {
        let backend = cfg.store_backend.ok_or(ClientError::MissingBackend)?;

        let paths = TlsPaths {
            cert: cfg.store_cert.as_deref(),
            key: cfg.store_key.as_deref(),
            ca_cert: cfg.store_cacert.as_deref(),
        };
        let connector = tls::load_connector(&paths).map_err(ClientError::Tls)?;
        let endpoints = parse_endpoints(
            &cfg.store_endpoints,
            backend.default_endpoint(),
            connector.is_some(),
        )?;

        tracing::debug!(
            backend = %backend,
            endpoints = ?endpoints.iter().map(|u| u.as_str()).collect::<Vec<_>>(),
            tls = connector.is_some(),
            "Store client configured"
        );

        let transport = StoreTransport::new(endpoints, connector);
        let kv: Arc<dyn KvStore> = match backend {
            StoreBackend::Etcd => Arc::new(EtcdStore::new(transport)),
            StoreBackend::Consul => Arc::new(ConsulStore::new(transport)),
        };
        Ok(Self { backend, kv })
    }

    /// Client over an existing key/value store.
    pub fn with_store(backend: StoreBackend, kv: Arc<dyn KvStore>) -> Self {
        Self { backend, kv }
    }

    /// Backend this client talks to.
    pub fn backend(&self) -> StoreBackend {
        self.backend
    }

    async fn load_raw(&self, cluster: &str) -> Result<Bytes, ClientError> {
        self.kv
            .get(&cluster_data_key(cluster)?)
            .await?
            .ok_or_else(|| ClientError::ClusterNotFound(cluster.to_string()))
    }

    async fn load_document(&self, cluster: &str) -> Result<Value, ClientError> {
        let raw = self.load_raw(cluster).await?;
        let doc: Value =
            serde_json::from_slice(&raw).map_err(|e| ClientError::InvalidClusterData {
                cluster: cluster.to_string(),
                reason: e.to_string(),
            })?;
        if !doc.is_object() {
            return Err(ClientError::InvalidClusterData {
                cluster: cluster.to_string(),
                reason: "document is not a JSON object".to_string(),
            });
        }
        Ok(doc)
    }

    async fn save_document(&self, cluster: &str, doc: &Value) -> Result<(), ClientError> {
        let raw = serde_json::to_vec(doc).map_err(|e| ClientError::InvalidClusterData {
            cluster: cluster.to_string(),
            reason: e.to_string(),
        })?;
        self.kv.put(&cluster_data_key(cluster)?, Bytes::from(raw)).await
    }
}

fn spec_mut<'a>(doc: &'a mut Value, cluster: &str) -> Result<&'a mut Value, ClientError> {
    let invalid = |reason: &str| ClientError::InvalidClusterData {
        cluster: cluster.to_string(),
        reason: reason.to_string(),
    };

    let section = doc
        .as_object_mut()
        .ok_or_else(|| invalid("document is not a JSON object"))?
        .entry("cluster")
        .or_insert_with(|| Value::Object(Map::new()));
    let spec = section
        .as_object_mut()
        .ok_or_else(|| invalid("cluster section is not a JSON object"))?
        .entry("spec")
        .or_insert_with(|| Value::Object(Map::new()));
    if spec.is_null() {
        *spec = Value::Object(Map::new());
    }
    Ok(spec)
}

fn parse_config_object(payload: &[u8]) -> Result<Value, ClientError> {
    let doc: Value =
        serde_json::from_slice(payload).map_err(|e| ClientError::InvalidConfig(e.to_string()))?;
    if !doc.is_object() {
        return Err(ClientError::InvalidConfig(
            "configuration must be a JSON object".to_string(),
        ));
    }
    Ok(doc)
}

impl ClusterOperations for StoreClient {
    #[instrument(name = "store::client::config", target = "store::client", level = "debug", skip(self))]
    async fn config(&self, cluster: &str) -> Result<Value, ClientError> {
        let doc = self.load_document(cluster).await?;
        Ok(doc
            .pointer("/cluster/spec")
            .filter(|spec| !spec.is_null())
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new())))
    }

    #[instrument(
        name = "store::client::patch_config",
        target = "store::client",
        level = "debug",
        skip(self, payload)
    )]
    async fn patch_config(&self, cluster: &str, payload: &[u8]) -> Result<(), ClientError> {
        let patch = parse_config_object(payload)?;
        let mut doc = self.load_document(cluster).await?;

        json_patch::merge(spec_mut(&mut doc, cluster)?, &patch);

        self.save_document(cluster, &doc).await?;
        tracing::debug!(cluster, "Cluster configuration patched");
        Ok(())
    }

    #[instrument(
        name = "store::client::replace_config",
        target = "store::client",
        level = "debug",
        skip(self, payload)
    )]
    async fn replace_config(&self, cluster: &str, payload: &[u8]) -> Result<(), ClientError> {
        let spec = parse_config_object(payload)?;
        let mut doc = self.load_document(cluster).await?;

        *spec_mut(&mut doc, cluster)? = spec;

        self.save_document(cluster, &doc).await?;
        tracing::debug!(cluster, "Cluster configuration replaced");
        Ok(())
    }

    #[instrument(name = "store::client::status", target = "store::client", level = "debug", skip(self))]
    async fn status(&self, cluster: &str) -> Result<ClusterStatus, ClientError> {
        let raw = self.load_raw(cluster).await?;
        let data: ClusterData =
            serde_json::from_slice(&raw).map_err(|e| ClientError::InvalidClusterData {
                cluster: cluster.to_string(),
                reason: e.to_string(),
            })?;
        Ok(ClusterStatus::from_cluster_data(cluster, &data))
    }

    #[instrument(name = "store::client::clusters", target = "store::client", level = "debug", skip(self))]
    async fn clusters(&self) -> Result<Vec<String>, ClientError> {
        let mut names = self.kv.list(CLUSTERS_PREFIX).await?;
        names.sort();
        names.dedup();
        Ok(names)
    }
}

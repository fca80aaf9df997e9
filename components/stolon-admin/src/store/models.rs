//! Cluster documents as kept in the coordination store and as rendered by
//! `stolonctl cluster status`.

// Local crates
use crate::store::errors::ClientError;

// External crates
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Key prefix all stolon clusters live under.
pub const CLUSTERS_PREFIX: &str = "stolon/cluster";

/// Store key of the cluster data document for `cluster`.
///
/// The name must be a single path segment so the key stays under
/// [`CLUSTERS_PREFIX`].
pub fn cluster_data_key(cluster: &str) -> Result<String, ClientError> {
    let single_segment = !matches!(cluster, "" | "." | "..")
        && !cluster.contains(['/', '\\', '?', '#', '%'])
        && !cluster.chars().any(char::is_control);
    if !single_segment {
        return Err(ClientError::InvalidClusterName(cluster.to_string()));
    }
    Ok(format!("{CLUSTERS_PREFIX}/{cluster}/clusterdata"))
}

/// Role of a database instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Primary, accepts writes.
    Master,
    /// Replica.
    #[default]
    Standby,
}

impl Role {
    /// Lowercase name used in output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Master => "master",
            Role::Standby => "standby",
        }
    }
}

/// Read-only view of the stored cluster data.
///
/// Only the fields status rendering needs are decoded; everything else in the
/// document is ignored here and preserved by writers, which edit the raw JSON.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClusterData {
    /// Cluster spec and status.
    pub cluster: ClusterSection,
    /// Keepers by UID.
    pub keepers: BTreeMap<String, Keeper>,
    /// Database instances by UID.
    pub dbs: BTreeMap<String, Db>,
}

/// `cluster` section of the cluster data.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClusterSection {
    /// Cluster wide status.
    pub status: ClusterPhase,
}

/// Cluster wide status.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClusterPhase {
    /// Lifecycle phase, e.g. `initializing` or `normal`.
    pub phase: String,
    /// UID of the database currently elected master.
    pub master: Option<String>,
}

/// A keeper process.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Keeper {
    /// Keeper health.
    pub status: KeeperStatus,
}

/// Keeper health.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KeeperStatus {
    /// Whether the sentinel considers the keeper healthy.
    pub healthy: bool,
}

/// A database instance managed by a keeper.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Db {
    /// Desired state.
    pub spec: DbSpec,
    /// Observed state.
    pub status: DbStatus,
}

/// Desired state of a database instance.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DbSpec {
    /// Keeper owning the instance.
    #[serde(rename = "keeperUID")]
    pub keeper_uid: String,
    /// Requested role.
    pub role: Role,
}

/// Observed state of a database instance.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DbStatus {
    /// Whether the instance is healthy.
    pub healthy: bool,
    /// Address PostgreSQL listens on.
    pub listen_address: String,
    /// Port PostgreSQL listens on.
    pub port: String,
}

/// Status document printed by `cluster status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    /// Cluster name.
    pub name: String,
    /// Lifecycle phase.
    pub phase: String,
    /// UID of the master database, if one is elected.
    pub master: Option<String>,
    /// Database instances, ordered by UID.
    pub nodes: Vec<NodeStatus>,
}

/// One database instance in a [`ClusterStatus`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatus {
    /// Database UID.
    pub uid: String,
    /// Owning keeper UID.
    pub keeper: String,
    /// Current role.
    pub role: Role,
    /// Database and keeper both healthy.
    pub healthy: bool,
    /// `host:port`, empty if unknown.
    pub address: String,
}

impl ClusterStatus {
    /// Derive the status document of `name` from its cluster data.
    ///
    /// The elected master comes from `cluster.status.master`; every other
    /// instance is reported as a standby regardless of its requested role.
    pub fn from_cluster_data(name: &str, data: &ClusterData) -> Self {
        let master = data.cluster.status.master.clone().filter(|m| !m.is_empty());

        let nodes = data
            .dbs
            .iter()
            .map(|(uid, db)| {
                let keeper_healthy = data
                    .keepers
                    .get(&db.spec.keeper_uid)
                    .is_some_and(|k| k.status.healthy);
                let role = if master.as_deref() == Some(uid.as_str()) {
                    Role::Master
                } else {
                    Role::Standby
                };
                let address = if db.status.listen_address.is_empty() {
                    String::new()
                } else {
                    format!("{}:{}", db.status.listen_address, db.status.port)
                };

                NodeStatus {
                    uid: uid.clone(),
                    keeper: db.spec.keeper_uid.clone(),
                    role,
                    healthy: db.status.healthy && keeper_healthy,
                    address,
                }
            })
            .collect();

        Self {
            name: name.to_string(),
            phase: data.cluster.status.phase.clone(),
            master,
            nodes,
        }
    }

    /// The node currently holding the master role, if any.
    pub fn master_node(&self) -> Option<&NodeStatus> {
        self.nodes.iter().find(|n| n.role == Role::Master)
    }
}

// External crates
use hyper::StatusCode;

/// Failures of the cluster store client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// No `--store-backend` was given.
    #[error("store backend type is required (etcd or consul)")]
    MissingBackend,

    /// A store endpoint could not be parsed.
    #[error("invalid store endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint {
        /// The endpoint as given.
        endpoint: String,
        /// Why it was rejected.
        reason: String,
    },

    /// TLS material is incomplete or unreadable.
    #[error("invalid store TLS material: {0:#}")]
    Tls(anyhow::Error),

    /// None of the endpoints answered.
    #[error("no store endpoint reachable (tried {endpoints}): {last_error}")]
    Unreachable {
        /// Comma separated endpoints that were tried.
        endpoints: String,
        /// Failure of the last endpoint tried.
        last_error: String,
    },

    /// The store answered with an unexpected status.
    #[error("store returned {status} for {key}: {body}")]
    UnexpectedStatus {
        /// HTTP status of the answer.
        status: StatusCode,
        /// Key the request was about.
        key: String,
        /// Answer body, lossily decoded.
        body: String,
    },

    /// The store answered with a body that could not be decoded.
    #[error("malformed store response for {key}: {source}")]
    MalformedResponse {
        /// Key the request was about.
        key: String,
        /// Decoding failure.
        #[source]
        source: serde_json::Error,
    },

    /// A cluster name that is not a single key segment.
    #[error("invalid cluster name {0:?}")]
    InvalidClusterName(String),

    /// No data exists for the named cluster.
    #[error("cluster {0} not found")]
    ClusterNotFound(String),

    /// Stored cluster data is not a valid document.
    #[error("cluster {cluster} has invalid cluster data: {reason}")]
    InvalidClusterData {
        /// Cluster name.
        cluster: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A configuration payload was rejected.
    #[error("invalid configuration document: {0}")]
    InvalidConfig(String),
}

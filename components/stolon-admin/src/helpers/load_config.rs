// Local crates
use crate::helpers::errors::AdminError;

// External crates
use config::{Environment, Map};
use serde::Deserialize;
use std::fmt;
use tracing::instrument;

/// Prefix shared by every `stolonrpc` environment variable.
pub const ENV_PREFIX: &str = "STOLONRPC";

/// `stolonrpc` service configuration, read once at startup.
///
/// | Variable                | Field         | Default     |
/// |-------------------------|---------------|-------------|
/// | `STOLONRPC_LOG_LEVEL`   | `log_level`   | `info`      |
/// | `STOLONRPC_PORT`        | `port`        | required    |
/// | `STOLONRPC_DB_HOST`     | `db_host`     | `localhost` |
/// | `STOLONRPC_DB_PORT`     | `db_port`     | `5432`      |
/// | `STOLONRPC_DB_USERNAME` | `db_username` | `postgres`  |
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct RpcServiceConfig {
    /// Log severity name.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Port the JSON-RPC listener binds on all interfaces.
    pub port: u16,
    /// Database host handed to the database-operation service.
    #[serde(default = "default_db_host")]
    pub db_host: String,
    /// Database port handed to the database-operation service.
    #[serde(default = "default_db_port")]
    pub db_port: u16,
    /// Database user handed to the database-operation service.
    #[serde(default = "default_db_username")]
    pub db_username: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_db_host() -> String {
    "localhost".to_string()
}

fn default_db_port() -> u16 {
    5432
}

fn default_db_username() -> String {
    "postgres".to_string()
}

impl RpcServiceConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self, AdminError> {
        Self::load(None)
    }

    /// Read the configuration from `vars` instead of the process environment.
    ///
    /// Keys are full variable names, e.g. `STOLONRPC_PORT`.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, AdminError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map: Map<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self::load(Some(map))
    }

    #[instrument(
        name = "config_loader",
        target = "helpers::load_config",
        level = "trace",
        skip_all
    )]
    fn load(source: Option<Map<String, String>>) -> Result<Self, AdminError> {
        let settings = config::Config::builder()
            .add_source(Environment::with_prefix(ENV_PREFIX).source(source))
            .build()
            .map_err(|e| AdminError::configuration_caused_by("Can't parse config", e))?;

        settings
            .try_deserialize::<RpcServiceConfig>()
            .map_err(|e| {
                AdminError::configuration_caused_by(format!("Can't parse config: {e}"), e)
            })
    }
}

impl fmt::Display for RpcServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "log_level={} port={} db_host={} db_port={} db_username={}",
            self.log_level, self.port, self.db_host, self.db_port, self.db_username
        )
    }
}

//! Routes a parsed [`Command`] to exactly one cluster operation.

// Local crates
use crate::{
    cli::{cli::Command, output},
    helpers::{
        errors::{AdminError, ResultExt},
        payload,
    },
    store::client::ClusterOperations,
};

// External crates
use std::io::{Read, Write};
use tracing::instrument;

/// A [`Command`] whose payload, when it takes one, has been read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Print the cluster configuration.
    GetConfig {
        /// Cluster name.
        cluster: String,
    },
    /// Merge `payload` into the cluster configuration.
    PatchConfig {
        /// Cluster name.
        cluster: String,
        /// Partial configuration document, as read.
        payload: Vec<u8>,
    },
    /// Replace the cluster configuration with `payload`.
    ReplaceConfig {
        /// Cluster name.
        cluster: String,
        /// Full configuration document, as read.
        payload: Vec<u8>,
    },
    /// Print cluster health and topology.
    Status {
        /// Cluster name.
        cluster: String,
        /// Only the master record.
        master_only: bool,
        /// JSON instead of text.
        json: bool,
    },
    /// Print the known cluster names.
    List,
}

/// Resolve the payload of `patch` and `replace` from the file or from `stdin`.
///
/// Runs before any store client exists, so a bad payload channel is reported
/// whatever the store settings are.
pub fn prepare<R: Read>(command: Command, stdin: R) -> Result<Operation, AdminError> {
    Ok(match command {
        Command::GetConfig { cluster } => Operation::GetConfig { cluster },
        Command::PatchConfig {
            cluster,
            file,
            read_stdin,
        } => Operation::PatchConfig {
            payload: payload::resolve_from(file.as_deref(), read_stdin, stdin)?,
            cluster,
        },
        Command::ReplaceConfig {
            cluster,
            file,
            read_stdin,
        } => Operation::ReplaceConfig {
            payload: payload::resolve_from(file.as_deref(), read_stdin, stdin)?,
            cluster,
        },
        Command::Status {
            cluster,
            master_only,
            json,
        } => Operation::Status {
            cluster,
            master_only,
            json,
        },
        Command::List => Operation::List,
    })
}

/// Run `command` against `client`, writing results to `out`.
///
/// Same as [`prepare`] followed by [`perform`].
pub async fn dispatch<C, R, W>(
    client: &C,
    command: Command,
    stdin: R,
    out: &mut W,
) -> Result<(), AdminError>
where
    C: ClusterOperations,
    R: Read,
    W: Write,
{
    let operation = prepare(command, stdin)?;
    perform(client, operation, out).await
}

/// Run one prepared operation against `client`. Nothing is written to `out`
/// on failure.
#[instrument(
    name = "dispatcher::perform",
    target = "cli::dispatcher",
    level = "debug",
    skip_all
)]
pub async fn perform<C, W>(client: &C, operation: Operation, out: &mut W) -> Result<(), AdminError>
where
    C: ClusterOperations,
    W: Write,
{
    match operation {
        Operation::GetConfig { cluster } => {
            let config = client
                .config(&cluster)
                .await
                .with_context(|| format!("cannot get configuration of cluster {cluster}"))?;
            output::write_json(out, &config).context("cannot write configuration")?;
        }
        Operation::PatchConfig { cluster, payload } => {
            client
                .patch_config(&cluster, &payload)
                .await
                .with_context(|| format!("cannot patch configuration of cluster {cluster}"))?;
        }
        Operation::ReplaceConfig { cluster, payload } => {
            client
                .replace_config(&cluster, &payload)
                .await
                .with_context(|| format!("cannot replace configuration of cluster {cluster}"))?;
        }
        Operation::Status {
            cluster,
            master_only,
            json,
        } => {
            let status = client
                .status(&cluster)
                .await
                .with_context(|| format!("cannot get status of cluster {cluster}"))?;
            output::write_status(out, &status, master_only, json)
                .context("cannot write status")?;
        }
        Operation::List => {
            let clusters = client.clusters().await.context("cannot list clusters")?;
            output::write_clusters(out, &clusters).context("cannot write cluster list")?;
        }
    }
    Ok(())
}

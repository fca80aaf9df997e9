// Local crates
use crate::{
    cli::dispatcher,
    helpers::errors::{AdminError, ResultExt},
    instrumentation::tracing::{LogTarget, Logging},
    store::{client::StoreClient, kv::StoreBackend},
};

// External crates
use clap::{Args, Parser, Subcommand};
use std::{
    ffi::OsString,
    io::{self, Write},
    path::PathBuf,
    process::ExitCode,
};

/// Marker argument selecting standard input as the payload channel.
pub const STDIN_MARKER: &str = "-";

#[derive(Debug, Parser)]
#[command(name = "stolonctl", version, about = "stolon cluster administration")]
struct Cli {
    /// Enable verbose logging to stderr
    #[arg(short, long)]
    debug: bool,

    #[command(flatten)]
    config: CliConfig,

    #[command(subcommand)]
    command: Commands,
}

/// Store connection settings shared by every command.
///
/// Each field comes from its flag or, when the flag is absent, from the
/// matching `STOLONCTL_*` environment variable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Args)]
pub struct CliConfig {
    /// A comma-delimited list of store endpoints (defaults: 127.0.0.1:2379 for etcd, 127.0.0.1:8500 for consul)
    #[arg(
        long,
        env = "STOLONCTL_STORE_ENDPOINTS",
        default_value = "",
        hide_default_value = true
    )]
    pub store_endpoints: String,

    /// Store backend type
    #[arg(long, env = "STOLONCTL_STORE_BACKEND", value_enum)]
    pub store_backend: Option<StoreBackend>,

    /// Path to the client TLS cert file
    #[arg(long, env = "STOLONCTL_STORE_CERT")]
    pub store_cert: Option<PathBuf>,

    /// Path to the client TLS key file
    #[arg(long, env = "STOLONCTL_STORE_KEY")]
    pub store_key: Option<PathBuf>,

    /// Path to the trusted CA cert file
    #[arg(long, env = "STOLONCTL_STORE_CA_CERT")]
    pub store_cacert: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Operations on an existing cluster
    Cluster {
        #[command(subcommand)]
        command: ClusterCommands,
    },
}

#[derive(Debug, Subcommand)]
enum ClusterCommands {
    /// Print configuration for cluster
    Config {
        /// Cluster name
        cluster_name: String,
    },

    /// Patch configuration for cluster
    Patch(PayloadArgs),

    /// Replace configuration for cluster
    Replace(PayloadArgs),

    /// Print cluster status
    Status {
        /// Cluster name
        cluster_name: String,

        /// Limit output to master only
        #[arg(long)]
        master: bool,

        /// Format output to json
        #[arg(long)]
        json: bool,
    },

    /// List clusters
    List,
}

#[derive(Debug, Args)]
struct PayloadArgs {
    /// Cluster name
    cluster_name: String,

    /// Read the configuration from this file
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Pass `-` to read the configuration from stdin
    #[arg(value_name = "-", value_parser = [STDIN_MARKER], hide_possible_values = true)]
    stdin: Option<String>,
}

impl PayloadArgs {
    fn read_stdin(&self) -> bool {
        self.stdin.as_deref() == Some(STDIN_MARKER)
    }
}

/// One `stolonctl` operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print a cluster's configuration.
    GetConfig {
        /// Target cluster.
        cluster: String,
    },
    /// Merge a partial configuration into a cluster's configuration.
    PatchConfig {
        /// Target cluster.
        cluster: String,
        /// Payload file, if given.
        file: Option<PathBuf>,
        /// Whether the payload comes from stdin.
        read_stdin: bool,
    },
    /// Replace a cluster's configuration.
    ReplaceConfig {
        /// Target cluster.
        cluster: String,
        /// Payload file, if given.
        file: Option<PathBuf>,
        /// Whether the payload comes from stdin.
        read_stdin: bool,
    },
    /// Print a cluster's status.
    Status {
        /// Target cluster.
        cluster: String,
        /// Only report the master node.
        master_only: bool,
        /// Render as JSON.
        json: bool,
    },
    /// List known clusters.
    List,
}

impl From<ClusterCommands> for Command {
    fn from(command: ClusterCommands) -> Self {
        match command {
            ClusterCommands::Config { cluster_name } => Command::GetConfig {
                cluster: cluster_name,
            },
            ClusterCommands::Patch(args) => Command::PatchConfig {
                read_stdin: args.read_stdin(),
                cluster: args.cluster_name,
                file: args.file,
            },
            ClusterCommands::Replace(args) => Command::ReplaceConfig {
                read_stdin: args.read_stdin(),
                cluster: args.cluster_name,
                file: args.file,
            },
            ClusterCommands::Status {
                cluster_name,
                master,
                json,
            } => Command::Status {
                cluster: cluster_name,
                master_only: master,
                json,
            },
            ClusterCommands::List => Command::List,
        }
    }
}

/// A parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Store connection settings.
    pub config: CliConfig,
    /// The operation to run.
    pub command: Command,
    /// Verbose logging requested.
    pub debug: bool,
}

/// Parse `args` (program name first) into an [`Invocation`].
pub fn parse<I, T>(args: I) -> Result<Invocation, AdminError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::try_parse_from(args)?;
    let Commands::Cluster { command } = cli.command;

    Ok(Invocation {
        config: cli.config,
        command: command.into(),
        debug: cli.debug,
    })
}

/// Entry function for `stolonctl`.
///
/// Usage errors (and `--help`/`--version`) are printed by clap and exit with
/// clap's code. Any other failure is logged, printed to stderr and exits 1.
pub async fn run<I, T>(args: I, out: &mut impl Write) -> ExitCode
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let invocation = match parse(args) {
        Ok(invocation) => invocation,
        Err(AdminError::Parse(err)) => {
            let _ = err.print();
            return ExitCode::from(u8::try_from(err.exit_code()).unwrap_or(2));
        }
        Err(err) => {
            eprintln!("stolonctl: {err}");
            return ExitCode::FAILURE;
        }
    };

    let level = if invocation.debug { "debug" } else { "warn" };
    let logging = match Logging::init(level, LogTarget::Stderr) {
        Ok(logging) => logging,
        Err(err) => {
            eprintln!("stolonctl: {err}");
            return ExitCode::FAILURE;
        }
    };
    let _default = tracing::dispatcher::set_default(logging.dispatch());

    match execute(invocation, out).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(kind = %err.kind(), error = ?err, "Command failed");
            eprintln!("stolonctl: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn execute(invocation: Invocation, out: &mut impl Write) -> Result<(), AdminError> {
    tracing::debug!(command = ?invocation.command, "Running command");

    let operation = dispatcher::prepare(invocation.command, io::stdin())?;
    let client = StoreClient::new(&invocation.config).context("cannot create store client")?;
    dispatcher::perform(&client, operation, out).await
}

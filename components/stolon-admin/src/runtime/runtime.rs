use crate::{
    helpers::{
        errors::{AdminError, ResultExt},
        load_config::RpcServiceConfig,
        shutdown::{TerminationSignal, termination_signals},
    },
    instrumentation::tracing::{LogTarget, Logging},
    rpc::{
        codec::JsonCodec,
        database::{ConnSettings, DatabaseOperation},
        http::{Router, listen_and_serve},
        server::RpcServer,
    },
};

use std::{io, process::ExitCode, sync::Arc};
use tokio::sync::{mpsc, oneshot};
use tracing::{Instrument, instrument, instrument::WithSubscriber};

/// How the supervised service stopped. Exactly one outcome per run.
#[derive(Debug)]
pub enum SupervisionOutcome {
    /// The HTTP listener stopped with an error.
    ListenerFault(io::Error),
    /// A termination signal arrived.
    TerminationSignal(TerminationSignal),
}

/// Wait for the first of a listener fault or a termination signal.
///
/// A fault sender dropped without reporting counts as a fault.
pub async fn supervise(
    faults: oneshot::Receiver<io::Error>,
    mut signals: mpsc::Receiver<TerminationSignal>,
) -> SupervisionOutcome {
    tokio::select! {
        fault = faults => SupervisionOutcome::ListenerFault(fault.unwrap_or_else(|_| {
            io::Error::other("listener stopped without reporting an error")
        })),
        Some(signal) = signals.recv() => SupervisionOutcome::TerminationSignal(signal),
    }
}

/// Route table of the service: JSON-RPC on `/rpc`.
pub fn build_router(cfg: &RpcServiceConfig) -> Router {
    let mut server = RpcServer::new();
    server.register_codec(Arc::new(JsonCodec), "application/json");
    server.register_codec(Arc::new(JsonCodec), "application/json;charset=UTF-8");
    server.register_service(
        DatabaseOperation::NAME,
        Arc::new(DatabaseOperation::new(ConnSettings::from(cfg))),
    );

    let mut router = Router::new();
    router.handle("/rpc", Arc::new(server));
    router
}

/// Entry function for `stolonrpc`.
///
/// Configuration and logging failures print to stderr and exit 1, since no
/// logger exists yet to report them.
pub async fn run_rpc_service() -> ExitCode {
    let cfg = match RpcServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("stolonrpc: {err}");
            return ExitCode::FAILURE;
        }
    };

    let logging = match Logging::init(&cfg.log_level, LogTarget::Stdout) {
        Ok(logging) => logging,
        Err(err) => {
            eprintln!("stolonrpc: {err}");
            return ExitCode::FAILURE;
        }
    };
    logging.install_panic_handler();

    match serve_until_stopped(cfg)
        .with_subscriber(logging.dispatch().clone())
        .await
    {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::dispatcher::with_default(logging.dispatch(), || {
                tracing::error!(kind = %err.kind(), "{err}");
            });
            ExitCode::FAILURE
        }
    }
}

/// Start the service and block until it must stop.
///
/// Returns the signal that stopped it, or the listener fault as an error.
#[instrument(name = "runtime::serve_until_stopped", target = "runtime", skip_all)]
async fn serve_until_stopped(cfg: RpcServiceConfig) -> Result<TerminationSignal, AdminError> {
    tracing::info!("Start with config: {cfg}");

    let router = Arc::new(build_router(&cfg));
    let signals = termination_signals().context("cannot install signal handlers")?;

    let port = cfg.port;
    let (fault_tx, fault_rx) = oneshot::channel();
    tokio::spawn(
        async move {
            let err = listen_and_serve(port, router).await;
            let _ = fault_tx.send(err);
        }
        .in_current_span()
        .with_current_subscriber(),
    );

    match supervise(fault_rx, signals).await {
        SupervisionOutcome::ListenerFault(err) => {
            Err(AdminError::ListenerFault(err)).with_context(|| format!("cannot serve on port {port}"))
        }
        SupervisionOutcome::TerminationSignal(signal) => {
            tracing::info!("Captured {signal}. Exiting...");
            Ok(signal)
        }
    }
}

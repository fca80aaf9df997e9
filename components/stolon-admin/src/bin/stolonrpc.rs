//! `stolonrpc`: JSON-RPC service for database operations.

use stolon_admin::runtime::runtime;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    runtime::run_rpc_service().await
}

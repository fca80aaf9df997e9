//! Administrative surface of a stolon deployment.
//!
//! Two programs are built from this crate:
//!
//! - `stolonctl`: reads and updates cluster configuration and status in the
//!   coordination store (etcd or Consul).
//! - `stolonrpc`: a JSON-RPC over HTTP service exposing database operations,
//!   supervised until a termination signal or a listener fault.

pub mod cli {
    //! `stolonctl` command line: parsing, dispatch and output.
    /// Argument parsing and the `stolonctl` entry point.
    #[allow(clippy::module_inception)]
    pub mod cli;
    pub mod dispatcher;
    pub mod output;
}

pub mod helpers {
    //! Errors, configuration, payload sourcing and signal handling.
    pub mod errors;
    /// `stolonrpc` environment configuration.
    pub mod load_config;
    pub mod payload;
    pub mod shutdown;
}

pub mod instrumentation {
    //! Logging setup.

    /// Subscriber stack built on `tracing-subscriber`.
    pub mod tracing;
}

pub mod rpc {
    //! JSON-RPC over HTTP.
    pub mod codec;
    pub mod database;
    /// Path routing and the HTTP listener.
    pub mod http;
    /// Codec selection and service dispatch.
    pub mod server;
}

pub mod runtime {
    //! `stolonrpc` startup and supervision.
    /// Service lifecycle.
    #[allow(clippy::module_inception)]
    pub mod runtime;
}

pub mod store {
    //! Cluster store client.
    /// Cluster operations over a key/value store.
    pub mod client;
    /// Store client errors.
    pub mod errors;
    pub mod kv;
    pub mod models;
    pub mod tls;
    pub mod transport;
}

//! `stolonctl`: stolon cluster administration.

use stolon_admin::cli::cli;
use std::{io, process::ExitCode};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    cli::run(std::env::args_os(), &mut io::stdout()).await
}

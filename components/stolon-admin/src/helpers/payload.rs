//! Configuration payload sourcing for `patch` and `replace`.
//!
//! A payload comes from exactly one of two channels: a named file or standard
//! input. The bytes are handed on untouched.

// Local crates
use crate::helpers::errors::{AdminError, ResultExt};

// External crates
use std::{
    fs,
    io::{self, Read},
    path::Path,
};
use tracing::instrument;

/// Message of the validation error raised when the channel choice is ambiguous.
pub const CHANNEL_CHOICE_ERROR: &str = "need either file to read from or readStdin option";

/// Resolve a payload, reading the process standard input when `read_stdin` is set.
pub fn resolve(file: Option<&Path>, read_stdin: bool) -> Result<Vec<u8>, AdminError> {
    resolve_from(file, read_stdin, io::stdin().lock())
}

/// Resolve a payload, reading `stdin` when `read_stdin` is set.
///
/// Exactly one of a non-empty `file` or `read_stdin` must be given. Reads run
/// to completion; nothing is returned on a partial read.
#[instrument(
    name = "payload::resolve",
    target = "helpers::payload",
    level = "debug",
    skip(stdin)
)]
pub fn resolve_from<R: Read>(
    file: Option<&Path>,
    read_stdin: bool,
    mut stdin: R,
) -> Result<Vec<u8>, AdminError> {
    let file = file.filter(|path| !path.as_os_str().is_empty());

    match (file, read_stdin) {
        (None, true) => {
            let mut payload = Vec::new();
            stdin
                .read_to_end(&mut payload)
                .context("cannot read config file from stdin")?;
            tracing::debug!(bytes = payload.len(), "Payload read from stdin");
            Ok(payload)
        }
        (Some(path), false) => {
            let payload =
                fs::read(path).with_context(|| format!("can not read file {}", path.display()))?;
            tracing::debug!(
                bytes = payload.len(),
                file = %path.display(),
                "Payload read from file"
            );
            Ok(payload)
        }
        _ => Err(AdminError::validation(CHANNEL_CHOICE_ERROR)),
    }
}

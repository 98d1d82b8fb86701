//! Typed errors for the recoverable failure classes.
//!
//! Everything that should simply stop the process goes through
//! `anyhow`; these enums exist where callers log and carry on.

use std::time::Duration;

use thiserror::Error;

/// Failure to obtain a public key from one peer.
#[derive(Debug, Error)]
pub enum PeerError {
    #[error("no answer within {0:?}")]
    Timeout(Duration),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("response carries neither result nor error")]
    MissingResult,
}

/// Malformed signing seed.  Always fatal at startup.
#[derive(Debug, Error)]
pub enum SigningKeyError {
    #[error("${0} is not valid UTF-8")]
    Encoding(&'static str),
    #[error("seed is not valid hex: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("seed must be 32 bytes, got {0}")]
    Length(usize),
    #[error("failed to read seed file {path}: {source}")]
    File {
        path: String,
        source: std::io::Error,
    },
}

/// Attachment address that is neither `ip` nor `ip/prefix`.
#[derive(Debug, Error)]
#[error("malformed attachment address {0:?}")]
pub struct AddressError(pub String);

//! Seed list artifact.
//!
//! The artifact is one connection URL per line.  When a signing key is
//! configured a blank line follows, then the lowercase hex Ed25519
//! signature over exactly the URL lines, then a final line break:
//!
//! ```text
//! ws://10.0.0.1:8443/aa
//! ws://10.0.0.2:8443/bb
//!
//! 3f9c…e1
//! ```

use std::ffi::OsString;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use axum::body::Bytes;
use ed25519_dalek::{Signer, SigningKey};
use log::info;

use crate::error::SigningKeyError;
use crate::types::PeerRecord;

const SEED_KEY_ENV: &str = "SEED_PRIVATE_KEY";
const SEED_KEY_FILE_ENV: &str = "SEED_PRIVATE_KEY_FILE";

/// A fully built artifact.  Cloning shares the underlying buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedList {
    body: Bytes,
    peers: usize,
}

impl SeedList {
    pub fn body(&self) -> Bytes {
        self.body.clone()
    }

    pub fn peer_count(&self) -> usize {
        self.peers
    }
}

/// Formats peer records into a [`SeedList`], signing it when a key is set.
pub struct SeedListBuilder {
    scheme: String,
    port: u16,
    signing_key: Option<SigningKey>,
}

impl SeedListBuilder {
    pub fn new(scheme: impl Into<String>, port: u16, signing_key: Option<SigningKey>) -> Self {
        Self {
            scheme: scheme.into(),
            port,
            signing_key,
        }
    }

    pub fn url(&self, record: &PeerRecord) -> String {
        format!(
            "{}://{}/{}",
            self.scheme,
            SocketAddr::new(record.ip, self.port),
            record.public_key
        )
    }

    /// Lines keep the order of `records`.
    pub fn build(&self, records: &[PeerRecord]) -> SeedList {
        let mut buf = Vec::new();
        for record in records {
            buf.extend_from_slice(self.url(record).as_bytes());
            buf.push(b'\n');
        }
        if let Some(key) = &self.signing_key {
            let signature = key.sign(&buf);
            buf.push(b'\n');
            buf.extend_from_slice(hex::encode(signature.to_bytes()).as_bytes());
            buf.push(b'\n');
        }
        SeedList {
            body: Bytes::from(buf),
            peers: records.len(),
        }
    }
}

/// Decode a hex encoded 32 byte Ed25519 seed.
pub fn signing_key_from_hex(seed: &str) -> Result<SigningKey, SigningKeyError> {
    let bytes = hex::decode(seed.trim())?;
    let seed: [u8; 32] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| SigningKeyError::Length(bytes.len()))?;
    Ok(SigningKey::from_bytes(&seed))
}

/// Read the signing seed from `$SEED_PRIVATE_KEY`, or from the file named
/// by `$SEED_PRIVATE_KEY_FILE` (Docker secrets).  `None` disables signing.
pub fn load_signing_key() -> Result<Option<SigningKey>, SigningKeyError> {
    signing_key_from_env(
        std::env::var_os(SEED_KEY_ENV),
        std::env::var_os(SEED_KEY_FILE_ENV),
    )
}

/// Resolve the signing key from the raw values of the seed variables.
/// Empty values count as unset; anything else must be a valid seed.
fn signing_key_from_env(
    seed: Option<OsString>,
    seed_file: Option<OsString>,
) -> Result<Option<SigningKey>, SigningKeyError> {
    let seed = match (seed, seed_file) {
        (Some(seed), _) if !seed.is_empty() => seed
            .into_string()
            .map_err(|_| SigningKeyError::Encoding(SEED_KEY_ENV))?,
        (_, Some(path)) if !path.is_empty() => read_seed_file(&PathBuf::from(path))?,
        _ => {
            info!("No signing seed configured, seed list will be unsigned");
            return Ok(None);
        }
    };
    let key = signing_key_from_hex(&seed)?;
    info!(
        "Signing seed list with public key {}",
        hex::encode(key.verifying_key().to_bytes())
    );
    Ok(Some(key))
}

fn read_seed_file(path: &Path) -> Result<String, SigningKeyError> {
    std::fs::read_to_string(path).map_err(|source| SigningKeyError::File {
        path: path.display().to_string(),
        source,
    })
}

//! Content fingerprinting.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

const PREFIX: &str = "sha256:";

/// A content fingerprint of the form `sha256:<hex>`.
///
/// Equality is byte-exact. Identical byte content yields identical
/// fingerprints; the inverse holds with cryptographic probability. No
/// normalization of line endings or metadata is performed; bytes only.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute the fingerprint of a file, reading its full byte stream once.
    ///
    /// Fails when the path does not exist or cannot be read.
    pub fn of_file(path: impl AsRef<Path>) -> crate::Result<Self> {
        let file = File::open(path.as_ref())?;
        let mut reader = BufReader::new(file);
        let mut hasher = Sha256::new();
        let mut buf = [0u8; 8192];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(Self::from_digest(hasher))
    }

    /// Compute the fingerprint of an in-memory byte slice.
    pub fn of_bytes(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Self::from_digest(hasher)
    }

    fn from_digest(hasher: Sha256) -> Self {
        use fmt::Write;
        let digest = hasher.finalize();
        let mut out = String::with_capacity(PREFIX.len() + 64);
        out.push_str(PREFIX);
        for byte in digest {
            let _ = write!(out, "{byte:02x}");
        }
        Self(out)
    }

    /// Parse a fingerprint received over the wire.
    pub fn parse(s: &str) -> crate::Result<Self> {
        let hex = s.strip_prefix(PREFIX).ok_or_else(|| {
            crate::Error::InvalidFingerprint(format!("expected {PREFIX} prefix, got {s:?}"))
        })?;
        if hex.len() != 64 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(crate::Error::InvalidFingerprint(format!(
                "expected 64 hex chars after prefix, got {hex:?}"
            )));
        }
        Ok(Self(s.to_string()))
    }

    /// The full `sha256:<hex>` string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", &self.0[..PREFIX.len() + 12])
    }
}

/// Server-side bulk variant: fingerprint every destination that exists.
///
/// Unreadable or missing paths are omitted from the returned map, which
/// callers treat as "absent, therefore stale".
pub fn hash_existing<I, S>(dests: I) -> BTreeMap<String, Fingerprint>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = BTreeMap::new();
    for dest in dests {
        let dest = dest.as_ref();
        if let Ok(fp) = Fingerprint::of_file(dest) {
            out.insert(dest.to_string(), fp);
        }
    }
    out
}

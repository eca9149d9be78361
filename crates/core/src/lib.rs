//! Core domain types for gangway.
//!
//! This crate holds everything the client and the daemon share: content
//! fingerprints, the wire types exchanged over the delta protocol, the
//! gzip tape-archive codec, and the daemon configuration shape. It has no
//! opinion about HTTP or the filesystem layout of a deployment; those live
//! in `gangway-server` and `gangway-cli`.

pub mod archive;
pub mod config;
pub mod error;
pub mod hash;
pub mod manifest;

pub use error::{Error, Result};

/// Prefix carried by every log line streamed back to the client.
pub const LOG_PREFIX: &str = "[gangway]";

/// Terminal line of a successful streamed response.
///
/// The HTTP status is committed before the real work begins, so the client
/// treats the presence of this exact final line as success and its absence,
/// regardless of status code, as failure.
pub const STATUS_OK: &str = "[gangway] STATUS:OK";

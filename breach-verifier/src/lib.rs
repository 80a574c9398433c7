//! Breached credential checker over a locally built SHA-256 breach set.
//!
//! A breach set is a directory holding immutable *generation* files plus a
//! `CURRENT` pointer naming the committed one. Each generation stores full
//! 32-byte SHA-256 digests as fixed-size records in sorted order behind a
//! 65,536-entry fanout table, so a lookup is one positional read of a small
//! bucket followed by a binary search. Membership is exact: no false
//! negatives and no false positives.
//!
//! Generations are produced by `breach-builder`. This crate only reads them.
//!
//! The digest is a plain unsalted SHA-256. It is a membership key for matching
//! against a public corpus and must not be used to store passwords.

pub mod digest;
pub mod error;
pub mod format;
pub mod index;
pub mod reader;

use std::path::PathBuf;

pub use digest::{DIGEST_LEN, Digest, digest};
pub use error::Error;
pub use format::{FanoutCounter, GENERATION_EXT, HEADER_LEN, Header, RECORD_SIZE};
pub use index::{BreachIndex, CURRENT_FILE, read_current};
pub use reader::{GenerationReader, Records};

/// Environment variable name for specifying the breach index directory.
pub const INDEX_DIR_ENV: &str = "BREACH_INDEX_DIR";

/// Default index directory, relative to the working directory.
pub const DEFAULT_INDEX_DIR: &str = "breach-index";

/// Returns the index path from the BREACH_INDEX_DIR environment variable,
/// or falls back to `./breach-index`.
pub fn index_dir_from_env() -> PathBuf {
    std::env::var(INDEX_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_INDEX_DIR))
}

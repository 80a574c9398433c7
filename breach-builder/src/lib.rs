//! Builds a breach set for [breach-verifier](../breach_verifier/index.html)
//! from plain-text breach corpora.
//!
//! # Pipeline
//!
//! 1. [`CorpusReader`] streams the corpus one line at a time, trims it, skips
//!    blank lines and applies the configured [`DecodePolicy`].
//! 2. Each credential is hashed with SHA-256 and pushed into a [`DigestSink`].
//!    The sink keeps a bounded chunk in memory and spills it as a sorted,
//!    deduplicated run when full, so corpora of any size build in fixed memory.
//! 3. [`MergeRuns`] k-way merges the runs (and, when appending, the committed
//!    generation) into one ascending, duplicate-free stream that is written
//!    as a new generation file.
//! 4. `CURRENT` is atomically repointed at the new generation and old
//!    generations are pruned.
//!
//! Plaintext credentials never reach the disk: runs and generations contain
//! digests only.

pub mod build;
pub mod corpus;
pub mod error;
pub mod manifest;
pub mod runs;
pub mod writer;

pub use build::{
    BuildOptions, BuildReport, DEFAULT_KEEP_GENERATIONS, build_from_reader, build_index,
    insert_all,
};
pub use corpus::{CorpusReader, CorpusStats, DecodePolicy, LoadOptions, open_corpus};
pub use error::{CorpusError, Error};
pub use manifest::BuildManifest;
pub use runs::{DEFAULT_CHUNK_RECORDS, DigestSink, MergeRuns};
pub use writer::{commit, list_generations, prune, write_generation};

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::corpus::{CorpusStats, DecodePolicy};
use crate::error::Error;

/// Diagnostic sidecar written next to each generation as `<generation>.json`.
/// Readers never depend on it.
#[derive(Debug, Clone, Serialize)]
pub struct BuildManifest {
    pub generation: String,
    pub created_at: DateTime<Utc>,
    pub corpus: String,
    pub decode: DecodePolicy,
    pub limit: Option<u64>,
    pub appended_to: Option<String>,
    pub corpus_stats: CorpusStats,
    /// Insert attempts, duplicates included.
    pub digests_in: u64,
    /// Distinct digests in the generation.
    pub records: u64,
    pub runs_spilled: usize,
}

impl BuildManifest {
    pub fn path_for(generation: &Path) -> PathBuf {
        generation.with_extension("json")
    }

    pub fn write(&self, path: &Path) -> Result<(), Error> {
        let file = File::create(path).map_err(|e| Error::io(path, e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)
            .map_err(|source| Error::Manifest { path: path.to_path_buf(), source })?;
        writer.write_all(b"\n").and_then(|_| writer.flush()).map_err(|e| Error::io(path, e))
    }
}

//! Writes a generation file and commits it by repointing `CURRENT`.
//!
//! Every file is written to a temporary name in the index directory, synced,
//! and renamed into place. A build that fails at any point leaves `CURRENT`
//! and the generation it names untouched.

use std::fs::{self, File};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use breach_verifier::{CURRENT_FILE, Digest, FanoutCounter, GENERATION_EXT, HEADER_LEN};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::error::Error;

/// A generation file that has been written and synced but not necessarily
/// committed.
#[derive(Debug, Clone)]
pub struct WrittenGeneration {
    pub name: String,
    pub path: PathBuf,
    pub records: u64,
}

/// Returns a fresh generation name. Names sort chronologically.
pub fn generation_name(dir: &Path, now: DateTime<Utc>) -> String {
    let stem = format!("gen-{}", now.format("%Y%m%dT%H%M%S%6fZ"));
    let mut name = format!("{stem}.{GENERATION_EXT}");
    let mut n = 1;
    while dir.join(&name).exists() {
        name = format!("{stem}-{n}.{GENERATION_EXT}");
        n += 1;
    }
    name
}

/// Streams ascending, duplicate-free digests into a new generation file.
pub fn write_generation<I>(dir: &Path, name: &str, digests: I) -> Result<WrittenGeneration, Error>
where
    I: IntoIterator<Item = Result<Digest, Error>>,
{
    let mut tmp = tempfile::Builder::new()
        .prefix(".gen-")
        .tempfile_in(dir)
        .map_err(|e| Error::io(dir, e))?;
    let tmp_path = tmp.path().to_path_buf();
    let io_err = |e| Error::io(&tmp_path, e);

    let mut writer = BufWriter::with_capacity(1 << 20, tmp.as_file_mut());
    // header goes in last, once the fanout is known
    writer.write_all(&vec![0u8; HEADER_LEN]).map_err(io_err)?;

    let mut counter = FanoutCounter::new();
    for digest in digests {
        let digest = digest?;
        if !counter.push(&digest) {
            return Err(Error::OutOfOrder { digest: digest.to_string() });
        }
        writer.write_all(digest.as_bytes()).map_err(io_err)?;
    }

    let file = writer.into_inner().map_err(|e| io_err(e.into_error()))?;
    let header = counter.finish();
    file.seek(SeekFrom::Start(0)).map_err(io_err)?;
    file.write_all(&header.encode()).map_err(io_err)?;
    file.sync_all().map_err(io_err)?;

    let path = dir.join(name);
    tmp.persist(&path).map_err(|e| Error::io(&path, e.error))?;
    sync_dir(dir)?;

    debug!(path = %path.display(), records = header.count(), "wrote generation");
    Ok(WrittenGeneration { name: name.to_string(), path, records: header.count() })
}

/// Atomically points `CURRENT` at the named generation.
pub fn commit(dir: &Path, name: &str) -> Result<(), Error> {
    let mut tmp = tempfile::Builder::new()
        .prefix(".current-")
        .tempfile_in(dir)
        .map_err(|e| Error::io(dir, e))?;
    let tmp_path = tmp.path().to_path_buf();
    writeln!(tmp, "{name}").map_err(|e| Error::io(&tmp_path, e))?;
    tmp.as_file().sync_all().map_err(|e| Error::io(&tmp_path, e))?;

    let pointer = dir.join(CURRENT_FILE);
    tmp.persist(&pointer).map_err(|e| Error::io(&pointer, e.error))?;
    sync_dir(dir)?;

    info!(generation = name, "committed breach set");
    Ok(())
}

/// Removes all but the newest `keep` generations (and their manifests). The
/// committed generation is never removed.
pub fn prune(dir: &Path, keep: usize, current: &str) -> Result<Vec<String>, Error> {
    let mut generations = list_generations(dir)?;
    generations.sort();

    let excess = generations.len().saturating_sub(keep.max(1));
    let mut removed = Vec::new();
    for name in generations.into_iter().take(excess) {
        if name == current {
            continue;
        }
        let path = dir.join(&name);
        if let Err(e) = fs::remove_file(&path) {
            warn!(path = %path.display(), error = %e, "failed to prune generation");
            continue;
        }
        let _ = fs::remove_file(path.with_extension("json"));
        removed.push(name);
    }

    if !removed.is_empty() {
        info!(count = removed.len(), "pruned old generations");
    }
    Ok(removed)
}

/// Names of generation files in the index directory.
pub fn list_generations(dir: &Path) -> Result<Vec<String>, Error> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| Error::io(dir, e))? {
        let entry = entry.map_err(|e| Error::io(dir, e))?;
        let path = entry.path();
        let name = path
            .extension()
            .filter(|ext| *ext == GENERATION_EXT)
            .and_then(|_| path.file_name())
            .and_then(|name| name.to_str())
            .filter(|name| name.starts_with("gen-"));

        if let Some(name) = name {
            names.push(name.to_string());
        }
    }
    Ok(names)
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<(), Error> {
    File::open(dir).and_then(|d| d.sync_all()).map_err(|e| Error::io(dir, e))
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<(), Error> {
    Ok(())
}

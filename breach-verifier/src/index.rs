use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::digest::Digest;
use crate::error::Error;
use crate::format::GENERATION_EXT;
use crate::reader::GenerationReader;

/// Name of the pointer file holding the committed generation's file name.
pub const CURRENT_FILE: &str = "CURRENT";

/// Reads the generation file name that `CURRENT` points at.
///
/// Returns `Ok(None)` when nothing has been committed yet.
pub fn read_current(dir: &Path) -> Result<Option<PathBuf>, Error> {
    let pointer = dir.join(CURRENT_FILE);
    let content = match fs::read_to_string(&pointer) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::io(pointer, e)),
    };

    let name = content.trim();
    let valid = !name.is_empty()
        && !name.contains(['/', '\\'])
        && Path::new(name).extension().is_some_and(|ext| ext == GENERATION_EXT);
    if !valid {
        return Err(Error::BadPointer { dir: dir.to_path_buf(), content });
    }

    Ok(Some(dir.join(name)))
}

/// Answers membership queries against the committed breach set in an index
/// directory.
///
/// The index holds the reader of the committed generation behind an `Arc`.
/// [`reload`](Self::reload) swaps in a newly committed generation atomically:
/// a query sees either the old set or the new one, never a partial build.
pub struct BreachIndex {
    dir: PathBuf,
    current: RwLock<Arc<GenerationReader>>,
}

impl BreachIndex {
    /// Opens the generation that `CURRENT` points at in `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, Error> {
        let dir = dir.into();
        let path = read_current(&dir)?.ok_or_else(|| Error::NoGeneration { dir: dir.clone() })?;
        let reader = GenerationReader::open(path)?;

        info!(dir = %dir.display(), records = reader.len(), "opened breach set");
        Ok(Self { dir, current: RwLock::new(Arc::new(reader)) })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the generation currently being served.
    pub fn snapshot(&self) -> Arc<GenerationReader> {
        Arc::clone(&self.current.read())
    }

    /// Number of distinct digests in the served generation.
    pub fn len(&self) -> u64 {
        self.current.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Checks if the given password has been found in a data breach.
    ///
    /// Returns `Ok(true)` if the password's digest is in the set,
    /// `Ok(false)` if it is not, or an error if the lookup failed. A failed
    /// lookup must never be reported as "not breached".
    pub fn contains(&self, password: &str) -> Result<bool, Error> {
        self.contains_digest(&Digest::of_str(password))
    }

    pub fn contains_digest(&self, digest: &Digest) -> Result<bool, Error> {
        self.snapshot().contains_digest(digest)
    }

    /// Async version of [`contains`](Self::contains).
    ///
    /// The digest is computed on the calling task; only the digest crosses to
    /// the blocking pool, where the whole lookup runs in a single
    /// `spawn_blocking` call.
    #[cfg(feature = "tokio")]
    pub async fn contains_async(&self, password: &str) -> Result<bool, Error> {
        let digest = Digest::of_str(password);
        let reader = self.snapshot();
        tokio::task::spawn_blocking(move || reader.contains_digest(&digest)).await?
    }

    /// Re-reads `CURRENT` and switches to the generation it names if it
    /// changed. Returns `true` if a new generation is now being served.
    ///
    /// On error the previous generation keeps serving.
    pub fn reload(&self) -> Result<bool, Error> {
        let path =
            read_current(&self.dir)?.ok_or_else(|| Error::NoGeneration { dir: self.dir.clone() })?;

        if self.current.read().path() == path.as_path() {
            debug!(path = %path.display(), "breach set unchanged");
            return Ok(false);
        }

        let reader = Arc::new(GenerationReader::open(path)?);
        info!(path = %reader.path().display(), records = reader.len(), "switched breach set");
        *self.current.write() = reader;
        Ok(true)
    }
}

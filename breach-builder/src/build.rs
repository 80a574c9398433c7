use std::fs;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use breach_verifier::{Digest, GenerationReader, read_current};
use chrono::Utc;
use tracing::{info, instrument, warn};

use crate::corpus::{CorpusReader, CorpusStats, LoadOptions, open_corpus};
use crate::error::{CorpusError, Error};
use crate::manifest::BuildManifest;
use crate::runs::{DEFAULT_CHUNK_RECORDS, DigestSink, MergeRuns, Source};
use crate::writer::{commit, generation_name, prune, write_generation};

/// Default number of generations kept on disk, the committed one included.
pub const DEFAULT_KEEP_GENERATIONS: usize = 2;

#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub index_dir: PathBuf,
    pub load: LoadOptions,
    /// Digests held in memory before a sorted run is spilled to disk.
    pub chunk_records: usize,
    pub keep_generations: usize,
    /// Merge the committed generation into the new one instead of replacing it.
    pub append: bool,
}

impl BuildOptions {
    pub fn new(index_dir: impl Into<PathBuf>) -> Self {
        Self {
            index_dir: index_dir.into(),
            load: LoadOptions::default(),
            chunk_records: DEFAULT_CHUNK_RECORDS,
            keep_generations: DEFAULT_KEEP_GENERATIONS,
            append: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BuildReport {
    pub generation: String,
    pub path: PathBuf,
    pub corpus_stats: CorpusStats,
    /// Insert attempts, duplicates included.
    pub digests_in: u64,
    /// Distinct digests in the committed generation.
    pub records: u64,
    pub runs_spilled: usize,
    pub appended_to: Option<String>,
    pub pruned: Vec<String>,
}

/// Hashes every credential and inserts its digest into the sink.
///
/// Returns the number of insert attempts. Bumps `progress` once per
/// credential.
pub fn insert_all<I>(
    credentials: I,
    sink: &mut DigestSink,
    progress: &AtomicU64,
) -> Result<u64, Error>
where
    I: IntoIterator<Item = Result<Vec<u8>, CorpusError>>,
{
    let mut count = 0u64;
    for credential in credentials {
        let credential = credential?;
        sink.insert(Digest::of_bytes(&credential))?;
        count += 1;
        progress.fetch_add(1, Ordering::Relaxed);
    }
    Ok(count)
}

/// Builds and commits a new generation from a corpus file.
pub fn build_index(
    corpus: &Path,
    options: &BuildOptions,
    progress: &AtomicU64,
) -> Result<BuildReport, Error> {
    let source = open_corpus(corpus)?;
    build_from_reader(source, &corpus.display().to_string(), options, progress)
}

/// Builds and commits a new generation from any line source.
///
/// `CURRENT` is only repointed after the new generation is fully written and
/// synced; on any error the committed set is left as it was.
#[instrument(skip_all, fields(corpus = label, index_dir = %options.index_dir.display()))]
pub fn build_from_reader<R: BufRead>(
    source: R,
    label: &str,
    options: &BuildOptions,
    progress: &AtomicU64,
) -> Result<BuildReport, Error> {
    let dir = options.index_dir.as_path();
    fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;

    let previous = if options.append {
        match read_current(dir)? {
            Some(path) => Some(GenerationReader::open(path)?),
            None => {
                warn!("no committed breach set to append to, building a fresh one");
                None
            }
        }
    } else {
        None
    };

    // removed with all runs when dropped, on every exit path
    let scratch = tempfile::Builder::new()
        .prefix(".build-")
        .tempdir_in(dir)
        .map_err(|e| Error::io(dir, e))?;

    let mut sink = DigestSink::new(scratch.path(), options.chunk_records);
    let mut corpus = CorpusReader::new(source, options.load);
    let digests_in = insert_all(&mut corpus, &mut sink, progress)?;
    let corpus_stats = corpus.stats();
    drop(corpus);

    if corpus_stats.invalid_lines > 0 {
        warn!(lines = corpus_stats.invalid_lines, "skipped lines that are not valid UTF-8");
    }
    info!(
        lines = corpus_stats.lines_read,
        credentials = corpus_stats.credentials,
        runs = sink.runs().len(),
        "corpus ingested"
    );

    let runs_spilled = sink.runs().len();
    let mut sources: Vec<Source> = sink.into_sources()?;
    if let Some(previous) = &previous {
        info!(
            path = %previous.path().display(),
            records = previous.len(),
            "merging committed generation"
        );
        sources.push(Box::new(previous.records()?.map(|r| r.map_err(Error::from))));
    }

    let name = generation_name(dir, Utc::now());
    let written = write_generation(dir, &name, MergeRuns::new(sources)?)?;

    let appended_to = previous
        .as_ref()
        .and_then(|p| p.path().file_name())
        .map(|n| n.to_string_lossy().into_owned());
    let manifest = BuildManifest {
        generation: name.clone(),
        created_at: Utc::now(),
        corpus: label.to_string(),
        decode: options.load.decode,
        limit: options.load.limit,
        appended_to: appended_to.clone(),
        corpus_stats,
        digests_in,
        records: written.records,
        runs_spilled,
    };
    if let Err(e) = manifest.write(&BuildManifest::path_for(&written.path)) {
        warn!(error = %e, "failed to write build manifest");
    }

    commit(dir, &name)?;
    drop(previous);
    let pruned = prune(dir, options.keep_generations, &name).unwrap_or_else(|e| {
        warn!(error = %e, "failed to prune old generations");
        Vec::new()
    });

    info!(generation = %name, records = written.records, digests_in, "build complete");
    Ok(BuildReport {
        generation: name,
        path: written.path,
        corpus_stats,
        digests_in,
        records: written.records,
        runs_spilled,
        appended_to,
        pruned,
    })
}

//! External sort of digests: bounded in-memory chunks spilled as sorted runs,
//! then merged into one ascending, duplicate-free stream.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::PathBuf;

use breach_verifier::{DIGEST_LEN, Digest};
use tracing::debug;

use crate::error::Error;

/// Default number of digests held in memory before spilling (128 MiB).
pub const DEFAULT_CHUNK_RECORDS: usize = 4 * 1024 * 1024;

/// A sorted, duplicate-free run spilled to disk.
#[derive(Debug)]
pub struct RunFile {
    path: PathBuf,
    len: u64,
}

impl RunFile {
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn open(&self) -> Result<RunReader, Error> {
        let file = File::open(&self.path).map_err(|e| Error::io(&self.path, e))?;
        Ok(RunReader {
            path: self.path.clone(),
            reader: BufReader::with_capacity(1 << 16, file),
            remaining: self.len,
        })
    }
}

pub struct RunReader {
    path: PathBuf,
    reader: BufReader<File>,
    remaining: u64,
}

impl Iterator for RunReader {
    type Item = Result<Digest, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let mut record = [0u8; DIGEST_LEN];
        match self.reader.read_exact(&mut record) {
            Ok(()) => Some(Ok(Digest::from_bytes(record))),
            Err(e) => {
                self.remaining = 0;
                Some(Err(Error::io(&self.path, e)))
            }
        }
    }
}

/// Collects digests for a build. Inserting a duplicate is a no-op for the
/// resulting set; duplicates are dropped when a chunk is sorted and again
/// when runs are merged.
pub struct DigestSink {
    scratch: PathBuf,
    chunk: Vec<Digest>,
    chunk_records: usize,
    runs: Vec<RunFile>,
    inserted: u64,
}

impl DigestSink {
    /// `scratch` must be an existing directory that outlives the sink's runs.
    pub fn new(scratch: impl Into<PathBuf>, chunk_records: usize) -> Self {
        let chunk_records = chunk_records.max(1);
        Self {
            scratch: scratch.into(),
            chunk: Vec::with_capacity(chunk_records.min(1 << 16)),
            chunk_records,
            runs: Vec::new(),
            inserted: 0,
        }
    }

    pub fn insert(&mut self, digest: Digest) -> Result<(), Error> {
        self.chunk.push(digest);
        self.inserted += 1;
        if self.chunk.len() >= self.chunk_records {
            self.spill()?;
        }
        Ok(())
    }

    /// Number of insert attempts, duplicates included.
    pub fn inserted(&self) -> u64 {
        self.inserted
    }

    pub fn runs(&self) -> &[RunFile] {
        &self.runs
    }

    fn spill(&mut self) -> Result<(), Error> {
        self.chunk.sort_unstable();
        self.chunk.dedup();

        let path = self.scratch.join(format!("run-{:06}.bin", self.runs.len()));
        let file = File::create(&path).map_err(|e| Error::io(&path, e))?;
        let mut writer = BufWriter::with_capacity(1 << 16, file);
        for digest in &self.chunk {
            writer.write_all(digest.as_bytes()).map_err(|e| Error::io(&path, e))?;
        }
        writer.flush().map_err(|e| Error::io(&path, e))?;

        debug!(run = self.runs.len(), records = self.chunk.len(), "spilled sorted run");
        self.runs.push(RunFile { path, len: self.chunk.len() as u64 });
        self.chunk.clear();
        Ok(())
    }

    /// Finishes collection and returns the merge sources: one per spilled run
    /// plus the sorted remainder still in memory.
    pub fn into_sources(mut self) -> Result<Vec<Source>, Error> {
        self.chunk.sort_unstable();
        self.chunk.dedup();

        let mut sources: Vec<Source> = Vec::with_capacity(self.runs.len() + 1);
        for run in &self.runs {
            sources.push(Box::new(run.open()?));
        }
        if !self.chunk.is_empty() {
            sources.push(Box::new(std::mem::take(&mut self.chunk).into_iter().map(Ok)));
        }
        Ok(sources)
    }
}

/// A stream of ascending digests feeding the merge.
pub type Source = Box<dyn Iterator<Item = Result<Digest, Error>> + Send>;

/// K-way merge of ascending sources into one strictly ascending stream.
pub struct MergeRuns {
    sources: Vec<Source>,
    heap: BinaryHeap<Reverse<(Digest, usize)>>,
    last: Option<Digest>,
}

impl MergeRuns {
    pub fn new(mut sources: Vec<Source>) -> Result<Self, Error> {
        let mut heap = BinaryHeap::with_capacity(sources.len());
        for (i, source) in sources.iter_mut().enumerate() {
            if let Some(first) = source.next() {
                heap.push(Reverse((first?, i)));
            }
        }
        Ok(Self { sources, heap, last: None })
    }
}

impl Iterator for MergeRuns {
    type Item = Result<Digest, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let Reverse((digest, i)) = self.heap.pop()?;
            match self.sources[i].next() {
                Some(Ok(next)) => self.heap.push(Reverse((next, i))),
                Some(Err(e)) => return Some(Err(e)),
                None => {}
            }

            if self.last == Some(digest) {
                continue;
            }
            self.last = Some(digest);
            return Some(Ok(digest));
        }
    }
}

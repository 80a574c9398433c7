//! Streaming reader for plain-text breach corpora, one credential per line.
//!
//! Breach exports are frequently not valid UTF-8, so how undecodable lines are
//! treated is an explicit [`DecodePolicy`] chosen by the caller.

use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use serde::Serialize;

use crate::error::{CorpusError, Error};

/// What to do with a line that is not valid UTF-8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DecodePolicy {
    /// Fail the whole load on the first invalid line.
    Strict,
    /// Drop invalid lines and count them.
    #[default]
    Skip,
    /// Replace invalid sequences with U+FFFD, then hash.
    Lossy,
    /// Hash the raw bytes as they are.
    Bytes,
}

impl fmt::Display for DecodePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DecodePolicy::Strict => "strict",
            DecodePolicy::Skip => "skip",
            DecodePolicy::Lossy => "lossy",
            DecodePolicy::Bytes => "bytes",
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LoadOptions {
    /// Stop after yielding this many credentials.
    pub limit: Option<u64>,
    pub decode: DecodePolicy,
}

/// Line accounting for one load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CorpusStats {
    pub lines_read: u64,
    pub blank_lines: u64,
    pub invalid_lines: u64,
    pub credentials: u64,
}

/// Opens a corpus file. `-` reads stdin and a `.zst` extension is
/// decompressed on the fly.
pub fn open_corpus(path: &Path) -> Result<Box<dyn BufRead + Send>, Error> {
    if path.as_os_str() == "-" {
        return Ok(Box::new(BufReader::new(io::stdin())));
    }

    let file =
        File::open(path).map_err(|source| Error::CorpusOpen { path: path.to_path_buf(), source })?;

    if path.extension().is_some_and(|ext| ext == "zst") {
        let decoder = zstd::stream::read::Decoder::new(file)
            .map_err(|source| Error::CorpusOpen { path: path.to_path_buf(), source })?;
        return Ok(Box::new(BufReader::new(decoder)));
    }

    Ok(Box::new(BufReader::with_capacity(1 << 16, file)))
}

/// Lazily yields trimmed, non-empty credentials from a line source in source
/// order.
///
/// Lines end at `\n`, `\r\n` or a lone `\r`, so corpora with classic Mac line
/// endings split into one credential per line too.
///
/// Items are raw bytes. They are valid UTF-8 unless the policy is
/// [`DecodePolicy::Bytes`]. The source is owned and dropped with the reader,
/// including when iteration stops early.
pub struct CorpusReader<R> {
    source: R,
    options: LoadOptions,
    stats: CorpusStats,
    buf: Vec<u8>,
    done: bool,
}

impl<R: BufRead> CorpusReader<R> {
    pub fn new(source: R, options: LoadOptions) -> Self {
        Self { source, options, stats: CorpusStats::default(), buf: Vec::with_capacity(256), done: false }
    }

    pub fn stats(&self) -> CorpusStats {
        self.stats
    }

    fn decode_line(&mut self) -> Result<Option<Vec<u8>>, CorpusError> {
        let line = self.stats.lines_read;
        let credential = match self.options.decode {
            DecodePolicy::Bytes => self.buf.trim_ascii().to_vec(),
            DecodePolicy::Lossy => String::from_utf8_lossy(&self.buf).trim().as_bytes().to_vec(),
            DecodePolicy::Strict | DecodePolicy::Skip => match std::str::from_utf8(&self.buf) {
                Ok(text) => text.trim().as_bytes().to_vec(),
                Err(_) if self.options.decode == DecodePolicy::Strict => {
                    return Err(CorpusError::InvalidUtf8 { line });
                }
                Err(_) => {
                    self.stats.invalid_lines += 1;
                    return Ok(None);
                }
            },
        };

        if credential.is_empty() {
            self.stats.blank_lines += 1;
            return Ok(None);
        }
        Ok(Some(credential))
    }
}

impl<R: BufRead> Iterator for CorpusReader<R> {
    type Item = Result<Vec<u8>, CorpusError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done || self.options.limit.is_some_and(|limit| self.stats.credentials >= limit) {
                return None;
            }

            self.buf.clear();
            match read_line(&mut self.source, &mut self.buf) {
                Ok(0) => {
                    self.done = true;
                    return None;
                }
                Ok(_) => self.stats.lines_read += 1,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(source) => {
                    self.done = true;
                    return Some(Err(CorpusError::Read { line: self.stats.lines_read + 1, source }));
                }
            }

            match self.decode_line() {
                Ok(Some(credential)) => {
                    self.stats.credentials += 1;
                    return Some(Ok(credential));
                }
                Ok(None) => continue,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

/// Appends one line to `buf` without its terminator and returns the number of
/// bytes consumed, terminator included. `0` means end of input.
fn read_line<R: BufRead>(source: &mut R, buf: &mut Vec<u8>) -> io::Result<usize> {
    let mut consumed = 0;
    loop {
        let (terminator, used) = {
            let available = match source.fill_buf() {
                Ok(available) => available,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            if available.is_empty() {
                return Ok(consumed);
            }
            match available.iter().position(|&b| b == b'\n' || b == b'\r') {
                Some(i) => {
                    buf.extend_from_slice(&available[..i]);
                    (Some(available[i]), i + 1)
                }
                None => {
                    buf.extend_from_slice(available);
                    (None, available.len())
                }
            }
        };
        source.consume(used);
        consumed += used;

        match terminator {
            None => continue,
            Some(b'\r') => {
                // \r\n is a single terminator, even across a buffer refill
                let next = loop {
                    match source.fill_buf() {
                        Ok(available) => break available.first().copied(),
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                        Err(e) => return Err(e),
                    }
                };
                if next == Some(b'\n') {
                    source.consume(1);
                    consumed += 1;
                }
                return Ok(consumed);
            }
            Some(_) => return Ok(consumed),
        }
    }
}

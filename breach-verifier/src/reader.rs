use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::digest::{DIGEST_LEN, Digest};
use crate::error::Error;
use crate::format::{HEADER_LEN, Header, RECORD_SIZE, binary_search_records};

/// Buckets up to this many bytes are read in one call into a stack buffer.
///
/// A set of ~30 million digests averages ~460 records (14.7KB) per bucket, so
/// the slow path only runs for very large sets or adversarial skew.
pub const BUCKET_BUF_LEN: usize = 16384;

/// An open, immutable generation file.
///
/// Lookups use positional reads on a shared handle, so a single reader can
/// serve any number of threads at once without locking.
pub struct GenerationReader {
    path: PathBuf,
    file: File,
    header: Header,
}

impl GenerationReader {
    /// Opens a generation file and validates its header and length.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let path = path.into();
        let file = File::open(&path).map_err(|e| Error::io(&path, e))?;

        let mut header_buf = vec![0u8; HEADER_LEN];
        read_exact_at(&file, &mut header_buf, 0).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => {
                Error::Corrupt { path: path.clone(), reason: "header is truncated".to_string() }
            }
            _ => Error::io(&path, e),
        })?;
        let header = Header::decode(&header_buf)
            .map_err(|e| Error::Corrupt { path: path.clone(), reason: e.reason() })?;

        let expected = header.file_len().ok_or_else(|| Error::Corrupt {
            path: path.clone(),
            reason: format!("record count {} overflows the file size", header.count()),
        })?;
        let file_len = file.metadata().map_err(|e| Error::io(&path, e))?.len();
        if file_len != expected {
            return Err(Error::Corrupt {
                path,
                reason: format!(
                    "expected {} bytes for {} records, found {}",
                    expected,
                    header.count(),
                    file_len
                ),
            });
        }

        Ok(Self { path, file, header })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of distinct digests in this generation.
    pub fn len(&self) -> u64 {
        self.header.count()
    }

    pub fn is_empty(&self) -> bool {
        self.header.count() == 0
    }

    /// Checks if the digest is a member of this generation.
    pub fn contains_digest(&self, digest: &Digest) -> Result<bool, Error> {
        let (lo, hi) = self.header.bucket_range(digest.bucket());
        if lo == hi {
            return Ok(false);
        }

        let bucket_bytes = ((hi - lo) as usize) * RECORD_SIZE;
        if bucket_bytes <= BUCKET_BUF_LEN {
            let mut buf = [0u8; BUCKET_BUF_LEN];
            read_exact_at(&self.file, &mut buf[..bucket_bytes], record_offset(lo))
                .map_err(|e| Error::io(&self.path, e))?;
            return Ok(binary_search_records(&buf[..bucket_bytes], digest.as_bytes()));
        }

        self.probe_search(lo, hi, digest)
    }

    /// Binary search reading one record per probe, for buckets that do not fit
    /// the stack buffer.
    fn probe_search(&self, mut low: u64, mut high: u64, digest: &Digest) -> Result<bool, Error> {
        let mut record = [0u8; RECORD_SIZE];
        while low < high {
            let mid = low + (high - low) / 2;
            read_exact_at(&self.file, &mut record, record_offset(mid))
                .map_err(|e| Error::io(&self.path, e))?;

            match record.cmp(digest.as_bytes()) {
                std::cmp::Ordering::Equal => return Ok(true),
                std::cmp::Ordering::Less => low = mid + 1,
                std::cmp::Ordering::Greater => high = mid,
            }
        }
        Ok(false)
    }

    /// Streams every record in ascending order through a fresh handle.
    pub fn records(&self) -> Result<Records, Error> {
        let mut file = File::open(&self.path).map_err(|e| Error::io(&self.path, e))?;
        file.seek(SeekFrom::Start(HEADER_LEN as u64)).map_err(|e| Error::io(&self.path, e))?;
        Ok(Records {
            path: self.path.clone(),
            reader: BufReader::with_capacity(1 << 16, file),
            remaining: self.header.count(),
        })
    }
}

/// Sequential iterator over a generation's records.
pub struct Records {
    path: PathBuf,
    reader: BufReader<File>,
    remaining: u64,
}

impl Iterator for Records {
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

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.remaining as usize;
        (remaining, Some(remaining))
    }
}

#[inline(always)]
fn record_offset(index: u64) -> u64 {
    HEADER_LEN as u64 + index * RECORD_SIZE as u64
}

#[cfg(unix)]
#[inline(always)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    std::os::unix::fs::FileExt::read_at(file, buf, offset)
}

#[cfg(windows)]
#[inline(always)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    std::os::windows::fs::FileExt::seek_read(file, buf, offset)
}

// A single read is not guaranteed to fill the buffer; keep reading until it is
// full, retrying reads interrupted by signals.
fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<()> {
    let mut total = 0usize;
    while total < buf.len() {
        match read_at(file, &mut buf[total..], offset + total as u64) {
            Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
            Ok(n) => total += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

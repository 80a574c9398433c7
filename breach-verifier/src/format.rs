//! On-disk layout of a breach set generation file.
//!
//! ```text
//! offset        size           field
//! 0             8              magic, last byte is the format version
//! 8             8              record count N (u64 LE)
//! 16            FANOUT_LEN*8   fanout: entry i = records whose bucket <= i (u64 LE)
//! HEADER_LEN    N*RECORD_SIZE  digests, strictly ascending
//! ```
//!
//! The fanout maps the first two bytes of a digest to the contiguous run of
//! records sharing them, so a lookup only ever touches one bucket. With tens of
//! millions of records a bucket stays in the hundreds, i.e. a few KB.

use std::cmp::Ordering;

use crate::digest::{DIGEST_LEN, Digest};

/// Current format version, stored in the last byte of the magic.
pub const FORMAT_VERSION: u8 = 1;

/// Magic bytes at the start of every generation file.
pub const MAGIC: [u8; 8] = *b"BRSET\0\0\x01";

/// Size of a record in bytes (a full, untruncated digest).
pub const RECORD_SIZE: usize = DIGEST_LEN;

/// Number of fanout buckets (first two digest bytes).
pub const FANOUT_LEN: usize = 1 << 16;

/// Byte offset of the first record.
pub const HEADER_LEN: usize = 16 + FANOUT_LEN * 8;

/// File extension of committed generation files.
pub const GENERATION_EXT: &str = "brset";

/// Why a header failed to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderError {
    Truncated,
    BadMagic,
    UnsupportedVersion(u8),
    FanoutNotMonotone,
    CountMismatch,
    CountTooLarge,
}

impl HeaderError {
    pub fn reason(self) -> String {
        match self {
            HeaderError::Truncated => "header is truncated".to_string(),
            HeaderError::BadMagic => "bad magic bytes".to_string(),
            HeaderError::UnsupportedVersion(v) => format!("unsupported format version {v}"),
            HeaderError::FanoutNotMonotone => "fanout table is not monotone".to_string(),
            HeaderError::CountMismatch => "fanout total does not match record count".to_string(),
            HeaderError::CountTooLarge => "record count overflows the file size".to_string(),
        }
    }
}

/// Decoded generation header: record count and cumulative fanout table.
#[derive(Clone, PartialEq, Eq)]
pub struct Header {
    count: u64,
    fanout: Box<[u64]>,
}

impl Header {
    /// Header of an empty set.
    pub fn empty() -> Self {
        Self { count: 0, fanout: vec![0u64; FANOUT_LEN].into_boxed_slice() }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Returns the half-open record index range `[lo, hi)` of a bucket.
    #[inline(always)]
    pub fn bucket_range(&self, bucket: usize) -> (u64, u64) {
        let lo = if bucket == 0 { 0 } else { self.fanout[bucket - 1] };
        (lo, self.fanout[bucket])
    }

    /// Expected total file length for this header, `None` if it does not fit
    /// in a `u64`.
    pub fn file_len(&self) -> Option<u64> {
        expected_file_len(self.count)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, HeaderError> {
        if bytes.len() < HEADER_LEN {
            return Err(HeaderError::Truncated);
        }
        if bytes[..7] != MAGIC[..7] {
            return Err(HeaderError::BadMagic);
        }
        if bytes[7] != FORMAT_VERSION {
            return Err(HeaderError::UnsupportedVersion(bytes[7]));
        }

        let count = read_u64(&bytes[8..16]);
        if expected_file_len(count).is_none() {
            return Err(HeaderError::CountTooLarge);
        }
        let mut fanout = Vec::with_capacity(FANOUT_LEN);
        let mut prev = 0u64;
        for entry in bytes[16..HEADER_LEN].chunks_exact(8) {
            let value = read_u64(entry);
            if value < prev {
                return Err(HeaderError::FanoutNotMonotone);
            }
            fanout.push(value);
            prev = value;
        }
        if prev != count {
            return Err(HeaderError::CountMismatch);
        }

        Ok(Self { count, fanout: fanout.into_boxed_slice() })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN);
        out.extend_from_slice(&MAGIC);
        out.extend_from_slice(&self.count.to_le_bytes());
        for entry in self.fanout.iter() {
            out.extend_from_slice(&entry.to_le_bytes());
        }
        out
    }
}

fn expected_file_len(count: u64) -> Option<u64> {
    count.checked_mul(RECORD_SIZE as u64)?.checked_add(HEADER_LEN as u64)
}

#[inline(always)]
fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}

/// Accumulates a header while records are streamed out in ascending order.
pub struct FanoutCounter {
    counts: Vec<u64>,
    last: Option<Digest>,
}

impl FanoutCounter {
    pub fn new() -> Self {
        Self { counts: vec![0u64; FANOUT_LEN], last: None }
    }

    /// Records one digest. Returns `false` (and counts nothing) if the digest
    /// is not strictly greater than the previous one.
    pub fn push(&mut self, digest: &Digest) -> bool {
        if self.last.is_some_and(|last| last >= *digest) {
            return false;
        }
        self.counts[digest.bucket()] += 1;
        self.last = Some(*digest);
        true
    }

    pub fn finish(self) -> Header {
        let mut fanout = self.counts;
        let mut total = 0u64;
        for entry in fanout.iter_mut() {
            total += *entry;
            *entry = total;
        }
        Header { count: total, fanout: fanout.into_boxed_slice() }
    }
}

impl Default for FanoutCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Binary searches for a digest in a buffer of sorted fixed-size records.
#[inline(always)]
pub fn binary_search_records(data: &[u8], search_key: &[u8; RECORD_SIZE]) -> bool {
    if data.is_empty() {
        return false;
    }

    let record_count = data.len() / RECORD_SIZE;
    let mut low = 0usize;
    let mut high = record_count;

    while low < high {
        let mid = low + (high - low) / 2;
        let offset = mid * RECORD_SIZE;

        let record = &data[offset..offset + RECORD_SIZE];

        match record.cmp(search_key.as_slice()) {
            Ordering::Equal => return true,
            Ordering::Less => low = mid + 1,
            Ordering::Greater => high = mid,
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(first: u8, last: u8) -> [u8; RECORD_SIZE] {
        let mut k = [0u8; RECORD_SIZE];
        k[0] = first;
        k[RECORD_SIZE - 1] = last;
        k
    }

    #[test]
    fn test_binary_search_records() {
        let records = [key(0x00, 0x01), key(0x00, 0x05), key(0x00, 0x10), key(0xFF, 0xFF)];
        let data: Vec<u8> = records.iter().flatten().copied().collect();

        for record in &records {
            assert!(binary_search_records(&data, record));
        }

        assert!(!binary_search_records(&data, &key(0x00, 0x00)));
        assert!(!binary_search_records(&data, &key(0x00, 0x02)));
        assert!(!binary_search_records(&data, &key(0x00, 0xFF)));
        assert!(!binary_search_records(&data, &key(0xFF, 0xFE)));
    }

    #[test]
    fn test_empty_data() {
        assert!(!binary_search_records(&[], &key(0x00, 0x01)));
    }

    #[test]
    fn test_single_record() {
        let data = key(0x56, 0xF0);
        assert!(binary_search_records(&data, &key(0x56, 0xF0)));
        assert!(!binary_search_records(&data, &key(0x00, 0x00)));
        assert!(!binary_search_records(&data, &key(0xFF, 0xFF)));
    }

    #[test]
    fn test_fanout_counter_builds_cumulative_table() {
        let mut counter = FanoutCounter::new();
        assert!(counter.push(&Digest::from_bytes(key(0x00, 0x01))));
        assert!(counter.push(&Digest::from_bytes(key(0x00, 0x02))));
        assert!(counter.push(&Digest::from_bytes(key(0x01, 0x00))));
        assert!(counter.push(&Digest::from_bytes(key(0xFF, 0x00))));

        let header = counter.finish();
        assert_eq!(header.count(), 4);
        assert_eq!(header.bucket_range(0x0000), (0, 2));
        assert_eq!(header.bucket_range(0x0001), (2, 2));
        assert_eq!(header.bucket_range(0x0100), (2, 3));
        assert_eq!(header.bucket_range(0xFF00), (3, 4));
        assert_eq!(header.bucket_range(0xFFFF), (4, 4));
    }

    #[test]
    fn test_fanout_counter_rejects_unsorted_and_duplicates() {
        let mut counter = FanoutCounter::new();
        assert!(counter.push(&Digest::from_bytes(key(0x10, 0x00))));
        assert!(!counter.push(&Digest::from_bytes(key(0x10, 0x00))));
        assert!(!counter.push(&Digest::from_bytes(key(0x01, 0x00))));
        assert_eq!(counter.finish().count(), 1);
    }

    #[test]
    fn test_header_encode_decode() {
        let mut counter = FanoutCounter::new();
        counter.push(&Digest::from_bytes(key(0x12, 0x34)));
        let header = counter.finish();

        let bytes = header.encode();
        assert_eq!(bytes.len(), HEADER_LEN);
        assert!(Header::decode(&bytes) == Ok(header));
    }

    #[test]
    fn test_header_decode_errors() {
        let good = Header::empty().encode();

        assert_eq!(Header::decode(&good[..HEADER_LEN - 1]).err(), Some(HeaderError::Truncated));

        let mut bad_magic = good.clone();
        bad_magic[0] = b'X';
        assert_eq!(Header::decode(&bad_magic).err(), Some(HeaderError::BadMagic));

        let mut bad_version = good.clone();
        bad_version[7] = 9;
        assert_eq!(
            Header::decode(&bad_version).err(),
            Some(HeaderError::UnsupportedVersion(9))
        );

        let mut bad_count = good.clone();
        bad_count[8] = 1;
        assert_eq!(Header::decode(&bad_count).err(), Some(HeaderError::CountMismatch));

        // fanout[0] = 5 followed by zeros
        let mut not_monotone = good;
        not_monotone[16] = 5;
        assert_eq!(Header::decode(&not_monotone).err(), Some(HeaderError::FanoutNotMonotone));
    }

    #[test]
    fn test_header_rejects_count_overflowing_file_len() {
        let mut bytes = Header::empty().encode();
        let count = 1u64 << 59;
        bytes[8..16].copy_from_slice(&count.to_le_bytes());
        bytes[HEADER_LEN - 8..].copy_from_slice(&count.to_le_bytes());

        assert_eq!(Header::decode(&bytes).err(), Some(HeaderError::CountTooLarge));
        assert_eq!(expected_file_len(u64::MAX / RECORD_SIZE as u64), None);
        assert_eq!(Header::empty().file_len(), Some(HEADER_LEN as u64));
    }
}

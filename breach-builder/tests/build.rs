use std::fs;
use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use breach_builder::{
    BuildOptions, BuildReport, CorpusError, DecodePolicy, Error, LoadOptions, build_from_reader,
    build_index, list_generations,
};
use breach_verifier::{BreachIndex, Digest, GenerationReader, read_current};
use tempfile::TempDir;

const CORPUS: &str = "password\n123456\nqwerty\npassword\n\n  letmein  \r\niloveyou\n123456\n";

fn build(
    dir: &Path,
    corpus: &[u8],
    options: impl FnOnce(&mut BuildOptions),
) -> Result<BuildReport, Error> {
    let mut opts = BuildOptions::new(dir);
    options(&mut opts);
    let progress = AtomicU64::new(0);
    build_from_reader(Cursor::new(corpus.to_vec()), "test", &opts, &progress)
}

fn all_records(dir: &Path) -> Vec<Digest> {
    let path = read_current(dir).unwrap().unwrap();
    GenerationReader::open(path).unwrap().records().unwrap().map(Result::unwrap).collect()
}

fn leftover_temp_files(dir: &Path) -> Vec<String> {
    fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with('.'))
        .collect()
}

#[test]
fn test_every_inserted_password_is_found() {
    let dir = TempDir::new().unwrap();
    let report = build(dir.path(), CORPUS.as_bytes(), |_| {}).unwrap();

    assert_eq!(report.digests_in, 7);
    assert_eq!(report.records, 5);
    assert_eq!(report.corpus_stats.blank_lines, 1);

    let index = BreachIndex::open(dir.path()).unwrap();
    for password in ["password", "123456", "qwerty", "letmein", "iloveyou"] {
        assert!(index.contains(password).unwrap(), "{password} should be breached");
    }
    assert!(!index.contains("  letmein  ").unwrap());
    assert!(!index.contains("Tr0ub4dor&3").unwrap());
    assert!(!index.contains("").unwrap());
    assert!(leftover_temp_files(dir.path()).is_empty());
}

#[test]
fn test_progress_counts_credentials() {
    let dir = TempDir::new().unwrap();
    let progress = AtomicU64::new(0);
    build_from_reader(
        Cursor::new(CORPUS.as_bytes().to_vec()),
        "test",
        &BuildOptions::new(dir.path()),
        &progress,
    )
    .unwrap();
    assert_eq!(progress.load(Ordering::Relaxed), 7);
}

#[test]
fn test_spilled_build_matches_in_memory_build() {
    let corpus: String = (0..2_000).map(|i| format!("user{}\n", i % 1_500)).collect();

    let small = TempDir::new().unwrap();
    let report = build(small.path(), corpus.as_bytes(), |o| o.chunk_records = 64).unwrap();
    assert!(report.runs_spilled > 20);

    let large = TempDir::new().unwrap();
    build(large.path(), corpus.as_bytes(), |_| {}).unwrap();

    let records = all_records(small.path());
    assert_eq!(records.len(), 1_500);
    assert_eq!(records, all_records(large.path()));
    assert!(records.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_empty_corpus_builds_empty_set() {
    let dir = TempDir::new().unwrap();
    let report = build(dir.path(), b"\n\n   \n", |_| {}).unwrap();
    assert_eq!(report.records, 0);

    let index = BreachIndex::open(dir.path()).unwrap();
    assert!(index.is_empty());
    assert!(!index.contains("password").unwrap());
    assert!(!index.contains("").unwrap());
}

#[test]
fn test_limit_caps_ingestion() {
    let dir = TempDir::new().unwrap();
    let report = build(dir.path(), CORPUS.as_bytes(), |o| {
        o.load = LoadOptions { limit: Some(2), decode: DecodePolicy::Skip }
    })
    .unwrap();
    assert_eq!(report.digests_in, 2);

    let index = BreachIndex::open(dir.path()).unwrap();
    assert!(index.contains("password").unwrap());
    assert!(index.contains("123456").unwrap());
    assert!(!index.contains("qwerty").unwrap());
}

#[test]
fn test_append_keeps_previous_digests() {
    let dir = TempDir::new().unwrap();
    build(dir.path(), b"alpha\nbeta\n", |_| {}).unwrap();
    let report = build(dir.path(), b"beta\ngamma\n", |o| o.append = true).unwrap();

    assert_eq!(report.records, 3);
    assert!(report.appended_to.is_some());

    let index = BreachIndex::open(dir.path()).unwrap();
    for password in ["alpha", "beta", "gamma"] {
        assert!(index.contains(password).unwrap());
    }
}

#[test]
fn test_replace_drops_previous_digests() {
    let dir = TempDir::new().unwrap();
    build(dir.path(), b"alpha\n", |_| {}).unwrap();
    build(dir.path(), b"gamma\n", |_| {}).unwrap();

    let index = BreachIndex::open(dir.path()).unwrap();
    assert!(!index.contains("alpha").unwrap());
    assert!(index.contains("gamma").unwrap());
}

#[test]
fn test_failed_build_keeps_committed_set() {
    let dir = TempDir::new().unwrap();
    build(dir.path(), b"alpha\n", |_| {}).unwrap();
    let committed = read_current(dir.path()).unwrap();

    let result = build(dir.path(), b"beta\n\xff\xfe\ngamma\n", |o| {
        o.load.decode = DecodePolicy::Strict;
        o.chunk_records = 1;
    });
    assert!(matches!(result, Err(Error::Corpus(CorpusError::InvalidUtf8 { line: 2 }))));

    assert_eq!(read_current(dir.path()).unwrap(), committed);
    assert!(leftover_temp_files(dir.path()).is_empty());
    let index = BreachIndex::open(dir.path()).unwrap();
    assert!(index.contains("alpha").unwrap());
    assert!(!index.contains("beta").unwrap());
}

#[test]
fn test_rebuild_with_same_corpus_gives_same_answers() {
    let dir = TempDir::new().unwrap();
    build(dir.path(), CORPUS.as_bytes(), |_| {}).unwrap();
    let probes = ["password", "qwerty", "nope", "", "iloveyou", "Password"];
    let index = BreachIndex::open(dir.path()).unwrap();
    let before: Vec<bool> = probes.iter().map(|p| index.contains(p).unwrap()).collect();

    build(dir.path(), CORPUS.as_bytes(), |_| {}).unwrap();
    assert!(index.reload().unwrap());
    let after: Vec<bool> = probes.iter().map(|p| index.contains(p).unwrap()).collect();

    assert_eq!(before, after);
}

#[test]
fn test_old_generations_are_pruned() {
    let dir = TempDir::new().unwrap();
    for corpus in [b"a\n", b"b\n", b"c\n", b"d\n"] {
        build(dir.path(), corpus, |o| o.keep_generations = 2).unwrap();
    }

    let generations = list_generations(dir.path()).unwrap();
    assert_eq!(generations.len(), 2);
    let current = read_current(dir.path()).unwrap().unwrap();
    let current_name = current.file_name().unwrap().to_str().unwrap();
    assert!(generations.iter().any(|g| g == current_name));
}

#[test]
fn test_manifest_is_written() {
    let dir = TempDir::new().unwrap();
    let report = build(dir.path(), CORPUS.as_bytes(), |_| {}).unwrap();

    let manifest = fs::read_to_string(report.path.with_extension("json")).unwrap();
    assert!(manifest.contains("\"records\": 5"));
    assert!(manifest.contains("\"decode\": \"skip\""));
    assert!(!manifest.contains("password"));
}

#[test]
fn test_zstd_corpus_file() {
    let dir = TempDir::new().unwrap();
    let corpus_path = dir.path().join("corpus.txt.zst");
    let compressed = zstd::stream::encode_all(CORPUS.as_bytes(), 3).unwrap();
    fs::write(&corpus_path, compressed).unwrap();

    let index_dir = dir.path().join("index");
    let progress = AtomicU64::new(0);
    let report = build_index(&corpus_path, &BuildOptions::new(&index_dir), &progress).unwrap();
    assert_eq!(report.records, 5);

    let index = BreachIndex::open(&index_dir).unwrap();
    assert!(index.contains("letmein").unwrap());
}

#[test]
fn test_missing_corpus_fails_without_touching_index() {
    let dir = TempDir::new().unwrap();
    let progress = AtomicU64::new(0);
    let result = build_index(
        &dir.path().join("missing.txt"),
        &BuildOptions::new(dir.path().join("index")),
        &progress,
    );
    assert!(matches!(result, Err(Error::CorpusOpen { .. })));
    assert!(!dir.path().join("index").exists());
}

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use breach_verifier::{BreachIndex, CURRENT_FILE, Digest, Error, FanoutCounter, read_current};
use tempfile::TempDir;

fn write_generation(dir: &Path, name: &str, passwords: &[&str]) {
    let mut digests: Vec<Digest> = passwords.iter().map(|p| Digest::of_str(p)).collect();
    digests.sort();
    digests.dedup();

    let mut counter = FanoutCounter::new();
    for d in &digests {
        counter.push(d);
    }

    let mut file = File::create(dir.join(name)).unwrap();
    file.write_all(&counter.finish().encode()).unwrap();
    for d in &digests {
        file.write_all(d.as_bytes()).unwrap();
    }
}

fn commit(dir: &Path, name: &str) {
    fs::write(dir.join(CURRENT_FILE), format!("{name}\n")).unwrap();
}

#[test]
fn test_open_without_current_fails() {
    let dir = TempDir::new().unwrap();
    assert!(matches!(BreachIndex::open(dir.path()), Err(Error::NoGeneration { .. })));
    assert!(read_current(dir.path()).unwrap().is_none());
}

#[test]
fn test_bad_pointer_is_rejected() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join(CURRENT_FILE), "../../etc/passwd").unwrap();
    assert!(matches!(BreachIndex::open(dir.path()), Err(Error::BadPointer { .. })));
}

#[test]
fn test_pointer_to_missing_generation_fails() {
    let dir = TempDir::new().unwrap();
    commit(dir.path(), "gen-missing.brset");
    assert!(matches!(BreachIndex::open(dir.path()), Err(Error::Io { .. })));
}

#[test]
fn test_breached_and_clean_passwords() {
    let dir = TempDir::new().unwrap();
    write_generation(dir.path(), "gen-1.brset", &["password", "123456", "iloveyou"]);
    commit(dir.path(), "gen-1.brset");

    let index = BreachIndex::open(dir.path()).unwrap();
    assert_eq!(index.len(), 3);
    assert!(index.contains("password").unwrap());
    assert!(index.contains("iloveyou").unwrap());
    assert!(!index.contains("Password").unwrap());
    assert!(!index.contains("hAwT?}cuC:r#kW5").unwrap());
    assert!(!index.contains("").unwrap());
}

#[test]
fn test_empty_set_and_empty_password() {
    let dir = TempDir::new().unwrap();
    write_generation(dir.path(), "gen-1.brset", &[]);
    commit(dir.path(), "gen-1.brset");

    let index = BreachIndex::open(dir.path()).unwrap();
    assert!(index.is_empty());
    assert!(!index.contains("").unwrap());
    assert!(!index.contains("password").unwrap());
}

#[test]
fn test_reload_swaps_generation_atomically() {
    let dir = TempDir::new().unwrap();
    write_generation(dir.path(), "gen-1.brset", &["alpha"]);
    commit(dir.path(), "gen-1.brset");

    let index = BreachIndex::open(dir.path()).unwrap();
    let old = index.snapshot();
    assert!(!index.reload().unwrap());

    write_generation(dir.path(), "gen-2.brset", &["alpha", "beta"]);
    commit(dir.path(), "gen-2.brset");
    assert!(index.reload().unwrap());

    assert!(index.contains("beta").unwrap());
    assert_eq!(index.len(), 2);
    // a query that started before the swap still sees the old set
    assert!(!old.contains_digest(&Digest::of_str("beta")).unwrap());
    assert_eq!(old.len(), 1);
}

#[test]
fn test_failed_reload_keeps_serving() {
    let dir = TempDir::new().unwrap();
    write_generation(dir.path(), "gen-1.brset", &["alpha"]);
    commit(dir.path(), "gen-1.brset");
    let index = BreachIndex::open(dir.path()).unwrap();

    fs::write(dir.path().join("gen-2.brset"), b"garbage").unwrap();
    commit(dir.path(), "gen-2.brset");

    assert!(matches!(index.reload(), Err(Error::Corrupt { .. })));
    assert!(index.contains("alpha").unwrap());
}

#[test]
fn test_concurrent_readers() {
    let dir = TempDir::new().unwrap();
    let passwords: Vec<String> = (0..500).map(|i| format!("pw-{i}")).collect();
    let refs: Vec<&str> = passwords.iter().map(String::as_str).collect();
    write_generation(dir.path(), "gen-1.brset", &refs);
    commit(dir.path(), "gen-1.brset");

    let index = Arc::new(BreachIndex::open(dir.path()).unwrap());
    std::thread::scope(|s| {
        for t in 0..8 {
            let index = Arc::clone(&index);
            let passwords = &passwords;
            s.spawn(move || {
                for (i, p) in passwords.iter().enumerate() {
                    if i % 8 == t {
                        assert!(index.contains(p).unwrap());
                        assert!(!index.contains(&format!("{p}-x")).unwrap());
                    }
                }
            });
        }
    });
}

#[cfg(feature = "tokio")]
#[tokio::test(flavor = "multi_thread")]
async fn test_contains_async() {
    let dir = TempDir::new().unwrap();
    write_generation(dir.path(), "gen-1.brset", &["password"]);
    commit(dir.path(), "gen-1.brset");

    let index = BreachIndex::open(dir.path()).unwrap();
    assert!(index.contains_async("password").await.unwrap());
    assert!(!index.contains_async("correct horse").await.unwrap());
}

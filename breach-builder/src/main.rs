use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use breach_builder::{
    BuildOptions, DEFAULT_CHUNK_RECORDS, DEFAULT_KEEP_GENERATIONS, DecodePolicy, Error,
    LoadOptions, build_index, list_generations,
};
use breach_verifier::{BreachIndex, Digest, read_current};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "breach-builder")]
#[command(about = "Build and inspect a SHA-256 breached-credential set")]
struct Args {
    /// Index directory holding generations and the CURRENT pointer
    #[arg(short, long, global = true, env = "BREACH_INDEX_DIR", default_value = "breach-index")]
    index_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest a corpus (one credential per line) and commit a new generation
    Build {
        /// Corpus file; `-` reads stdin, `.zst` files are decompressed
        #[arg(short, long)]
        corpus: PathBuf,

        /// Stop after this many credentials (default: whole corpus)
        #[arg(long)]
        limit: Option<u64>,

        /// How to treat lines that are not valid UTF-8
        #[arg(long, value_enum, default_value_t = DecodePolicy::Skip)]
        decode: DecodePolicy,

        /// Merge into the committed generation instead of replacing it
        #[arg(long)]
        append: bool,

        /// Digests held in memory before spilling a sorted run
        #[arg(long, default_value_t = DEFAULT_CHUNK_RECORDS)]
        chunk_records: usize,

        /// Generations to keep on disk, the committed one included
        #[arg(long, default_value_t = DEFAULT_KEEP_GENERATIONS)]
        keep_generations: usize,

        /// Disable progress spinner
        #[arg(long)]
        no_progress: bool,
    },

    /// Check passwords against the committed generation
    Check {
        #[arg(required = true)]
        passwords: Vec<String>,
    },

    /// Show the committed generation and its build manifest
    Stats,
}

fn main() -> Result<(), Error> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match args.command {
        Command::Build {
            corpus,
            limit,
            decode,
            append,
            chunk_records,
            keep_generations,
            no_progress,
        } => {
            if chunk_records == 0 {
                return Err(Error::InvalidArgs("--chunk-records must be at least 1".into()));
            }
            if keep_generations == 0 {
                return Err(Error::InvalidArgs("--keep-generations must be at least 1".into()));
            }

            let options = BuildOptions {
                index_dir: args.index_dir,
                load: LoadOptions { limit, decode },
                chunk_records,
                keep_generations,
                append,
            };
            build(&corpus, &options, no_progress)
        }
        Command::Check { passwords } => check(args.index_dir, &passwords),
        Command::Stats => stats(args.index_dir),
    }
}

fn build(corpus: &Path, options: &BuildOptions, no_progress: bool) -> Result<(), Error> {
    let progress_counter = Arc::new(AtomicU64::new(0));
    let done = Arc::new(AtomicBool::new(false));

    let progress_bar = if !no_progress {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {pos} credentials ({per_sec}) {msg}")
                .expect("Invalid progress bar template"),
        );
        Some(pb)
    } else {
        None
    };

    // Spawn progress updater thread
    let updater = progress_bar.clone().map(|pb| {
        let counter = Arc::clone(&progress_counter);
        let done = Arc::clone(&done);
        std::thread::spawn(move || {
            while !done.load(Ordering::Relaxed) {
                pb.set_position(counter.load(Ordering::Relaxed));
                std::thread::sleep(Duration::from_millis(100));
            }
        })
    });

    let result = build_index(corpus, options, &progress_counter);

    done.store(true, Ordering::Relaxed);
    if let Some(handle) = updater {
        let _ = handle.join();
    }
    if let Some(pb) = progress_bar {
        pb.set_position(progress_counter.load(Ordering::Relaxed));
        pb.finish_with_message(if result.is_ok() { "done" } else { "failed" });
    }

    let report = result?;
    println!(
        "Committed {} with {} unique digests ({} credentials read, {} blank, {} invalid)",
        report.generation,
        report.records,
        report.digests_in,
        report.corpus_stats.blank_lines,
        report.corpus_stats.invalid_lines
    );
    if let Some(previous) = &report.appended_to {
        println!("Appended to {previous}");
    }
    if !report.pruned.is_empty() {
        println!("Pruned {} old generation(s)", report.pruned.len());
    }
    Ok(())
}

fn check(index_dir: PathBuf, passwords: &[String]) -> Result<(), Error> {
    let index = BreachIndex::open(index_dir)?;
    for password in passwords {
        let digest = Digest::of_str(password);
        let verdict = if index.contains_digest(&digest)? { "BREACHED" } else { "not found" };
        println!("{digest}  {verdict}");
    }
    Ok(())
}

fn stats(index_dir: PathBuf) -> Result<(), Error> {
    let Some(current) = read_current(&index_dir)? else {
        println!("No committed breach set in {}", index_dir.display());
        return Ok(());
    };

    let index = BreachIndex::open(&index_dir)?;
    println!("Committed: {}", current.display());
    println!("Records:   {}", index.len());

    let mut generations = list_generations(&index_dir)?;
    generations.sort();
    println!("On disk:   {}", generations.join(", "));

    if let Ok(manifest) = fs::read_to_string(current.with_extension("json")) {
        println!("{}", manifest.trim_end());
    }
    Ok(())
}

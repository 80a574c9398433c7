use std::path::PathBuf;

/// Errors raised while reading a corpus.
#[derive(Debug, thiserror::Error)]
pub enum CorpusError {
    #[error("Line {line}: invalid UTF-8 (decode policy is strict)")]
    InvalidUtf8 { line: u64 },

    #[error("Failed to read corpus at line {line}: {source}")]
    Read {
        line: u64,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Cannot open corpus '{path}': {source}")]
    CorpusOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Corpus(#[from] CorpusError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Index(#[from] breach_verifier::Error),

    #[error("Failed to write manifest '{path}': {source}")]
    Manifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Digest stream is not strictly ascending at {digest}")]
    OutOfOrder { digest: String },

    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io { path: path.into(), source }
    }
}

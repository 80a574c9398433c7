use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("No committed breach set in {dir} (missing CURRENT)")]
    NoGeneration { dir: PathBuf },

    #[error("CURRENT in {dir} does not name a generation file: {content:?}")]
    BadPointer { dir: PathBuf, content: String },

    #[error("Corrupt breach set file '{path}': {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[cfg(feature = "tokio")]
    #[error("Lookup task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Io { path: path.into(), source }
    }
}

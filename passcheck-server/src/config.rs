use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::http::Cors;

pub const DEFAULT_ALLOWED_ORIGIN: &str = "http://localhost:5173";

#[derive(Parser, Debug, Clone)]
#[command(name = "passcheck-server")]
#[command(about = "Serve password strength, breach checks and password generation over HTTP")]
pub struct Config {
    /// Address to listen on
    #[arg(long, env = "PASSCHECK_BIND", default_value = "127.0.0.1:8000")]
    pub bind: SocketAddr,

    /// Index directory built by breach-builder (falls back to BREACH_INDEX_DIR)
    #[arg(long, env = "PASSCHECK_INDEX_DIR")]
    pub index_dir: Option<PathBuf>,

    /// Origin allowed to make browser requests; repeat for more, `*` for any
    #[arg(
        long = "allow-origin",
        env = "PASSCHECK_ALLOW_ORIGINS",
        value_delimiter = ',',
        default_value = DEFAULT_ALLOWED_ORIGIN
    )]
    pub allow_origins: Vec<String>,

    /// Seconds between checks for a newly committed breach set (0 disables)
    #[arg(long, env = "PASSCHECK_RELOAD_INTERVAL_SECS", default_value_t = 0)]
    pub reload_interval_secs: u64,
}

impl Config {
    pub fn index_dir(&self) -> PathBuf {
        self.index_dir.clone().unwrap_or_else(breach_verifier::index_dir_from_env)
    }

    pub fn cors(&self) -> Cors {
        Cors::new(self.allow_origins.iter().map(|o| o.trim()).filter(|o| !o.is_empty()))
    }

    pub fn reload_interval(&self) -> Option<Duration> {
        (self.reload_interval_secs > 0).then(|| Duration::from_secs(self.reload_interval_secs))
    }
}

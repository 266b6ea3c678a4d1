//! Locations of the on-disk data tree
//!
//! Everything lives under one base directory: `~/.reel` by default, or
//! whatever `--data-dir` pointed at. The override is set once at startup
//! and read by every path helper after that.

use std::path::PathBuf;
use std::sync::OnceLock;

static DATA_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Record the base directory for this process. Call before anything
/// touches the store or the log file; later calls are ignored.
pub fn init_data_dir(custom_path: Option<PathBuf>) {
    let path = custom_path.unwrap_or_else(default_data_dir);
    if let Err(path) = DATA_DIR.set(path) {
        tracing::debug!(rejected = %path.display(), "data directory already set");
    }
}

fn default_data_dir() -> PathBuf {
    match dirs::home_dir() {
        Some(home) => home.join(".reel"),
        None => PathBuf::from(".reel"),
    }
}

/// Base data directory for this process.
pub fn data_dir() -> PathBuf {
    DATA_DIR.get().cloned().unwrap_or_else(default_data_dir)
}

pub fn database_path() -> PathBuf {
    data_dir().join("reel.db")
}

pub fn logs_dir() -> PathBuf {
    data_dir().join("logs")
}

pub fn log_file_path() -> PathBuf {
    logs_dir().join("reel.log")
}

/// Where session archives land unless the CLI names an output file.
pub fn exports_dir() -> PathBuf {
    data_dir().join("exports")
}

pub fn config_path() -> PathBuf {
    data_dir().join("config.toml")
}

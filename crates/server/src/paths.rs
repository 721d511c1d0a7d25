//! Central path resolution for all CogniCore server data files.
//!
//! Resolved once at startup from: CLI `--data-dir` > `COGNICORE_DATA_DIR` env > `~/.cognicore`.
//! All callsites use these helpers instead of constructing paths from `HOME`.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

static DATA_DIR: RwLock<Option<PathBuf>> = RwLock::new(None);

/// Initialize the global data directory. Returns the resolved path.
///
/// `explicit` already folds in the env var (clap `env` fallback).
pub fn init_data_dir(explicit: Option<&Path>) -> PathBuf {
    let dir = explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(default_data_dir);

    let mut guard = DATA_DIR.write().unwrap_or_else(PoisonError::into_inner);
    *guard = Some(dir.clone());
    dir
}

/// Current data directory, or the default when `init_data_dir` hasn't run.
pub fn data_dir() -> PathBuf {
    DATA_DIR
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
        .unwrap_or_else(default_data_dir)
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".cognicore")
}

pub fn db_path() -> PathBuf {
    data_dir().join("cognicore.db")
}

pub fn log_dir() -> PathBuf {
    data_dir().join("logs")
}

/// Create all required subdirectories under the data dir.
pub fn ensure_dirs() -> io::Result<()> {
    let base = data_dir();
    std::fs::create_dir_all(&base)?;
    std::fs::create_dir_all(base.join("logs"))?;
    Ok(())
}

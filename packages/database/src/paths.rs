#![allow(clippy::module_name_repetitions)]
//! Default locations under the project's `data/` directory.

use std::path::{Path, PathBuf};

/// Returns the workspace root directory.
///
/// Resolved at compile time from `CARGO_MANIFEST_DIR`.
///
/// # Panics
///
/// Panics if the project root cannot be resolved.
#[must_use]
pub fn project_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .nth(2)
        .expect("Failed to find project root from CARGO_MANIFEST_DIR")
        .to_path_buf()
}

/// Returns the `data/` directory path.
#[must_use]
pub fn data_dir() -> PathBuf {
    project_root().join("data")
}

/// Default database file.
#[must_use]
pub fn default_db_path() -> PathBuf {
    data_dir().join("gridiron.duckdb")
}

/// Default directory holding weekly schedule files.
#[must_use]
pub fn schedules_dir() -> PathBuf {
    data_dir().join("schedules")
}

/// Default root for staged artifacts.
#[must_use]
pub fn staging_dir() -> PathBuf {
    data_dir().join("staging")
}

/// Default root for quarantine files.
#[must_use]
pub fn quarantine_dir() -> PathBuf {
    data_dir().join("quarantine")
}

/// Ensures a directory exists, creating it if necessary.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be created.
pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

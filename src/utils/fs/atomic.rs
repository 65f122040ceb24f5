//! Atomic file write operations using temp-and-rename strategy.
//!
//! Every state record the updater leaves for the next process goes through [`atomic_write`], so
//! a crash mid-write leaves either the old record or the new one, never a torn file.

use super::dirs::ensure_parent_dir;
use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::Path;

/// Atomically writes bytes to a file using a write-then-rename strategy.
///
/// 1. Writes content to a sibling temporary file (`.tmp` extension)
/// 2. Syncs the temporary file to disk
/// 3. Renames the temporary file over the target path
/// 4. Syncs the parent directory so the rename itself is durable (Unix)
///
/// When this returns `Ok`, the content survives a power loss. Callers rely on that before they
/// spawn another process that reads the file.
///
/// # Examples
///
/// ```rust,no_run
/// use updraft_cli::utils::fs::atomic_write;
/// use std::path::Path;
///
/// # fn example() -> anyhow::Result<()> {
/// atomic_write(Path::new("selfupdate.state"), br#"{"state":"FullUpdate"}"#)?;
/// # Ok(())
/// # }
/// ```
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    ensure_parent_dir(path)?;

    let temp_path = path.with_extension("tmp");

    {
        let mut file = fs::File::create(&temp_path)
            .with_context(|| format!("Failed to create temp file: {}", temp_path.display()))?;

        file.write_all(content)
            .with_context(|| format!("Failed to write to temp file: {}", temp_path.display()))?;

        file.sync_all().with_context(|| "Failed to sync file to disk")?;
    }

    fs::rename(&temp_path, path)
        .with_context(|| format!("Failed to rename temp file to: {}", path.display()))?;

    sync_parent_dir(path)?;

    Ok(())
}

/// Serializes `data` as pretty JSON and writes it with [`atomic_write`].
pub fn write_json_file<T>(path: &Path, data: &T) -> Result<()>
where
    T: serde::Serialize,
{
    let json = serde_json::to_vec_pretty(data)
        .with_context(|| format!("Failed to serialize JSON for {}", path.display()))?;
    atomic_write(path, &json)
}

#[cfg(unix)]
fn sync_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::File::open(parent)
            .and_then(|dir| dir.sync_all())
            .with_context(|| format!("Failed to sync directory: {}", parent.display()))?;
    }
    Ok(())
}

// Directory handles cannot be fsync'd on Windows; MoveFileEx already flushes the rename.
#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) -> Result<()> {
    Ok(())
}

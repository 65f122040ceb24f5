//! Directory helpers.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Ensures a directory exists, creating it and all parent directories if necessary.
///
/// Returns an error if the path exists but is not a directory.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .with_context(|| format!("Failed to create directory: {}", path.display()))?;
    } else if !path.is_dir() {
        return Err(anyhow::anyhow!("Path exists but is not a directory: {}", path.display()));
    }
    Ok(())
}

/// Ensures that the parent directory of a file path exists.
pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        ensure_dir(parent)?;
    }
    Ok(())
}

/// Removes a directory tree, ignoring every failure.
///
/// Returns whether the directory is gone afterwards.
pub fn remove_dir_best_effort(path: &Path) -> bool {
    if !path.exists() {
        return true;
    }
    match fs::remove_dir_all(path) {
        Ok(()) => true,
        Err(e) => {
            debug!("Could not remove {}: {}", path.display(), e);
            false
        }
    }
}

/// Copies a file and preserves its permissions on Unix.
pub fn copy_with_permissions(src: &Path, dst: &Path) -> Result<()> {
    ensure_parent_dir(dst)?;
    fs::copy(src, dst)
        .with_context(|| format!("Failed to copy {} to {}", src.display(), dst.display()))?;

    #[cfg(unix)]
    {
        let permissions = fs::metadata(src)
            .with_context(|| format!("Failed to read metadata of {}", src.display()))?
            .permissions();
        fs::set_permissions(dst, permissions)
            .with_context(|| format!("Failed to set permissions on {}", dst.display()))?;
    }

    Ok(())
}
